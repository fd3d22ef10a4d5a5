//! Telegram Bot API transport
//!
//! `TelegramClient` implements the runtime's `Transport` over HTTPS. Updates
//! arrive by long-polling (`poll`) or through the webhook in `api`; both go
//! through `handle_update`, which turns them into typed events at this
//! boundary.

pub mod types;

use crate::db::UserId;
use crate::runtime::{RuntimeManager, Transport};
use crate::state_machine::effect::Keyboard;
use crate::state_machine::{Action, Event};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use types::{
    AnswerCallbackQuery, ApiResponse, DeleteMessage, EditMessageText, File, GetFile, GetUpdates,
    InlineKeyboardMarkup, InputMediaPhoto, SendMessage, SentMessage, Update,
};

/// Seconds the server holds a `getUpdates` call open
const POLL_TIMEOUT_SECS: u64 = 30;

/// Pause after a failed poll
const POLL_BACKOFF: Duration = Duration::from_secs(3);

/// Largest document accepted for download
const MAX_DOCUMENT_BYTES: u64 = 1 << 20;

/// Photos per album; larger sets are split
const MAX_ALBUM: usize = 10;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Http(reqwest::Error),
    #[error("Telegram API error {code}: {description}")]
    Api {
        code: i64,
        description: String,
        retry_after: Option<u64>,
    },
    #[error("Unexpected response: {0}")]
    Decode(String),
    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

/// Request URLs embed the bot token; keep them out of errors and logs
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        TransportError::Http(e.without_url())
    }
}

impl TransportError {
    /// Telegram refuses edits that would not change the message
    fn is_not_modified(&self) -> bool {
        matches!(self, TransportError::Api { description, .. } if description.contains("message is not modified"))
    }
}

pub struct TelegramClient {
    client: Client,
    /// `{api_base}/bot{token}`
    method_url: String,
    /// `{api_base}/file/bot{token}`
    file_url: String,
}

impl TelegramClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(POLL_TIMEOUT_SECS + 30))
            .build()?;
        let base = api_base.trim_end_matches('/');
        Ok(Self {
            client,
            method_url: format!("{base}/bot{token}"),
            file_url: format!("{base}/file/bot{token}"),
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P) -> Result<R, TransportError>
    where
        P: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{method}", self.method_url))
            .json(params)
            .send()
            .await?;
        decode(response).await
    }

    async fn call_multipart<R: DeserializeOwned>(
        &self,
        method: &str,
        form: Form,
    ) -> Result<R, TransportError> {
        let response = self
            .client
            .post(format!("{}/{method}", self.method_url))
            .multipart(form)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, TransportError> {
        self.call(
            "getUpdates",
            &GetUpdates {
                offset,
                timeout: POLL_TIMEOUT_SECS,
                allowed_updates: vec!["message", "callback_query"],
            },
        )
        .await
    }

    /// Polling and a webhook are mutually exclusive on Telegram's side
    pub async fn delete_webhook(&self) -> Result<(), TransportError> {
        let _: bool = self.call("deleteWebhook", &serde_json::json!({})).await?;
        Ok(())
    }

    pub async fn download(&self, file_id: &str) -> Result<Vec<u8>, TransportError> {
        let file: File = self.call("getFile", &GetFile { file_id }).await?;
        let path = file
            .file_path
            .ok_or_else(|| TransportError::Decode(format!("no file_path for {file_id}")))?;
        let response = self
            .client
            .get(format!("{}/{path}", self.file_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }

    async fn photo_part(path: &str) -> Result<Part, TransportError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = std::path::Path::new(path)
            .file_name()
            .map_or_else(|| "image.jpg".to_string(), |n| n.to_string_lossy().into_owned());
        Ok(Part::bytes(bytes).file_name(file_name))
    }

    async fn send_album(&self, chat_id: UserId, paths: &[String]) -> Result<Vec<i64>, TransportError> {
        if let [path] = paths {
            let form = Form::new()
                .text("chat_id", chat_id.to_string())
                .part("photo", Self::photo_part(path).await?);
            let sent: SentMessage = self.call_multipart("sendPhoto", form).await?;
            return Ok(vec![sent.message_id]);
        }

        let mut form = Form::new().text("chat_id", chat_id.to_string());
        let mut media = Vec::with_capacity(paths.len());
        for (i, path) in paths.iter().enumerate() {
            let name = format!("photo{i}");
            media.push(InputMediaPhoto::attachment(&name));
            form = form.part(name, Self::photo_part(path).await?);
        }
        let media = serde_json::to_string(&media)
            .map_err(|e| TransportError::Decode(e.to_string()))?;
        let sent: Vec<SentMessage> = self
            .call_multipart("sendMediaGroup", form.text("media", media))
            .await?;
        Ok(sent.into_iter().map(|m| m.message_id).collect())
    }
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, TransportError> {
    let body = response.text().await?;
    let envelope: ApiResponse<R> = serde_json::from_str(&body)
        .map_err(|e| TransportError::Decode(format!("{e} - body: {body}")))?;
    match envelope {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse {
            error_code,
            description,
            parameters,
            ..
        } => Err(TransportError::Api {
            code: error_code.unwrap_or_default(),
            description: description.unwrap_or_else(|| "no description".to_string()),
            retry_after: parameters.and_then(|p| p.retry_after),
        }),
    }
}

#[async_trait]
impl Transport for TelegramClient {
    async fn send_message(
        &self,
        chat_id: UserId,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<i64, String> {
        let sent: SentMessage = self
            .call(
                "sendMessage",
                &SendMessage {
                    chat_id,
                    text,
                    reply_markup: keyboard.map(InlineKeyboardMarkup::from),
                },
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(sent.message_id)
    }

    async fn edit_message(
        &self,
        chat_id: UserId,
        message_id: i64,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), String> {
        let result: Result<serde_json::Value, _> = self
            .call(
                "editMessageText",
                &EditMessageText {
                    chat_id,
                    message_id,
                    text,
                    reply_markup: keyboard.map(InlineKeyboardMarkup::from),
                },
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_modified() => Ok(()),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn delete_message(&self, chat_id: UserId, message_id: i64) -> Result<(), String> {
        let _: bool = self
            .call(
                "deleteMessage",
                &DeleteMessage {
                    chat_id,
                    message_id,
                },
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    async fn send_media_group(
        &self,
        chat_id: UserId,
        paths: &[String],
    ) -> Result<Vec<i64>, String> {
        let mut ids = Vec::with_capacity(paths.len());
        for chunk in paths.chunks(MAX_ALBUM) {
            ids.extend(
                self.send_album(chat_id, chunk)
                    .await
                    .map_err(|e| e.to_string())?,
            );
        }
        Ok(ids)
    }

    async fn fetch_file(&self, file_id: &str) -> Result<Vec<u8>, String> {
        self.download(file_id).await.map_err(|e| e.to_string())
    }

    async fn answer_callback(&self, callback_id: &str) -> Result<(), String> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                &AnswerCallbackQuery {
                    callback_query_id: callback_id,
                },
            )
            .await
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}

// ============================================================================
// Inbound updates
// ============================================================================

/// An update reduced to what the dispatcher needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ready(Event),
    /// Document whose bytes still have to be fetched
    Document {
        file_id: String,
        file_name: Option<String>,
    },
}

/// Convert an update into the sending user and an inbound event.
/// Malformed callback data is rejected here, before any session is touched.
pub fn parse_update(update: Update) -> Option<(UserId, Inbound)> {
    if let Some(callback) = update.callback_query {
        let user_id = callback.from.id;
        let data = callback.data.unwrap_or_default();
        let action = match data.parse::<Action>() {
            Ok(action) => action,
            Err(e) => {
                tracing::warn!(user_id, data = %data, error = %e, "Malformed callback data");
                return None;
            }
        };
        let event = Event::Action {
            action,
            message_id: callback.message.map(|m| m.message_id),
        };
        return Some((user_id, Inbound::Ready(event)));
    }

    let message = update.message?;
    let user_id = message.from.as_ref().map_or(message.chat.id, |u| u.id);

    if let Some(document) = message.document {
        if document.file_size.unwrap_or(0) > MAX_DOCUMENT_BYTES {
            tracing::warn!(user_id, size = ?document.file_size, "Document too large, ignoring");
            return None;
        }
        return Some((
            user_id,
            Inbound::Document {
                file_id: document.file_id,
                file_name: document.file_name,
            },
        ));
    }

    if let Some(photo) = message.photo {
        let largest = photo
            .into_iter()
            .max_by_key(|p| u64::from(p.width) * u64::from(p.height))?;
        return Some((
            user_id,
            Inbound::Ready(Event::Photo {
                file_id: largest.file_id,
            }),
        ));
    }

    let text = message.text?;
    if text == "/start" || text.starts_with("/start ") {
        let display_name = message
            .from
            .map(|u| u.first_name)
            .filter(|n| !n.trim().is_empty());
        return Some((user_id, Inbound::Ready(Event::Start { display_name })));
    }
    Some((user_id, Inbound::Ready(Event::Text { text })))
}

/// Acknowledge, convert and dispatch one update
pub async fn handle_update(manager: &RuntimeManager, update: Update) {
    let transport = manager.transport();
    if let Some(callback) = &update.callback_query {
        if let Err(e) = transport.answer_callback(&callback.id).await {
            tracing::debug!(error = %e, "Failed to answer callback");
        }
    }

    let update_id = update.update_id;
    let Some((user_id, inbound)) = parse_update(update) else {
        tracing::debug!(update_id, "Ignoring update");
        return;
    };

    let result = match inbound {
        Inbound::Ready(event) => manager.dispatch(user_id, event).await,
        Inbound::Document { file_id, file_name } => {
            // Throttled users are turned away before the download
            if !manager.admit(user_id).await {
                return;
            }
            let bytes = match transport.fetch_file(&file_id).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(user_id, file_id = %file_id, error = %e, "Failed to download document");
                    return;
                }
            };
            manager
                .dispatch_admitted(user_id, Event::Document { file_name, bytes })
                .await
        }
    };

    if let Err(e) = result {
        tracing::error!(user_id, update_id, error = %e, "Dispatch failed");
    }
}

/// Long-poll `getUpdates` until cancelled
pub async fn poll(client: &TelegramClient, manager: &RuntimeManager, shutdown: CancellationToken) {
    if let Err(e) = client.delete_webhook().await {
        tracing::warn!(error = %e, "Failed to clear webhook before polling");
    }
    tracing::info!("Long-polling for updates");

    let mut offset = 0;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => break,
            result = client.get_updates(offset) => {
                match result {
                    Ok(updates) => {
                        for update in updates {
                            offset = offset.max(update.update_id + 1);
                            handle_update(manager, update).await;
                        }
                    }
                    Err(e) => {
                        let pause = match &e {
                            TransportError::Api { retry_after: Some(secs), .. } => Duration::from_secs(*secs),
                            _ => POLL_BACKOFF,
                        };
                        tracing::warn!(error = %e, pause_secs = pause.as_secs(), "getUpdates failed");
                        tokio::time::sleep(pause).await;
                    }
                }
            }
        }
    }

    tracing::info!("Polling stopped");
}
