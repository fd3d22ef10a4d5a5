//! Runtime for executing per-user sessions
//!
//! Every user gets one spawned `SessionRuntime` fed by a bounded channel, so
//! a user's events run strictly one after another while different users run
//! in parallel.

mod executor;
mod rate_limit;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use rate_limit::UserRateLimiter;
pub use traits::*;

use crate::catalog::Catalog;
use crate::config::Config;
use crate::db::{Database, UserId};
use crate::state_machine::{too_long, Event, MSG_TOO_MANY_REQUESTS};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

/// Runtime wired to trait objects; production and tests differ only in parts
pub type SharedRuntime =
    SessionRuntime<Arc<dyn SessionStore>, Arc<dyn RecordWriter>, Arc<dyn Transport>>;

/// Queued events per user before `dispatch` waits
const EVENT_BUFFER: usize = 32;

#[derive(Debug, Clone)]
pub struct RuntimeSettings {
    pub upload_dir: PathBuf,
    pub rate_limit_per_minute: u32,
    pub max_message_len: usize,
}

impl From<&Config> for RuntimeSettings {
    fn from(config: &Config) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            rate_limit_per_minute: config.rate_limit_per_minute,
            max_message_len: config.max_message_len,
        }
    }
}

/// Handle to a running session
pub struct SessionHandle {
    pub event_tx: mpsc::Sender<Event>,
}

/// Manager for all session runtimes
pub struct RuntimeManager {
    store: Arc<dyn SessionStore>,
    writer: Arc<dyn RecordWriter>,
    catalog: Arc<dyn Catalog>,
    transport: Arc<dyn Transport>,
    settings: RuntimeSettings,
    limiter: UserRateLimiter,
    runtimes: RwLock<HashMap<UserId, SessionHandle>>,
}

impl RuntimeManager {
    pub fn new(db: Database, transport: Arc<dyn Transport>, settings: RuntimeSettings) -> Self {
        let db = Arc::new(db);
        Self::from_parts(db.clone(), db.clone(), db, transport, settings)
    }

    pub fn from_parts(
        store: Arc<dyn SessionStore>,
        writer: Arc<dyn RecordWriter>,
        catalog: Arc<dyn Catalog>,
        transport: Arc<dyn Transport>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            limiter: UserRateLimiter::new(settings.rate_limit_per_minute),
            store,
            writer,
            catalog,
            transport,
            settings,
            runtimes: RwLock::new(HashMap::new()),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Gate an inbound event and queue it on the user's runtime.
    /// Throttled or oversized events only produce a notice.
    pub async fn dispatch(&self, user_id: UserId, event: Event) -> Result<(), String> {
        reject_internal(&event)?;
        if !self.admit(user_id).await {
            return Ok(());
        }
        self.dispatch_admitted(user_id, event).await
    }

    /// Consume one unit of the user's event budget; a throttled user gets
    /// the notice and `false`
    pub async fn admit(&self, user_id: UserId) -> bool {
        if self.limiter.check(user_id) {
            return true;
        }
        self.notify(user_id, MSG_TOO_MANY_REQUESTS).await;
        false
    }

    /// Dispatch an event whose budget was already taken by `admit`
    pub async fn dispatch_admitted(&self, user_id: UserId, event: Event) -> Result<(), String> {
        reject_internal(&event)?;
        let len = event.text_len();
        if len > self.settings.max_message_len {
            tracing::info!(user_id, len, max = self.settings.max_message_len, "Rejecting oversized message");
            self.notify(user_id, &too_long(self.settings.max_message_len))
                .await;
            return Ok(());
        }

        let event_tx = self.get_or_create(user_id).await?;
        event_tx
            .send(event)
            .await
            .map_err(|e| format!("Session runtime for {user_id} is gone: {e}"))
    }

    /// Get or create the runtime for a user
    async fn get_or_create(&self, user_id: UserId) -> Result<mpsc::Sender<Event>, String> {
        {
            let runtimes = self.runtimes.read().await;
            if let Some(handle) = runtimes.get(&user_id).filter(|h| !h.event_tx.is_closed()) {
                return Ok(handle.event_tx.clone());
            }
        }

        let mut runtimes = self.runtimes.write().await;
        // Another dispatch may have won the race for the write lock
        if let Some(handle) = runtimes.get(&user_id) {
            if !handle.event_tx.is_closed() {
                return Ok(handle.event_tx.clone());
            }
            tracing::warn!(user_id, "Session runtime exited, replacing it");
            runtimes.remove(&user_id);
        }

        let session = self.store.load_session(user_id).await?;
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);

        let runtime: SharedRuntime = SessionRuntime::new(
            user_id,
            session,
            self.store.clone(),
            self.writer.clone(),
            self.transport.clone(),
            self.catalog.clone(),
            self.settings.upload_dir.clone(),
            event_rx,
        );
        tokio::spawn(runtime.run());

        runtimes.insert(
            user_id,
            SessionHandle {
                event_tx: event_tx.clone(),
            },
        );
        Ok(event_tx)
    }

    pub async fn active_sessions(&self) -> usize {
        self.runtimes.read().await.len()
    }

    async fn notify(&self, user_id: UserId, text: &str) {
        if let Err(e) = self.transport.send_message(user_id, text, None).await {
            tracing::warn!(user_id, error = %e, "Failed to send notice");
        }
    }
}

fn reject_internal(event: &Event) -> Result<(), String> {
    if event.is_effect_result() {
        return Err(format!("{} is produced internally", event.kind()));
    }
    Ok(())
}
