//! walletctl Ledger - Durable record of every inbound request
//!
//! The ledger is:
//! - Receipt-first (a request is recorded before any side-effecting work)
//! - Single-outcome (each request reaches exactly one terminal state)
//! - Append-only (events are never deleted)
//!
//! # Invariants
//!
//! 1. `record` must be confirmed before the caller proceeds
//! 2. Terminal states are never left or overwritten
//! 3. A handle can be advanced at most once

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::debug;
use walletctl_types::{
    AppId, Application, RequestContext, RequestEvent, RequestEventId, RequestState,
    TerminalState,
};

/// Errors that can occur in ledger operations
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("Ledger {operation} timed out")]
    Timeout { operation: &'static str },

    #[error("Request event not found: {event_id}")]
    NotFound { event_id: String },

    #[error("Invalid transition for {event_id}: {from} -> {to}")]
    InvalidTransition {
        event_id: String,
        from: RequestState,
        to: RequestState,
    },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Storage backing the ledger
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Durably insert a new event
    async fn insert(&self, event: &RequestEvent) -> Result<()>;

    /// Move an event from `received` to `to`.
    ///
    /// Fails with `InvalidTransition` if the event is already terminal.
    async fn transition(
        &self,
        id: &RequestEventId,
        to: RequestState,
        at: DateTime<Utc>,
    ) -> Result<()>;

    /// Fetch an event by ID
    async fn get(&self, id: &RequestEventId) -> Result<Option<RequestEvent>>;
}

/// Proof that a request was recorded.
///
/// Consumed by [`EventLedger::advance`], so one request cannot be advanced
/// twice through the same handle.
#[derive(Debug)]
#[must_use = "a recorded request must be advanced to a terminal state"]
pub struct EventHandle {
    id: RequestEventId,
    app_id: AppId,
    origin_event_id: String,
}

impl EventHandle {
    pub fn id(&self) -> &RequestEventId {
        &self.id
    }

    pub fn app_id(&self) -> &AppId {
        &self.app_id
    }

    pub fn origin_event_id(&self) -> &str {
        &self.origin_event_id
    }
}

/// The request event ledger
#[derive(Clone)]
pub struct EventLedger {
    store: Arc<dyn EventStore>,
}

impl EventLedger {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Record a request in the `received` state
    pub async fn record(
        &self,
        ctx: &RequestContext,
        application: &Application,
        origin_event_id: &str,
        content: &str,
    ) -> Result<EventHandle> {
        let event = RequestEvent::received(application.id.clone(), origin_event_id, content);

        ctx.run(self.store.insert(&event))
            .await
            .map_err(|_| LedgerError::Timeout { operation: "record" })??;

        debug!(
            event_id = %event.id,
            origin_event_id,
            app_id = %application.id,
            "Recorded request event"
        );

        Ok(EventHandle {
            id: event.id,
            app_id: event.app_id,
            origin_event_id: event.origin_event_id,
        })
    }

    /// Mark the terminal outcome of a recorded request
    pub async fn advance(
        &self,
        ctx: &RequestContext,
        handle: EventHandle,
        state: TerminalState,
    ) -> Result<RequestState> {
        let to = RequestState::from(state);

        ctx.run(self.store.transition(&handle.id, to, Utc::now()))
            .await
            .map_err(|_| LedgerError::Timeout { operation: "advance" })??;

        debug!(event_id = %handle.id, state = %to, "Advanced request event");
        Ok(to)
    }

    /// Fetch an event by ID
    pub async fn get(&self, id: &RequestEventId) -> Result<Option<RequestEvent>> {
        self.store.get(id).await
    }
}

/// In-process event store
#[derive(Clone, Default)]
pub struct MemoryEventStore {
    events: Arc<RwLock<HashMap<RequestEventId, RequestEvent>>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events recorded for an application
    pub async fn events_for_app(&self, app_id: &AppId) -> Vec<RequestEvent> {
        let events = self.events.read().await;
        let mut found: Vec<_> = events
            .values()
            .filter(|e| &e.app_id == app_id)
            .cloned()
            .collect();
        found.sort_by_key(|e| e.created_at);
        found
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn insert(&self, event: &RequestEvent) -> Result<()> {
        let mut events = self.events.write().await;
        if events.contains_key(&event.id) {
            return Err(LedgerError::Persistence {
                message: format!("duplicate request event {}", event.id),
            });
        }
        events.insert(event.id.clone(), event.clone());
        Ok(())
    }

    async fn transition(
        &self,
        id: &RequestEventId,
        to: RequestState,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut events = self.events.write().await;
        let event = events.get_mut(id).ok_or_else(|| LedgerError::NotFound {
            event_id: id.to_string(),
        })?;

        if event.state.is_terminal() {
            return Err(LedgerError::InvalidTransition {
                event_id: id.to_string(),
                from: event.state,
                to,
            });
        }

        event.state = to;
        event.updated_at = at;
        Ok(())
    }

    async fn get(&self, id: &RequestEventId) -> Result<Option<RequestEvent>> {
        Ok(self.events.read().await.get(id).cloned())
    }
}
