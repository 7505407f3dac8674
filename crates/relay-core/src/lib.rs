//! `relay-core` — the action-orchestration core behind the CRM back office.
//!
//! An operator click becomes a durable [`types::ActionRequest`], guarded so
//! at most one action of a given type is in flight per entity, dispatched
//! fire-and-forget to an external worker, and resolved by the worker's
//! callback. Live delivery back to the waiting client goes through the
//! [`hub::OutcomeHub`]; the [`store::ActionStore`] stays the system of
//! record throughout.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod notification;
pub mod orchestrator;
pub mod store;
pub mod types;

pub use config::RelayConfig;
pub use dispatch::Dispatcher;
pub use error::{RelayError, Result};
pub use hub::{InMemoryHub, OutcomeHub};
pub use notification::Notification;
pub use orchestrator::{CallbackAck, Orchestrator};
pub use store::{ActionStore, Resolution};
pub use types::{
    ActionRequest, ActionStatus, ActionType, EntityRef, EventStatus, Outcome, OutcomeEvent,
    TriggerRequest,
};
