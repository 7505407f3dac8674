//! Client side of the relay listener contract.
//!
//! A listener triggers an action, subscribes to its correlation id, awaits
//! exactly one terminal event bounded by a local timeout, and always
//! unsubscribes — on resolution, on timeout, and on drop. A timeout means
//! "unknown outcome"; the caller reconciles later via the status queries.

pub mod client;
pub mod error;
pub mod events;
pub mod types;

pub use client::RelayClient;
pub use error::RelayClientError;
pub use events::EventStream;
pub use types::{ListenOutcome, TriggerAccepted};

pub type Result<T> = std::result::Result<T, RelayClientError>;
