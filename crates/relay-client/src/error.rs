use relay_core::ActionRequest;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayClientError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("failed to parse outcome event: {source}\n  data: {data}")]
    Parse {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("action already in progress: {message}")]
    Conflict {
        message: String,
        existing: Option<Box<ActionRequest>>,
    },

    #[error("server returned {status}: {message}")]
    Server { status: u16, message: String },

    #[error("event stream closed before a terminal event arrived")]
    ClosedWithoutEvent,
}
