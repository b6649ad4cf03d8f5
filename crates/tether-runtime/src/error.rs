use tether_events::EventError;
use thiserror::Error;

use crate::transport::FetchError;

/// Errors surfaced to script code and to the host
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Event type name outside the taxonomy
    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    /// Operation not allowed in the current state (e.g. peek while subscribed)
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Fetch failed and no saved copy of the script exists
    #[error("Failed to load {name} from {url}: {source}")]
    PackageUnavailable {
        name: String,
        url: String,
        #[source]
        source: FetchError,
    },

    /// Script failed to compile or raised while running
    #[error("Script error in {package}: {message}")]
    Script { package: String, message: String },

    /// A binding outlived the session it was created for
    #[error("Session has ended")]
    SessionEnded,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RuntimeError {
    pub fn script(package: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Script {
            package: package.into(),
            message: message.into(),
        }
    }
}

impl From<EventError> for RuntimeError {
    fn from(error: EventError) -> Self {
        match error {
            EventError::InvalidEventType(name) => RuntimeError::InvalidEventType(name),
            other => RuntimeError::InvalidArgument(other.to_string()),
        }
    }
}
