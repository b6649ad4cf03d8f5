use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The name is not part of the event taxonomy
    #[error("Invalid event type: {0}")]
    InvalidEventType(String),

    #[error("Invalid button: {0}")]
    InvalidButton(String),

    #[error("Invalid axis: {0}")]
    InvalidAxis(String),
}
