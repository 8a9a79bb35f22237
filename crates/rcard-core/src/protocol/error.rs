//! Client-visible error taxonomy.

use thiserror::Error;

/// `result` code for most failures.
pub const RESULT_FAILURE: i32 = -1;

/// `result` code for failures while a command was on its way to the card.
pub const RESULT_TRANSMIT_FAILURE: i32 = -2;

/// Every failure a request can report.
///
/// The `Display` text is what clients see in the `error` field of the
/// response, so most variants render their message verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Malformed or out-of-range request fields.
    #[error("{0}")]
    Validation(String),

    /// The backend could not be reached, the reader was not found or the
    /// applet could not be selected.
    #[error("{0}")]
    Connection(String),

    /// The backend failed while executing a command.
    #[error("Exception during execution: {0}")]
    Transmit(String),

    /// The deployment forbids the requested operation.
    #[error("{0}")]
    Permission(String),

    /// The frame could not be decoded at all.
    #[error("Exception: {0}")]
    Protocol(String),

    /// The `action` tag is missing or not one of the supported actions.
    #[error("UnknownAction")]
    UnknownAction(Option<String>),

    /// The request did not finish within the front-end's deadline.
    #[error("timeout")]
    Timeout,
}

impl GatewayError {
    /// The `result` code a response carries for this error.
    pub fn result_code(&self) -> i32 {
        match self {
            GatewayError::Transmit(_) => RESULT_TRANSMIT_FAILURE,
            _ => RESULT_FAILURE,
        }
    }
}
