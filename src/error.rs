//! Error types for proxied requests and control port sessions.
//!
//! Errors from the HTTP and SOCKS collaborators are carried through
//! unchanged; control port failures keep the raw socket error or the raw
//! response text so callers can diagnose what Tor actually said.

use std::io;
use thiserror::Error;

/// The main error type for all tor-request operations.
#[derive(Error, Debug)]
pub enum TorRequestError {
    /// The HTTP client failed to build or perform a request.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success HTTP status.
    #[error("HTTP status {status}: {body}")]
    HttpStatus {
        /// The numeric status code.
        status: u16,
        /// The response body, as text.
        body: String,
    },

    /// The SOCKS agent could not be built or used.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Socket-level failure while talking to the control port.
    #[error("ControlPort connection error: {0}")]
    ControlConnection(#[source] io::Error),

    /// The control port answered with at least one non-success line.
    #[error("Error communicating with Tor ControlPort\n {response}")]
    ControlProtocolViolation {
        /// Status code of the first rejected line, when it could be parsed.
        code: Option<u16>,
        /// The raw accumulated response.
        response: String,
    },

    /// A configured response timeout elapsed.
    #[error("Operation timed out")]
    Timeout,

    /// Invalid argument provided to a request.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type alias for tor-request operations.
pub type Result<T> = std::result::Result<T, TorRequestError>;

/// Tor reply status codes as defined by the Tor control protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 250 - OK
    Ok = 250,
    /// 251 - Operation was unnecessary
    OperationUnnecessary = 251,
    /// 451 - Resource exhausted
    ResourceExhausted = 451,
    /// 500 - Syntax error: protocol
    SyntaxErrorProtocol = 500,
    /// 510 - Unrecognized command
    UnrecognizedCommand = 510,
    /// 512 - Syntax error in command argument
    SyntaxErrorArgument = 512,
    /// 514 - Authentication required
    AuthenticationRequired = 514,
    /// 515 - Bad authentication
    BadAuthentication = 515,
    /// 550 - Unspecified Tor error
    UnspecifiedError = 550,
    /// 551 - Internal error
    InternalError = 551,
    /// 552 - Unrecognized entity
    UnrecognizedEntity = 552,
    /// Unknown status code
    Unknown = 0,
}

impl StatusCode {
    /// The textual token that marks a successful reply line.
    pub const SUCCESS_TOKEN: &'static str = "250";

    /// Parse a status code from a u16 value.
    pub fn from_u16(code: u16) -> Self {
        match code {
            250 => StatusCode::Ok,
            251 => StatusCode::OperationUnnecessary,
            451 => StatusCode::ResourceExhausted,
            500 => StatusCode::SyntaxErrorProtocol,
            510 => StatusCode::UnrecognizedCommand,
            512 => StatusCode::SyntaxErrorArgument,
            514 => StatusCode::AuthenticationRequired,
            515 => StatusCode::BadAuthentication,
            550 => StatusCode::UnspecifiedError,
            551 => StatusCode::InternalError,
            552 => StatusCode::UnrecognizedEntity,
            _ => StatusCode::Unknown,
        }
    }

    /// Check if this status code indicates success.
    pub fn is_success(&self) -> bool {
        matches!(self, StatusCode::Ok | StatusCode::OperationUnnecessary)
    }

    /// Get the numeric value of this status code.
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }
}

impl From<u16> for StatusCode {
    fn from(code: u16) -> Self {
        StatusCode::from_u16(code)
    }
}
