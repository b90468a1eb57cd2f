//! Control port message formatting and response validation.
//!
//! Commands are written as one newline-joined batch and the reply is read
//! until Tor closes the connection, so validation works on the whole
//! accumulated text rather than on individually framed replies.

use crate::error::{Result, StatusCode, TorRequestError};

/// Line separator of the host platform, used to split control responses.
#[cfg(windows)]
pub const LINE_SEPARATOR: &str = "\r\n";

/// Line separator of the host platform, used to split control responses.
#[cfg(not(windows))]
pub const LINE_SEPARATOR: &str = "\n";

/// Separator written between commands.
pub const COMMAND_SEPARATOR: &str = "\n";

/// Message returned once a renewal has been acknowledged.
pub const RENEWAL_SUCCESS_MESSAGE: &str = "Tor session successfully renewed!!";

/// A single status line from Tor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyLine {
    /// The 3-digit status code.
    pub code: u16,
    /// The separator character: '-' for mid-reply, '+' for data, ' ' for end.
    pub separator: char,
    /// The text content of the line.
    pub text: String,
}

impl ReplyLine {
    /// Parse a reply line, ignoring a trailing CR/LF.
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.len() < 4 {
            return Err(TorRequestError::InvalidArgument(format!(
                "Reply line too short: '{}'",
                line
            )));
        }

        let code: u16 = line
            .get(..3)
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| {
                TorRequestError::InvalidArgument(format!("Invalid status code in: '{}'", line))
            })?;

        let separator = line.chars().nth(3).unwrap_or(' ');
        if !matches!(separator, ' ' | '-' | '+') {
            return Err(TorRequestError::InvalidArgument(format!(
                "Invalid separator '{}' in: '{}'",
                separator, line
            )));
        }

        Ok(ReplyLine {
            code,
            separator,
            text: line.get(4..).unwrap_or("").to_string(),
        })
    }

    /// Get the status code as an enum.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.code)
    }

    /// Check if this is the final line of a reply.
    pub fn is_end(&self) -> bool {
        self.separator == ' '
    }
}

/// Everything Tor sent during one control session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlResponse {
    raw: String,
}

impl ControlResponse {
    /// Wrap the raw accumulated text.
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// The text exactly as received.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Lines of the response, without the segment after the final separator.
    pub fn lines(&self) -> Vec<&str> {
        let mut lines: Vec<&str> = self.raw.split(LINE_SEPARATOR).collect();
        lines.pop();
        lines
    }

    /// The first line that is neither blank nor carries the success token.
    pub fn first_rejected_line(&self) -> Option<&str> {
        self.lines().into_iter().find(|line| {
            let content = line.trim_end_matches('\r');
            !content.is_empty() && !content.contains(StatusCode::SUCCESS_TOKEN)
        })
    }

    /// Whether every line was acknowledged.
    pub fn is_success(&self) -> bool {
        self.first_rejected_line().is_none()
    }

    /// Convert into an error if any line was rejected.
    pub fn into_result(self) -> Result<Self> {
        let rejected = self
            .first_rejected_line()
            .map(|line| ReplyLine::parse(line).ok().map(|l| l.code));

        match rejected {
            None => Ok(self),
            Some(code) => Err(TorRequestError::ControlProtocolViolation {
                code,
                response: self.raw,
            }),
        }
    }
}

/// Quote a string as a control-protocol QuotedString.
///
/// The result is always wrapped in double quotes, so an empty string becomes `""`.
pub fn quote_string(s: &str) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    result.push('"');

    for c in s.chars() {
        match c {
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            _ => result.push(c),
        }
    }

    result.push('"');
    result
}

/// Join commands into the single payload written to the socket.
pub fn format_commands<S: AsRef<str>>(commands: &[S]) -> String {
    let mut payload = commands
        .iter()
        .map(|command| command.as_ref())
        .collect::<Vec<&str>>()
        .join(COMMAND_SEPARATOR);
    payload.push_str(COMMAND_SEPARATOR);
    payload
}

/// The commands that authenticate, request a new identity and hang up.
pub fn renewal_commands(password: &str) -> Vec<String> {
    vec![
        format!("authenticate {}", quote_string(password)),
        "signal newnym".to_string(),
        "quit".to_string(),
    ]
}
