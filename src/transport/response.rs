//! SMTP reply parsing.

use crate::error::TransportError;

type Result<T> = std::result::Result<T, TransportError>;

/// Represents a single line in an SMTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLine {
    pub code: u16,
    /// Whether this is the last line in a multi-line response.
    pub is_last: bool,
    pub message: String,
}

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: u16,
    /// Message text of every line, status codes removed.
    pub lines: Vec<String>,
}

impl Response {
    #[must_use]
    pub const fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// Returns the complete message as a single string with lines joined by newlines.
    #[must_use]
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }

    /// Returns `true` if this response indicates success (2xx code).
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code >= 200 && self.code < 300
    }

    /// The token the relay put after the status code of its final line.
    ///
    /// Relays answer the end of `DATA` with `250 <token> ...`; the token is
    /// the local part of the id they reissued for the message.
    #[must_use]
    pub fn relay_token(&self) -> Option<&str> {
        self.lines.last()?.split_whitespace().next()
    }

    /// Parses a single response line.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Parse` if the line doesn't match SMTP format.
    pub fn parse_line(line: &str) -> Result<ResponseLine> {
        let code_str = line
            .get(..3)
            .ok_or_else(|| TransportError::Parse(format!("Response line too short: '{line}'")))?;
        if !code_str.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TransportError::Parse(format!(
                "Invalid status code: '{code_str}'"
            )));
        }
        let code = code_str
            .parse::<u16>()
            .map_err(|_| TransportError::Parse(format!("Invalid status code: '{code_str}'")))?;

        let is_last = match line[3..].chars().next() {
            None | Some(' ') => true,
            Some('-') => false,
            Some(c) => {
                return Err(TransportError::Parse(format!(
                    "Invalid separator character: '{c}'"
                )));
            }
        };

        let message = line.get(4..).unwrap_or_default().to_string();

        Ok(ResponseLine {
            code,
            is_last,
            message,
        })
    }

    /// Parses a complete reply from raw bytes as handed back by the transport.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Parse` if the reply is malformed or incomplete.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)?;
        let mut lines = Vec::new();
        let mut first_code = None;

        for line in text.lines().filter(|line| !line.is_empty()) {
            let parsed = Self::parse_line(line)?;

            match first_code {
                Some(code) if parsed.code != code => {
                    return Err(TransportError::Parse(format!(
                        "Status code mismatch in multi-line response: expected {code}, got {}",
                        parsed.code
                    )));
                }
                Some(_) => {}
                None => first_code = Some(parsed.code),
            }

            lines.push(parsed.message);

            if parsed.is_last {
                return Ok(Self::new(parsed.code, lines));
            }
        }

        Err(TransportError::Parse(format!("Incomplete response: '{text}'")))
    }
}
