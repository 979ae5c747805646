//! Line protocol spoken by the decision service.
//!
//! Each request is one line, `COMMAND [key]`, and each reply is one line of
//! JSON:
//!
//! ```text
//! CHECK 10.0.0.1   -> {"allowed":true,"remaining":99,"reset_at":900000}
//! PEEK 10.0.0.1    -> {"count":1,"remaining":99,"reset_at":900000}
//! RESET 10.0.0.1   -> {"removed":true}
//! PING             -> {"pong":true}
//! ```

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::ratelimit::{ClientKey, Decision, LimiterBackend};

/// Longest request line accepted, including the trailing newline.
pub const MAX_LINE_LENGTH: usize = 1024;

/// A parsed request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check(ClientKey),
    Peek(ClientKey),
    Reset(ClientKey),
    Ping,
}

/// Errors for request lines that cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("{0} requires a client key")]
    MissingKey(&'static str),

    #[error("request line is not valid UTF-8")]
    InvalidUtf8,

    #[error("request line exceeds {0} bytes")]
    LineTooLong(usize),
}

impl Command {
    /// Parse one request line. Blank lines yield `Ok(None)`.
    ///
    /// The command word is case-insensitive; the key is the rest of the line
    /// with surrounding whitespace removed.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }

        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let keyed = |name: &'static str| {
            if rest.is_empty() {
                Err(ParseError::MissingKey(name))
            } else {
                Ok(ClientKey::from(rest))
            }
        };

        let command = match word.to_ascii_uppercase().as_str() {
            "CHECK" => Command::Check(keyed("CHECK")?),
            "PEEK" => Command::Peek(keyed("PEEK")?),
            "RESET" => Command::Reset(keyed("RESET")?),
            "PING" => Command::Ping,
            _ => return Err(ParseError::UnknownCommand(word.to_string())),
        };

        Ok(Some(command))
    }

    /// Parse one raw request line, rejecting bytes that are not UTF-8.
    pub fn parse_bytes(line: &[u8]) -> Result<Option<Self>, ParseError> {
        let line = std::str::from_utf8(line).map_err(|_| ParseError::InvalidUtf8)?;
        Self::parse(line)
    }
}

/// One JSON reply line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Decision(Decision),
    Usage {
        count: u64,
        remaining: u64,
        reset_at: Option<u64>,
    },
    Reset {
        removed: bool,
    },
    Pong {
        pong: bool,
    },
    Error {
        error: String,
    },
}

/// Run a command against the backend.
pub async fn execute<B: LimiterBackend + ?Sized>(backend: &B, command: Command) -> Reply {
    match command {
        Command::Check(key) => Reply::Decision(backend.check(&key).await),
        Command::Peek(key) => match backend.peek(&key).await {
            Some(usage) => Reply::Usage {
                count: usage.count,
                remaining: usage.remaining,
                reset_at: Some(usage.reset_at),
            },
            None => Reply::Usage {
                count: 0,
                remaining: backend.max_requests(),
                reset_at: None,
            },
        },
        Command::Reset(key) => Reply::Reset {
            removed: backend.reset(&key).await,
        },
        Command::Ping => Reply::Pong { pong: true },
    }
}

/// Outcome of reading one request line.
enum Frame {
    /// A complete line (or the unterminated tail before EOF) is in the buffer
    Line,
    /// The line ran past `MAX_LINE_LENGTH` and was discarded up to its newline
    TooLong,
    /// The peer closed the connection
    Closed,
}

/// Read one newline-terminated line into `buf`, buffering at most
/// `MAX_LINE_LENGTH` bytes of it.
async fn read_frame<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<Frame>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let mut overflowed = false;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(if overflowed {
                Frame::TooLong
            } else if buf.is_empty() {
                Frame::Closed
            } else {
                Frame::Line
            });
        }

        let (used, complete) = match available.iter().position(|&b| b == b'\n') {
            Some(end) => (end + 1, true),
            None => (available.len(), false),
        };

        if !overflowed {
            if buf.len() + used > MAX_LINE_LENGTH {
                overflowed = true;
                buf.clear();
            } else {
                buf.extend_from_slice(&available[..used]);
            }
        }
        reader.consume(used);

        if complete {
            return Ok(if overflowed { Frame::TooLong } else { Frame::Line });
        }
    }
}

/// Serve request lines from `stream` until the peer closes it.
///
/// Malformed lines, including non-UTF-8 and oversized ones, get an error
/// reply and the connection stays open.
pub async fn handle_connection<B, S>(backend: &B, stream: S) -> std::io::Result<()>
where
    B: LimiterBackend + ?Sized,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut stream = BufReader::new(stream);
    let mut line = Vec::new();

    loop {
        let parsed = match read_frame(&mut stream, &mut line).await? {
            Frame::Closed => {
                debug!("Peer closed connection");
                return Ok(());
            }
            Frame::TooLong => Err(ParseError::LineTooLong(MAX_LINE_LENGTH)),
            Frame::Line => Command::parse_bytes(&line),
        };

        let reply = match parsed {
            Ok(Some(command)) => execute(backend, command).await,
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Rejected malformed command");
                Reply::Error {
                    error: e.to_string(),
                }
            }
        };

        let mut out = serde_json::to_string(&reply)?;
        out.push('\n');
        stream.write_all(out.as_bytes()).await?;
    }
}
