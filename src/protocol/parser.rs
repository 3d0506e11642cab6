//! Incremental Line Parser
//!
//! The connection loop appends socket data to a buffer and calls
//! [`LineParser::parse`] until it returns `None`:
//!
//! - `Some((frame, consumed))` - a frame is ready; advance the buffer by `consumed`
//! - `None` - no complete line yet, read more
//!
//! A line longer than the configured maximum is reported once as
//! [`ProtocolError::LineTooLong`] and the remainder of that line is skipped,
//! so one bad client line never desynchronizes the stream.

use crate::protocol::types::Command;
use thiserror::Error;

/// Errors that can occur while turning a line into a [`Command`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("empty command")]
    EmptyCommand,

    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("wrong number of arguments for '{0}' command")]
    WrongArity(&'static str),

    /// Carries the offending token
    #[error("value is not an integer")]
    InvalidInteger(String),

    #[error("line too long ({len} bytes, max {max})")]
    LineTooLong { len: usize, max: usize },

    #[error("invalid UTF-8 in command")]
    InvalidUtf8,
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ProtocolError>;

/// Default maximum line length (64 KB)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 64 * 1024;

/// What the parser found at the front of the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A well-formed command
    Command(Command),
    /// Nothing to answer: an empty line, or bytes of a line already rejected
    Blank,
    /// A complete but unusable line; answer with an error and carry on
    Invalid(ProtocolError),
}

/// Splits a byte stream into command lines.
#[derive(Debug)]
pub struct LineParser {
    max_line_length: usize,
    /// Skipping the rest of an over-long line
    discarding: bool,
}

impl Default for LineParser {
    fn default() -> Self {
        Self::new()
    }
}

impl LineParser {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            discarding: false,
        }
    }

    /// Attempts to take one frame off the front of `buf`.
    pub fn parse(&mut self, buf: &[u8]) -> Option<(Frame, usize)> {
        if buf.is_empty() {
            return None;
        }

        let max = self.max_line_length;
        match buf.iter().position(|&b| b == b'\n') {
            Some(pos) if self.discarding => {
                self.discarding = false;
                Some((Frame::Blank, pos + 1))
            }
            Some(pos) if pos > max => Some((
                Frame::Invalid(ProtocolError::LineTooLong { len: pos, max }),
                pos + 1,
            )),
            Some(pos) => Some((parse_line(&buf[..pos]), pos + 1)),
            None if self.discarding => Some((Frame::Blank, buf.len())),
            None if buf.len() > max => {
                self.discarding = true;
                Some((
                    Frame::Invalid(ProtocolError::LineTooLong {
                        len: buf.len(),
                        max,
                    }),
                    buf.len(),
                ))
            }
            None => None,
        }
    }
}

/// Parses one line (without its `\n`).
fn parse_line(line: &[u8]) -> Frame {
    let line = line.strip_suffix(b"\r").unwrap_or(line);

    let text = match std::str::from_utf8(line) {
        Ok(text) => text,
        Err(_) => return Frame::Invalid(ProtocolError::InvalidUtf8),
    };

    if text.trim().is_empty() {
        return Frame::Blank;
    }

    match parse_command(text) {
        Ok(command) => Frame::Command(command),
        Err(e) => Frame::Invalid(e),
    }
}

fn parse_integer(token: &str) -> ParseResult<i64> {
    token
        .parse()
        .map_err(|_| ProtocolError::InvalidInteger(token.to_string()))
}

fn single_key(args: &[&str], name: &'static str) -> ParseResult<String> {
    match args {
        [key] => Ok(key.to_string()),
        _ => Err(ProtocolError::WrongArity(name)),
    }
}

fn no_args(args: &[&str], command: Command) -> ParseResult<Command> {
    if args.is_empty() {
        Ok(command)
    } else {
        Err(ProtocolError::WrongArity(command.name()))
    }
}

/// Parses a command line into a [`Command`].
///
/// Keywords are case-sensitive and must be uppercase.
pub fn parse_command(line: &str) -> ParseResult<Command> {
    let mut tokens = line.split_whitespace();
    let name = tokens.next().ok_or(ProtocolError::EmptyCommand)?;
    let args: Vec<&str> = tokens.collect();

    match name {
        "SET" => match args.as_slice() {
            [key, value] => Ok(Command::Set {
                key: key.to_string(),
                value: value.to_string(),
                ttl: None,
            }),
            [key, value, ttl] => Ok(Command::Set {
                key: key.to_string(),
                value: value.to_string(),
                ttl: Some(parse_integer(ttl)?),
            }),
            _ => Err(ProtocolError::WrongArity("SET")),
        },
        "GET" => single_key(&args, "GET").map(|key| Command::Get { key }),
        "DEL" => single_key(&args, "DEL").map(|key| Command::Del { key }),
        "EXISTS" => single_key(&args, "EXISTS").map(|key| Command::Exists { key }),
        "TTL" => single_key(&args, "TTL").map(|key| Command::Ttl { key }),
        "EXPIRE" => match args.as_slice() {
            [key, seconds] => Ok(Command::Expire {
                key: key.to_string(),
                seconds: parse_integer(seconds)?,
            }),
            _ => Err(ProtocolError::WrongArity("EXPIRE")),
        },
        "PING" => match args.as_slice() {
            [] => Ok(Command::Ping { message: None }),
            [message] => Ok(Command::Ping {
                message: Some(message.to_string()),
            }),
            _ => Err(ProtocolError::WrongArity("PING")),
        },
        "KEYS" => no_args(&args, Command::Keys),
        "SAVE" => no_args(&args, Command::Save),
        "LOAD" => no_args(&args, Command::Load),
        "CLEAR" => no_args(&args, Command::Clear),
        "FLUSH" => no_args(&args, Command::Flush),
        "STATS" => no_args(&args, Command::Stats),
        "HELP" => no_args(&args, Command::Help),
        "QUIT" => no_args(&args, Command::Quit),
        _ => Err(ProtocolError::UnknownCommand(name.to_string())),
    }
}
