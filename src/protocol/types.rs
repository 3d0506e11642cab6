//! Line Protocol Data Types
//!
//! Requests are single lines of whitespace-separated tokens terminated by `\n`.
//! Every request that is not blank gets exactly one reply line.
//!
//! ## Examples
//!
//! ```text
//! > SET name Ariz        < OK
//! > GET name             < Ariz
//! > GET missing          < Key not found
//! > DEL name             < 1
//! > KEYS                 < a b c
//! > FROB                 < ERROR: unknown command 'FROB'
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Reply text for a GET/TTL/EXPIRE on an absent key.
pub const NOT_FOUND: &str = "Key not found";

/// Reply text for KEYS on an empty store.
pub const EMPTY_KEYS: &str = "(empty)";

/// Prefix of every error reply.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// A parsed client request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `SET key value [ttl]`
    Set {
        key: String,
        value: String,
        ttl: Option<i64>,
    },
    /// `GET key`
    Get { key: String },
    /// `DEL key`
    Del { key: String },
    /// `EXISTS key`
    Exists { key: String },
    /// `EXPIRE key seconds`
    Expire { key: String, seconds: i64 },
    /// `TTL key`
    Ttl { key: String },
    Keys,
    Save,
    Load,
    Clear,
    Flush,
    Stats,
    /// `PING [message]`
    Ping { message: Option<String> },
    Help,
    Quit,
}

impl Command {
    /// The wire keyword for this command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Set { .. } => "SET",
            Command::Get { .. } => "GET",
            Command::Del { .. } => "DEL",
            Command::Exists { .. } => "EXISTS",
            Command::Expire { .. } => "EXPIRE",
            Command::Ttl { .. } => "TTL",
            Command::Keys => "KEYS",
            Command::Save => "SAVE",
            Command::Load => "LOAD",
            Command::Clear => "CLEAR",
            Command::Flush => "FLUSH",
            Command::Stats => "STATS",
            Command::Ping { .. } => "PING",
            Command::Help => "HELP",
            Command::Quit => "QUIT",
        }
    }
}

/// A single reply line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// `OK`
    Ok,
    /// `BYE`, sent before the server closes the connection
    Bye,
    /// `PONG`
    Pong,
    /// `Key not found`
    NotFound,
    /// A stored value, returned verbatim
    Value(String),
    /// A decimal integer
    Integer(i64),
    /// Space-joined keys, or `(empty)`
    Keys(Vec<String>),
    /// Free-form informational text (STATS, HELP)
    Info(String),
    /// `ERROR: <message>`
    Error(String),
}

impl Reply {
    pub fn ok() -> Self {
        Reply::Ok
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Reply::Error(msg.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// `1` for true, `0` for false.
    pub fn flag(b: bool) -> Self {
        Reply::Integer(b as i64)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Encodes the reply as one `\n`-terminated line.
    ///
    /// Any embedded line breaks are flattened to spaces so a reply can never
    /// span more than one line.
    pub fn serialize(&self) -> Bytes {
        let line = self.to_string();
        let mut buf = BytesMut::with_capacity(line.len() + 1);
        for b in line.bytes() {
            buf.put_u8(if b == b'\n' || b == b'\r' { b' ' } else { b });
        }
        buf.put_u8(b'\n');
        buf.freeze()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Bye => write!(f, "BYE"),
            Reply::Pong => write!(f, "PONG"),
            Reply::NotFound => write!(f, "{}", NOT_FOUND),
            Reply::Value(v) => write!(f, "{}", v),
            Reply::Integer(n) => write!(f, "{}", n),
            Reply::Keys(keys) if keys.is_empty() => write!(f, "{}", EMPTY_KEYS),
            Reply::Keys(keys) => write!(f, "{}", keys.join(" ")),
            Reply::Info(text) => write!(f, "{}", text),
            Reply::Error(msg) => write!(f, "{}{}", ERROR_PREFIX, msg),
        }
    }
}
