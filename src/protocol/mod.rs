//! Line Protocol Implementation
//!
//! Plain text over TCP: one command per `\n`-terminated line, tokens separated
//! by whitespace, one reply line per command.
//!
//! - `types`: [`Command`] and [`Reply`], reply serialization
//! - `parser`: incremental [`LineParser`] and [`parse_command`]
//!
//! ## Example
//!
//! ```
//! use linekv::protocol::{parse_command, Command, Reply};
//!
//! let command = parse_command("GET name").unwrap();
//! assert_eq!(command, Command::Get { key: "name".to_string() });
//!
//! let reply = Reply::Value("Ariz".to_string());
//! assert_eq!(&reply.serialize()[..], b"Ariz\n");
//! ```

pub mod parser;
pub mod types;

pub use parser::{
    parse_command, Frame, LineParser, ParseResult, ProtocolError, DEFAULT_MAX_LINE_LENGTH,
};
pub use types::{Command, Reply};
