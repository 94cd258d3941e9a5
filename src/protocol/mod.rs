//! Command Protocol
//!
//! Clients send one command per line. A line is split on runs of ASCII
//! whitespace, the first field names the command (case-insensitive) and the
//! remaining fields are its arguments. There is no quoting or escaping.
//!
//! ## Modules
//!
//! - `parser`: Turns a raw line into a typed [`Operation`]
//! - `operation`: The typed operations the dispatcher executes
//! - `reply`: The `Reply` enum and its wire encoding
//!
//! ## Example
//!
//! ```
//! use cider::protocol::{parse_command, Operation, Reply};
//!
//! let op = parse_command(b"GET name").unwrap();
//! assert_eq!(op, Operation::Get { key: "name".to_string() });
//!
//! let reply = Reply::bulk("cider");
//! assert_eq!(&reply.serialize()[..], b"$5\r\ncider\r\n");
//! ```

pub mod operation;
pub mod parser;
pub mod reply;

// Re-export commonly used types for convenience
pub use operation::{ExpireOperation, Expiry, Operation, SetOperation};
pub use parser::{parse_command, ParseError, ParseResult};
pub use reply::Reply;
