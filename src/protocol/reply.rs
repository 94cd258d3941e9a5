//! Reply Encoding
//!
//! Every command produces exactly one reply. Replies are textual and each one
//! starts with a type prefix byte:
//! - `+` OK
//! - `-` Error (always prefixed with `ERR `)
//! - `_` Nil
//! - `$` Bulk string
//! - `:` Integer
//!
//! All replies are terminated with CRLF (`\r\n`).
//!
//! ## Examples
//!
//! OK: `+OK\r\n`
//! Error: `-ERR key not found\r\n`
//! Nil: `_\r\n`
//! Bulk string: `$3\r\nbar\r\n`
//! Integer: `:42\r\n`

use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// The CRLF terminator used by every reply
pub const CRLF: &[u8] = b"\r\n";

/// Reply type prefixes
pub mod prefix {
    pub const OK: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const NIL: u8 = b'_';
    pub const BULK_STRING: u8 = b'$';
    pub const INTEGER: u8 = b':';
}

/// A reply to a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Success without a value.
    /// Format: `+OK\r\n`
    Ok,

    /// A recoverable error. The message must not contain CRLF.
    /// Format: `-ERR <message>\r\n`
    Error(String),

    /// Absent value, e.g. a GET miss.
    /// Format: `_\r\n`
    Nil,

    /// Length-prefixed byte string.
    /// Format: `$<length>\r\n<data>\r\n`
    Bulk(Bytes),

    /// 64-bit signed integer.
    /// Format: `:<integer>\r\n`
    Integer(i64),
}

impl Reply {
    /// Creates an error reply from anything displayable.
    ///
    /// # Example
    /// ```
    /// use cider::protocol::Reply;
    /// let err = Reply::error("key not found");
    /// assert_eq!(&err.serialize()[..], b"-ERR key not found\r\n");
    /// ```
    pub fn error(message: impl fmt::Display) -> Self {
        Reply::Error(message.to_string())
    }

    /// Creates a bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(data.into())
    }

    /// Creates an integer reply.
    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Serializes the reply into its wire format.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.serialize_into(&mut buf);
        buf.freeze()
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut BytesMut) {
        match self {
            Reply::Ok => {
                buf.put_u8(prefix::OK);
                buf.put_slice(b"OK");
            }
            Reply::Error(message) => {
                buf.put_u8(prefix::ERROR);
                buf.put_slice(b"ERR ");
                buf.put_slice(message.as_bytes());
            }
            Reply::Nil => buf.put_u8(prefix::NIL),
            Reply::Bulk(data) => {
                buf.put_u8(prefix::BULK_STRING);
                buf.put_slice(data.len().to_string().as_bytes());
                buf.put_slice(CRLF);
                buf.put_slice(data);
            }
            Reply::Integer(n) => {
                buf.put_u8(prefix::INTEGER);
                buf.put_slice(n.to_string().as_bytes());
            }
        }
        buf.put_slice(CRLF);
    }

    /// Upper bound on the serialized size, used to size the output buffer.
    fn encoded_len(&self) -> usize {
        match self {
            Reply::Ok => 5,
            Reply::Error(message) => 7 + message.len(),
            Reply::Nil => 3,
            Reply::Bulk(data) => 25 + data.len(),
            Reply::Integer(_) => 23,
        }
    }

    /// Returns true if this reply is an error.
    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ok => write!(f, "OK"),
            Reply::Error(message) => write!(f, "(error) ERR {}", message),
            Reply::Nil => write!(f, "(nil)"),
            Reply::Bulk(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "\"{}\"", s),
                Err(_) => write!(f, "(binary data, {} bytes)", data.len()),
            },
            Reply::Integer(n) => write!(f, "(integer) {}", n),
        }
    }
}
