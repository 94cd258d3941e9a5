//! Command Line Parser
//!
//! Turns one raw command line into a typed [`Operation`].
//!
//! ## How the Parser Works
//!
//! The line is split on runs of ASCII whitespace. Quotes have no special
//! meaning, so `SET k "a b"` stores the four bytes `"a b"` including the
//! quote characters. The first field selects the command (case-insensitive)
//! and the rest is read in a single left-to-right pass:
//!
//! ```text
//! SET  key  v1 v2 v3  NX  GET  EX 10
//!  0    1   2  3  4   5    6   7  8
//!           └──────┘  └──────────────┘
//!            value     modifiers (first keyword at index >= 3 is the cutoff)
//! ```
//!
//! Fields before the cutoff are never read as modifiers, so the scan needs no
//! backtracking and every rejection points at exactly one field.

use crate::protocol::operation::{ExpireOperation, Expiry, Operation, SetOperation};
use bytes::Bytes;
use thiserror::Error;

/// Errors that can occur while parsing a command line.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The line contained no fields
    #[error("no command supplied")]
    EmptyCommand,

    /// The first field is not a known command
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// A required key or value is missing
    #[error("not enough arguments for '{0}' command")]
    InsufficientArguments(&'static str),

    /// Two mutually exclusive modifiers were given, e.g. `NX/XX`
    #[error("conflicting flags {0}")]
    ConflictingFlags(&'static str),

    /// An expiry keyword is missing its integer or the integer is malformed
    #[error("missing or invalid value for {0}")]
    MissingOrInvalidExpiryValue(&'static str),

    /// A field that is not a modifier the command accepts
    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Modifiers accepted by `SET` after the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetModifier {
    Nx,
    Xx,
    Get,
    Ex,
    ExAt,
    KeepTtl,
}

const SET_MODIFIERS: [(&[u8], SetModifier); 6] = [
    (b"NX", SetModifier::Nx),
    (b"XX", SetModifier::Xx),
    (b"GET", SetModifier::Get),
    (b"EX", SetModifier::Ex),
    (b"EXAT", SetModifier::ExAt),
    (b"KEEPTTL", SetModifier::KeepTtl),
];

impl SetModifier {
    fn from_field(field: &[u8]) -> Option<Self> {
        SET_MODIFIERS
            .iter()
            .find(|(name, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, modifier)| *modifier)
    }
}

/// Modifiers accepted by `EXPIRE` after the ttl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExpireModifier {
    Nx,
    Xx,
    Gt,
    Lt,
}

const EXPIRE_MODIFIERS: [(&[u8], ExpireModifier); 4] = [
    (b"NX", ExpireModifier::Nx),
    (b"XX", ExpireModifier::Xx),
    (b"GT", ExpireModifier::Gt),
    (b"LT", ExpireModifier::Lt),
];

impl ExpireModifier {
    fn from_field(field: &[u8]) -> Option<Self> {
        EXPIRE_MODIFIERS
            .iter()
            .find(|(name, _)| field.eq_ignore_ascii_case(name))
            .map(|(_, modifier)| *modifier)
    }
}

/// Parses a single command line.
///
/// Trailing `\r\n` is treated as whitespace, so the raw line read from the
/// socket can be passed in as is.
///
/// # Example
///
/// ```
/// use cider::protocol::{parse_command, Operation};
///
/// let op = parse_command(b"GET name\r\n").unwrap();
/// assert_eq!(op, Operation::Get { key: "name".to_string() });
/// ```
pub fn parse_command(line: &[u8]) -> ParseResult<Operation> {
    let fields: Vec<&[u8]> = line
        .split(|b| b.is_ascii_whitespace())
        .filter(|field| !field.is_empty())
        .collect();

    let name = match fields.first() {
        Some(name) => String::from_utf8_lossy(name).to_ascii_uppercase(),
        None => return Err(ParseError::EmptyCommand),
    };

    match name.as_str() {
        "SET" => parse_set(&fields),
        "GET" => Ok(Operation::Get {
            key: required_key(&fields, "GET")?,
        }),
        "DEL" => Ok(Operation::Del {
            keys: key_list(&fields, "DEL")?,
        }),
        "EXISTS" => Ok(Operation::Exists {
            keys: key_list(&fields, "EXISTS")?,
        }),
        "EXPIRE" => parse_expire(&fields),
        "INCR" => Ok(Operation::Incr {
            key: single_key(&fields, "INCR")?,
        }),
        "DECR" => Ok(Operation::Decr {
            key: single_key(&fields, "DECR")?,
        }),
        _ => Err(ParseError::UnknownCommand(name)),
    }
}

/// SET key value... [NX|XX] [GET] [EX seconds|EXAT epoch] [KEEPTTL]
fn parse_set(fields: &[&[u8]]) -> ParseResult<Operation> {
    if fields.len() < 3 {
        return Err(ParseError::InsufficientArguments("SET"));
    }

    let cutoff = fields
        .iter()
        .enumerate()
        .skip(3)
        .find(|(_, field)| SetModifier::from_field(field).is_some())
        .map_or(fields.len(), |(i, _)| i);

    let mut op = SetOperation {
        key: field_to_string(fields[1]),
        value: Bytes::from(fields[2..cutoff].join(&b' ')),
        ..Default::default()
    };

    let mut i = cutoff;
    while i < fields.len() {
        match SetModifier::from_field(fields[i]) {
            Some(SetModifier::Nx) => {
                if op.xx {
                    return Err(ParseError::ConflictingFlags("NX/XX"));
                }
                op.nx = true;
            }
            Some(SetModifier::Xx) => {
                if op.nx {
                    return Err(ParseError::ConflictingFlags("NX/XX"));
                }
                op.xx = true;
            }
            Some(SetModifier::Get) => op.get = true,
            Some(SetModifier::KeepTtl) => op.keep_ttl = true,
            Some(SetModifier::Ex) => {
                if matches!(op.expiry, Some(Expiry::UnixTime(_))) {
                    return Err(ParseError::ConflictingFlags("EX/EXAT"));
                }
                let secs = expiry_value(fields.get(i + 1), "EX")?;
                op.expiry = Some(Expiry::Seconds(secs));
                i += 1;
            }
            Some(SetModifier::ExAt) => {
                if matches!(op.expiry, Some(Expiry::Seconds(_))) {
                    return Err(ParseError::ConflictingFlags("EX/EXAT"));
                }
                let at = expiry_value(fields.get(i + 1), "EXAT")?;
                op.expiry = Some(Expiry::UnixTime(at));
                i += 1;
            }
            None => return Err(ParseError::UnexpectedArgument(field_to_string(fields[i]))),
        }
        i += 1;
    }

    Ok(Operation::Set(op))
}

/// EXPIRE key seconds [NX|XX|GT|LT]
///
/// NX cannot be combined with any of the others; XX, GT and LT combine freely.
fn parse_expire(fields: &[&[u8]]) -> ParseResult<Operation> {
    let key = required_key(fields, "EXPIRE")?;
    let ttl = fields
        .get(2)
        .and_then(|field| parse_integer(field))
        .ok_or(ParseError::MissingOrInvalidExpiryValue("EXPIRE"))?;

    let mut op = ExpireOperation {
        key,
        ttl,
        ..Default::default()
    };

    for field in fields.iter().skip(3) {
        match ExpireModifier::from_field(field) {
            Some(ExpireModifier::Nx) => {
                if op.xx {
                    return Err(ParseError::ConflictingFlags("NX/XX"));
                }
                if op.gt {
                    return Err(ParseError::ConflictingFlags("NX/GT"));
                }
                if op.lt {
                    return Err(ParseError::ConflictingFlags("NX/LT"));
                }
                op.nx = true;
            }
            Some(ExpireModifier::Xx) => {
                if op.nx {
                    return Err(ParseError::ConflictingFlags("NX/XX"));
                }
                op.xx = true;
            }
            Some(ExpireModifier::Gt) => {
                if op.nx {
                    return Err(ParseError::ConflictingFlags("NX/GT"));
                }
                op.gt = true;
            }
            Some(ExpireModifier::Lt) => {
                if op.nx {
                    return Err(ParseError::ConflictingFlags("NX/LT"));
                }
                op.lt = true;
            }
            None => return Err(ParseError::UnexpectedArgument(field_to_string(field))),
        }
    }

    Ok(Operation::Expire(op))
}

/// Second field as key; anything after it is ignored.
fn required_key(fields: &[&[u8]], command: &'static str) -> ParseResult<String> {
    fields
        .get(1)
        .map(|field| field_to_string(field))
        .ok_or(ParseError::InsufficientArguments(command))
}

/// Exactly one key and nothing else.
fn single_key(fields: &[&[u8]], command: &'static str) -> ParseResult<String> {
    let key = required_key(fields, command)?;
    match fields.get(2) {
        Some(extra) => Err(ParseError::UnexpectedArgument(field_to_string(extra))),
        None => Ok(key),
    }
}

/// All fields after the command name, at least one.
fn key_list(fields: &[&[u8]], command: &'static str) -> ParseResult<Vec<String>> {
    if fields.len() < 2 {
        return Err(ParseError::InsufficientArguments(command));
    }
    Ok(fields[1..].iter().map(|field| field_to_string(field)).collect())
}

/// Integer following EX/EXAT. Any base-10 value is accepted, sign included.
fn expiry_value(field: Option<&&[u8]>, flag: &'static str) -> ParseResult<i64> {
    field
        .and_then(|field| parse_integer(field))
        .ok_or(ParseError::MissingOrInvalidExpiryValue(flag))
}

fn parse_integer(field: &[u8]) -> Option<i64> {
    std::str::from_utf8(field).ok()?.parse().ok()
}

fn field_to_string(field: &[u8]) -> String {
    String::from_utf8_lossy(field).into_owned()
}
