//! Object identifiers as they appear on the wire: opaque, fixed-width hex
//! strings. The core never hashes object data — that lives in the pack
//! encoder/decoder, an external collaborator — it only validates and compares
//! the ids handed to it by callers and servers.

use std::fmt;
use std::str::FromStr;

use crate::error::TransportError;

/// Hex width of an object id. Git defaults to SHA-1 (40 hex chars); SHA-256
/// repositories (`object-format=sha256`) use 64.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum IdWidth {
    #[default]
    Sha1,
    Sha256,
}

impl IdWidth {
    pub const fn hex_len(self) -> usize {
        match self {
            IdWidth::Sha1 => 40,
            IdWidth::Sha256 => 64,
        }
    }
}

/// A validated, fixed-width hexadecimal object identifier.
///
/// `ObjectId::zero` (all zeros) is the distinguished "absent" value used to
/// mark newly-created or deleted refs in push ref-update tuples.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate a hex object id of the given width. Validation goes
    /// through `hex::decode` rather than a hand-rolled digit check so the
    /// notion of "valid hex" stays in one place shared with anything else in
    /// the crate that decodes hex.
    pub fn parse(s: &str, width: IdWidth) -> Result<Self, TransportError> {
        if s.len() != width.hex_len() {
            return Err(TransportError::protocol(format!(
                "invalid object id `{s}` (expected {} hex chars, got {})",
                width.hex_len(),
                s.len()
            )));
        }
        hex::decode(s).map_err(|_| {
            TransportError::protocol(format!("invalid object id `{s}`: not valid hex"))
        })?;
        Ok(ObjectId(s.to_ascii_lowercase()))
    }

    /// The distinguished "absent" id for a given width.
    pub fn zero(width: IdWidth) -> Self {
        ObjectId("0".repeat(width.hex_len()))
    }

    /// True if this is the zero id for its own width.
    pub fn is_zero(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn width(&self) -> IdWidth {
        if self.0.len() == IdWidth::Sha256.hex_len() {
            IdWidth::Sha256
        } else {
            IdWidth::Sha1
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ObjectId {
    type Err = TransportError;

    /// Parses assuming SHA-1 width; use [`ObjectId::parse`] to pick a width
    /// explicitly (e.g. for SHA-256 repositories).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.len() {
            40 => ObjectId::parse(s, IdWidth::Sha1),
            64 => ObjectId::parse(s, IdWidth::Sha256),
            _ => Err(TransportError::protocol(format!(
                "invalid object id `{s}`: unsupported length {}",
                s.len()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_id_is_zero() {
        let z = ObjectId::zero(IdWidth::Sha1);
        assert!(z.is_zero());
        assert_eq!(z.as_str(), "0".repeat(40));
    }

    #[test]
    fn parses_sha1_and_sha256() {
        let sha1 = "abc123abc123abc123abc123abc123abc123abc1";
        assert_eq!(sha1.len(), 40);
        let id: ObjectId = sha1.parse().unwrap();
        assert_eq!(id.width(), IdWidth::Sha1);

        let sha256 = "a".repeat(64);
        let id: ObjectId = sha256.parse().unwrap();
        assert_eq!(id.width(), IdWidth::Sha256);
    }

    #[test]
    fn rejects_bad_length_and_non_hex() {
        assert!("deadbeef".parse::<ObjectId>().is_err());
        assert!(ObjectId::parse(&"z".repeat(40), IdWidth::Sha1).is_err());
    }

    #[test]
    fn normalizes_case() {
        let upper = "A".repeat(40);
        let id = ObjectId::parse(&upper, IdWidth::Sha1).unwrap();
        assert_eq!(id.as_str(), "a".repeat(40));
    }
}
