//! Cursor pagination codec
//!
//! Feeds are ordered by `(sort_at DESC, id DESC)`. A cursor marks the last
//! row of a page; the next page continues with rows strictly before it.
//! Rows inserted later sort ahead of every existing cursor, so paging
//! forward never sees them and never repeats a row.
//!
//! ## Wire format
//!
//! ```text
//! base64url_nopad( version:u8 | sort_at_micros:i64be | id:[u8; 16] | sha256(prefix)[..8] )
//! ```
//!
//! 33 bytes encode to exactly 44 characters with no padding bits, so every
//! character contributes to the checksum. Callers treat the token as
//! opaque; changing the layout means bumping the version byte.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use uuid::Uuid;

use campus_org::{AccessError, AccessResult};

/// Current layout version.
pub const CURSOR_VERSION: u8 = 1;

const PAYLOAD_LEN: usize = 1 + 8 + 16;
const CHECKSUM_LEN: usize = 8;
const TOKEN_LEN: usize = PAYLOAD_LEN + CHECKSUM_LEN;

/// A row's place in the feed ordering.
///
/// `Ord` compares `(sort_at, id)` ascending; feeds walk it in reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub sort_at: DateTime<Utc>,
    pub id: Uuid,
}

impl Position {
    pub fn new(sort_at: DateTime<Utc>, id: Uuid) -> Self {
        Self { sort_at, id }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_at
            .cmp(&other.sort_at)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Encode a position as an opaque token.
///
/// Sub-microsecond precision is dropped; content timestamps are stored
/// at microsecond precision so nothing is lost in practice.
///
/// # Example
///
/// ```
/// use campus_content::cursor::{decode, encode, Position};
/// use chrono::{TimeZone, Utc};
/// use uuid::Uuid;
///
/// let position = Position::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap(), Uuid::now_v7());
/// let token = encode(&position);
/// assert_eq!(decode(&token).unwrap(), position);
/// assert!(decode("not-a-cursor").is_err());
/// ```
pub fn encode(position: &Position) -> String {
    let mut bytes = Vec::with_capacity(TOKEN_LEN);
    bytes.push(CURSOR_VERSION);
    bytes.extend_from_slice(&position.sort_at.timestamp_micros().to_be_bytes());
    bytes.extend_from_slice(position.id.as_bytes());
    let checksum = checksum(&bytes);
    bytes.extend_from_slice(&checksum);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode a token produced by [`encode`].
///
/// Every failure is a validation error; a bad cursor never reads as
/// "no more pages".
pub fn decode(token: &str) -> AccessResult<Position> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim())
        .map_err(|e| invalid(format!("not base64url: {}", e)))?;
    if bytes.len() != TOKEN_LEN {
        return Err(invalid(format!("expected {} bytes, got {}", TOKEN_LEN, bytes.len())));
    }

    let (payload, expected) = bytes.split_at(PAYLOAD_LEN);
    if checksum(payload) != expected {
        return Err(invalid("checksum mismatch"));
    }
    if payload[0] != CURSOR_VERSION {
        return Err(invalid(format!("unsupported version {}", payload[0])));
    }

    let mut micros = [0u8; 8];
    micros.copy_from_slice(&payload[1..9]);
    let micros = i64::from_be_bytes(micros);
    let sort_at = DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| invalid("timestamp out of range"))?;

    let id = Uuid::from_slice(&payload[9..PAYLOAD_LEN]).map_err(|e| invalid(e.to_string()))?;

    Ok(Position { sort_at, id })
}

fn checksum(payload: &[u8]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(payload);
    let mut out = [0u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

fn invalid(reason: impl Into<String>) -> AccessError {
    AccessError::validation(format!("invalid cursor: {}", reason.into()))
}
