//! Opaque version tokens stamped on every committed write.
//!
//! Callers only ever compare tokens for equality. Stores mint them from a
//! [`VersionClock`], which derives each token from the wall clock at
//! microsecond precision and bumps past the previous token when two writes
//! land in the same tick, so tokens from one clock never collide.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// Version stamp of a record's last committed write
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(Vec<u8>);

impl VersionToken {
    /// Wrap raw token bytes as read back from a store
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Raw token bytes, for persistence
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// URL-safe text form used on the wire and in `ETag` headers
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }

    /// Parse the text form produced by [`VersionToken::encode`]
    pub fn decode(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("version token is empty".into()));
        }
        URL_SAFE_NO_PAD
            .decode(trimmed)
            .map(Self)
            .map_err(|_| Error::InvalidInput(format!("malformed version token: {trimmed}")))
    }

    fn stamp(&self) -> Option<u64> {
        let bytes: [u8; 8] = self.0.as_slice().try_into().ok()?;
        Some(u64::from_be_bytes(bytes))
    }
}

impl fmt::Debug for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VersionToken({})", self.encode())
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl Serialize for VersionToken {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for VersionToken {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        Self::decode(&text).map_err(serde::de::Error::custom)
    }
}

/// Strictly monotonic source of [`VersionToken`]s
#[derive(Debug, Default)]
pub struct VersionClock {
    last: AtomicU64,
}

impl VersionClock {
    /// Create a clock with no history
    pub const fn new() -> Self {
        Self {
            last: AtomicU64::new(0),
        }
    }

    /// Create a clock that only mints tokens after `latest`.
    ///
    /// Used when reopening a persistent store so that a wall clock that moved
    /// backwards cannot reissue a token already on disk.
    pub fn resume_after(latest: Option<&VersionToken>) -> Self {
        Self {
            last: AtomicU64::new(latest.and_then(VersionToken::stamp).unwrap_or(0)),
        }
    }

    /// Mint the next token
    pub fn next(&self) -> VersionToken {
        let now = unix_micros_now();
        let advance = |last: u64| Some(now.max(last.saturating_add(1)));
        let (Ok(previous) | Err(previous)) =
            self.last
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, advance);
        let stamp = now.max(previous.saturating_add(1));
        VersionToken(stamp.to_be_bytes().to_vec())
    }
}

fn unix_micros_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_clock_never_repeats_within_a_tick() {
        let clock = VersionClock::new();
        let tokens: Vec<_> = (0..1_000).map(|_| clock.next()).collect();
        let stamps: Vec<_> = tokens.iter().filter_map(VersionToken::stamp).collect();

        assert_eq!(stamps.len(), tokens.len());
        assert!(stamps.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_clock_is_unique_across_threads() {
        let clock = Arc::new(VersionClock::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let clock = Arc::clone(&clock);
                std::thread::spawn(move || (0..500).map(|_| clock.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for token in handle.join().unwrap() {
                assert!(seen.insert(token), "duplicate version token minted");
            }
        }
        assert_eq!(seen.len(), 4_000);
    }

    #[test]
    fn test_resume_after_skips_future_stamp() {
        let far_future = VersionToken::from_bytes(u64::MAX.saturating_sub(10).to_be_bytes());
        let clock = VersionClock::resume_after(Some(&far_future));

        let next = clock.next();
        assert!(next.stamp().unwrap() > far_future.stamp().unwrap());
    }

    #[test]
    fn test_resume_after_ignores_foreign_tokens() {
        let foreign = VersionToken::from_bytes(vec![1, 2, 3]);
        let clock = VersionClock::resume_after(Some(&foreign));
        assert!(clock.next().stamp().is_some());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(VersionToken::decode("").is_err());
        assert!(VersionToken::decode("not base64!").is_err());
    }

    #[test]
    fn test_token_serializes_as_text() {
        let token = VersionClock::new().next();
        let json = serde_json::to_string(&token).unwrap();
        assert_eq!(json, format!("\"{}\"", token.encode()));

        let parsed: VersionToken = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, token);
    }
}
