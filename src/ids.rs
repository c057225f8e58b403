//! Identifier and timestamp generation for new entities

use chrono::{DateTime, SubsecRound, Utc};
use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

const FALLBACK_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const FALLBACK_ID_LEN: usize = 9;

/// How identifiers are currently being produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdStrength {
    /// UUID v4 from the operating system's random source
    Uuid,
    /// Short base-36 strings from a time-seeded PRNG. Much weaker collision
    /// resistance, only used when the OS random source is unavailable.
    PseudoRandom,
}

/// Generates unique ids for conversations and messages.
///
/// Prefers UUID v4. Once the OS random source fails the generator switches
/// permanently to the pseudo-random mode for the rest of its lifetime.
pub struct IdGenerator {
    fallback: Option<StdRng>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self { fallback: None }
    }

    /// Generator pinned to the pseudo-random mode
    pub fn pseudo_random(seed: u64) -> Self {
        Self {
            fallback: Some(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn strength(&self) -> IdStrength {
        if self.fallback.is_some() {
            IdStrength::PseudoRandom
        } else {
            IdStrength::Uuid
        }
    }

    pub fn next_id(&mut self) -> String {
        if self.fallback.is_none() {
            let mut bytes = [0u8; 16];
            match OsRng.try_fill_bytes(&mut bytes) {
                Ok(()) => {
                    return uuid::Builder::from_random_bytes(bytes)
                        .into_uuid()
                        .to_string();
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        "OS random source unavailable, ids fall back to pseudo-random strings"
                    );
                }
            }
        }

        let rng = self
            .fallback
            .get_or_insert_with(|| StdRng::seed_from_u64(time_seed()));
        (0..FALLBACK_ID_LEN)
            .map(|_| {
                let index = rng.gen_range(0..FALLBACK_ALPHABET.len());
                char::from(FALLBACK_ALPHABET[index])
            })
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

fn time_seed() -> u64 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    // Truncation is fine, this only seeds the PRNG
    #[allow(clippy::cast_possible_truncation)]
    let nanos = nanos as u64;
    nanos ^ (u64::from(std::process::id()) << 32)
}

/// Current instant at millisecond precision.
///
/// Every timestamp on a new message or conversation comes from here.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// Serde format for every stored instant: RFC 3339, always three fraction
/// digits, `Z` suffix. Fixed width, so instants sort as text.
///
/// Use with `#[serde(with = "crate::ids::timestamp")]`.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(de::Error::custom)
    }
}
