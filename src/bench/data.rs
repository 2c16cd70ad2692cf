//! Value generators.

use crate::error::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::Rng;
use serde::Serialize;

/// Length of a [`DataShape::RandomBytes`] value unless configured otherwise.
pub const DEFAULT_RANDOM_LEN: usize = 1000;

/// Kind of value appended by a trial.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataShape {
    /// Incompressible random bytes.
    RandomBytes {
        /// Value length in bytes.
        len: usize,
    },
    /// A JSON feed message with random base64 identifiers, compressible
    /// roughly the way real social feed entries are.
    FeedMessage,
}

impl DataShape {
    /// Random bytes of the default length.
    pub fn random_bytes() -> Self {
        DataShape::RandomBytes { len: DEFAULT_RANDOM_LEN }
    }

    /// Name used in trial and benchmark names.
    pub fn name(&self) -> &'static str {
        match self {
            DataShape::RandomBytes { .. } => "random_data",
            DataShape::FeedMessage => "feed_message",
        }
    }

    /// Generates one value.
    pub fn generate<R: Rng>(&self, rng: &mut R) -> Result<Vec<u8>> {
        match *self {
            DataShape::RandomBytes { len } => Ok(random_bytes(rng, len)),
            DataShape::FeedMessage => {
                let message = FeedMessage {
                    previous: format!("%{}.sha256", random_base64(rng, 32)),
                    author: format!("@{}.ed25519", random_base64(rng, 32)),
                    sequence: rng.random::<u64>() % 10_000,
                    timestamp: rng.random::<u64>(),
                    hash: "sha256",
                    content: FeedContent { kind: "post", text: random_base64(rng, 100) },
                };
                Ok(serde_json::to_vec_pretty(&message)?)
            }
        }
    }
}

#[derive(Serialize)]
struct FeedMessage {
    previous: String,
    author: String,
    sequence: u64,
    timestamp: u64,
    hash: &'static str,
    content: FeedContent,
}

#[derive(Serialize)]
struct FeedContent {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
}

fn random_bytes<R: Rng>(rng: &mut R, len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rng.fill(&mut buf[..]);
    buf
}

fn random_base64<R: Rng>(rng: &mut R, len: usize) -> String {
    STANDARD.encode(random_bytes(rng, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length() {
        let mut rng = rand::rng();
        let value = DataShape::random_bytes().generate(&mut rng).unwrap();
        assert_eq!(value.len(), DEFAULT_RANDOM_LEN);

        let value = DataShape::RandomBytes { len: 17 }.generate(&mut rng).unwrap();
        assert_eq!(value.len(), 17);
    }

    #[test]
    fn test_feed_message_fields() {
        let mut rng = rand::rng();
        let value = DataShape::FeedMessage.generate(&mut rng).unwrap();
        let json: serde_json::Value = serde_json::from_slice(&value).unwrap();

        assert!(json["previous"].as_str().unwrap().starts_with('%'));
        assert!(json["previous"].as_str().unwrap().ends_with(".sha256"));
        assert!(json["author"].as_str().unwrap().ends_with(".ed25519"));
        assert!(json["sequence"].as_u64().unwrap() < 10_000);
        assert_eq!(json["hash"], "sha256");
        assert_eq!(json["content"]["type"], "post");
        assert_eq!(json["content"]["text"].as_str().unwrap().len(), 136);
    }

    #[test]
    fn test_values_differ() {
        let mut rng = rand::rng();
        let a = DataShape::FeedMessage.generate(&mut rng).unwrap();
        let b = DataShape::FeedMessage.generate(&mut rng).unwrap();
        assert_ne!(a, b);
    }
}
