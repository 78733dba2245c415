// ============================================================================
// sensorseal — lib.rs
// Message authentication for sensor readings: SHA-256 and HMAC-SHA256
// written from scratch, plus the `type:value|ts:..|sig:..` wire format.
// ============================================================================

#![cfg_attr(
    not(test),
    deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)
)]

pub mod config;
pub mod encoding;
pub mod hashes;
pub mod hmac;
pub mod sensor;

pub use config::{ConfigError, SealConfig, SECRET_ENV};

pub use encoding::{ct_eq_ignore_case, decode_digest, eq_ignore_case, to_hex, EncodingError};

pub use hashes::{Sha256, BLOCK_SIZE, DIGEST_SIZE};

pub use hmac::{HmacKey, HmacSha256, Signer};

pub use sensor::{
    now_millis, parse_payload, EnvelopeError, ReadingValue, SensorReading, SignedMessage,
    Verified, Verifier, VerifyPolicy, DEFAULT_TIMESTAMP_TOLERANCE, SIG_SEPARATOR,
};
