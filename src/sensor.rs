//! Signed sensor readings on the wire.
//!
//! A device sends `<type>:<value>|ts:<timestamp>|sig:<hex>`, where the
//! signature is the HMAC-SHA256 of everything before `|sig:`. This module
//! builds that payload on the sending side and takes it apart again on the
//! receiving side.

use core::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::hmac::Signer;

/// Separator between the signed payload and its signature.
pub const SIG_SEPARATOR: &str = "|sig:";

/// Field name carrying the timestamp inside a payload.
pub const TIMESTAMP_FIELD: &str = "ts";

/// Default allowed clock skew between sender and receiver.
pub const DEFAULT_TIMESTAMP_TOLERANCE: Duration = Duration::from_secs(300);

// Logged payloads are cut to this many characters
const LOG_PREVIEW_CHARS: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    #[error("message carries no signature")]
    Unsigned,
    #[error("missing field: {0}")]
    MissingField(&'static str),
    #[error("malformed field: {0:?}")]
    MalformedField(String),
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),
    #[error("invalid reading value: {0:?}")]
    InvalidValue(String),
    #[error("invalid signature - data may be tampered")]
    BadSignature,
    #[error("timestamp {timestamp} outside {tolerance_ms} ms of {now} - possible replay")]
    StaleTimestamp {
        timestamp: u64,
        now: u64,
        tolerance_ms: u64,
    },
}

/// The value part of a reading.
///
/// Floats render with exactly two decimals, integers in plain base 10.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadingValue {
    Float(f64),
    Int(i64),
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Float(v) => write!(f, "{v:.2}"),
            ReadingValue::Int(v) => write!(f, "{v}"),
        }
    }
}

impl From<f32> for ReadingValue {
    fn from(v: f32) -> Self {
        ReadingValue::Float(f64::from(v))
    }
}

impl From<f64> for ReadingValue {
    fn from(v: f64) -> Self {
        ReadingValue::Float(v)
    }
}

impl From<i32> for ReadingValue {
    fn from(v: i32) -> Self {
        ReadingValue::Int(i64::from(v))
    }
}

impl From<i64> for ReadingValue {
    fn from(v: i64) -> Self {
        ReadingValue::Int(v)
    }
}

impl From<u32> for ReadingValue {
    fn from(v: u32) -> Self {
        ReadingValue::Int(i64::from(v))
    }
}

impl ReadingValue {
    /// Integers first, so `"1"` stays an integer and `"23.50"` a float.
    fn parse(raw: &str) -> Result<Self, EnvelopeError> {
        if let Ok(v) = raw.parse::<i64>() {
            return Ok(ReadingValue::Int(v));
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(ReadingValue::Float(v)),
            _ => Err(EnvelopeError::InvalidValue(raw.to_string())),
        }
    }
}

/// One sensor sample: type token, value and millisecond timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorReading {
    pub kind: String,
    pub value: ReadingValue,
    pub timestamp: u64,
}

impl SensorReading {
    pub fn new(kind: impl Into<String>, value: impl Into<ReadingValue>, timestamp: u64) -> Self {
        SensorReading {
            kind: kind.into(),
            value: value.into(),
            timestamp,
        }
    }

    /// `<type>:<value>|ts:<timestamp>`, the exact bytes that get signed.
    pub fn payload(&self) -> String {
        format!(
            "{}:{}|{TIMESTAMP_FIELD}:{}",
            self.kind, self.value, self.timestamp
        )
    }
}

/// Parse `<type>:<value>|ts:<timestamp>`.
pub fn parse_payload(payload: &str) -> Result<SensorReading, EnvelopeError> {
    let mut reading: Option<(&str, ReadingValue)> = None;
    let mut timestamp = None;

    for field in payload.split('|') {
        let (key, value) = field
            .split_once(':')
            .ok_or_else(|| EnvelopeError::MalformedField(field.to_string()))?;
        if key == TIMESTAMP_FIELD {
            let ts = value
                .parse::<u64>()
                .map_err(|_| EnvelopeError::InvalidTimestamp(value.to_string()))?;
            timestamp = Some(ts);
        } else if key.is_empty() || reading.is_some() {
            return Err(EnvelopeError::MalformedField(field.to_string()));
        } else {
            reading = Some((key, ReadingValue::parse(value)?));
        }
    }

    let (kind, value) = reading.ok_or(EnvelopeError::MissingField("reading"))?;
    let timestamp = timestamp.ok_or(EnvelopeError::MissingField(TIMESTAMP_FIELD))?;
    Ok(SensorReading::new(kind, value, timestamp))
}

/// A received line split into its signed payload and signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignedMessage<'a> {
    pub payload: &'a str,
    pub signature: &'a str,
}

impl<'a> SignedMessage<'a> {
    /// Splits on the last `|sig:`. Lines without one are [`EnvelopeError::Unsigned`].
    pub fn parse(line: &'a str) -> Result<Self, EnvelopeError> {
        let (payload, signature) = line
            .rsplit_once(SIG_SEPARATOR)
            .ok_or(EnvelopeError::Unsigned)?;
        Ok(SignedMessage { payload, signature })
    }
}

/// Receiver-side acceptance rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    pub timestamp_tolerance: Duration,
    pub allow_unsigned: bool,
}

impl VerifyPolicy {
    /// Tolerance in milliseconds, saturating at `u64::MAX`.
    pub fn tolerance_ms(&self) -> u64 {
        u64::try_from(self.timestamp_tolerance.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        VerifyPolicy {
            timestamp_tolerance: DEFAULT_TIMESTAMP_TOLERANCE,
            allow_unsigned: false,
        }
    }
}

/// Outcome of a successful [`Verifier::check`].
#[derive(Debug, Clone, PartialEq)]
pub enum Verified {
    Signed(SensorReading),
    /// Only produced when the policy allows unsigned lines.
    Unsigned(SensorReading),
}

impl Verified {
    pub fn reading(&self) -> &SensorReading {
        match self {
            Verified::Signed(r) | Verified::Unsigned(r) => r,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, Verified::Signed(_))
    }
}

/// Checks received lines against a shared secret and a [`VerifyPolicy`].
#[derive(Debug, Clone)]
pub struct Verifier {
    signer: Signer,
    policy: VerifyPolicy,
}

impl Verifier {
    pub fn new(signer: Signer, policy: VerifyPolicy) -> Self {
        tracing::debug!(
            tolerance_ms = policy.tolerance_ms(),
            allow_unsigned = policy.allow_unsigned,
            "Built verifier"
        );
        Verifier { signer, policy }
    }

    pub fn policy(&self) -> &VerifyPolicy {
        &self.policy
    }

    /// Verify `line` as received at `now_ms` (milliseconds since the epoch).
    pub fn check(&self, line: &str, now_ms: u64) -> Result<Verified, EnvelopeError> {
        let message = match SignedMessage::parse(line) {
            Ok(message) => message,
            Err(EnvelopeError::Unsigned) if self.policy.allow_unsigned => {
                tracing::debug!(payload = %preview(line), "Accepting unsigned reading");
                return parse_payload(line).map(Verified::Unsigned);
            }
            Err(e) => return Err(e),
        };

        if !self
            .signer
            .verify_constant_time(message.payload, message.signature)
        {
            tracing::warn!(payload = %preview(message.payload), "Invalid signature");
            return Err(EnvelopeError::BadSignature);
        }

        let reading = parse_payload(message.payload)?;

        let tolerance_ms = self.policy.tolerance_ms();
        if reading.timestamp.abs_diff(now_ms) > tolerance_ms {
            tracing::warn!(
                timestamp = reading.timestamp,
                now = now_ms,
                "Timestamp outside tolerance"
            );
            return Err(EnvelopeError::StaleTimestamp {
                timestamp: reading.timestamp,
                now: now_ms,
                tolerance_ms,
            });
        }

        tracing::info!(kind = %reading.kind, "Valid signature");
        Ok(Verified::Signed(reading))
    }

    /// [`check`](Self::check) against the system clock.
    pub fn check_now(&self, line: &str) -> Result<Verified, EnvelopeError> {
        self.check(line, now_millis())
    }
}

/// Milliseconds since the Unix epoch; 0 if the clock is before it.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn preview(s: &str) -> String {
    s.chars().take(LOG_PREVIEW_CHARS).collect()
}
