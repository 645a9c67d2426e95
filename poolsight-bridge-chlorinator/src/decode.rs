//! Conversion of raw register contents into physical values.
//!
//! Decoding is total: every 16-bit word or bit maps to a value. Malformed
//! responses are rejected by the transport before they get here.

use std::fmt;
use std::time::Instant;

use poolsight_common::TelemetryValue;

use crate::catalog::RegisterSpec;

/// How a raw register becomes a physical value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DecodeRule {
    /// Two's-complement 16-bit word divided by the divisor.
    SignedScaled(f64),
    /// Unsigned 16-bit word divided by the divisor.
    UnsignedScaled(f64),
    /// Unsigned 16-bit word, unscaled.
    UnsignedRaw,
    /// Single bit, `true` meaning active/abnormal.
    Boolean,
}

impl DecodeRule {
    /// The divisor of a scaled rule.
    pub fn divisor(&self) -> Option<f64> {
        match self {
            DecodeRule::SignedScaled(d) | DecodeRule::UnsignedScaled(d) => Some(*d),
            DecodeRule::UnsignedRaw | DecodeRule::Boolean => None,
        }
    }
}

/// Raw content returned by one transport read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawValue {
    Word(u16),
    Bit(bool),
}

/// A raw read, held only until it is decoded.
#[derive(Debug, Clone)]
pub struct RawSample {
    pub key: &'static str,
    pub raw: RawValue,
    pub taken_at: Instant,
}

/// A decoded physical value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Number(f64),
    Flag(bool),
}

impl Value {
    /// Status text used in diagnostics for flags.
    pub fn status_text(&self) -> Option<&'static str> {
        match self {
            Value::Flag(true) => Some("ACTIVE"),
            Value::Flag(false) => Some("NORMAL"),
            Value::Number(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(v) => write!(f, "{}", v),
            Value::Flag(v) => write!(f, "{}", v),
        }
    }
}

impl From<Value> for TelemetryValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Number(v) => TelemetryValue::Gauge(v),
            Value::Flag(v) => TelemetryValue::Boolean(v),
        }
    }
}

/// A field value in engineering units.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedReading {
    pub key: &'static str,
    pub value: Value,
    pub unit: &'static str,
    /// Wall-clock time of the bus read, Unix milliseconds.
    pub read_at: i64,
}

/// Reinterpret a 16-bit word as two's complement.
pub fn sign_correct(raw: u16) -> i32 {
    if raw >= 0x8000 {
        i32::from(raw) - 0x1_0000
    } else {
        i32::from(raw)
    }
}

/// Apply a decode rule to a raw value.
///
/// A bit read under a numeric rule counts as 0 or 1, and a word read under
/// [`DecodeRule::Boolean`] is true when non-zero.
pub fn decode(rule: DecodeRule, raw: RawValue) -> Value {
    let word = match raw {
        RawValue::Word(w) => w,
        RawValue::Bit(b) => u16::from(b),
    };

    match rule {
        DecodeRule::SignedScaled(d) => Value::Number(f64::from(sign_correct(word)) / d),
        DecodeRule::UnsignedScaled(d) => Value::Number(f64::from(word) / d),
        DecodeRule::UnsignedRaw => Value::Number(f64::from(word)),
        DecodeRule::Boolean => Value::Flag(match raw {
            RawValue::Bit(b) => b,
            RawValue::Word(w) => w != 0,
        }),
    }
}

/// Map a monotonic read instant onto the wall clock.
pub fn wall_clock_millis(taken_at: Instant) -> i64 {
    let age = i64::try_from(taken_at.elapsed().as_millis()).unwrap_or(i64::MAX);
    chrono::Utc::now().timestamp_millis().saturating_sub(age)
}

/// Decode a sample taken for `spec`.
pub fn decode_sample(spec: &RegisterSpec, sample: &RawSample) -> DecodedReading {
    DecodedReading {
        key: spec.key,
        value: decode(spec.decode, sample.raw),
        unit: spec.unit,
        read_at: wall_clock_millis(sample.taken_at),
    }
}
