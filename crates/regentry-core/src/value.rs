//! Typed property values.
//!
//! Backends answer property queries with untyped payloads. [`PropertyValue`]
//! is the closed set of kinds the rest of the crate works with, and this
//! module converts in both directions.
//!
//! # Classification order
//!
//! A payload may structurally answer more than one kind (an ordered
//! association list reads as both a mapping and a list, a boolean reads as a
//! number). [`PropertyValue::from_native`] always tries the kinds in
//! [`ValueKind::PRIORITY`] order and keeps the first match, so the same
//! payload is classified the same way every time. Payloads that match no
//! kind produce `None`.

use crate::backend::{NativePayload, Number};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// The kind of a [`PropertyValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Text,
    Bytes,
    Mapping,
    List,
    Timestamp,
    Number,
}

impl ValueKind {
    /// Order in which native payloads are matched against kinds.
    pub const PRIORITY: [ValueKind; 6] = [
        ValueKind::Text,
        ValueKind::Bytes,
        ValueKind::Mapping,
        ValueKind::List,
        ValueKind::Timestamp,
        ValueKind::Number,
    ];
}

/// A registry property, marshalled out of the backend's native payload `P`.
///
/// Containers keep their elements as native payloads; only the top level is
/// classified.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue<P> {
    Text(String),
    Bytes(Vec<u8>),
    Mapping(BTreeMap<String, P>),
    List(Vec<P>),
    Timestamp(DateTime<Utc>),
    Number(Number),
}

impl<P: NativePayload> PropertyValue<P> {
    /// Classify a native payload. Never panics; `None` means the payload
    /// has no typed counterpart.
    pub fn from_native(native: &P) -> Option<Self> {
        let value = native
            .as_text()
            .map(PropertyValue::Text)
            .or_else(|| native.as_bytes().map(PropertyValue::Bytes))
            .or_else(|| native.as_mapping().map(PropertyValue::Mapping))
            .or_else(|| native.as_list().map(PropertyValue::List))
            .or_else(|| native.as_timestamp().map(PropertyValue::Timestamp))
            .or_else(|| native.as_number().map(PropertyValue::Number));

        if value.is_none() {
            debug!("Native value matches no property kind: {:?}", native);
        }
        value
    }

    /// Build the backend's native representation of this value.
    pub fn to_native(&self) -> P {
        match self {
            PropertyValue::Text(text) => P::from_text(text),
            PropertyValue::Bytes(bytes) => P::from_bytes(bytes),
            PropertyValue::Mapping(mapping) => P::from_mapping(mapping),
            PropertyValue::List(items) => P::from_list(items),
            PropertyValue::Timestamp(timestamp) => P::from_timestamp(*timestamp),
            PropertyValue::Number(number) => P::from_number(*number),
        }
    }
}

impl<P> PropertyValue<P> {
    pub fn kind(&self) -> ValueKind {
        match self {
            PropertyValue::Text(_) => ValueKind::Text,
            PropertyValue::Bytes(_) => ValueKind::Bytes,
            PropertyValue::Mapping(_) => ValueKind::Mapping,
            PropertyValue::List(_) => ValueKind::List,
            PropertyValue::Timestamp(_) => ValueKind::Timestamp,
            PropertyValue::Number(_) => ValueKind::Number,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(text) => Some(text.as_str()),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            PropertyValue::Bytes(bytes) => Some(bytes.as_slice()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            PropertyValue::Number(number) => Some(*number),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Timestamp(timestamp) => Some(*timestamp),
            _ => None,
        }
    }
}

impl<P> From<&str> for PropertyValue<P> {
    fn from(text: &str) -> Self {
        PropertyValue::Text(text.to_string())
    }
}

impl<P> From<String> for PropertyValue<P> {
    fn from(text: String) -> Self {
        PropertyValue::Text(text)
    }
}

impl<P> From<Vec<u8>> for PropertyValue<P> {
    fn from(bytes: Vec<u8>) -> Self {
        PropertyValue::Bytes(bytes)
    }
}

impl<P> From<DateTime<Utc>> for PropertyValue<P> {
    fn from(timestamp: DateTime<Utc>) -> Self {
        PropertyValue::Timestamp(timestamp)
    }
}

impl<P> From<Number> for PropertyValue<P> {
    fn from(number: Number) -> Self {
        PropertyValue::Number(number)
    }
}

impl<P> From<i64> for PropertyValue<P> {
    fn from(value: i64) -> Self {
        PropertyValue::Number(Number::Integer(value))
    }
}

impl<P> From<f64> for PropertyValue<P> {
    fn from(value: f64) -> Self {
        PropertyValue::Number(Number::Float(value))
    }
}

/// Diagnostic rendering. Not meant to be parsed back.
impl<P: fmt::Debug> fmt::Display for PropertyValue<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Text(text) => write!(f, "{text}"),
            PropertyValue::Bytes(bytes) => write!(f, "Data ({} bytes)", bytes.len()),
            PropertyValue::Mapping(mapping) => write!(f, "Dictionary:\n{mapping:#?}"),
            PropertyValue::List(items) => write!(f, "Array: {items:?}"),
            PropertyValue::Timestamp(timestamp) => write!(f, "Date: {timestamp}"),
            PropertyValue::Number(number) => write!(f, "Number: {number}"),
        }
    }
}
