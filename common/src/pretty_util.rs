use std::fmt::Debug;
use std::time::Duration;

use byte_unit::{Byte, UnitType};
use pretty_duration::pretty_duration;
use serde::Serialize;

use crate::config::Format;

/// Duration formatted for human-readable diagnostics.
pub fn to_duration_pretty(duration: &Duration) -> String {
    pretty_duration(duration, None)
}

/// Byte size formatted for human-readable diagnostics.
pub fn to_bytes_len_pretty(len: usize) -> String {
    let byte = Byte::from_u128(len as u128).unwrap_or_default();
    let adjusted = byte.get_appropriate_unit(UnitType::Decimal);
    format!("{adjusted:.2}")
}

pub fn to_string_pretty<T: Sized + Serialize + Debug>(format: &Format, val: &T) -> String {
    match format {
        Format::Json => serde_json::to_string_pretty(val)
            .unwrap_or_else(|_| format!("<failed to render as json: {:?}>", val)),
        Format::Yaml => serde_yaml::to_string(val)
            .unwrap_or_else(|_| format!("<failed to render as yaml: {:?}>", val)),
        Format::None => format!("{:?}", val),
    }
}
