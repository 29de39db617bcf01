//! Capacity unit conversion.
//!
//! Memory and storage end up in bytes, everything countable (cores, GPUs)
//! as a plain count. Size labels are binary: providers report `GB` for what
//! is really GiB, so `GB` and `GiB` both mean 2^30.

use crate::providers::{NativeQuantity, QuantityValue};

pub const VCPU: &str = "vcpu";
pub const GPU: &str = "gpu";
pub const MEMORY_BYTES: &str = "memory_bytes";
pub const STORAGE_BYTES: &str = "storage_bytes";
/// Storage of volumes folded into a server
pub const ATTACHED_STORAGE_BYTES: &str = "attached_storage_bytes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dimension {
    Bytes,
    Count,
}

/// Canonical attribute name and its dimension for a provider attribute.
///
/// Unknown attributes keep their name; their dimension follows the unit.
pub fn canonical_attribute(native: &str, unit: &str) -> (String, Dimension) {
    match native.to_ascii_lowercase().as_str() {
        "cores" | "cpu" | "cpus" | "vcpu" | "vcpus" => (VCPU.to_string(), Dimension::Count),
        "gpu" | "gpus" => (GPU.to_string(), Dimension::Count),
        "memory" | "mem" | "ram" | "memory_bytes" => (MEMORY_BYTES.to_string(), Dimension::Bytes),
        "disk" | "disk_size" | "size" | "storage" | "volume_size" | "storage_bytes" => {
            (STORAGE_BYTES.to_string(), Dimension::Bytes)
        }
        other => {
            if byte_factor(unit).is_some() && !unit.is_empty() {
                (format!("{other}_bytes"), Dimension::Bytes)
            } else {
                (other.to_string(), Dimension::Count)
            }
        }
    }
}

fn byte_factor(unit: &str) -> Option<u64> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "" | "b" | "byte" | "bytes" => Some(1),
        "k" | "kb" | "kib" => Some(1 << 10),
        "m" | "mb" | "mib" => Some(1 << 20),
        "g" | "gb" | "gib" => Some(1 << 30),
        "t" | "tb" | "tib" => Some(1 << 40),
        _ => None,
    }
}

fn count_factor(unit: &str) -> Option<u64> {
    match unit.trim().to_ascii_lowercase().as_str() {
        "" | "count" | "pcs" | "units" => Some(1),
        _ => None,
    }
}

/// Split `"8 GB"` / `"8GB"` into number and unit label.
fn split_number(text: &str) -> Option<(f64, &str)> {
    let text = text.trim();
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    if end == 0 {
        return None;
    }
    let number = text[..end].parse::<f64>().ok()?;
    Some((number, text[end..].trim()))
}

/// Convert a native quantity to `(canonical attribute, value)`.
///
/// Returns `None` when the figure or its unit cannot be interpreted.
pub fn convert(quantity: &NativeQuantity) -> Option<(String, u64)> {
    let (number, unit) = match &quantity.value {
        QuantityValue::Number(n) => (*n, quantity.unit.as_str()),
        QuantityValue::Text(text) => {
            let (n, embedded) = split_number(text)?;
            let unit = if embedded.is_empty() {
                quantity.unit.as_str()
            } else {
                embedded
            };
            (n, unit)
        }
    };

    if !number.is_finite() || number < 0.0 {
        return None;
    }

    let (name, dimension) = canonical_attribute(&quantity.attribute, unit);
    let factor = match dimension {
        Dimension::Bytes => byte_factor(unit)?,
        Dimension::Count => count_factor(unit)?,
    };

    let value = (number * factor as f64).round();
    if value > u64::MAX as f64 {
        return None;
    }
    Some((name, value as u64))
}
