//! Canonical Kubernetes quantity strings for integer values
//!
//! Only the integer subset is needed: KEDA trigger metadata carries memory
//! sizes in binary SI (`256Mi`) and Prometheus thresholds in decimal SI
//! (`20k`).

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];
const DECIMAL_SUFFIXES: [&str; 7] = ["", "k", "M", "G", "T", "P", "E"];

/// Format a value in binary SI (powers of 1024).
///
/// Values below 1024 in magnitude, and values that are not an exact multiple
/// of 1024, print as plain integers.
pub fn binary_si(value: i64) -> String {
    if value.unsigned_abs() < 1024 {
        return value.to_string();
    }

    let mut mantissa = value;
    let mut exponent = 0;
    while mantissa % 1024 == 0 && exponent < BINARY_SUFFIXES.len() - 1 {
        mantissa /= 1024;
        exponent += 1;
    }
    format!("{mantissa}{}", BINARY_SUFFIXES[exponent])
}

/// Format a value in decimal SI (powers of 1000).
///
/// Trailing zeros are folded into the largest suffix whose exponent is a
/// multiple of three, so `1500` stays `1500` while `20000` becomes `20k`.
pub fn decimal_si(value: i64) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut mantissa = value;
    let mut exponent = 0usize;
    while mantissa % 10 == 0 {
        mantissa /= 10;
        exponent += 1;
    }
    while exponent % 3 != 0 {
        mantissa *= 10;
        exponent -= 1;
    }

    let index = exponent / 3;
    match DECIMAL_SUFFIXES.get(index) {
        Some(suffix) => format!("{mantissa}{suffix}"),
        None => value.to_string(),
    }
}
