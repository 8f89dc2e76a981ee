//! Kubernetes resource quantity parsing
//!
//! Converts quantity strings such as `250m`, `2`, `512Mi` or `1e3` into a
//! plain `f64` in base units (cores for CPU, bytes for memory).

use crate::error::{QuarantineError, Result};

const KI: f64 = 1024.0;

/// Parse a Kubernetes quantity into base units
pub fn parse_quantity(value: &str) -> Result<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(value, "empty quantity"));
    }

    let split = trimmed
        .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '+' | '-')))
        .unwrap_or(trimmed.len());
    let (number, suffix) = trimmed.split_at(split);

    let base: f64 = number
        .parse()
        .map_err(|_| invalid(value, "missing or malformed number"))?;

    let multiplier = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => KI,
        "Mi" => KI.powi(2),
        "Gi" => KI.powi(3),
        "Ti" => KI.powi(4),
        "Pi" => KI.powi(5),
        "Ei" => KI.powi(6),
        exp if exp.starts_with(['e', 'E']) => {
            let exponent: i32 = exp[1..]
                .parse()
                .map_err(|_| invalid(value, "malformed exponent"))?;
            10f64.powi(exponent)
        }
        _ => return Err(invalid(value, "unknown suffix")),
    };

    Ok(base * multiplier)
}

fn invalid(value: &str, reason: &'static str) -> QuarantineError {
    QuarantineError::InvalidQuantity {
        value: value.to_string(),
        reason,
    }
}
