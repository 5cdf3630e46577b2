//! Self-contained validation helpers used before dispatching mutations.

use std::sync::LazyLock;

use regex::Regex;

use crate::client::{ClientError, Result};

/// Allocation unit; every capacity value must be an integral multiple.
pub const UNIT_SIZE: i64 = 512;
/// Minimum pool capacity in bytes.
pub const POOL_MIN_SIZE: i64 = 1_000_000_000_000;
/// Minimum volume size in bytes.
pub const VOLUME_MIN_SIZE: i64 = 1_000_000_000;

static IQN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"iqn\.\d{4}-\d{2}\.([[:alnum:]\-.]+)(:[^,;*&$|\s]+)$")
        .expect("IQN pattern compiles")
});

static WWN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{16}$").expect("WWN pattern compiles")
});

fn divisible_by(num: i64, divisor: i64) -> bool {
    num % divisor == 0
}

/// Round `num` up to the next integral multiple of `unit`.
pub fn round_to_unit(num: i64, unit: i64) -> i64 {
    (num + unit - 1) / unit * unit
}

/// Check alignment to the allocation unit; the error carries the rounded
/// suggestion so the caller can report a usable value.
pub fn verify_capacity(num: i64, unit: i64) -> Result<()> {
    if divisible_by(num, unit) {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "size: {} is not aligned with integral units of {}, the value can be rounded to: {}",
            num,
            unit,
            round_to_unit(num, unit)
        )))
    }
}

/// Closed-set membership check.
pub fn string_in_list(field: &str, value: &str, list: &[&str], case_insensitive: bool) -> Result<()> {
    let matched = list.iter().any(|choice| {
        if case_insensitive {
            choice.eq_ignore_ascii_case(value)
        } else {
            *choice == value
        }
    });
    if matched {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "{} value is invalid: {}, valid choices are: {}",
            field,
            value,
            list.join(", ")
        )))
    }
}

pub fn string_length_in_range(field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    if value.len() < min {
        return Err(ClientError::Validation(format!(
            "{} cannot be shorter than {} characters",
            field, min
        )));
    }
    if value.len() > max {
        return Err(ClientError::Validation(format!(
            "{} cannot be longer than {} characters",
            field, max
        )));
    }
    Ok(())
}

pub fn integer_in_range(field: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min {
        return Err(ClientError::Validation(format!(
            "{} cannot be lower than {}: {}",
            field, min, value
        )));
    }
    if value > max {
        return Err(ClientError::Validation(format!(
            "{} cannot be higher than {}: {}",
            field, max, value
        )));
    }
    Ok(())
}

pub fn integer_at_least(field: &str, value: i64, min: i64) -> Result<()> {
    if value < min {
        return Err(ClientError::Validation(format!(
            "{} cannot be lower than {}: {}",
            field, min, value
        )));
    }
    Ok(())
}

/// iSCSI initiator IQN format check.
pub fn validate_iqn(field: &str, address: &str) -> Result<()> {
    if IQN_RE.is_match(address) {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "{} IQN format is wrong: {}",
            field, address
        )))
    }
}

/// Fibre Channel WWN format check.
pub fn validate_wwn(field: &str, address: &str) -> Result<()> {
    if WWN_RE.is_match(address) {
        Ok(())
    } else {
        Err(ClientError::Validation(format!(
            "{} FC WWN format is wrong: {}",
            field, address
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_capacity_accepts_aligned_values() {
        assert!(verify_capacity(1_000_000_000_000, UNIT_SIZE).is_ok());
        assert!(verify_capacity(UNIT_SIZE, UNIT_SIZE).is_ok());
    }

    #[test]
    fn test_verify_capacity_suggests_rounded_value() {
        let err = verify_capacity(1000, UNIT_SIZE).unwrap_err();
        assert!(err.to_string().contains("rounded to: 1024"));
    }

    #[test]
    fn test_round_to_unit_rounds_up() {
        assert_eq!(round_to_unit(513, UNIT_SIZE), 1024);
        assert_eq!(round_to_unit(512, UNIT_SIZE), 512);
    }

    #[test]
    fn test_string_in_list() {
        const CHOICES: [&str; 2] = ["THIN", "THICK"];
        assert!(string_in_list("provtype", "THIN", &CHOICES, false).is_ok());
        assert!(string_in_list("provtype", "thin", &CHOICES, false).is_err());
        assert!(string_in_list("provtype", "thin", &CHOICES, true).is_ok());
    }

    #[test]
    fn test_string_length_in_range() {
        assert!(string_length_in_range("secret", "short", 14, 255).is_err());
        assert!(string_length_in_range("secret", "longenoughsecret", 14, 255).is_ok());
    }

    #[test]
    fn test_integer_in_range() {
        assert!(integer_in_range("physical_capacity_warning", 0, 1, 100).is_err());
        assert!(integer_in_range("physical_capacity_warning", 80, 1, 100).is_ok());
        assert!(integer_in_range("physical_capacity_warning", 101, 1, 100).is_err());
    }

    #[test]
    fn test_validate_iqn() {
        assert!(validate_iqn("address", "iqn.2020-01.com.example:h1").is_ok());
        assert!(validate_iqn("address", "not-an-iqn").is_err());
    }

    #[test]
    fn test_validate_wwn() {
        assert!(validate_wwn("address", "500143802426baf4").is_ok());
        assert!(validate_wwn("address", "zzz143802426baf4").is_err());
        assert!(validate_wwn("address", "50014380").is_err());
    }
}
