//! Small validation helpers shared by the configuration and geometry loaders.
use std::ops::RangeInclusive;

/// Validates if a given string is a valid file path.
///
/// # Arguments
///
/// * `path` - The string to validate.
///
/// # Returns
///
/// * `Ok(())` if the file path is valid.
/// * `Err(&'static str)` if the file path is invalid.
pub fn is_valid_path(path: &str) -> Result<(), &'static str> {
    if path.is_empty() {
        return Err("File path cannot be empty");
    }
    if path.contains('\0') {
        return Err("File path cannot contain null bytes");
    }
    Ok(())
}

/// Validates if a given value is within a specified numeric range.
///
/// # Arguments
///
/// * `value` - The value to validate.
/// * `range` - The inclusive range to validate against.
///
/// # Returns
///
/// * `Ok(())` if the value is within the range.
/// * `Err(&'static str)` if the value is outside the range.
pub fn is_in_range<T: PartialOrd>(value: T, range: RangeInclusive<T>) -> Result<(), &'static str> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err("Value is outside the specified range")
    }
}

/// Validates if a given string is not empty.
pub fn is_not_empty(value: &str) -> Result<(), &'static str> {
    if !value.trim().is_empty() {
        Ok(())
    } else {
        Err("Value cannot be empty")
    }
}

/// Validates that a length table (radii, thicknesses) is non-empty and holds only
/// finite, strictly positive values.
pub fn is_positive_table(values: &[f64]) -> Result<(), &'static str> {
    if values.is_empty() {
        return Err("Table cannot be empty");
    }
    if values.iter().all(|v| v.is_finite() && *v > 0.0) {
        Ok(())
    } else {
        Err("Table entries must be finite and greater than 0")
    }
}

/// Validates that a count table is non-empty and has no zero entries.
pub fn is_positive_counts(counts: &[u32]) -> Result<(), &'static str> {
    if counts.is_empty() {
        return Err("Count list cannot be empty");
    }
    if counts.contains(&0) {
        return Err("Count list entries must be greater than 0");
    }
    Ok(())
}
