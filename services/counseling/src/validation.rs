//! Input validation utilities

use regex::Regex;
use std::sync::OnceLock;

/// Return the trimmed value of a required text field
pub fn required_text(field: &str, value: Option<&str>) -> Result<String, String> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_string()),
        _ => Err(format!("{} is required", field)),
    }
}

/// Trim an optional text field, mapping blank input to `None`
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Validate a session count that must be strictly positive
pub fn validate_session_count(field: &str, value: Option<i32>) -> Result<i32, String> {
    match value {
        None => Err(format!("{} is required", field)),
        Some(count) if count <= 0 => Err(format!("{} must be greater than 0", field)),
        Some(count) if count > 1000 => Err(format!("{} must be at most 1000", field)),
        Some(count) => Ok(count),
    }
}

/// Highest accepted package price, in minor currency units
pub const MAX_PACKAGE_PRICE: i64 = 1_000_000_000_000;

/// Validate a package price in minor currency units
pub fn validate_price(value: Option<i64>) -> Result<i64, String> {
    match value {
        None => Err("packagePrice is required".to_string()),
        Some(price) if price < 0 => Err("packagePrice must not be negative".to_string()),
        Some(price) if price > MAX_PACKAGE_PRICE => Err(format!(
            "packagePrice must be at most {}",
            MAX_PACKAGE_PRICE
        )),
        Some(price) => Ok(price),
    }
}

/// Normalize and validate a payment method code such as `CASH` or `BANK_TRANSFER`
pub fn validate_payment_method(value: Option<&str>) -> Result<String, String> {
    let method = required_text("paymentMethod", value)?.to_ascii_uppercase();

    static PAYMENT_METHOD_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = PAYMENT_METHOD_REGEX.get_or_init(|| {
        Regex::new(r"^[A-Z][A-Z0-9_]{0,31}$").expect("Failed to compile payment method regex")
    });

    if !regex.is_match(&method) {
        return Err(
            "paymentMethod may only contain letters, digits and underscores".to_string(),
        );
    }

    Ok(method)
}

/// Validate an e-mail address
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > 254 {
        return Err("clientEmail must be at most 254 characters long".to_string());
    }

    static EMAIL_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = EMAIL_REGEX.get_or_init(|| {
        Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
            .expect("Failed to compile email regex")
    });

    if !regex.is_match(email) {
        return Err("Invalid clientEmail format".to_string());
    }

    Ok(())
}
