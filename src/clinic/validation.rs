use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::error::{ClinicError, ClinicResult};

/// Column widths of the clinic tables. Postgres rejects longer values, so they
/// are checked here and reported as validation errors.
pub const NAME_MAX: usize = 100;
pub const PHONE_MAX: usize = 20;
pub const SPECIALTY_MAX: usize = 100;
pub const SPECIES_MAX: usize = 50;
pub const BREED_MAX: usize = 50;
pub const STATUS_MAX: usize = 20;
pub const EMAIL_MAX: usize = 254;

pub fn today() -> NaiveDate {
    chrono::Utc::now().date_naive()
}

/// Trimmed, non-empty text.
pub fn required(field: &str, value: String) -> ClinicResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ClinicError::validation(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

/// Like [`required`], for a column limited to `max` characters.
pub fn required_within(field: &str, value: String, max: usize) -> ClinicResult<String> {
    let value = required(field, value)?;
    within(field, &value, max)?;
    Ok(value)
}

/// Blank optional text is stored as NULL.
pub fn optional(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like [`optional`], for a column limited to `max` characters.
pub fn optional_within(
    field: &str,
    value: Option<String>,
    max: usize,
) -> ClinicResult<Option<String>> {
    let value = optional(value);
    if let Some(value) = &value {
        within(field, value, max)?;
    }
    Ok(value)
}

fn within(field: &str, value: &str, max: usize) -> ClinicResult<()> {
    if value.chars().count() > max {
        return Err(ClinicError::validation(format!(
            "{} must be at most {} characters",
            field, max
        )));
    }
    Ok(())
}

pub fn email(value: Option<String>) -> ClinicResult<Option<String>> {
    match optional_within("email", value, EMAIL_MAX)? {
        Some(email) => match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(Some(email)),
            _ => Err(ClinicError::validation(format!("{} is not a valid email", email))),
        },
        None => Ok(None),
    }
}

/// A birth date may be today but not later.
pub fn birth_date(value: Option<NaiveDate>, today: NaiveDate) -> ClinicResult<Option<NaiveDate>> {
    match value {
        Some(date) if date > today => Err(ClinicError::validation(format!(
            "birth date {} is in the future",
            date
        ))),
        other => Ok(other),
    }
}

/// Non-negative amount with at most two decimals, as integer cents.
pub fn to_cents(field: &str, amount: Decimal) -> ClinicResult<i64> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(ClinicError::validation(format!("{} must not be negative", field)));
    }
    if amount.normalize().scale() > 2 {
        return Err(ClinicError::validation(format!(
            "{} allows at most two decimal places",
            field
        )));
    }

    amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .and_then(|cents| cents.to_i64())
        .ok_or_else(|| ClinicError::validation(format!("{} is too large", field)))
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
