pub mod account;
pub mod auth;

pub use auth::*;

use crate::{
    error::AppError,
    utils::secret::is_code_format,
};
use validator::ValidationErrors;

/// Flatten validator output into one user-facing sentence list, field order stable.
pub(crate) fn validation_error(errors: ValidationErrors) -> AppError {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    let messages: Vec<String> = fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| match &e.message {
                Some(msg) => msg.to_string(),
                None => format!("{} is invalid.", field),
            })
        })
        .collect();

    AppError::Validation(messages.join(" "))
}

/// Addresses are matched case-insensitively, so they are stored and looked up lower-cased.
pub(crate) fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

pub(crate) fn ensure_passwords_match(password: &str, confirm: &str) -> Result<(), AppError> {
    if password != confirm {
        return Err(AppError::Validation("Passwords do not match.".to_string()));
    }
    Ok(())
}

pub(crate) fn ensure_code_format(code: &str) -> Result<(), AppError> {
    if !is_code_format(code.trim()) {
        return Err(AppError::Validation(
            "Invalid code format. Please enter a 6-digit code.".to_string(),
        ));
    }
    Ok(())
}
