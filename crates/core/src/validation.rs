//! Input checks run before a request is issued.
//!
//! Each function returns `Err(CoreError::Validation)` with a message
//! suitable for showing to the user as-is.

use validator::ValidateEmail;

use crate::error::{CoreError, CoreResult};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of note content in characters.
pub const MAX_NOTE_CONTENT_LENGTH: usize = 20_000;

/// Maximum length of a tag name in characters.
pub const MAX_TAG_NAME_LENGTH: usize = 50;

/// Minimum password length accepted by sign-up and password update.
pub const MIN_PASSWORD_LENGTH: usize = 6;

// ---------------------------------------------------------------------------
// Validation functions
// ---------------------------------------------------------------------------

/// Note content must contain something other than whitespace.
pub fn validate_note_content(content: &str) -> CoreResult<()> {
    if content.trim().is_empty() {
        return Err(CoreError::Validation("Note content cannot be empty".into()));
    }
    if content.chars().count() > MAX_NOTE_CONTENT_LENGTH {
        return Err(CoreError::Validation(format!(
            "Note content exceeds maximum length of {MAX_NOTE_CONTENT_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_tag_name(name: &str) -> CoreResult<()> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("Tag name cannot be empty".into()));
    }
    if trimmed.chars().count() > MAX_TAG_NAME_LENGTH {
        return Err(CoreError::Validation(format!(
            "Tag name exceeds maximum length of {MAX_TAG_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> CoreResult<()> {
    if email.trim().validate_email() {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "'{email}' is not a valid email address"
        )))
    }
}

pub fn validate_password(password: &str) -> CoreResult<()> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(CoreError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LENGTH} characters long"
        )));
    }
    Ok(())
}

/// Check a new password and its confirmation field.
///
/// A mismatch is reported before the length check.
pub fn validate_password_pair(password: &str, confirmation: &str) -> CoreResult<()> {
    if password != confirmation {
        return Err(CoreError::Validation("Passwords do not match".into()));
    }
    validate_password(password)
}
