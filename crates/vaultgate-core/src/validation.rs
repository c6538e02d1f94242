//! Input validation for grant parameters and identifiers.

use crate::error::ValidationError;
use crate::types::{ContentId, UserId};

/// Maximum identifier length in bytes.
pub const MAX_ID_LEN: usize = 256;

/// Maximum content locator length in bytes.
pub const MAX_LOCATOR_LEN: usize = 8192;

/// Maximum grant TTL in days.
pub const MAX_TTL_DAYS: i64 = 3650;

/// Validate an access key's two identifiers.
pub fn validate_identifiers(
    content_id: &ContentId,
    user_id: &UserId,
) -> Result<(), ValidationError> {
    if content_id.as_str().is_empty() {
        return Err(ValidationError::EmptyContentId);
    }
    if user_id.as_str().is_empty() {
        return Err(ValidationError::EmptyUserId);
    }
    for id in [content_id.as_str(), user_id.as_str()] {
        if id.len() > MAX_ID_LEN {
            return Err(ValidationError::IdentifierTooLong {
                max: MAX_ID_LEN,
                got: id.len(),
            });
        }
        if id.chars().any(|c| c.is_control()) {
            return Err(ValidationError::ControlCharacters);
        }
    }
    Ok(())
}

/// Validate the full parameter set of a Grant call.
pub fn validate_grant(
    content_id: &ContentId,
    user_id: &UserId,
    locator: &str,
    transaction_id: &str,
    ttl_days: i64,
) -> Result<(), ValidationError> {
    validate_identifiers(content_id, user_id)?;

    if locator.is_empty() {
        return Err(ValidationError::EmptyLocator);
    }
    if locator.len() > MAX_LOCATOR_LEN {
        return Err(ValidationError::LocatorTooLong {
            max: MAX_LOCATOR_LEN,
            got: locator.len(),
        });
    }
    if transaction_id.is_empty() {
        return Err(ValidationError::EmptyTransactionId);
    }

    validate_ttl(ttl_days)
}

/// Validate a TTL or extension length in days.
pub fn validate_ttl(days: i64) -> Result<(), ValidationError> {
    if days <= 0 {
        return Err(ValidationError::NonPositiveTtl(days));
    }
    if days > MAX_TTL_DAYS {
        return Err(ValidationError::TtlTooLong {
            max: MAX_TTL_DAYS,
            got: days,
        });
    }
    Ok(())
}
