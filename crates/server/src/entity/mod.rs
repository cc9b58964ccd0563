//! SeaORM entities backing the credential store.

pub mod oauth2_authorization;
pub mod oauth2_client;
pub mod oauth2_redirect_uri;
pub mod oauth2_token;

use time::{Duration, OffsetDateTime, PrimitiveDateTime};

/// `start + seconds`, saturating at the latest representable instant.
pub(crate) fn expiry_after(start: OffsetDateTime, seconds: i64) -> OffsetDateTime {
    start
        .checked_add(Duration::seconds(seconds))
        .unwrap_or_else(|| PrimitiveDateTime::MAX.assume_utc())
}
