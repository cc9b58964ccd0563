//! Soft revocation shared by clients, tokens and authorization codes.
//!
//! Every revocable record carries a `revoked` flag and a `revocation_date`.
//! Revocation is a conditional update that only flips records which are not
//! yet revoked, so the affected-row count tells the caller whether it won.

use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter,
    sea_query::{Expr, SimpleExpr},
};
use time::OffsetDateTime;

use crate::entity::{oauth2_authorization, oauth2_client, oauth2_token};

pub trait Revocable: Send + Sync {
    type Entity: EntityTrait;

    fn is_revoked(&self) -> bool;

    /// `None` for records that never expire on their own.
    fn expires_at(&self) -> Option<OffsetDateTime>;

    fn revoked_column() -> <Self::Entity as EntityTrait>::Column;

    fn revocation_date_column() -> <Self::Entity as EntityTrait>::Column;

    /// Primary-key filter selecting this record.
    fn identity(&self) -> SimpleExpr;

    fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        self.expires_at().is_some_and(|expires_at| now > expires_at)
    }
}

impl Revocable for oauth2_client::Model {
    type Entity = oauth2_client::Entity;

    fn is_revoked(&self) -> bool {
        self.revoked
    }

    fn expires_at(&self) -> Option<OffsetDateTime> {
        None
    }

    fn revoked_column() -> oauth2_client::Column {
        oauth2_client::Column::Revoked
    }

    fn revocation_date_column() -> oauth2_client::Column {
        oauth2_client::Column::RevocationDate
    }

    fn identity(&self) -> SimpleExpr {
        oauth2_client::Column::Id.eq(self.id.clone())
    }
}

impl Revocable for oauth2_token::Model {
    type Entity = oauth2_token::Entity;

    fn is_revoked(&self) -> bool {
        self.revoked
    }

    fn expires_at(&self) -> Option<OffsetDateTime> {
        Some(self.access_token_expires_at())
    }

    fn revoked_column() -> oauth2_token::Column {
        oauth2_token::Column::Revoked
    }

    fn revocation_date_column() -> oauth2_token::Column {
        oauth2_token::Column::RevocationDate
    }

    fn identity(&self) -> SimpleExpr {
        oauth2_token::Column::Id.eq(self.id.clone())
    }
}

impl Revocable for oauth2_authorization::Model {
    type Entity = oauth2_authorization::Entity;

    fn is_revoked(&self) -> bool {
        self.revoked
    }

    fn expires_at(&self) -> Option<OffsetDateTime> {
        Some(self.code_expires_at())
    }

    fn revoked_column() -> oauth2_authorization::Column {
        oauth2_authorization::Column::Revoked
    }

    fn revocation_date_column() -> oauth2_authorization::Column {
        oauth2_authorization::Column::RevocationDate
    }

    fn identity(&self) -> SimpleExpr {
        oauth2_authorization::Column::Authcode.eq(self.authcode.clone())
    }
}

/// Set the revoked flag and timestamp once.
///
/// Returns `true` if this call revoked the record and `false` if it was
/// already revoked; re-revoking is a no-op.
pub async fn revoke<C, R>(db: &C, record: &R) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
    R: Revocable,
{
    let result = R::Entity::update_many()
        .col_expr(R::revoked_column(), Expr::value(true))
        .col_expr(
            R::revocation_date_column(),
            Expr::value(OffsetDateTime::now_utc()),
        )
        .filter(record.identity())
        .filter(R::revoked_column().eq(false))
        .exec(db)
        .await?;
    Ok(result.rows_affected > 0)
}

/// Expired records are revoked as a side effect of being checked.
pub async fn is_expired_or_revoked<C, R>(db: &C, record: &R) -> Result<bool, DbErr>
where
    C: ConnectionTrait,
    R: Revocable,
{
    if record.is_revoked() {
        return Ok(true);
    }
    if record.is_expired_at(OffsetDateTime::now_utc()) {
        revoke(db, record).await?;
        return Ok(true);
    }
    Ok(false)
}
