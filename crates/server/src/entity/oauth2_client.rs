//! OAuth2 Client entity.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_client")]
pub struct Model {
    /// 64 hex chars, doubles as the public client identifier
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    /// Argon2id PHC string; the plaintext secret is never stored
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub revoked: bool,
    pub revocation_date: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::oauth2_redirect_uri::Entity")]
    RedirectUri,
    #[sea_orm(has_many = "super::oauth2_token::Entity")]
    Token,
    #[sea_orm(has_many = "super::oauth2_authorization::Entity")]
    Authorization,
}

impl Related<super::oauth2_redirect_uri::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RedirectUri.def()
    }
}

impl Related<super::oauth2_token::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Token.def()
    }
}

impl Related<super::oauth2_authorization::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Authorization.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
