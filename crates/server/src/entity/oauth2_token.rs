//! OAuth2 Token entity - an access/refresh token pair.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_token")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub access_token: String,
    #[sea_orm(unique)]
    pub refresh_token: String,
    pub client_id: String,
    pub user_id: i64,
    /// Access token lifetime in seconds, counted from `creation_date`
    pub expires_in: i64,
    pub creation_date: OffsetDateTime,
    pub revoked: bool,
    pub revocation_date: Option<OffsetDateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::oauth2_client::Entity",
        from = "Column::ClientId",
        to = "super::oauth2_client::Column::Id"
    )]
    Client,
}

impl Related<super::oauth2_client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// When the access token stops being accepted
    pub fn access_token_expires_at(&self) -> OffsetDateTime {
        super::expiry_after(self.creation_date, self.expires_in)
    }

    /// When the refresh token stops being exchangeable
    pub fn refresh_token_expires_at(&self, refresh_token_lifetime: i64) -> OffsetDateTime {
        super::expiry_after(self.creation_date, refresh_token_lifetime)
    }
}
