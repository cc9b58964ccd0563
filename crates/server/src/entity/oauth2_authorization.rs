//! OAuth2 Authorization Code entity - short-lived codes exchanged for tokens.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth2_authorization")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub authcode: String,
    pub client_id: String,
    pub user_id: i64,
    /// Redirect URI the code was issued for; the exchange must repeat it
    pub redirect_uri: String,
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
    pub fn code_expires_at(&self) -> OffsetDateTime {
        super::expiry_after(self.creation_date, self.expires_in)
    }
}
