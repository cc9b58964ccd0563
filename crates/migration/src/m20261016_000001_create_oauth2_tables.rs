//! Migration creating the credential store tables.
//!
//! Creates tables for:
//! - oauth2_client: Registered clients (secret stored as a KDF hash)
//! - oauth2_redirect_uri: Redirect URIs registered per client
//! - oauth2_token: Access/refresh token pairs
//! - oauth2_authorization: Authorization codes (short-lived, single use)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 1. Clients
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Client::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Client::Id)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OAuth2Client::SecretHash).string().not_null())
                    .col(
                        ColumnDef::new(OAuth2Client::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::RevocationDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Client::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // 2. Redirect URIs
        manager
            .create_table(
                Table::create()
                    .table(OAuth2RedirectUri::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2RedirectUri::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2RedirectUri::ClientId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(OAuth2RedirectUri::Uri).text().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth2_redirect_uri_client")
                            .from(OAuth2RedirectUri::Table, OAuth2RedirectUri::ClientId)
                            .to(OAuth2Client::Table, OAuth2Client::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // 3. Tokens
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Token::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Token::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::AccessToken)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::RefreshToken)
                            .string_len(64)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(OAuth2Token::ClientId).string_len(64).not_null())
                    .col(ColumnDef::new(OAuth2Token::UserId).big_integer().not_null())
                    .col(
                        ColumnDef::new(OAuth2Token::ExpiresIn)
                            .big_integer()
                            .not_null()
                            .default(3600),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::CreationDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuth2Token::RevocationDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth2_token_client")
                            .from(OAuth2Token::Table, OAuth2Token::ClientId)
                            .to(OAuth2Client::Table, OAuth2Client::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // 4. Authorization codes
        manager
            .create_table(
                Table::create()
                    .table(OAuth2Authorization::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OAuth2Authorization::Authcode)
                            .string_len(64)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::ClientId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::RedirectUri)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::ExpiresIn)
                            .big_integer()
                            .not_null()
                            .default(600),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::CreationDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::Revoked)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(OAuth2Authorization::RevocationDate)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_oauth2_authorization_client")
                            .from(OAuth2Authorization::Table, OAuth2Authorization::ClientId)
                            .to(OAuth2Client::Table, OAuth2Client::Id),
                    )
                    .to_owned(),
            )
            .await?;

        // Indexes for lookups by owning client
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_redirect_uri_client_uri")
                    .table(OAuth2RedirectUri::Table)
                    .col(OAuth2RedirectUri::ClientId)
                    .col(OAuth2RedirectUri::Uri)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_token_client_id")
                    .table(OAuth2Token::Table)
                    .col(OAuth2Token::ClientId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_oauth2_authorization_client_id")
                    .table(OAuth2Authorization::Table)
                    .col(OAuth2Authorization::ClientId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth2_authorization_client_id")
                    .to_owned(),
            )
            .await?;
        manager
            .drop_index(Index::drop().name("idx_oauth2_token_client_id").to_owned())
            .await?;
        manager
            .drop_index(
                Index::drop()
                    .name("idx_oauth2_redirect_uri_client_uri")
                    .to_owned(),
            )
            .await?;

        // Children before the client table they reference
        manager
            .drop_table(Table::drop().table(OAuth2Authorization::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Token::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2RedirectUri::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(OAuth2Client::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum OAuth2Client {
    #[sea_orm(iden = "oauth2_client")]
    Table,
    Id,
    SecretHash,
    Revoked,
    RevocationDate,
    CreatedAt,
}

#[derive(DeriveIden)]
enum OAuth2RedirectUri {
    #[sea_orm(iden = "oauth2_redirect_uri")]
    Table,
    Id,
    ClientId,
    Uri,
}

#[derive(DeriveIden)]
enum OAuth2Token {
    #[sea_orm(iden = "oauth2_token")]
    Table,
    Id,
    AccessToken,
    RefreshToken,
    ClientId,
    UserId,
    ExpiresIn,
    CreationDate,
    Revoked,
    RevocationDate,
}

#[derive(DeriveIden)]
enum OAuth2Authorization {
    #[sea_orm(iden = "oauth2_authorization")]
    Table,
    Authcode,
    ClientId,
    UserId,
    RedirectUri,
    ExpiresIn,
    CreationDate,
    Revoked,
    RevocationDate,
}
