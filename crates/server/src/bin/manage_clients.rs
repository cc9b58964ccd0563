//! Client provisioning for operators.
//!
//! Reads `config.yaml` (and environment overrides) for the database and KDF
//! settings, like the server does.

use oauth2_provider::config::load_config;
use oauth2_provider::oauth2::{CredentialStore, SecretHasher};
use sea_orm::{Database, TransactionTrait};
use std::env;
use std::process::ExitCode;

const USAGE: &str = "usage: manage-clients <command>

commands:
  create [redirect_uri ...]         provision a client, print its id and secret
  rotate <client_id>                replace a client's secret, print the new one
  revoke <client_id>                soft-revoke a client
  add-redirect <client_id> <uri>    register another redirect URI
  hash-password <password>          print an Argon2 hash for the `users` config";

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<ExitCode> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        eprintln!("{USAGE}");
        return Ok(ExitCode::FAILURE);
    };

    let config = load_config()?;
    let store = CredentialStore::new(&config.oauth2)?;

    if let ("hash-password", [password]) = (command.as_str(), rest) {
        let hash = SecretHasher::new(&config.oauth2.kdf)?.derive(password)?;
        println!("{hash}");
        return Ok(ExitCode::SUCCESS);
    }

    let db = Database::connect(&config.database_url).await?;

    match (command.as_str(), rest) {
        ("create", redirect_uris) => {
            let txn = db.begin().await?;
            let client = store.create_client(&txn).await?;
            for uri in redirect_uris {
                store.add_redirect_uri(&txn, &client.client_id, uri).await?;
            }
            txn.commit().await?;

            println!("client_id: {}", client.client_id);
            println!("client_secret: {}", client.client_secret);
        }
        ("rotate", [client_id]) => {
            let Some(client) = store.find_client(&db, client_id).await? else {
                eprintln!("unknown client: {client_id}");
                return Ok(ExitCode::FAILURE);
            };
            let secret = store.rotate_client_secret(&db, client).await?;
            println!("client_secret: {secret}");
        }
        ("revoke", [client_id]) => {
            let Some(client) = store.find_client(&db, client_id).await? else {
                eprintln!("unknown client: {client_id}");
                return Ok(ExitCode::FAILURE);
            };
            if store.revoke_client(&db, &client).await? {
                println!("revoked {client_id}");
            } else {
                println!("{client_id} was already revoked");
            }
        }
        ("add-redirect", [client_id, uri]) => {
            if store.find_client(&db, client_id).await?.is_none() {
                eprintln!("unknown client: {client_id}");
                return Ok(ExitCode::FAILURE);
            }
            store.add_redirect_uri(&db, client_id, uri).await?;
            println!("registered {uri} for {client_id}");
        }
        _ => {
            eprintln!("{USAGE}");
            return Ok(ExitCode::FAILURE);
        }
    }

    Ok(ExitCode::SUCCESS)
}
