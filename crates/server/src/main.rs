use oauth2_provider::api::start_webserver;
use oauth2_provider::config::load_config_or_panic;
use oauth2_provider::oauth2::{ConfiguredUsers, OAuth2State};
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "oauth2_provider=info,tower_http=info,sea_orm=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    initialize_tracing();

    let config = load_config_or_panic();
    tracing::info!(
        require_ssl = config.oauth2.require_ssl,
        trust_forwarded_proto = config.oauth2.trust_forwarded_proto,
        access_token_lifetime = config.oauth2.access_token_lifetime,
        users = config.users.len(),
        "oauth2 configuration"
    );
    if !config.oauth2.require_ssl {
        tracing::warn!("oauth2.require_ssl is disabled; client secrets may travel in cleartext");
    }

    let db = Arc::new(Database::connect(&config.database_url).await?);

    let auth_check = Arc::new(ConfiguredUsers::new(config.users.clone()));
    let state = OAuth2State::new(db, &config.oauth2, auth_check)?;

    start_webserver(state, config.listen_addr).await?;
    Ok(())
}
