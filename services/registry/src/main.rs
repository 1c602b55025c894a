use std::time::Duration;

use anyhow::Context as _;
use sea_orm::Database;
use tokio::sync::watch;
use tracing::info;

use checkpoint_core::middleware::ApiKey;
use checkpoint_core::tracing::init_tracing;

use checkpoint_registry::config::RegistryConfig;
use checkpoint_registry::infra::mailer::BrevoMailer;
use checkpoint_registry::infra::platform::DiscordPlatform;
use checkpoint_registry::router::build_router;
use checkpoint_registry::state::AppState;
use checkpoint_registry::sweeper::Sweeper;

/// Upper bound for a single outbound call to the mail or chat API.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = RegistryConfig::from_env()?;

    let db = Database::connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .context("failed to build HTTP client")?;

    let state = AppState {
        db,
        mailer: BrevoMailer {
            client: client.clone(),
            api_url: config.mail_api_url.clone(),
            api_key: config.mail_api_key.clone(),
            sender_email: config.mail_sender_email.clone(),
            sender_name: config.mail_sender_name.clone(),
        },
        platform: DiscordPlatform {
            client,
            api_base: config.discord_api_base.clone(),
            bot_token: config.discord_bot_token.clone(),
            guild_id: config.discord_guild_id.clone(),
            all_access_role_id: config.all_access_role_id.clone(),
        },
        api_key: ApiKey::new(config.api_key.as_str()),
        code_policy: config.code_policy(),
        team_policy: config.team_policy(),
        roles: config.role_map(),
        organizer_email: config.organizer_email.clone(),
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = Sweeper::new(
        state.clone(),
        Duration::from_secs(config.sweep_interval_secs),
    )
    .start(shutdown_rx);

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.registry_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    info!("registry service listening on {addr}");
    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
        })
        .await
        .context("server error")?;

    let _ = shutdown_tx.send(true);
    sweeper.await.context("sweeper task panicked")?;
    Ok(())
}
