//! Process entry point: loads `BotConfig`, launches a headless browser,
//! wires the provider/registry/callback/control-channel collaborators, and
//! runs the meeting flow controller to completion. `tracing_subscriber`
//! with an `EnvFilter`, config loaded and logged (redacted) before anything
//! else starts, `anyhow` reserved for this boundary alone.

use std::sync::Arc;

use chromiumoxide::browser::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use meeting_bot::browser::{BrowserPage, ChromePage};
use meeting_bot::callbacks::LifecycleCallbackClient;
use meeting_bot::config::{BotConfig, Platform};
use meeting_bot::controller::{self, ControllerDeps};
use meeting_bot::provider::{GoogleMeetProvider, Provider, TeamsProvider};
use meeting_bot::redis::{RedisScriptRunner, ServerRegistryClient};
use meeting_bot::session::{ServerUrlSource, SessionRegistryBridge};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "meeting_bot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("starting meeting bot");

    let config = BotConfig::from_env().map_err(|e| {
        error!(error = %e, "failed to load bot configuration");
        e
    })?;

    info!(
        platform = %config.platform,
        connection_id = %config.connection_id,
        native_meeting_id = %config.native_meeting_id,
        max_clients = config.max_clients,
        "bot configuration loaded"
    );

    let (browser, mut handler) = Browser::launch(
        BrowserConfig::builder()
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?,
    )
    .await?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                warn!(error = %err, "chromiumoxide handler event error");
            }
        }
    });

    let page = browser.new_page("about:blank").await?;
    let page: Arc<dyn BrowserPage> = Arc::new(ChromePage::new(page));

    let provider: Arc<dyn Provider> = match &config.platform {
        Platform::GoogleMeet => Arc::new(GoogleMeetProvider::new()),
        Platform::Teams => Arc::new(TeamsProvider::new()),
        Platform::Other(tag) => {
            error!(platform = %tag, "no provider strategy registered for this platform");
            anyhow::bail!("unsupported platform: {tag}");
        }
    };

    let runner = RedisScriptRunner::connect(config.control_bus_url()).await?;
    let registry_client = ServerRegistryClient::new(runner, config.max_clients);
    let registry = Arc::new(SessionRegistryBridge::new(registry_client)) as Arc<dyn ServerUrlSource>;

    let callbacks = LifecycleCallbackClient::new(
        config.bot_manager_callback_url.clone(),
        config.connection_id.clone(),
        config.container_name.clone(),
    )?;

    let stop_token = CancellationToken::new();
    let control_channel_task = {
        let redis_url = config.control_bus_url().to_string();
        let connection_id = config.connection_id.clone();
        let stop_token = stop_token.clone();
        tokio::spawn(async move {
            if let Err(err) = meeting_bot::control_channel::run(&redis_url, &connection_id, stop_token).await {
                warn!(error = %err, "control channel exited with an error");
            }
        })
    };

    let outcome = controller::run(
        config,
        ControllerDeps {
            page,
            provider,
            registry,
            callbacks,
            stop_token: stop_token.clone(),
        },
    )
    .await;

    stop_token.cancel();
    control_channel_task.abort();
    handler_task.abort();

    let exit_code = outcome.exit_code();
    info!(reason = %outcome.tag(), exit_code, "bot run complete");
    std::process::exit(exit_code);
}
