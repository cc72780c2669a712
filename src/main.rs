use anyhow::{Context, Result};
use log::{error, info};
use std::path::PathBuf;

use condensate::cli::{apply_overrides, build_cli, handle_subcommands};
use condensate::config::{default_settings_path, Settings};
use condensate::output::{formatter_for, FileSender};
use condensate::services::DataService;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let level = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let settings_path = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .unwrap_or_else(default_settings_path);
    let mut settings = Settings::load_or_create(&settings_path)
        .with_context(|| format!("failed to load settings from {}", settings_path.display()))?;
    apply_overrides(&matches, &mut settings).context("invalid command-line override")?;

    if handle_subcommands(&matches, &settings, &settings_path).await? {
        return Ok(());
    }

    info!("🚀 Condensate v{}", condensate::VERSION);
    info!("📁 Settings: {}", settings_path.display());

    let run_matches = matches.subcommand_matches("run");
    let run_flag = |name: &str| run_matches.map_or(false, |m| m.get_flag(name));

    let mut service = DataService::new(settings.clone())
        .await
        .context("failed to start acquisition")?;
    if let Some(format) = matches.get_one::<String>("format") {
        service.set_formatter(formatter_for(format, settings.display.threshold)?);
    }
    if let Some(file) = matches.get_one::<String>("output-file") {
        service.add_sender(Box::new(FileSender::new(file)));
    }
    service.set_live_chart(run_flag("chart"));

    #[cfg(feature = "api")]
    let mut api = if settings.api.enabled || run_flag("api") {
        use condensate::services::{ApiService, ApiServiceState};
        use std::sync::Arc;
        use tokio::sync::RwLock;

        let state = ApiServiceState::new(
            Arc::new(RwLock::new(settings.clone())),
            settings_path.clone(),
            service.buffer(),
        );
        let mut api = ApiService::new(state);
        api.start(settings.api.port)
            .await
            .with_context(|| format!("failed to start HTTP API on port {}", settings.api.port))?;
        Some(api)
    } else {
        None
    };

    #[cfg(feature = "websocket")]
    let feed = if settings.websocket.enabled || run_flag("websocket") {
        let feed = condensate::services::LiveFeedServer::new(settings.websocket.port, service.buffer());
        let running = feed.clone();
        let readings = service.subscribe();
        tokio::spawn(async move {
            if let Err(e) = running.start(readings).await {
                error!("❌ WebSocket live feed stopped: {}", e);
            }
        });
        Some(feed)
    } else {
        None
    };

    let result = service.run().await;

    #[cfg(feature = "websocket")]
    if let Some(feed) = feed.as_ref() {
        feed.stop().await?;
    }

    #[cfg(feature = "api")]
    if let Some(api) = api.as_mut() {
        api.stop().await?;
    }

    result.context("acquisition loop failed")?;
    info!("👋 Goodbye!");
    Ok(())
}
