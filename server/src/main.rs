use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use linkup_server::analyzer::{CompatibilityAnalyzer, KeywordAnalyzer, OpenAiAnalyzer};
use linkup_server::config::{generate_config_template, Cli, Config};
use linkup_server::delivery::DeliveryCoordinator;
use linkup_server::directory::{JsonFileDirectory, UserDirectory};
use linkup_server::matching::{spawn_match_scheduler, MatchScheduler};
use linkup_server::{routes, state};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Handle --generate-config: print template and exit
    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    // Initialize tracing/logging
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("linkup_server=info"))
    };
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(env_filter()).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(env_filter()).init();
    }

    tracing::info!("linkup server v{} starting", env!("CARGO_PKG_VERSION"));

    let schedule = config.matching.schedule_time().map_err(|e| {
        format!(
            "invalid [matching] schedule {:?} (expected HH:MM): {}",
            config.matching.schedule, e
        )
    })?;

    // External collaborators: user directory and compatibility analyzer
    let directory: Arc<dyn UserDirectory> = Arc::new(JsonFileDirectory::new(&config.users_file));
    tracing::info!("User directory: {}", config.users_file);

    let analyzer: Arc<dyn CompatibilityAnalyzer> = if config.analyzer.api_key.is_empty() {
        tracing::info!("No analyzer API key configured, using offline keyword matching");
        Arc::new(KeywordAnalyzer::new())
    } else {
        tracing::info!(model = %config.analyzer.model, "Using remote compatibility analyzer");
        Arc::new(OpenAiAnalyzer::new(&config.analyzer)?)
    };

    let delivery = Arc::new(DeliveryCoordinator::new(directory.clone(), &config.chat));
    let scheduler = Arc::new(MatchScheduler::new(
        directory,
        analyzer,
        delivery.clone(),
        schedule,
    ));

    if config.matching.enabled {
        spawn_match_scheduler(scheduler.clone(), config.matching.tick_interval_secs);
        tracing::info!(
            "Daily match scheduler started: sweep at {} local time, checked every {}s",
            config.matching.schedule,
            config.matching.tick_interval_secs
        );
    } else {
        tracing::info!("Daily match scheduler disabled");
    }

    let app_state = state::AppState {
        delivery,
        scheduler,
    };

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
