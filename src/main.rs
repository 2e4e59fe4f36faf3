mod app;
mod capture;
mod config;
mod error;
mod meals;
mod recognition;
mod state;
mod storage;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "nutrilens=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    // Read before the runtime spawns its workers; the system UTC offset is
    // not available once the process is multi-threaded.
    let config = config::AppConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "invalid configuration");
    })?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(config))
}

async fn run(config: config::AppConfig) -> anyhow::Result<()> {
    let state = match state::AppState::init(config).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            return Err(e);
        }
    };
    let history = state.store.snapshot();
    if history.is_empty() {
        tracing::info!(data_dir = %state.config.data_dir.display(), "no meal history yet");
    } else {
        tracing::info!(
            meals = history.len(),
            data_dir = %state.config.data_dir.display(),
            "meal history ready"
        );
    }

    app::serve(app::build_app(state)).await
}
