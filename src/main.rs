use anyhow::Context;
use clap::Parser;
use fitmouv::brain::{LanguageModel, OpenAiProvider, Unconfigured};
use fitmouv::cli::{Cli, Command};
use fitmouv::clock::SystemClock;
use fitmouv::coach::Coach;
use fitmouv::config::Config;
use fitmouv::contacts::InMemoryStore;
use fitmouv::gateway::{self, AppState};
use fitmouv::scheduler::Scheduler;
use fitmouv::whatsapp::CloudApiClient;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref(), &cli.overrides())
        .context("failed to load configuration")?;

    if let Command::CheckConfig = cli.action() {
        println!("Configuration OK");
        println!("  listen:        {}", config.listen_addr());
        println!("  graph api:     {}", config.graph_api_url());
        println!("  llm:           {}", if config.openai_api_key.is_some() { config.openai_model.as_str() } else { "disabled" });
        println!("  crm webhook:   {}", if config.systeme_secret.as_deref().is_some_and(|s| !s.is_empty()) { "enabled" } else { "disabled" });
        println!("  nudge ladder:  {}", config.nudge_templates.join(", "));
        return Ok(());
    }

    let _log_guard = fitmouv::logging::init(&config).context("failed to initialize logging")?;
    let config = Arc::new(config);

    let api = Arc::new(CloudApiClient::from_config(&config).context("failed to build WhatsApp client")?);
    let llm: Arc<dyn LanguageModel> = match OpenAiProvider::from_config(&config)
        .context("failed to build OpenAI client")?
    {
        Some(provider) => Arc::new(provider),
        None => {
            tracing::warn!("OPENAI_API_KEY not set: replies use the fallback text, voice notes are not transcribed");
            Arc::new(Unconfigured)
        }
    };

    let coach = Arc::new(Coach::new(
        config.clone(),
        Arc::new(InMemoryStore::new()),
        api,
        llm,
        Arc::new(Scheduler::new()),
        Arc::new(SystemClock),
    ));

    if let Err(e) = coach.restore_leads().await {
        tracing::error!("CRM: could not read lead file: {}", e);
    }

    let cancel = CancellationToken::new();
    let dispatcher = tokio::spawn(coach.clone().run(cancel.clone()));

    let app = gateway::router(AppState::new(coach));
    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("FitMouv server listening on http://{}", addr);

    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            shutdown.cancel();
        })
        .await
        .context("server error")?;

    cancel.cancel();
    dispatcher.await.context("dispatcher task panicked")?;
    tracing::info!("FitMouv server stopped");
    Ok(())
}

/// Wait for Ctrl+C (or SIGTERM on Unix, which is what the hosting platform sends).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("Shutdown signal received");
}
