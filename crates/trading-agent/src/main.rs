use std::sync::Arc;

use analysis_core::Timeframe;
use anyhow::{Context, Result};
use resource_monitor::ResourceMonitor;
use risk_manager::RiskManager;
use strategy_engine::StrategyEngine;
use technical_analysis::MarketAnalyzer;
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;

mod config;
mod file_provider;
mod metrics;
mod orchestrator;
mod paper_broker;

#[cfg(test)]
mod orchestrator_tests;

use config::AgentConfig;
use file_provider::FileBarProvider;
use orchestrator::Orchestrator;
use paper_broker::PaperBroker;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    // Panic hook: log panic info before crashing
    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting signal and risk trading agent");

    // 2. Load and validate configuration
    let config = AgentConfig::from_env().context("Invalid agent configuration")?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Symbols: {}", config.symbols.join(", "));
    tracing::info!("  Timeframe: {}", config.timeframe);
    tracing::info!("  Risk per trade: {}%", config.max_risk_per_trade_percent);
    tracing::info!("  Portfolio risk cap: {}%", config.max_portfolio_risk_percent);
    tracing::info!("  Min confidence: {:.0}%", config.min_confidence * 100.0);
    match config.account_balance {
        Some(balance) => tracing::info!("  Account balance: {:.2}", balance),
        None => tracing::info!("  Account balance: not set (minimum lot sizing)"),
    }
    if Timeframe::from_token(&config.timeframe).is_none() {
        tracing::warn!(
            "Unrecognised timeframe {:?}; data will be requested at 1h and no strategy may apply",
            config.timeframe
        );
    }

    // 3. Market data and analysis
    if !config.data_dir.is_dir() {
        tracing::warn!(
            "Data directory {} does not exist; every analysis will be degraded",
            config.data_dir.display()
        );
    }
    let provider = Arc::new(FileBarProvider::new(config.data_dir.clone()));
    let analyzer = Arc::new(MarketAnalyzer::new(provider).with_fetch_timeout(config.fetch_timeout()));

    // 4. Strategies, risk, resources, execution
    let strategies = StrategyEngine::with_defaults();
    tracing::info!(
        "Strategy engine initialized ({}), indicators: {}",
        strategies.strategy_names().join(", "),
        strategies
            .required_indicators()
            .iter()
            .map(|k| k.name())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let risk_manager = Arc::new(RiskManager::new(config.risk_config()));
    let monitor = ResourceMonitor::new(config.monitor_config());
    let executor = Arc::new(PaperBroker::new(config.paper_stop_distance_percent));
    tracing::info!("Paper execution enabled");

    let mut orchestrator = Orchestrator::new(
        config,
        analyzer,
        strategies,
        Arc::clone(&risk_manager),
        monitor,
        Arc::clone(&executor) as Arc<dyn broker_trait::ExecutionClient>,
    );

    // 5. Shutdown on SIGINT / SIGTERM
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, shutting down...");
            }
        }
        let _ = shutdown_tx.send(true);
        // Sender must outlive the loop's last read of the flag
        std::future::pending::<()>().await;
    });

    // 6. Sweep until told to stop
    orchestrator.run(shutdown_rx).await;

    let portfolio = risk_manager.get_portfolio_risk().await;
    let paper_open = executor.open_symbols().await.len();
    tracing::info!(
        sweeps = orchestrator.metrics().sweeps_run,
        positions = portfolio.position_count,
        paper_open = paper_open,
        total_risk = portfolio.total_risk,
        risk_percentage = format!("{:.1}%", portfolio.risk_percentage),
        "Final portfolio risk"
    );
    tracing::info!("Shutdown complete");

    Ok(())
}
