//! Patient Risk Prediction Service - Main Entry Point
//!
//! Loads the scaler and LSTM once, then serves `/predict` over HTTP.

use anyhow::{Context, Result};
use solace_inference::{
    config::AppConfig,
    http::{self, AppState},
    logging,
    metrics::{MetricsReporter, ServiceMetrics},
    pipeline::ServiceContext,
};
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;
    logging::init(&config.logging)?;

    info!("Starting Patient Risk Prediction Service");
    info!(
        backend = ?config.models.backend,
        device = ?config.models.device,
        model = %config.models.model_path,
        scaler = %config.models.scaler_path,
        "Configuration loaded successfully"
    );

    // Model and scaler live for the whole process
    let context = ServiceContext::from_config(&config).context("Failed to load model artifacts")?;

    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = AppState::new(context, metrics.clone());
    http::start_server(state, &config.bind_address()).await?;

    // Print final summary
    info!("Prediction service shutting down...");
    metrics.print_summary();

    Ok(())
}
