//! Test Prediction Client
//!
//! Generates random patient rows and posts them to the prediction endpoint.

use rand::Rng;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

/// Request body matching the service's expected format
#[derive(Debug, Serialize)]
struct PredictRequest {
    data: Vec<[f64; 8]>,
}

/// Row generator for testing. Blood pressure and cholesterol are emitted as
/// codes (Low=0, Normal=1, High=2), the form the service expects.
struct PatientGenerator {
    rng: rand::rngs::ThreadRng,
}

impl PatientGenerator {
    fn new() -> Self {
        Self {
            rng: rand::thread_rng(),
        }
    }

    /// Generate a patient with unremarkable readings
    fn generate_typical(&mut self) -> [f64; 8] {
        [
            self.rng.gen_range(0..2) as f64,
            self.rng.gen_range(0..2) as f64,
            self.rng.gen_range(0..2) as f64,
            self.rng.gen_range(0..2) as f64,
            self.rng.gen_range(18.0..60.0),
            self.rng.gen_range(0..2) as f64,
            self.rng.gen_range(0..=1) as f64,
            self.rng.gen_range(0..=1) as f64,
        ]
    }

    /// Generate a patient with elevated readings
    fn generate_elevated(&mut self) -> [f64; 8] {
        [
            1.0,
            1.0,
            self.rng.gen_range(0..2) as f64,
            1.0,
            self.rng.gen_range(55.0..90.0),
            self.rng.gen_range(0..2) as f64,
            2.0,
            2.0,
        ]
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("test_client=info".parse()?),
        )
        .init();

    info!("Starting Test Prediction Client");

    // Parse arguments
    let args: Vec<String> = std::env::args().collect();
    let url = args
        .get(1)
        .map(|s| s.as_str())
        .unwrap_or("http://localhost:5000/predict");
    let requests: u64 = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(100);
    let batch_size: usize = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(4);
    let elevated_rate = parse_rate(args.get(4).map(|s| s.as_str()), 0.2)?;
    let delay_ms: u64 = args.get(5).and_then(|s| s.parse().ok()).unwrap_or(100);

    info!(
        url = %url,
        requests = requests,
        batch_size = batch_size,
        elevated_rate = elevated_rate,
        delay_ms = delay_ms,
        "Configuration loaded"
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;
    let mut generator = PatientGenerator::new();
    let mut rng = rand::thread_rng();

    let mut label_counts = [0u64; 2];
    let mut failures = 0u64;

    for i in 0..requests {
        let data: Vec<[f64; 8]> = (0..batch_size)
            .map(|_| {
                if rng.gen_bool(elevated_rate) {
                    generator.generate_elevated()
                } else {
                    generator.generate_typical()
                }
            })
            .collect();
        let request = PredictRequest { data };

        let response = match client.post(url).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Service unreachable. Running in dry-run mode.");
                return run_dry_mode(requests - i, batch_size, elevated_rate, delay_ms).await;
            }
        };

        let status = response.status();
        let body: serde_json::Value = response.json().await?;
        if status.is_success() {
            for label in body["predictions"].as_array().into_iter().flatten() {
                if let Some(l) = label.as_u64() {
                    label_counts[(l as usize).min(1)] += 1;
                }
            }
        } else {
            failures += 1;
            warn!(status = %status, error = %body["error"], "Request failed");
        }

        if (i + 1) % 10 == 0 {
            info!(
                "Sent {}/{} requests ({} label 0, {} label 1, {} failed)",
                i + 1,
                requests,
                label_counts[0],
                label_counts[1],
                failures
            );
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    info!(
        "Completed! {} requests ({} label 0, {} label 1, {} failed)",
        requests, label_counts[0], label_counts[1], failures
    );

    Ok(())
}

/// Parse a probability argument, rejecting values outside `[0, 1]`
fn parse_rate(arg: Option<&str>, default: f64) -> anyhow::Result<f64> {
    let rate = match arg {
        Some(s) => s
            .parse::<f64>()
            .map_err(|e| anyhow::anyhow!("invalid rate '{}': {}", s, e))?,
        None => default,
    };
    anyhow::ensure!(
        (0.0..=1.0).contains(&rate),
        "rate must be between 0 and 1, got {}",
        rate
    );
    Ok(rate)
}

async fn run_dry_mode(
    requests: u64,
    batch_size: usize,
    elevated_rate: f64,
    delay_ms: u64,
) -> anyhow::Result<()> {
    info!("Running in dry-run mode (no service connection)");

    let mut generator = PatientGenerator::new();
    let mut rng = rand::thread_rng();

    for i in 0..requests {
        let data = (0..batch_size)
            .map(|_| {
                if rng.gen_bool(elevated_rate) {
                    generator.generate_elevated()
                } else {
                    generator.generate_typical()
                }
            })
            .collect();

        let json = serde_json::to_string_pretty(&PredictRequest { data })?;

        if (i + 1) % 10 == 0 || i == 0 {
            info!("Sample request {}:\n{}", i + 1, json);
        }

        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }

    Ok(())
}
