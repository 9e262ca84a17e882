//! # Credential Rotator
//!
//! Rotates a database credential stored in AWS Secrets Manager using the
//! four-step createSecret / setSecret / testSecret / finishSecret protocol.
//!
//! ## Usage
//!
//! ```bash
//! # Run a single step (what a rotation scheduler invokes)
//! credential-rotator step --secret-id db-cred --token t2 --step createSecret
//!
//! # Run a whole rotation locally with a fresh token
//! credential-rotator rotate --secret-id db-cred
//!
//! # Serve POST /rotate, /metrics and probes
//! credential-rotator serve --port 5000
//! ```
//!
//! Configuration comes from environment variables, see [`RotationConfig`].

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use credential_rotator::observability::{init_logging, metrics};
use credential_rotator::server::{start_server, ServerState};
use credential_rotator::store::AwsSecretStore;
use credential_rotator::target::MySqlTarget;
use credential_rotator::{RotationConfig, RotationController, RotationRequest, RotationRunner, RotationStep};
use std::sync::Arc;
use tracing::info;

/// Database credential rotator
#[derive(Parser)]
#[command(name = "credential-rotator", version)]
#[command(about = "Four-step database credential rotation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dispatch one rotation step
    Step {
        /// Secret name or ARN
        #[arg(long)]
        secret_id: String,

        /// Rotation request token (becomes the new version id)
        #[arg(long)]
        token: String,

        /// createSecret, setSecret, testSecret or finishSecret
        #[arg(long)]
        step: String,
    },
    /// Run all four steps for one rotation
    Rotate {
        /// Secret name or ARN
        #[arg(long)]
        secret_id: String,

        /// Rotation request token (defaults to a new UUID)
        #[arg(long)]
        token: Option<String>,
    },
    /// Serve the HTTP rotation trigger, metrics and probes
    Serve {
        /// Listen port (defaults to METRICS_PORT)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider before any TLS connection is made
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|existing| {
            anyhow::anyhow!("Failed to install rustls crypto provider, already set: {existing:?}")
        })?;

    let cli = Cli::parse();
    let config = RotationConfig::from_env();

    init_logging(&config)?;
    metrics::register_metrics().context("Failed to register metrics")?;

    let store = AwsSecretStore::new(&config).await;
    let controller = RotationController::new(store, MySqlTarget::new(), config);

    match cli.command {
        Commands::Step {
            secret_id,
            token,
            step,
        } => {
            let request = RotationRequest::new(secret_id, token, RotationStep::from(step));
            let outcome = controller
                .dispatch(&request)
                .await
                .with_context(|| format!("{} failed", request.step))?;
            println!("{}", serde_json::to_string(&outcome)?);
        }
        Commands::Rotate { secret_id, token } => {
            let token = token.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            info!("Rotating {} with token {}", secret_id, token);
            let report = RotationRunner::new(&controller)
                .run(&secret_id, &token)
                .await
                .with_context(|| format!("Rotation of {secret_id} with token {token} stopped"))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Serve { port } => {
            let port = port.unwrap_or(controller.config().metrics_port);
            let state = Arc::new(ServerState::new(controller));
            start_server(port, state)
                .await
                .context("HTTP server failed")?;
        }
    }

    Ok(())
}
