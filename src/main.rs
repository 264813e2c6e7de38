//! MeshBus transport operator
//!
//! Watches MessageHub resources and provisions the Kafka transport they
//! declare.
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! meshbus-operator
//!
//! # Run with custom log level
//! RUST_LOG=debug meshbus-operator
//! ```

use clap::Parser;
use kube::Client;
use meshbus_operator::controllers::HubController;
use meshbus_operator::leader_election::{self, LeaderElection};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// MeshBus transport operator
#[derive(Parser, Debug)]
#[command(name = "meshbus-operator")]
#[command(version, about = "Kubernetes operator for MeshBus Kafka transports")]
struct Args {
    /// Enable leader election for HA deployments
    #[arg(long, default_value = "false")]
    leader_election: bool,

    /// Namespace for the leader election Lease (auto-detected if empty)
    #[arg(long, default_value = "")]
    leader_election_namespace: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let args = Args::parse();

    info!("Starting MeshBus transport operator");
    info!("Leader election: {}", args.leader_election);

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // One token wired through everything: losing the leader lease or
    // receiving a shutdown signal aborts in-flight provisioning waits.
    let cancel = CancellationToken::new();

    if args.leader_election {
        let namespace = leader_election::detect_namespace(&args.leader_election_namespace);
        info!("Leader election namespace: {}", namespace);
        let lease = LeaderElection::new(client.clone(), &namespace)
            .acquire()
            .await?;
        lease.spawn_renewal(cancel.clone());
    }

    let controller = Arc::new(HubController::new(client, cancel.clone()));
    let controller_handle = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            if let Err(err) = controller.run().await {
                error!("Hub controller error: {}", err);
            }
        })
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            cancel.cancel();
        }
        _ = cancel.cancelled() => {
            error!("Leadership lost, initiating shutdown");
        }
        result = controller_handle => {
            if let Err(err) = result {
                error!("Hub controller task failed: {}", err);
            }
        }
    }

    info!("MeshBus transport operator shutting down");
    Ok(())
}
