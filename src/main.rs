//! memcached-operator binary.
//!
//! Starts the health server, waits for the leader lease, then runs the
//! controller until a shutdown signal arrives or leadership is lost.

use std::sync::Arc;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use memcached_operator::config::{
    LEASE_NAME, LEASE_RENEW_INTERVAL, LEASE_TTL, OperatorConfig, SHUTDOWN_GRACE_PERIOD,
};
use memcached_operator::health::{HealthState, run_health_server};
use memcached_operator::run_controller_scoped;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("memcached_operator=info".parse()?)
                .add_directive("kube=info".parse()?)
                .add_directive("kube_leader_election=info".parse()?),
        )
        .json()
        .init();

    let config = OperatorConfig::from_env();
    info!(
        holder_id = %config.pod_name,
        lease_namespace = %config.pod_namespace,
        scope = config.scope(),
        "Starting memcached-operator"
    );

    let client = Client::try_default().await?;
    let health_state = Arc::new(HealthState::new());

    // Probes answer before leadership is acquired; readiness flips once the
    // controller starts
    let health_handle = {
        let health_state = health_state.clone();
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lease = LeaseLock::new(
        client.clone(),
        &config.pod_namespace,
        LeaseLockParams {
            holder_id: config.pod_name.clone(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: LEASE_TTL,
        },
    );

    tokio::select! {
        _ = acquire_leadership(&lease) => {}
        _ = shutdown_signal() => {
            info!("Received shutdown signal before acquiring leadership");
            return Ok(());
        }
    }

    let controller_handle = {
        let health_state = health_state.clone();
        let watch_namespace = config.watch_namespace.clone();
        tokio::spawn(async move {
            run_controller_scoped(client, Some(health_state), watch_namespace.as_deref()).await;
        })
    };

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("Controller task panicked: {}", e);
            }
            Err("controller stopped".into())
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
            Err("health server stopped".into())
        }
        reason = hold_leadership(&lease) => {
            // Exiting non-zero lets Kubernetes restart the pod into a new election
            error!(reason = %reason, "Lost leadership, shutting down");
            health_state.set_ready(false).await;
            Err(reason.into())
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");
            health_state.set_ready(false).await;
            info!(
                grace_period_secs = SHUTDOWN_GRACE_PERIOD.as_secs(),
                "Waiting for in-flight reconciliations to complete"
            );
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
            info!("Operator stopped");
            Ok(())
        }
    }
}

/// Block until this instance holds the lease.
async fn acquire_leadership(lease: &LeaseLock) {
    info!("Waiting to acquire leadership...");
    loop {
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {
                info!("Acquired leadership");
                return;
            }
            Ok(_) => info!("Another instance is leader, waiting..."),
            Err(e) => warn!("Failed to acquire lease: {}, retrying...", e),
        }
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
    }
}

/// Renew the lease until a renewal fails; returns why.
async fn hold_leadership(lease: &LeaseLock) -> String {
    loop {
        tokio::time::sleep(LEASE_RENEW_INTERVAL).await;
        match lease.try_acquire_or_renew().await {
            Ok(result) if result.acquired_lease => {}
            Ok(_) => return "lease taken by another instance".to_string(),
            Err(e) => return format!("failed to renew lease: {e}"),
        }
    }
}

/// Wait for SIGTERM or SIGINT.
///
/// Signal handler setup failures are fatal.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
