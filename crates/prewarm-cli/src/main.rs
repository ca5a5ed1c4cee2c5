//! prewarm daemon entry point.
//!
//! Keeps a warm pool of Docker sandboxes. Every command-line argument is a
//! session id; each one is served a sandbox from the pool right after the
//! initial fill, and the claimed entry is printed to stdout as JSON.
//!
//! Runs until Ctrl-C, then stops the pool, which removes every sandbox it
//! created (claimed ones included).

mod config;

use config::PrewarmConfig;
use prewarm_core::{DynProvisioner, PoolEntry, SandboxPool};
use prewarm_docker::DockerProvisioner;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr, stdout carries claimed sessions
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("prewarm=info".parse()?)
                .add_directive("prewarm_core=info".parse()?)
                .add_directive("prewarm_docker=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting prewarm");

    let config = PrewarmConfig::from_env();
    tracing::info!(?config, "Configuration loaded");
    config.validate_warn();

    let stats_every = config.stats_every()?;
    let provisioner: DynProvisioner = Arc::new(DockerProvisioner::new(config.docker_config())?);
    let pool = SandboxPool::new(config.pool_config()?, provisioner);
    pool.start().await;

    let sessions: Vec<String> = std::env::args().skip(1).collect();
    let claimed = claim_sessions(&pool, &sessions).await;

    let mut ticker = tokio::time::interval(stats_every);
    ticker.tick().await;
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                break;
            }
            _ = ticker.tick() => log_stats(&pool).await,
        }
    }

    tracing::info!("Received shutdown signal, cleaning up...");
    pool.stop().await;
    tracing::info!(sessions = claimed.len(), "Claimed sandboxes removed with the pool");

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Serve each session from the pool, timing every claim.
async fn claim_sessions(pool: &SandboxPool, sessions: &[String]) -> Vec<PoolEntry> {
    let mut claimed = Vec::with_capacity(sessions.len());
    for session in sessions {
        let start = Instant::now();
        let entry = pool.get_sandbox(session).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        let Some(entry) = entry else {
            tracing::warn!(session = %session, elapsed_ms, "No warm sandbox available, session needs a cold start");
            continue;
        };

        tracing::info!(
            session = %session,
            sandbox = %entry.name(),
            control_port = entry.ports().control,
            elapsed_ms,
            "Session served from pool"
        );
        match serde_json::to_string(&entry) {
            Ok(json) => println!("{json}"),
            Err(e) => tracing::error!(error = %e, "Failed to serialize pool entry"),
        }
        claimed.push(entry);
    }
    claimed
}

async fn log_stats(pool: &SandboxPool) {
    let stats = pool.stats();
    tracing::info!(
        size = pool.size().await,
        free = pool.free_count().await,
        claims = stats.claims(),
        misses = stats.misses(),
        created = stats.created(),
        creation_failures = stats.creation_failures(),
        evicted = stats.evicted(),
        hit_rate = format!("{:.1}%", stats.hit_rate()),
        backoff_secs = pool.backoff_remaining().await.map(|d| d.as_secs()),
        "Pool stats"
    );
}
