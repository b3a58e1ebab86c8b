//! Boot a single producer against live Redis with seeded in-memory
//! repositories. Exercises the full claim/lease/reschedule path end to end:
//! run it, watch the `healthcheck` queue fill, Ctrl-C to stop.

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use uptick::events::MemoryEventBus;
use uptick::monitor::{Monitor, MonitorKind, RetryPolicy};
use uptick::producer::{Collaborators, Producer, ProducerConfig};
use uptick::repository::{
    MemoryMaintenanceService, MemoryMonitorRepository, MemoryProxyRepository,
};
use uptick::runtime::{node_id, Config, RedisTaskQueue};

fn sample_monitor(id: &str, interval_secs: i64) -> Monitor {
    Monitor {
        id: id.into(),
        name: format!("sample {id}"),
        kind: MonitorKind::Http,
        interval_secs,
        timeout_secs: 16,
        proxy_id: None,
        config: serde_json::json!({"url": "https://example.com/health"}),
        active: true,
        retry: RetryPolicy {
            max_retries: 3,
            retry_interval_secs: 30,
        },
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::from_env()?;
    let client = redis::Client::open(config.redis.url())?;
    let conn = client.get_connection_manager().await?;

    let monitors = Arc::new(MemoryMonitorRepository::new());
    monitors.upsert(sample_monitor("m-fast", 10));
    monitors.upsert(sample_monitor("m-slow", 60));

    let queue = Arc::new(RedisTaskQueue::new(conn.clone()));
    let mut producer_config = ProducerConfig::for_node(node_id());
    producer_config.concurrency = config.concurrency;

    let producer = Producer::new(
        conn,
        Collaborators {
            monitors,
            proxies: Arc::new(MemoryProxyRepository::new()),
            maintenance: Arc::new(MemoryMaintenanceService::new()),
            queue: queue.clone(),
            bus: Arc::new(MemoryEventBus::new()),
        },
        producer_config,
    )?;
    let handle = producer.spawn().await?;

    let depth_reporter = {
        let queue = queue.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(10)).await;
                match queue.depth("healthcheck").await {
                    Ok(depth) => tracing::info!(depth, "healthcheck queue depth"),
                    Err(err) => tracing::warn!(error = %err, "queue depth read failed"),
                }
            }
        })
    };

    wait_for_shutdown_signal().await?;
    tracing::info!("shutdown signal received");
    depth_reporter.abort();
    handle.shutdown().await;
    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
