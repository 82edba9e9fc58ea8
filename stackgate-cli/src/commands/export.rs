//! `stackgate export` command handler
//!
//! Long-running health exporter: one HTTP listener serving `/metrics` plus
//! its own `/health` and `/healthz`, and a loop that probes every service
//! once per interval and publishes `stackgate_service_up{job="<service>"}`.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Result;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use tokio::net::TcpListener;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use stackgate_core::config::{MetricsConfig, StackConfig};
use stackgate_core::metrics as m;
use stackgate_core::probe::ProbeClient;
use stackgate_core::topology::Topology;

use crate::cli::ExportArgs;
use crate::error::CliError;

/// Execute the `export` command. Runs until SIGINT or SIGTERM.
pub async fn execute(args: ExportArgs, config: &StackConfig) -> Result<(), CliError> {
    let topology = config.topology()?;
    let client = super::probe_client(config)?;
    let interval_secs = args
        .interval_secs
        .unwrap_or(config.metrics.scrape_interval_secs)
        .max(1);

    let addr = listen_addr(&config.metrics).map_err(|e| CliError::Command(e.to_string()))?;
    let listener = TcpListener::bind(addr).await?;
    let handle = install_recorder().map_err(|e| CliError::Command(e.to_string()))?;
    metrics::gauge!(m::BUILD_INFO, m::LABEL_VERSION => env!("CARGO_PKG_VERSION")).set(1.0);
    info!(listen_addr = %addr, interval_secs, "health exporter started");

    let server = axum::serve(listener, router(handle.clone())).into_future();
    tokio::pin!(server);

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let shutdown = wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                let signal = signal.map_err(|e| CliError::Command(e.to_string()))?;
                info!(signal, "health exporter stopping");
                return Ok(());
            }
            result = &mut server => {
                result?;
                return Err(CliError::Command("metrics listener stopped unexpectedly".to_owned()));
            }
            _ = ticker.tick() => {
                handle.run_upkeep();
                let states = scrape_once(client.as_ref(), &topology).await;
                let up = states.iter().filter(|(_, up)| *up).count();
                debug!(up, total = states.len(), "scrape completed");
            }
        }
    }
}

/// Parses `[metrics] listen_addr:port`.
fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    let addr: SocketAddr = format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))?;

    if addr.ip().is_unspecified() {
        warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }
    Ok(addr)
}

/// Installs the global Prometheus recorder. Rendering is served by [`router`].
fn install_recorder() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full(m::READINESS_WAIT_SECONDS.to_owned()),
            &m::READINESS_WAIT_BUCKETS,
        )?
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    m::describe_all();
    Ok(handle)
}

/// Exporter routes: Prometheus text at `/metrics`, liveness of the
/// exporter itself at `/health` and `/healthz`.
fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .route("/health", get(self_health))
        .route("/healthz", get(self_health))
        .with_state(handle)
}

async fn render_metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        handle.render(),
    )
}

async fn self_health() -> &'static str {
    "OK\n"
}

/// Probes each service with a readiness probe once and sets its gauge.
///
/// Returns `(service, up)` in declaration order. A probe error counts as down.
pub async fn scrape_once<P: ProbeClient>(client: &P, topology: &Topology) -> Vec<(String, bool)> {
    let mut states = Vec::new();
    for service in topology.services() {
        let Some(probe) = &service.readiness else {
            continue;
        };
        let up = match client.execute(probe).await {
            Ok(outcome) => outcome.success,
            Err(e) => {
                warn!(service = %service.name, error = %e, "probe could not run");
                false
            }
        };
        metrics::gauge!(m::SERVICE_UP, m::LABEL_JOB => service.name.clone())
            .set(if up { 1.0 } else { 0.0 });
        states.push((service.name.clone(), up));
    }
    states
}

/// Wait for SIGTERM or SIGINT. Returns the signal name.
#[cfg(unix)]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
