//! Prometheus metrics exporter

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::config::MetricsConfig;

/// Install the global Prometheus recorder and its HTTP listener
///
/// Does nothing when metrics are disabled. Must be called from within a tokio
/// runtime.
pub fn install_exporter(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        info!("Metrics exporter disabled");
        return Ok(());
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .with_context(|| format!("Invalid metrics address {}:{}", config.host, config.port))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    describe_metrics();
    info!("Prometheus metrics available on http://{}/metrics", addr);
    Ok(())
}

fn describe_metrics() {
    metrics::describe_counter!("calc_requests_total", "Calculation requests by outcome");
    metrics::describe_counter!("calc_records_appended_total", "Records appended to the history");
    metrics::describe_gauge!("calc_subscribers", "Live history feed subscribers");
    metrics::describe_counter!(
        "calc_subscribers_dropped_total",
        "Subscribers removed after a failed delivery"
    );
}
