use metrics_exporter_prometheus::PrometheusBuilder;

use crate::core::config::Settings;

/// Installs the Prometheus recorder and its scrape listener when enabled.
///
/// Must be called from inside the tokio runtime; the exporter spawns its HTTP
/// listener on it.
pub(crate) fn init(settings: &Settings) -> anyhow::Result<()> {
    let telemetry = settings.telemetry();
    if !telemetry.prometheus_enabled {
        return Ok(());
    }

    PrometheusBuilder::new().with_http_listener(telemetry.prometheus_listen_addr).install()?;

    tracing::info!(addr = %telemetry.prometheus_listen_addr, "Prometheus exporter listening");
    Ok(())
}
