//! Tracing and OpenTelemetry setup for the co-location stack.
//!
//! [`init_tracing`] installs the global `tracing` subscriber once at process
//! startup.  Console output is always on; span export to an OTLP collector
//! (Jaeger, Grafana Tempo, ...) is opt-in via environment:
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter, default `"info"`. |
//! | `COFRAME_LOG_FORMAT=json` | Newline-delimited JSON instead of the compact console format. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector base URL (e.g. `http://localhost:4318`); enables span export. |
//!
//! ```rust,no_run
//! // Keep the guard alive until the process exits.
//! let _guard = coframe_runtime::telemetry::init_tracing("coframe");
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{trace::SdkTracerProvider, Resource};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

/// Install the global `tracing` subscriber, optionally exporting spans.
///
/// With `OTEL_EXPORTER_OTLP_ENDPOINT` set, every span the protocol crates
/// emit is forwarded to the collector over OTLP/HTTP; without it the stack
/// logs to the console only.
///
/// Dropping the returned [`TracerProviderGuard`] flushes pending span
/// batches, so it belongs in `main` and must outlive all traced work.
pub fn init_tracing(service_name: &str) -> TracerProviderGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = std::env::var("COFRAME_LOG_FORMAT").as_deref() == Ok("json");

    let provider = build_provider(service_name);
    let otel_layer = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("coframe")));
    let fmt_layer = if json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().compact().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(otel_layer)
        .with(fmt_layer)
        .init();

    TracerProviderGuard(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// RAII guard
// ─────────────────────────────────────────────────────────────────────────────

/// Shuts the OTel [`SdkTracerProvider`] down on drop.
///
/// Shutdown flushes any spans still queued in the exporter.  When no OTLP
/// endpoint was configured the guard holds nothing and dropping it is a
/// no-op.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take() {
            if let Err(e) = provider.shutdown() {
                eprintln!("[coframe] OpenTelemetry provider shutdown error: {e}");
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build the span pipeline when `OTEL_EXPORTER_OTLP_ENDPOINT` is set.
///
/// Exporter construction failures are reported on stderr (the subscriber is
/// not installed yet at this point) and the stack falls back to plain
/// console logging.
fn build_provider(service_name: &str) -> Option<SdkTracerProvider> {
    let endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok()?;

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[coframe] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Simple exporter: spans flush synchronously.  A batch exporter spawns
    // onto a Tokio runtime, and none is running yet when the shell calls
    // `init_tracing`.
    let provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_simple_exporter(exporter)
        .build();
    Some(provider)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_endpoint_means_no_provider() {
        // SAFETY: no other test touches this variable; no data races.
        unsafe { std::env::remove_var("OTEL_EXPORTER_OTLP_ENDPOINT") };
        assert!(build_provider("coframe-test").is_none());
    }

    #[test]
    fn empty_guard_drops_cleanly() {
        drop(TracerProviderGuard(None));
    }
}
