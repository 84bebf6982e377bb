use anyhow::Result;
use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct ConductorMetrics {
    subquery_runs: Counter<u64>,
    subquery_duration_ms: Histogram<f64>,
    backend_failures: Counter<u64>,
    tool_call_invocations: Counter<u64>,
    tool_call_entries: Histogram<u64>,
}

static METRICS: OnceCell<ConductorMetrics> = OnceCell::new();

fn handles() -> &'static ConductorMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("conductor.research");
        ConductorMetrics {
            subquery_runs: meter
                .u64_counter("subquery_runs_total")
                .with_description("Sub-query executions by outcome")
                .init(),
            subquery_duration_ms: meter
                .f64_histogram("subquery_duration_ms")
                .with_description("Sub-query processing time in milliseconds")
                .init(),
            backend_failures: meter
                .u64_counter("backend_failures_total")
                .with_description("Retrieval backend calls that failed and were treated as empty")
                .init(),
            tool_call_invocations: meter
                .u64_counter("tool_call_invocations_total")
                .with_description("Tool-call retriever executions by strategy")
                .init(),
            tool_call_entries: meter
                .u64_histogram("tool_call_entries")
                .with_description("Results returned per tool-call retriever execution")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) -> Result<()> {
    if std::env::var("CONDUCTOR_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "CONDUCTOR_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export research metrics."
        );
    }
    Ok(())
}

pub fn record_subquery(status: &str, duration_ms: u64, context_len: usize) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("status", status.to_string()),
        KeyValue::new("empty", context_len == 0),
    ];
    metrics.subquery_runs.add(1, &attrs);
    metrics.subquery_duration_ms.record(duration_ms as f64, &attrs);
}

pub fn record_backend_failure(backend: &str, kind: &str) {
    let attrs = [
        KeyValue::new("backend", backend.to_string()),
        KeyValue::new("kind", kind.to_string()),
    ];
    handles().backend_failures.add(1, &attrs);
}

pub fn record_tool_call(strategy: &str, entries: usize) {
    let metrics = handles();
    let attrs = [KeyValue::new("strategy", strategy.to_string())];
    metrics.tool_call_invocations.add(1, &attrs);
    metrics.tool_call_entries.record(entries as u64, &attrs);
}
