//! OTel internals: tracing layer and sampling.

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider, ShouldSample, SpanLimits};
use tracing_opentelemetry::OpenTelemetryLayer;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),
}

/// Guard that shuts down the OTel tracer provider on drop, flushing pending spans.
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("OTel shutdown error: {e}");
        }
    }
}

/// Build an OpenTelemetry tracing layer and guard.
///
/// Must be called inside a Tokio runtime: the batch exporter spawns onto it.
/// The guard must be held for the lifetime of the process so spans are
/// flushed.
pub fn otel_layer<S>(
    service_name: &str,
) -> Result<(OpenTelemetryLayer<S, opentelemetry_sdk::trace::SdkTracer>, OtelGuard), TelemetryError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let exporter = SpanExporter::builder()
        .with_tonic()
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(BerthSampler)
        .with_resource(resource)
        .with_span_limits(SpanLimits::default())
        .build();

    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer("berth");
    let layer = tracing_opentelemetry::layer().with_tracer(tracer);

    Ok((layer, OtelGuard { provider }))
}

// ============================================================================
// BerthSampler: differentiated sampling by span category
// ============================================================================

/// Custom sampler with differentiated rates by span name prefix.
///
/// A span whose parent is sampled is always sampled. Root spans:
///
/// | Prefix       | Rate | Rationale                                 |
/// |--------------|------|-------------------------------------------|
/// | `tool.*`     | 100% | One per MCP tool call                     |
/// | `engine.*`   | 100% | Container engine calls, critical to debug |
/// | errors       | 100% | Always capture failures                   |
/// | other        | 10%  | Default for unclassified spans            |
#[derive(Debug, Clone)]
struct BerthSampler;

impl BerthSampler {
    fn rate(name: &str) -> f64 {
        if name.starts_with("tool") || name.starts_with("engine") {
            1.0
        } else {
            0.1
        }
    }
}

impl ShouldSample for BerthSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        // If parent is sampled, always sample (maintain trace continuity)
        if let Some(cx) = parent_context {
            let parent_span = cx.span();
            let parent_ctx = parent_span.span_context();
            if parent_ctx.is_sampled() {
                return SamplingResult {
                    decision: SamplingDecision::RecordAndSample,
                    attributes: vec![],
                    trace_state: parent_ctx.trace_state().clone(),
                };
            }
        }

        let is_error = attributes.iter().any(|kv| {
            (kv.key.as_str() == "otel.status_code" && kv.value.as_str() == "ERROR")
                || (kv.key.as_str() == "error" && kv.value.as_str() == "true")
        });

        if is_error {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: vec![],
                trace_state: TraceState::default(),
            };
        }

        // Delegate to trace-id ratio sampler for deterministic decisions
        Sampler::TraceIdRatioBased(Self::rate(name)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{SpanContext, SpanId, TraceFlags};

    fn decision(name: &str, attributes: &[KeyValue]) -> SamplingDecision {
        // Highest possible ratio bits: only a 100% rate samples it
        let unlucky = TraceId::from_bytes([0xff; 16]);
        BerthSampler
            .should_sample(None, unlucky, name, &SpanKind::Internal, attributes, &[])
            .decision
    }

    #[test]
    fn test_tool_and_engine_always_sampled() {
        assert_eq!(decision("tool.create_session", &[]), SamplingDecision::RecordAndSample);
        assert_eq!(decision("engine.exec_agent", &[]), SamplingDecision::RecordAndSample);
    }

    #[test]
    fn test_root_probe_sampled_by_ratio() {
        assert_eq!(decision("probe.status", &[]), SamplingDecision::Drop);
    }

    #[test]
    fn test_probe_under_sampled_tool_span_follows_parent() {
        let unlucky = TraceId::from_bytes([0xff; 16]);
        let parent = SpanContext::new(
            unlucky,
            SpanId::from_bytes([1; 8]),
            TraceFlags::SAMPLED,
            false,
            TraceState::default(),
        );
        let cx = Context::new().with_remote_span_context(parent);
        let result = BerthSampler.should_sample(
            Some(&cx),
            unlucky,
            "probe.status",
            &SpanKind::Internal,
            &[],
            &[],
        );
        assert_eq!(result.decision, SamplingDecision::RecordAndSample);
    }

    #[test]
    fn test_errors_always_sampled() {
        let attrs = [KeyValue::new("error", "true")];
        assert_eq!(decision("probe.status", &attrs), SamplingDecision::RecordAndSample);
    }
}
