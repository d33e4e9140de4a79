//! Prometheus metrics for dispatched calls

use crate::interceptor::{CallInfo, Interceptor};
use crate::{Code, Status};
use anyhow::Result;
use prometheus::{Counter, CounterVec, Encoder, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use tracing::debug;

/// Prometheus metrics collector for RPC calls
#[derive(Clone)]
pub struct MetricsCollector {
    /// Total calls received
    pub rpc_requests_total: CounterVec,
    /// Call duration in seconds
    pub rpc_request_duration_seconds: HistogramVec,
    /// Outcomes by status code
    pub rpc_responses_total: CounterVec,
    /// Failed calls
    pub rpc_errors_total: Counter,
    /// Prometheus registry for metrics
    pub registry: Arc<Registry>,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());

        let rpc_requests_total = CounterVec::new(
            Opts::new("rpc_requests_total", "Total RPC calls"),
            &["service", "method"],
        )?;

        let rpc_request_duration_seconds = HistogramVec::new(
            Opts::new("rpc_request_duration_seconds", "RPC call latency in seconds").into(),
            &["service", "method"],
        )?;

        let rpc_responses_total = CounterVec::new(
            Opts::new("rpc_responses_total", "Total RPC outcomes by status code"),
            &["code"],
        )?;

        let rpc_errors_total = Counter::new("rpc_errors_total", "Total failed RPC calls")?;

        registry.register(Box::new(rpc_requests_total.clone()))?;
        registry.register(Box::new(rpc_request_duration_seconds.clone()))?;
        registry.register(Box::new(rpc_responses_total.clone()))?;
        registry.register(Box::new(rpc_errors_total.clone()))?;

        debug!("Metrics collector registered 4 metric families");

        Ok(Self {
            rpc_requests_total,
            rpc_request_duration_seconds,
            rpc_responses_total,
            rpc_errors_total,
            registry,
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Records every dispatched call in a [`MetricsCollector`]
pub struct MetricsInterceptor {
    collector: MetricsCollector,
}

impl MetricsInterceptor {
    pub fn new(collector: MetricsCollector) -> Self {
        Self { collector }
    }
}

#[async_trait::async_trait]
impl Interceptor for MetricsInterceptor {
    fn name(&self) -> &'static str {
        "MetricsInterceptor"
    }

    async fn on_call(&self, info: &CallInfo) -> Result<()> {
        self.collector
            .rpc_requests_total
            .with_label_values(&[&info.service, &info.method])
            .inc();
        Ok(())
    }

    async fn on_complete(&self, info: &CallInfo, code: Code) -> Result<()> {
        self.collector
            .rpc_request_duration_seconds
            .with_label_values(&[&info.service, &info.method])
            .observe(info.elapsed().as_secs_f64());
        self.collector
            .rpc_responses_total
            .with_label_values(&[code.as_str()])
            .inc();
        Ok(())
    }

    async fn on_error(&self, _info: &CallInfo, _status: &Status) -> Result<()> {
        self.collector.rpc_errors_total.inc();
        Ok(())
    }
}
