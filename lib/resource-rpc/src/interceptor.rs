//! Interceptor framework for hooks around every dispatched call

use crate::{Code, Status};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, debug_span, Instrument};

/// Information about one dispatched call, shared by every interceptor
#[derive(Clone, Debug)]
pub struct CallInfo {
    /// Service name from the request path
    pub service: String,
    /// Method name from the request path
    pub method: String,
    /// Incoming W3C trace context, if any
    pub trace_parent: Option<String>,
    /// When dispatch started
    pub started: Instant,
    /// Custom metadata for interceptors
    pub metadata: Arc<Mutex<HashMap<String, String>>>,
}

impl CallInfo {
    pub fn new(service: &str, method: &str, trace_parent: Option<&str>) -> Self {
        Self {
            service: service.to_string(),
            method: method.to_string(),
            trace_parent: trace_parent.map(str::to_string),
            started: Instant::now(),
            metadata: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// `/{service}/{method}`
    pub fn full_method(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Get a metadata value
    pub fn get_metadata(&self, key: &str) -> Option<String> {
        self.metadata
            .lock()
            .ok()
            .and_then(|m| m.get(key).cloned())
    }

    /// Set a metadata value
    pub fn set_metadata(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut m) = self.metadata.lock() {
            m.insert(key.into(), value.into());
        }
    }
}

/// Hooks run around every dispatched call
#[async_trait::async_trait]
pub trait Interceptor: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str {
        "UnnamedInterceptor"
    }

    /// Called before the call is routed
    async fn on_call(&self, _info: &CallInfo) -> Result<()> {
        Ok(())
    }

    /// Called once the outcome is known, success or not
    async fn on_complete(&self, _info: &CallInfo, _code: Code) -> Result<()> {
        Ok(())
    }

    /// Called when the call fails
    async fn on_error(&self, _info: &CallInfo, _status: &Status) -> Result<()> {
        Ok(())
    }
}

/// Chain of interceptors.
///
/// `on_call` runs in order, `on_complete` and `on_error` in reverse order.
/// A failing interceptor is logged and never fails the call.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an interceptor to the chain
    pub fn add<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.interceptors.push(Arc::new(interceptor));
        self
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub async fn on_call(&self, info: &CallInfo) {
        for ic in &self.interceptors {
            let span = debug_span!("interceptor", name = ic.name());
            if let Err(e) = ic.on_call(info).instrument(span).await {
                debug!("Interceptor {} on_call error: {}", ic.name(), e);
            }
        }
    }

    pub async fn on_complete(&self, info: &CallInfo, code: Code) {
        for ic in self.interceptors.iter().rev() {
            let span = debug_span!("interceptor", name = ic.name());
            if let Err(e) = ic.on_complete(info, code).instrument(span).await {
                debug!("Interceptor {} on_complete error: {}", ic.name(), e);
            }
        }
    }

    pub async fn on_error(&self, info: &CallInfo, status: &Status) {
        for ic in self.interceptors.iter().rev() {
            let span = debug_span!("interceptor", name = ic.name());
            if let Err(e) = ic.on_error(info, status).instrument(span).await {
                debug!("Interceptor {} on_error error: {}", ic.name(), e);
            }
        }
    }
}

/// Logs every call with its outcome and duration
pub struct LoggingInterceptor;

#[async_trait::async_trait]
impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "LoggingInterceptor"
    }

    async fn on_call(&self, info: &CallInfo) -> Result<()> {
        debug!("Call: {}", info.full_method());
        Ok(())
    }

    async fn on_complete(&self, info: &CallInfo, code: Code) -> Result<()> {
        debug!(
            "Call: {} -> {} (duration: {}ms)",
            info.full_method(),
            code,
            info.elapsed().as_millis()
        );
        Ok(())
    }

    async fn on_error(&self, info: &CallInfo, status: &Status) -> Result<()> {
        debug!("Error: {} - {}", info.full_method(), status);
        Ok(())
    }
}
