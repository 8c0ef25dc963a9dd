//! Synthetic request workload driven through a pooled component.
//!
//! Each simulated request runs in its own unit of work on one of the worker
//! threads and appends chunks to a pooled `PageBuffer` before rendering it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde::Serialize;
use tether_core::{
    delegate, factory_fn, Component, ComponentClass, ComponentError, Interface, Method, PoolConfig,
    PoolStats, PoolableComponentHandler, Proxy, ProxyError, UnitOfWork,
};
use thiserror::Error;

/// Errors raised by a simulated request.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The proxy could not serve the call.
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// The request was rejected on purpose.
    #[error("request {0} rejected")]
    Rejected(u64),
}

/// Workload shape.
#[derive(Debug, Clone)]
pub struct Workload {
    /// Total units of work to run.
    pub units: u64,
    /// Worker threads.
    pub threads: usize,
    /// Calls per unit of work.
    pub calls: usize,
    /// Fail every n-th unit of work after its first call.
    pub fail_every: Option<u64>,
}

/// Outcome of a workload run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkloadReport {
    /// Units of work executed.
    pub units: u64,
    /// Units of work that ended with an error.
    pub failed_units: u64,
    /// Cleanup tasks that failed.
    pub cleanup_failures: u64,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u128,
    /// Pool statistics after the run.
    pub stats: PoolStats,
}

/// A scratch buffer that is expensive to allocate and unsafe to share.
pub struct PageBuffer {
    id: u64,
    body: String,
}

impl Component for PageBuffer {
    fn recycle(&mut self) -> Result<(), ComponentError> {
        self.body.clear();
        Ok(())
    }
}

/// Introspection interface of pooled components.
pub trait Describe {
    /// Describes the bound instance.
    fn describe(&self) -> Result<String, RequestError>;
}

impl Describe for PageBuffer {
    fn describe(&self) -> Result<String, RequestError> {
        Ok(format!("page-buffer#{} ({} bytes)", self.id, self.body.len()))
    }
}

delegate!(Describe for PageBuffer {
    fn describe(&self) -> Result<String, RequestError>;
});

const APPEND: Method = Method::new("Renderer", "append");
const RENDER: Method = Method::new("Renderer", "render");

/// Returns the class descriptor of [`PageBuffer`].
pub fn page_buffer_class() -> ComponentClass {
    let component = Interface::new("Component");
    ComponentClass::new("PageBuffer")
        .implements(Interface::extending("Renderer", [component.clone()]))
        .implements(Interface::extending("Describe", [component]))
        .implements(Interface::new("Recyclable"))
}

/// Builds the handler used by the workload.
pub fn page_buffer_handler(
    config: PoolConfig,
) -> Result<PoolableComponentHandler<PageBuffer>, tether_core::HandlerError> {
    let next_id = AtomicU64::new(0);
    PoolableComponentHandler::new(
        factory_fn(page_buffer_class(), move || {
            Ok(PageBuffer {
                id: next_id.fetch_add(1, Ordering::Relaxed),
                body: String::with_capacity(8 * 1024),
            })
        }),
        config,
    )
}

fn handle_request(
    proxy: &Proxy<PageBuffer>,
    cx: &UnitOfWork,
    request: u64,
    workload: &Workload,
) -> Result<String, RequestError> {
    for call in 0..workload.calls {
        proxy.invoke(cx, APPEND, |page: &mut PageBuffer| {
            page.body.push_str(&format!("<p>request {request} chunk {call}</p>"));
            Ok::<_, RequestError>(())
        })?;

        if call == 0 && workload.fail_every.is_some_and(|n| n > 0 && request % n == 0) {
            return Err(RequestError::Rejected(request));
        }
    }

    let description = proxy.bind(cx).describe()?;
    tracing::trace!(request, %description, "rendering");
    proxy.invoke(cx, RENDER, |page: &mut PageBuffer| Ok(page.body.clone()))
}

/// Runs `workload` against a fresh handler built from `config`.
pub fn run(config: PoolConfig, workload: &Workload) -> anyhow::Result<WorkloadReport> {
    let handler = page_buffer_handler(config)?;
    let next_request = Arc::new(AtomicU64::new(0));
    let failed = Arc::new(AtomicU64::new(0));
    let cleanup_failures = Arc::new(AtomicU64::new(0));
    let started = Instant::now();

    tracing::info!(
        units = workload.units,
        threads = workload.threads,
        calls = workload.calls,
        "starting workload"
    );

    let workers = (0..workload.threads.max(1))
        .map(|worker| {
            let proxy = handler.proxy();
            let workload = workload.clone();
            let next_request = Arc::clone(&next_request);
            let failed = Arc::clone(&failed);
            let cleanup_failures = Arc::clone(&cleanup_failures);

            thread::Builder::new()
                .name(format!("tether-worker-{worker}"))
                .spawn(move || loop {
                    let request = next_request.fetch_add(1, Ordering::Relaxed);
                    if request >= workload.units {
                        break;
                    }

                    let (result, report) =
                        UnitOfWork::run(|cx| handle_request(&proxy, cx, request, &workload));

                    if let Err(e) = result {
                        tracing::debug!(request, error = %e, "request failed");
                        failed.fetch_add(1, Ordering::Relaxed);
                    }
                    cleanup_failures.fetch_add(report.failures.len() as u64, Ordering::Relaxed);
                })
        })
        .collect::<std::io::Result<Vec<_>>>()?;

    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("worker thread panicked"))?;
    }

    let report = WorkloadReport {
        units: workload.units,
        failed_units: failed.load(Ordering::Relaxed),
        cleanup_failures: cleanup_failures.load(Ordering::Relaxed),
        elapsed_ms: started.elapsed().as_millis(),
        stats: handler.stats(),
    };
    handler.dispose();

    tracing::info!(
        failed = report.failed_units,
        elapsed_ms = %report.elapsed_ms,
        "workload finished"
    );
    Ok(report)
}
