//! Tower layer running a service stack under orchestrator protection.

use crate::{ReliabilityError, ReliabilityOrchestrator};
use futures::future::BoxFuture;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Layer running every call through
/// [`ReliabilityOrchestrator::execute`] under a fixed context name.
#[derive(Clone)]
pub struct ReliabilityLayer {
    orchestrator: Arc<ReliabilityOrchestrator>,
    context: String,
}

impl ReliabilityLayer {
    pub fn new(orchestrator: Arc<ReliabilityOrchestrator>, context: impl Into<String>) -> Self {
        Self {
            orchestrator,
            context: context.into(),
        }
    }
}

impl<S> Layer<S> for ReliabilityLayer {
    type Service = ReliabilityService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ReliabilityService {
            inner,
            orchestrator: Arc::clone(&self.orchestrator),
            context: self.context.clone(),
        }
    }
}

/// Service produced by [`ReliabilityLayer`].
#[derive(Clone)]
pub struct ReliabilityService<S> {
    inner: S,
    orchestrator: Arc<ReliabilityOrchestrator>,
    context: String,
}

impl<S, Req> Service<Req> for ReliabilityService<S>
where
    S: Service<Req> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Response: Send + 'static,
    S::Error: Send + 'static,
    Req: Send + 'static,
{
    type Response = S::Response;
    type Error = ReliabilityError<S::Error>;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(ReliabilityError::Inner)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let orchestrator = Arc::clone(&self.orchestrator);
        let context = self.context.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move { orchestrator.execute(&context, || inner.call(req)).await })
    }
}
