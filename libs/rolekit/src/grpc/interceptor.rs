//! Cross-service interceptor chain.
//!
//! Every inbound call on every service in the process goes through the same
//! ordered [`InterceptorChain`]. `before` hooks run in registration order and may
//! annotate request headers or reject the call; `after` hooks run in reverse
//! order for every interceptor whose `before` ran.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use http::{HeaderMap, Request, Response};
use tonic::{Code, Status};
use tower::{Layer, Service};


/// Identity of one inbound call.
#[derive(Debug, Clone)]
pub struct CallInfo {
    service: Arc<str>,
    path: String,
    started: Instant,
}

impl CallInfo {
    #[must_use]
    pub fn new(service: Arc<str>, path: &str) -> Self {
        Self {
            service,
            path: path.to_owned(),
            started: Instant::now(),
        }
    }

    /// Name of the hosting service as declared in the configuration.
    #[must_use]
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Full request path, e.g. `/rolehost.chat.v1.Chat/Post`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Fully qualified gRPC service, e.g. `rolehost.chat.v1.Chat`.
    #[must_use]
    pub fn grpc_service(&self) -> &str {
        self.split_path().0
    }

    #[must_use]
    pub fn method(&self) -> &str {
        self.split_path().1
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn split_path(&self) -> (&str, &str) {
        let trimmed = self.path.trim_start_matches('/');
        trimmed.rsplit_once('/').unwrap_or((trimmed, ""))
    }
}

/// Result of a call as seen by `after` hooks.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub code: Code,
    pub elapsed: Duration,
    /// Interceptor that short-circuited the call, if any.
    pub rejected_by: Option<&'static str>,
}

/// Hook into every inbound call.
///
/// Hooks are synchronous and run on the request path; they must not block.
pub trait Interceptor: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Inspect or annotate the request. Returning `Err` rejects the call with that status.
    ///
    /// # Errors
    /// The status returned to the client when the call is rejected.
    fn before(&self, call: &CallInfo, headers: &mut HeaderMap) -> Result<(), Status> {
        let _ = (call, headers);
        Ok(())
    }

    fn after(&self, call: &CallInfo, outcome: &CallOutcome) {
        let _ = (call, outcome);
    }
}

/// Logs every call; the default chain contains only this interceptor.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn before(&self, call: &CallInfo, _headers: &mut HeaderMap) -> Result<(), Status> {
        tracing::debug!(
            service = call.service(),
            rpc.service = call.grpc_service(),
            rpc.method = call.method(),
            "gRPC request"
        );
        Ok(())
    }

    fn after(&self, call: &CallInfo, outcome: &CallOutcome) {
        tracing::info!(
            service = call.service(),
            rpc.service = call.grpc_service(),
            rpc.method = call.method(),
            code = %outcome.code,
            elapsed_ms = u64::try_from(outcome.elapsed.as_millis()).unwrap_or(u64::MAX),
            "gRPC response"
        );
    }
}

/// Ordered, shareable list of interceptors.
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Arc<Vec<Arc<dyn Interceptor>>>,
}

impl InterceptorChain {
    /// Empty chain: calls pass through untouched.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Chain holding a single [`LoggingInterceptor`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new().with(LoggingInterceptor)
    }

    /// Append an interceptor; it runs after the ones already present.
    #[must_use]
    pub fn with<I: Interceptor>(mut self, interceptor: I) -> Self {
        Arc::make_mut(&mut self.interceptors).push(Arc::new(interceptor));
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run `before` hooks. On rejection returns how many hooks ran (the
    /// rejecting one included), its name and the status.
    fn run_before(&self, call: &CallInfo, headers: &mut HeaderMap) -> Result<(), (usize, &'static str, Status)> {
        for (idx, interceptor) in self.interceptors.iter().enumerate() {
            if let Err(status) = interceptor.before(call, headers) {
                return Err((idx + 1, interceptor.name(), status));
            }
        }
        Ok(())
    }

    fn run_after(&self, ran: usize, call: &CallInfo, outcome: &CallOutcome) {
        for interceptor in self.interceptors.iter().take(ran).rev() {
            interceptor.after(call, outcome);
        }
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Tower layer installing an [`InterceptorChain`] in front of a service's routes.
#[derive(Clone)]
pub struct InterceptLayer {
    chain: InterceptorChain,
    service: Arc<str>,
}

impl InterceptLayer {
    #[must_use]
    pub fn new(chain: InterceptorChain, service: Arc<str>) -> Self {
        Self { chain, service }
    }
}

impl<S> Layer<S> for InterceptLayer {
    type Service = InterceptService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InterceptService {
            inner,
            chain: self.chain.clone(),
            service: Arc::clone(&self.service),
        }
    }
}

#[derive(Clone)]
pub struct InterceptService<S> {
    inner: S,
    chain: InterceptorChain,
    service: Arc<str>,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for InterceptService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Default + Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let call = CallInfo::new(Arc::clone(&self.service), req.uri().path());
        let chain = self.chain.clone();

        if let Err((ran, rejected_by, status)) = chain.run_before(&call, req.headers_mut()) {
            let outcome = CallOutcome {
                code: status.code(),
                elapsed: call.elapsed(),
                rejected_by: Some(rejected_by),
            };
            chain.run_after(ran, &call, &outcome);
            return Box::pin(async move { Ok(status.into_http()) });
        }

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let result = inner.call(req).await;
            let code = match &result {
                Ok(resp) => response_code(resp.headers()),
                Err(_) => Code::Internal,
            };
            let outcome = CallOutcome {
                code,
                elapsed: call.elapsed(),
                rejected_by: None,
            };
            chain.run_after(chain.len(), &call, &outcome);
            result
        })
    }
}

/// Status code visible in response headers. Streaming bodies report their
/// status in trailers, which are not observed here.
fn response_code(headers: &HeaderMap) -> Code {
    Status::from_header_map(headers).map_or(Code::Ok, |status| status.code())
}
