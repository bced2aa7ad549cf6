//! `login` role: issues session ids. Requires a database.

use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};

use async_trait::async_trait;
use opentelemetry::KeyValue;
use opentelemetry::trace::{Span as _, Status as SpanStatus, Tracer as _};
use rolekit::telemetry::TracingHandle;
use rolekit::{DbHandle, Service, ServiceCtx};
use tonic::body::Body;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tonic::{Request, Response, Status};

use super::{BoxFuture, unimplemented_response};

pub const SERVICE_NAME: &str = "rolehost.login.v1.Login";
pub const LOGIN_PATH: &str = "/rolehost.login.v1.Login/Login";

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginRequest {
    #[prost(string, tag = "1")]
    pub account: String,
    #[prost(string, tag = "2")]
    pub token: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct LoginReply {
    #[prost(string, tag = "1")]
    pub session_id: String,
    #[prost(string, tag = "2")]
    pub account: String,
}

/// Login role.
#[derive(Debug, Default)]
pub struct LoginService;

#[async_trait]
impl Service for LoginService {
    async fn before_run(&self, ctx: &ServiceCtx) -> anyhow::Result<()> {
        let db = ctx.db_required()?;
        tracing::info!(engine = ?db.engine(), dsn = %db.redacted_dsn(), "Login database configured");
        Ok(())
    }

    fn run(&self, ctx: &ServiceCtx, routes: &mut RoutesBuilder) -> anyhow::Result<()> {
        let handler = LoginHandler {
            db: ctx.db_required()?.clone(),
            tracing: ctx.tracing().clone(),
        };
        routes.add_service(LoginServer {
            inner: Arc::new(handler),
        });
        Ok(())
    }
}

struct LoginHandler {
    db: DbHandle,
    tracing: TracingHandle,
}

impl LoginHandler {
    async fn login(&self, request: Request<LoginRequest>) -> Result<Response<LoginReply>, Status> {
        let req = request.into_inner();
        if req.account.trim().is_empty() {
            return Err(Status::invalid_argument("account is required"));
        }

        let mut span = self.tracing.tracer().start("login.login");
        span.set_attribute(KeyValue::new("login.account", req.account.clone()));

        if let Err(e) = self.db.ping().await {
            tracing::warn!(account = %req.account, error = %e, "Login database unreachable");
            span.set_status(SpanStatus::error("database unavailable"));
            span.end();
            return Err(Status::unavailable("database unavailable"));
        }
        span.end();

        let session_id = uuid::Uuid::new_v4().to_string();
        tracing::debug!(account = %req.account, %session_id, "Session issued");
        Ok(Response::new(LoginReply {
            session_id,
            account: req.account,
        }))
    }
}

#[derive(Clone)]
struct LoginServer {
    inner: Arc<LoginHandler>,
}

impl NamedService for LoginServer {
    const NAME: &'static str = SERVICE_NAME;
}

impl tower::Service<http::Request<Body>> for LoginServer {
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<Body>) -> Self::Future {
        match req.uri().path() {
            LOGIN_PATH => {
                struct LoginSvc(Arc<LoginHandler>);
                impl tonic::server::UnaryService<LoginRequest> for LoginSvc {
                    type Response = LoginReply;
                    type Future = BoxFuture<Response<Self::Response>, Status>;

                    fn call(&mut self, request: Request<LoginRequest>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.login(request).await })
                    }
                }

                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let codec = tonic_prost::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(LoginSvc(inner), req).await)
                })
            }
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}
