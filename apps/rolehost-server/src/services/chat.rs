//! `chat` role: accepts messages posted to a room.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use opentelemetry::KeyValue;
use opentelemetry::trace::{Span as _, Tracer as _};
use rolekit::{Service, ServiceCtx};
use rolekit::telemetry::TracingHandle;
use tonic::body::Body;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tonic::{Request, Response, Status};

use super::{BoxFuture, unimplemented_response};

pub const SERVICE_NAME: &str = "rolehost.chat.v1.Chat";
pub const POST_PATH: &str = "/rolehost.chat.v1.Chat/Post";

const MAX_MESSAGE_LEN: usize = 4096;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PostRequest {
    #[prost(string, tag = "1")]
    pub room: String,
    #[prost(string, tag = "2")]
    pub author: String,
    #[prost(string, tag = "3")]
    pub text: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PostReply {
    #[prost(bool, tag = "1")]
    pub accepted: bool,
    /// Process-wide sequence number of the accepted message.
    #[prost(uint64, tag = "2")]
    pub sequence: u64,
}

/// Chat role. No database.
#[derive(Default)]
pub struct ChatService {
    sequence: Arc<AtomicU64>,
}

impl Service for ChatService {
    fn run(&self, ctx: &ServiceCtx, routes: &mut RoutesBuilder) -> anyhow::Result<()> {
        let handler = ChatHandler {
            sequence: Arc::clone(&self.sequence),
            tracing: ctx.tracing().clone(),
        };
        routes.add_service(ChatServer::new(handler));
        Ok(())
    }
}

struct ChatHandler {
    sequence: Arc<AtomicU64>,
    tracing: TracingHandle,
}

impl ChatHandler {
    fn post(&self, request: Request<PostRequest>) -> Result<Response<PostReply>, Status> {
        let msg = request.into_inner();
        if msg.room.is_empty() {
            return Err(Status::invalid_argument("room is required"));
        }
        if msg.text.is_empty() || msg.text.len() > MAX_MESSAGE_LEN {
            return Err(Status::invalid_argument(format!(
                "text must be 1..={MAX_MESSAGE_LEN} bytes"
            )));
        }

        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;

        let mut span = self.tracing.tracer().start("chat.post");
        span.set_attribute(KeyValue::new("chat.room", msg.room.clone()));
        span.set_attribute(KeyValue::new("chat.sequence", i64::try_from(sequence).unwrap_or(i64::MAX)));
        span.end();

        tracing::debug!(room = %msg.room, author = %msg.author, sequence, "Message accepted");
        Ok(Response::new(PostReply {
            accepted: true,
            sequence,
        }))
    }
}

struct ChatServer {
    inner: Arc<ChatHandler>,
}

impl ChatServer {
    fn new(handler: ChatHandler) -> Self {
        Self {
            inner: Arc::new(handler),
        }
    }
}

impl Clone for ChatServer {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl NamedService for ChatServer {
    const NAME: &'static str = SERVICE_NAME;
}

impl tower::Service<http::Request<Body>> for ChatServer {
    type Response = http::Response<Body>;
    type Error = Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<Body>) -> Self::Future {
        match req.uri().path() {
            POST_PATH => {
                struct PostSvc(Arc<ChatHandler>);
                impl tonic::server::UnaryService<PostRequest> for PostSvc {
                    type Response = PostReply;
                    type Future = BoxFuture<Response<Self::Response>, Status>;

                    fn call(&mut self, request: Request<PostRequest>) -> Self::Future {
                        let inner = Arc::clone(&self.0);
                        Box::pin(async move { inner.post(request) })
                    }
                }

                let inner = Arc::clone(&self.inner);
                Box::pin(async move {
                    let codec = tonic_prost::ProstCodec::default();
                    let mut grpc = tonic::server::Grpc::new(codec);
                    Ok(grpc.unary(PostSvc(inner), req).await)
                })
            }
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use rolekit::{ConfigFormat, ConfigStore, RoleRunner, RoleSelection, ServiceRegistry, ServiceState};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    async fn post(addr: std::net::SocketAddr, msg: PostRequest) -> Result<PostReply, Status> {
        let channel = tonic::transport::Channel::from_shared(format!("http://{addr}"))
            .unwrap()
            .connect()
            .await
            .unwrap();
        let mut client = tonic::client::Grpc::new(channel);
        client.ready().await.unwrap();
        let codec: tonic_prost::ProstCodec<PostRequest, PostReply> = tonic_prost::ProstCodec::default();
        client
            .unary(
                Request::new(msg),
                http::uri::PathAndQuery::from_static(POST_PATH),
                codec,
            )
            .await
            .map(Response::into_inner)
    }

    #[tokio::test]
    async fn post_over_grpc_through_runner() {
        let store = ConfigStore::from_str_with(
            r#"{"services": [{"name": "chat", "listen_port": "127.0.0.1:0"}]}"#,
            ConfigFormat::Json,
        )
        .unwrap();
        let mut registry = ServiceRegistry::from_store(store);
        registry.register("chat", ChatService::default()).await.unwrap();

        let cancel = CancellationToken::new();
        let sup = RoleRunner::new(Arc::new(registry)).launch(&RoleSelection::parse("chat"), &cancel);
        let status = tokio::time::timeout(
            Duration::from_secs(5),
            sup.wait_for("chat", |s| s.state == ServiceState::Serving),
        )
        .await
        .unwrap()
        .unwrap();
        let addr = status.local_addr.unwrap();

        let msg = PostRequest {
            room: "lobby".into(),
            author: "ana".into(),
            text: "hello".into(),
        };
        let first = post(addr, msg.clone()).await.unwrap();
        let second = post(addr, msg).await.unwrap();
        assert!(first.accepted);
        assert_eq!(second.sequence, first.sequence + 1);

        let err = post(
            addr,
            PostRequest {
                room: "lobby".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);

        cancel.cancel();
        sup.join().await.unwrap();
    }
}
