//! gRPC bootstrap: bind a service's listener and serve its routes behind the
//! shared interceptor chain.

pub mod interceptor;

pub use interceptor::{
    CallInfo, CallOutcome, InterceptLayer, InterceptService, Interceptor, InterceptorChain,
    LoggingInterceptor,
};

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::service::RoutesBuilder;
use tonic::transport::Server;

use crate::config::ServiceDescriptor;

#[derive(thiserror::Error, Debug)]
pub enum GrpcError {
    #[error("service '{service}': failed to listen on '{addr}': {source}")]
    Bind {
        service: String,
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("service '{service}': gRPC server failed: {source}")]
    Serve {
        service: String,
        #[source]
        source: tonic::transport::Error,
    },
}

/// Server for one service, not yet accepting connections.
#[derive(Debug)]
pub struct GrpcServer {
    service: Arc<str>,
    chain: InterceptorChain,
}

/// Bind the descriptor's listen address.
///
/// Port conflicts are not retried.
///
/// # Errors
/// Returns [`GrpcError::Bind`] naming the service when the address cannot be bound.
pub async fn listen(
    descriptor: &ServiceDescriptor,
    chain: &InterceptorChain,
) -> Result<(GrpcServer, TcpListener), GrpcError> {
    let addr = descriptor.bind_addr();
    let listener = TcpListener::bind(&addr).await.map_err(|source| GrpcError::Bind {
        service: descriptor.name.clone(),
        addr: addr.clone(),
        source,
    })?;

    let server = GrpcServer {
        service: Arc::from(descriptor.name.as_str()),
        chain: chain.clone(),
    };
    Ok((server, listener))
}

impl GrpcServer {
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service
    }

    /// Serve `routes` on `listener` until `cancel` fires, then drain gracefully.
    ///
    /// # Errors
    /// Returns [`GrpcError::Serve`] if the transport fails.
    pub async fn serve(
        self,
        routes: RoutesBuilder,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> Result<(), GrpcError> {
        let bound: Option<SocketAddr> = listener.local_addr().ok();
        tracing::info!(service = %self.service, addr = ?bound, interceptors = ?self.chain, "gRPC server listening");

        let incoming = TcpListenerStream::new(listener);
        let service = Arc::clone(&self.service);
        Server::builder()
            .layer(InterceptLayer::new(self.chain, Arc::clone(&self.service)))
            .add_routes(routes.routes())
            .serve_with_incoming_shutdown(incoming, async move {
                cancel.cancelled().await;
            })
            .await
            .map_err(|source| GrpcError::Serve {
                service: service.to_string(),
                source,
            })?;

        tracing::info!(service = %self.service, "gRPC server stopped");
        Ok(())
    }
}
