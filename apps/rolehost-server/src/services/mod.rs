//! Built-in services and the gRPC plumbing they share.
//!
//! Messages are declared with `prost` derives and the server wrappers follow
//! the shape of `tonic` generated code, so no `protoc` step is needed.

pub mod chat;
pub mod login;

use std::future::Future;
use std::pin::Pin;

use http::header::CONTENT_TYPE;
use tonic::body::Body;

pub use chat::ChatService;
pub use login::LoginService;

pub(crate) type BoxFuture<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'static>>;

/// Response for paths no method matches.
pub(crate) fn unimplemented_response() -> http::Response<Body> {
    let mut response = http::Response::new(Body::default());
    let headers = response.headers_mut();
    headers.insert(
        tonic::Status::GRPC_STATUS,
        (tonic::Code::Unimplemented as i32).into(),
    );
    headers.insert(CONTENT_TYPE, tonic::metadata::GRPC_CONTENT_TYPE);
    response
}
