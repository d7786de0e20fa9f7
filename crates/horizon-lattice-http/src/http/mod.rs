//! HTTP building blocks: parameters, serializers, request descriptors,
//! responses and the transport seam.
//!
//! These types are what the [`NetworkManager`](crate::NetworkManager) works
//! with internally. Most applications only need [`Parameters`], [`HttpMethod`]
//! and [`Response`]; the rest is public so that custom [`Transport`]
//! implementations can be written.

mod params;
mod request;
mod response;
pub(crate) mod serializer;
mod transport;

pub use params::Parameters;
pub use request::{HttpMethod, RequestBody, RequestBuilder, RequestDescriptor, resolve_url};
pub use response::{ProgressCallback, Response, TransferProgress};
pub use serializer::{
    FormSerializer, JsonSerializer, RequestSerializer, RequestSerializerKind,
    ResponseSerializerKind,
};
pub use transport::{ReqwestTransport, ReqwestTransportBuilder, Transport, TransportResponse};
