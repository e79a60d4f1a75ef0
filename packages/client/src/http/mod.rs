//! HTTP data model: ordered headers, requests, responses.

pub mod headers;
pub mod into_url;
pub mod request;
pub mod response;

pub use headers::{OrderedHeaders, PseudoId, PseudoOrder};
pub use into_url::IntoUrl;
pub use request::{Body as RequestBody, Request};
pub use response::{Body, BodyReader, BufferPool, Encoding, HistoryEntry, Response};
