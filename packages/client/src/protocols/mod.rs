//! Protocol implementations and transport assembly.

pub mod h1;
pub mod h2;
pub mod h3;
pub mod transport;

pub use transport::{
    ForceProtocol, Transport, TransportBody, TransportCache, TransportRequest, TransportResponse,
};
