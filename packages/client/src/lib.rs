//! # guise_client
//!
//! Implementation crate of the `guise` browser-impersonating HTTP client.
//! Issues HTTP/1.1, HTTP/2 and HTTP/3 requests whose network-observable
//! fingerprints (TLS ClientHello, HTTP/2 SETTINGS and frame ordering, QUIC
//! Initial shape) reproduce a chosen browser build.
//!
//! The public fluent surface lives in the `guise` crate; this crate holds
//! the engines: fingerprint assembly, dialing (direct / SOCKS5 / HTTP
//! CONNECT / unix sockets), DNS (system, UDP, DNS-over-TLS, TTL cache),
//! the hand-rolled HTTP/2 frame layer, quiche-backed HTTP/3, the redirect
//! and retry engines, cookie sessions and the bounded async pool.

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod builder;
pub mod client;
pub mod config;
pub mod connect;
pub mod context;
pub mod cookie;
pub mod dns;
pub mod error;
pub mod fingerprint;
pub mod http;
pub mod middleware;
pub mod multipart;
pub mod pool;
pub mod protocols;
pub mod proxy;
pub mod quic;
pub mod redirect;
pub mod retry;
pub mod tls;

pub use builder::ClientBuilder;
pub use client::Client;
pub use context::Context;
pub use error::{Error, Kind, Result};
pub use http::{IntoUrl, OrderedHeaders, Request, Response};

pub use url::Url;
