//! # guise
//!
//! Browser-impersonating HTTP client with a fluent builder surface.
//! Requests issued through `guise` reproduce the network-observable
//! fingerprints (TLS ClientHello, HTTP/2 frame ordering, QUIC Initial
//! shape) of real browser builds.
//!
//! ```no_run
//! use guise::{ClientExt, Guise};
//!
//! # async fn run() -> guise::Result<()> {
//! let client = Guise::builder().impersonate().chrome().session().build()?;
//! let mut response = client.fetch("https://tls.peet.ws/api/clean").send().await?;
//! println!("{}", response.string().await?);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(clippy::all)]

pub mod builder;

use std::sync::{Arc, OnceLock};

pub use builder::{ClientExt, RequestBuilder};
pub use guise_client::{
    Client, ClientBuilder, Context, Error, IntoUrl, Kind, OrderedHeaders, Request, Response,
    Result, Url,
};

/// Global default client, lazily built on first use.
static GLOBAL_CLIENT: OnceLock<Arc<Client>> = OnceLock::new();

/// Static entry points.
pub struct Guise;

impl Guise {
    /// Start configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The shared default client (Chrome profile, no session).
    pub fn client() -> Arc<Client> {
        Arc::clone(GLOBAL_CLIENT.get_or_init(|| {
            let client = ClientBuilder::new()
                .build()
                .unwrap_or_else(|e| panic!("default client must build: {e}"));
            Arc::new(client)
        }))
    }

    /// GET through the shared default client.
    pub fn get(url: impl IntoUrl) -> RequestBuilder {
        RequestBuilder::from_shared(http::Method::GET, url)
    }

    /// POST through the shared default client.
    pub fn post(url: impl IntoUrl) -> RequestBuilder {
        RequestBuilder::from_shared(http::Method::POST, url)
    }
}
