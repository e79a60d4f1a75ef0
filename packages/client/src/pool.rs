//! Bounded-concurrency URL fan-out.
//!
//! A pool takes a stream of URLs, dispatches them through a shared client
//! with up to `workers` requests in flight, and yields successes and
//! failures on separate channels. Closing the input drains the workers and
//! closes both outputs; cancelling the parent token aborts in-flight
//! requests.

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::client::Client;
use crate::context::Context;
use crate::error::Error;
use crate::http::{IntoUrl, Response};

/// Handle to a running pool dispatch.
pub struct Dispatch {
    pub urls: mpsc::Sender<String>,
    pub responses: mpsc::Receiver<Response>,
    pub errors: mpsc::Receiver<Error>,
    cancel: CancellationToken,
}

impl Dispatch {
    /// Queue one URL; fails when the pool has shut down.
    pub async fn push(&self, url: impl IntoUrl) -> crate::error::Result<()> {
        let url = url.into_url()?;
        self.urls
            .send(url.to_string())
            .await
            .map_err(|_| crate::error::cancelled())
    }

    /// Stop accepting URLs; workers drain and the outputs close.
    pub fn close(&mut self) {
        // Replacing the sender drops the only handle the caller holds.
        let (closed, _) = mpsc::channel(1);
        self.urls = closed;
    }

    /// Abort everything, including in-flight requests.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

/// Fan out GETs over `workers` concurrent requests.
pub fn dispatch(client: Client, workers: usize, parent: Option<CancellationToken>) -> Dispatch {
    let workers = workers.max(1);
    let cancel = parent.unwrap_or_default();
    let (url_tx, url_rx) = mpsc::channel::<String>(workers * 2);
    let (response_tx, response_rx) = mpsc::channel::<Response>(workers);
    let (error_tx, error_rx) = mpsc::channel::<Error>(workers);

    let token = cancel.clone();
    tokio::spawn(run_pool(client, workers, url_rx, response_tx, error_tx, token));

    Dispatch {
        urls: url_tx,
        responses: response_rx,
        errors: error_rx,
        cancel,
    }
}

async fn run_pool(
    client: Client,
    workers: usize,
    mut urls: mpsc::Receiver<String>,
    responses: mpsc::Sender<Response>,
    errors: mpsc::Sender<Error>,
    cancel: CancellationToken,
) {
    let mut tasks: JoinSet<()> = JoinSet::new();
    loop {
        // Bound the fan-out before pulling the next URL.
        while tasks.len() >= workers {
            if tasks.join_next().await.is_none() {
                break;
            }
        }
        let url = tokio::select! {
            _ = cancel.cancelled() => break,
            url = urls.recv() => match url {
                Some(url) => url,
                None => break,
            },
        };

        let client = client.clone();
        let responses = responses.clone();
        let errors = errors.clone();
        let token = cancel.clone();
        tasks.spawn(async move {
            let outcome = async {
                let request = client.get(url.as_str())?;
                client.execute(request).await
            };
            let ctx = Context::with_token(token);
            match ctx.run(outcome).await {
                Ok(response) => {
                    let _ = responses.send(response).await;
                }
                Err(error) => {
                    let _ = errors.send(error).await;
                }
            }
        });
    }
    // Input closed or cancelled: drain in-flight workers, then the output
    // channels close as the last senders drop.
    while tasks.join_next().await.is_some() {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ClientBuilder;

    #[tokio::test]
    async fn bad_urls_land_on_the_error_channel() {
        let client = ClientBuilder::new().build().unwrap();
        let mut pool = dispatch(client, 2, None);
        pool.push("http:///nonsense").await.unwrap_err();
        pool.urls.send(String::new()).await.unwrap();
        pool.close();

        let error = pool.errors.recv().await.expect("one error");
        assert!(error.is_builder());
        assert!(pool.responses.recv().await.is_none());
    }

    #[tokio::test]
    async fn cancellation_closes_outputs() {
        let client = ClientBuilder::new().build().unwrap();
        let mut pool = dispatch(client, 2, None);
        pool.cancel();
        assert!(pool.responses.recv().await.is_none());
    }
}
