//! Bounded TTL cache over any resolver.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures_util::future::BoxFuture;

use super::Resolve;
use crate::error::Result;

/// TTL cache keyed by host. Hits never re-dial; negative results are not
/// cached.
#[derive(Debug, Clone)]
pub struct CachingResolver {
    inner: Arc<dyn Resolve>,
    entries: Arc<DashMap<String, (Vec<IpAddr>, Instant)>>,
    ttl: Duration,
    max_entries: usize,
}

impl CachingResolver {
    pub fn new(inner: Arc<dyn Resolve>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            inner,
            entries: Arc::new(DashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    fn get_fresh(&self, host: &str) -> Option<Vec<IpAddr>> {
        let entry = self.entries.get(host)?;
        let (addrs, stored_at) = entry.value();
        if stored_at.elapsed() < self.ttl {
            Some(addrs.clone())
        } else {
            drop(entry);
            self.entries.remove(host);
            None
        }
    }

    fn store(&self, host: String, addrs: Vec<IpAddr>) {
        if self.entries.len() >= self.max_entries {
            let ttl = self.ttl;
            self.entries
                .retain(|_, (_, stored_at)| stored_at.elapsed() < ttl);
        }
        if self.entries.len() >= self.max_entries {
            // Still full of fresh entries: drop one arbitrary victim.
            if let Some(victim) = self.entries.iter().next().map(|e| e.key().clone()) {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(host, (addrs, Instant::now()));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Resolve for CachingResolver {
    fn resolve(&self, host: String) -> BoxFuture<'static, Result<Vec<IpAddr>>> {
        let this = self.clone();
        Box::pin(async move {
            if let Some(addrs) = this.get_fresh(&host) {
                tracing::trace!(host = %host, "dns cache hit");
                return Ok(addrs);
            }
            let addrs = this.inner.resolve(host.clone()).await?;
            this.store(host, addrs.clone());
            Ok(addrs)
        })
    }

    fn identity(&self) -> String {
        format!(
            "cache({},{},{})",
            self.inner.identity(),
            self.ttl.as_secs(),
            self.max_entries
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone)]
    struct CountingResolver(Arc<AtomicUsize>);

    impl Resolve for CountingResolver {
        fn resolve(&self, _host: String) -> BoxFuture<'static, Result<Vec<IpAddr>>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(vec!["127.0.0.1".parse().unwrap()]) })
        }

        fn identity(&self) -> String {
            "counting".to_string()
        }
    }

    #[tokio::test]
    async fn hits_do_not_redial() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingResolver::new(
            Arc::new(CountingResolver(Arc::clone(&calls))),
            Duration::from_secs(60),
            16,
        );
        cache.resolve("example.com".into()).await.unwrap();
        cache.resolve("example.com".into()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bound_is_enforced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = CachingResolver::new(
            Arc::new(CountingResolver(calls)),
            Duration::from_secs(60),
            2,
        );
        for host in ["a.test", "b.test", "c.test", "d.test"] {
            cache.resolve(host.into()).await.unwrap();
        }
        assert!(cache.len() <= 2);
    }
}
