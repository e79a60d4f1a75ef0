//! Request and response hook chains.
//!
//! Pre-request hooks run in registration order and may mutate the request
//! or short-circuit with an error; post-response hooks observe and may
//! mutate the response the same way.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::http::{Request, Response};

type RequestHook = dyn Fn(&mut Request) -> Result<()> + Send + Sync;
type ResponseHook = dyn Fn(&mut Response) -> Result<()> + Send + Sync;

/// Ordered hook chains of a client.
#[derive(Clone, Default)]
pub struct Middleware {
    request_hooks: Vec<Arc<RequestHook>>,
    response_hooks: Vec<Arc<ResponseHook>>,
}

impl Middleware {
    pub fn with_request_hook<F>(&mut self, hook: F)
    where
        F: Fn(&mut Request) -> Result<()> + Send + Sync + 'static,
    {
        self.request_hooks.push(Arc::new(hook));
    }

    pub fn with_response_hook<F>(&mut self, hook: F)
    where
        F: Fn(&mut Response) -> Result<()> + Send + Sync + 'static,
    {
        self.response_hooks.push(Arc::new(hook));
    }

    pub(crate) fn run_request_hooks(&self, request: &mut Request) -> Result<()> {
        for hook in &self.request_hooks {
            hook(request)?;
        }
        Ok(())
    }

    pub(crate) fn run_response_hooks(&self, response: &mut Response) -> Result<()> {
        for hook in &self.response_hooks {
            hook(response)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Middleware")
            .field("request_hooks", &self.request_hooks.len())
            .field("response_hooks", &self.response_hooks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;
    use url::Url;

    #[test]
    fn request_hooks_run_in_registration_order() {
        let mut middleware = Middleware::default();
        middleware.with_request_hook(|req| {
            req.headers.append("X-First", "1");
            Ok(())
        });
        middleware.with_request_hook(|req| {
            req.headers.append("X-Second", "2");
            Ok(())
        });

        let mut request = Request::new(Method::GET, Url::parse("https://x.test").unwrap());
        middleware.run_request_hooks(&mut request).unwrap();
        let names: Vec<&str> = request.headers.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["X-First", "X-Second"]);
    }

    #[test]
    fn hook_error_short_circuits() {
        let mut middleware = Middleware::default();
        middleware.with_request_hook(|_| Err(crate::error::builder_msg("rejected by hook")));
        middleware.with_request_hook(|req| {
            req.headers.append("X-Never", "1");
            Ok(())
        });

        let mut request = Request::new(Method::GET, Url::parse("https://x.test").unwrap());
        let err = middleware.run_request_hooks(&mut request).unwrap_err();
        assert!(err.is_builder());
        assert!(!request.headers.contains("x-never"));
    }
}
