use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{RenderedRequest, Transport, TransportError, TransportResponse};
use crate::logging::BenchLogger;

/// Two-state transport: `primary` until its first connection or protocol failure,
/// `fallback` from then on. The failing request is retried once on the fallback.
/// Timeouts and requests that could not be built are returned as they are.
pub struct FallbackTransport<P, F> {
    primary: P,
    fallback: F,
    degraded: AtomicBool,
}

impl<P, F> FallbackTransport<P, F>
where
    P: Transport,
    F: Transport,
{
    pub fn new(primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            degraded: AtomicBool::new(false),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<P, F> Transport for FallbackTransport<P, F>
where
    P: Transport,
    F: Transport,
{
    async fn execute(
        &self,
        request: &RenderedRequest<'_>,
    ) -> Result<TransportResponse, TransportError> {
        if self.is_degraded() {
            return self.fallback.execute(request).await;
        }
        match self.primary.execute(request).await {
            Ok(response) => Ok(response),
            Err(err @ (TransportError::Timeout | TransportError::InvalidRequest(_))) => Err(err),
            Err(err) => {
                // Only the worker that flips the flag reports it.
                if !self.degraded.swap(true, Ordering::AcqRel) {
                    BenchLogger::fallback_engaged(
                        self.primary.label(),
                        self.fallback.label(),
                        &err,
                    );
                }
                self.fallback.execute(request).await
            }
        }
    }

    fn label(&self) -> &str {
        if self.is_degraded() {
            self.fallback.label()
        } else {
            self.primary.label()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        borrow::Cow,
        sync::atomic::{AtomicU64, Ordering},
    };

    use reqwest::Method;

    use super::*;

    struct Counting {
        calls: AtomicU64,
        fail: Option<fn() -> TransportError>,
        name: &'static str,
    }

    impl Counting {
        fn new(name: &'static str) -> Self {
            Self {
                calls: AtomicU64::new(0),
                fail: None,
                name,
            }
        }

        fn failing(name: &'static str, fail: fn() -> TransportError) -> Self {
            Self {
                fail: Some(fail),
                ..Self::new(name)
            }
        }
    }

    #[async_trait]
    impl Transport for Counting {
        async fn execute(
            &self,
            _request: &RenderedRequest<'_>,
        ) -> Result<TransportResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match self.fail {
                Some(fail) => Err(fail()),
                None => Ok(TransportResponse::new(200, "ok")),
            }
        }

        fn label(&self) -> &str {
            self.name
        }
    }

    fn request(method: &Method) -> RenderedRequest<'_> {
        RenderedRequest {
            method,
            url: Cow::Borrowed("http://localhost/"),
            body: Cow::Borrowed(""),
            headers: &[],
            default_content_type: true,
        }
    }

    #[tokio::test]
    async fn healthy_primary_is_kept() {
        let t = FallbackTransport::new(Counting::new("h2"), Counting::new("h1"));
        let method = Method::GET;
        for _ in 0..3 {
            t.execute(&request(&method)).await.unwrap();
        }
        assert!(!t.is_degraded());
        assert_eq!(t.primary.calls.load(Ordering::Relaxed), 3);
        assert_eq!(t.fallback.calls.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn first_failure_sticks_to_fallback() {
        let t = FallbackTransport::new(
            Counting::failing("h2", || TransportError::Connect("refused".into())),
            Counting::new("h1"),
        );
        let method = Method::GET;
        for _ in 0..3 {
            let resp = t.execute(&request(&method)).await.unwrap();
            assert_eq!(resp.status, 200);
        }
        assert!(t.is_degraded());
        assert_eq!(t.label(), "h1");
        assert_eq!(t.primary.calls.load(Ordering::Relaxed), 1);
        assert_eq!(t.fallback.calls.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn timeouts_and_bad_requests_keep_the_primary() {
        let method = Method::GET;

        let t = FallbackTransport::new(
            Counting::failing("h2", || TransportError::Timeout),
            Counting::new("h1"),
        );
        for _ in 0..2 {
            let err = t.execute(&request(&method)).await.unwrap_err();
            assert!(matches!(err, TransportError::Timeout));
        }
        assert!(!t.is_degraded());
        assert_eq!(t.label(), "h2");
        assert_eq!(t.primary.calls.load(Ordering::Relaxed), 2);
        assert_eq!(t.fallback.calls.load(Ordering::Relaxed), 0);

        let t = FallbackTransport::new(
            Counting::failing("h2", || TransportError::InvalidRequest("bad url".into())),
            Counting::new("h1"),
        );
        let err = t.execute(&request(&method)).await.unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest(_)));
        assert!(!t.is_degraded());
        assert_eq!(t.fallback.calls.load(Ordering::Relaxed), 0);
    }
}
