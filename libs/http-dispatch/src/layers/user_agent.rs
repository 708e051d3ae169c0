use crate::error::DispatchError;
use http::{HeaderValue, Request};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that fills in `User-Agent` on requests that lack one
#[derive(Clone, Debug)]
pub struct UserAgentLayer {
    user_agent: HeaderValue,
}

impl UserAgentLayer {
    /// # Errors
    /// Returns `DispatchError::InvalidHeaderValue` if the string is not a valid header value
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, DispatchError> {
        let user_agent = HeaderValue::from_str(user_agent.as_ref())?;
        Ok(Self { user_agent })
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

/// Service produced by [`UserAgentLayer`]
#[derive(Clone, Debug)]
pub struct UserAgentService<S> {
    inner: S,
    user_agent: HeaderValue,
}

impl<S, ReqBody> Service<Request<ReqBody>> for UserAgentService<S>
where
    S: Service<Request<ReqBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        // Caller-supplied User-Agent wins
        req.headers_mut()
            .entry(http::header::USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tower::ServiceExt;

    async fn seen_user_agent(layer: &UserAgentLayer, req: Request<()>) -> Option<HeaderValue> {
        let echo = tower::service_fn(|req: Request<()>| async move {
            Ok::<_, std::convert::Infallible>(req.headers().get(http::header::USER_AGENT).cloned())
        });
        layer.layer(echo).oneshot(req).await.unwrap()
    }

    #[tokio::test]
    async fn test_user_agent_added() {
        let layer = UserAgentLayer::try_new("dispatch-test/1.0").unwrap();
        let req = Request::builder().uri("http://example.com").body(()).unwrap();

        let seen = seen_user_agent(&layer, req).await;
        assert_eq!(seen.unwrap(), "dispatch-test/1.0");
    }

    #[tokio::test]
    async fn test_user_agent_not_overwritten() {
        let layer = UserAgentLayer::try_new("dispatch-test/1.0").unwrap();
        let req = Request::builder()
            .uri("http://example.com")
            .header(http::header::USER_AGENT, "custom-agent/2.0")
            .body(())
            .unwrap();

        let seen = seen_user_agent(&layer, req).await;
        assert_eq!(seen.unwrap(), "custom-agent/2.0");
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let result = UserAgentLayer::try_new("invalid\x00agent");
        assert!(matches!(result, Err(DispatchError::InvalidHeaderValue(_))));
    }
}
