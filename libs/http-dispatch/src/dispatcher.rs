use crate::builder::DispatcherBuilder;
use crate::cancel::{AbortController, AbortSignal, Cancel, CancelToken};
use crate::context::ExecutionContext;
use crate::descriptor::RequestDescriptor;
use crate::error::{DispatchError, ErrorCode, NETWORK_ERROR_MESSAGE, RequestError, TransportError};
use crate::headers;
use crate::latch::{SettleLatch, SettleState};
use crate::response::{NormalizedResponse, RawResponse, RequestHandle, ResponseData, canonical_status_text};
use crate::settle::SettlementPolicy;
use crate::transport::{CredentialsMode, Transport, TransportRequest};
use crate::url::{build_full_path, build_url};
use http::{HeaderMap, Method};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tower::ServiceExt;
use tracing::Instrument;

/// Turns request descriptors into single outcomes
///
/// Each call to [`dispatch`](Self::dispatch) assembles headers, URL and
/// credential policy from the descriptor, hands one [`TransportRequest`] to
/// the transport and settles exactly once: with the response accepted by the
/// [`SettlementPolicy`], with a [`RequestError`], or with the cancel reason.
///
/// Cloning is cheap; clones share the transport and context.
#[derive(Clone)]
pub struct Dispatcher {
    pub(crate) transport: Transport,
    pub(crate) context: Arc<ExecutionContext>,
    pub(crate) settlement: Arc<dyn SettlementPolicy>,
}

impl Dispatcher {
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    /// Dispatcher over the default [`HyperTransport`](crate::HyperTransport)
    ///
    /// # Errors
    /// Returns an error if TLS initialization fails
    pub fn new() -> Result<Self, DispatchError> {
        DispatcherBuilder::new().build()
    }

    #[must_use]
    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// Dispatch one request and wait for its outcome
    ///
    /// # Errors
    /// - `DispatchError::Cancelled` when the descriptor's cancel token fires
    ///   before the transport settles
    /// - `DispatchError::Request` for invalid options, transport failures,
    ///   timeouts and responses rejected by the settlement policy
    pub async fn dispatch(&self, descriptor: RequestDescriptor) -> Result<NormalizedResponse, DispatchError> {
        let latch = Arc::new(SettleLatch::new());
        self.run(Arc::new(descriptor), &latch).await
    }

    /// Start a dispatch on the runtime and return its pending outcome
    ///
    /// Dropping the returned [`DispatchHandle`] aborts the dispatch task; use
    /// [`DispatchHandle::detach`] to let it run to completion unobserved.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    #[must_use]
    pub fn spawn(&self, descriptor: RequestDescriptor) -> DispatchHandle {
        let config = Arc::new(descriptor);
        let latch = Arc::new(SettleLatch::new());
        let this = self.clone();
        let task = {
            let config = Arc::clone(&config);
            let latch = Arc::clone(&latch);
            tokio::spawn(async move { this.run(config, &latch).await })
        };
        DispatchHandle {
            task: Some(task),
            latch,
            config,
        }
    }

    async fn run(
        &self,
        config: Arc<RequestDescriptor>,
        latch: &Arc<SettleLatch>,
    ) -> Result<NormalizedResponse, DispatchError> {
        let full_path = build_full_path(config.base_url.as_deref(), &config.url);
        let span = tracing::debug_span!("http_dispatch", method = %config.method, url = %full_path);
        self.execute(config, full_path, latch).instrument(span).await
    }

    async fn execute(
        &self,
        config: Arc<RequestDescriptor>,
        full_path: String,
        latch: &Arc<SettleLatch>,
    ) -> Result<NormalizedResponse, DispatchError> {
        let (method, headers, url) = match self.prepare(&config, &full_path) {
            Ok(prepared) => prepared,
            Err(err) => {
                let claimed = latch.try_settle();
                tracing::debug!(error = %err, claimed, "dispatch rejected before transport");
                return Err(err);
            }
        };

        let controller = AbortController::new();
        let signal = controller.signal();

        // Cancellation claims the latch from the token listener, independently
        // of the transport future.
        let _subscription = config.cancel_token.as_ref().map(|token| {
            let latch = Arc::clone(latch);
            let controller = controller.clone();
            token.subscribe(move |reason| {
                let claimed = latch.try_cancel();
                if claimed {
                    controller.abort();
                }
                tracing::debug!(reason = %reason, claimed, "dispatch cancelled");
            })
        });
        if latch.state() == SettleState::Cancelled {
            return Err(DispatchError::Cancelled(cancel_reason(&config)));
        }

        let credentials = CredentialsMode::from_with_credentials(config.with_credentials);
        let request = RequestHandle::new(method.clone(), url.clone(), headers.clone(), credentials);

        let transport_request = TransportRequest {
            method,
            url,
            headers,
            body: config.data.clone(),
            credentials,
            signal: signal.clone(),
            timeout: config.effective_timeout(),
            timeout_error_message: config.timeout_error_message.clone(),
            max_content_length: config.max_content_length,
        };

        let completed = tokio::select! {
            biased;
            () = signal.aborted() => None,
            result = self.transport.clone().oneshot(transport_request) => Some(result),
        };

        // The listener may claim the latch between completion and this point.
        let Some(result) = completed.filter(|_| latch.try_settle()) else {
            return Err(DispatchError::Cancelled(cancel_reason(&config)));
        };
        match result {
            Ok(raw) => {
                tracing::debug!(status = raw.status, "transport completed");
                let response = normalize(&config, request, signal, raw)?;
                self.settlement.settle(response)
            }
            Err(err) => {
                tracing::debug!(error = %err, "transport failed");
                Err(classify_transport_error(&config, request, err))
            }
        }
    }

    fn prepare(
        &self,
        config: &Arc<RequestDescriptor>,
        full_path: &str,
    ) -> Result<(Method, HeaderMap, String), DispatchError> {
        let method = parse_method(config)?;
        let headers = headers::assemble(config, &self.context, full_path).map_err(|err| {
            RequestError::new(err.to_string(), Arc::clone(config), Some(ErrorCode::BadOptionValue), None)
                .with_source(err)
        })?;
        let url = self.resolve_url(config, full_path)?;
        Ok((method, headers, url))
    }

    fn resolve_url(&self, config: &Arc<RequestDescriptor>, full_path: &str) -> Result<String, DispatchError> {
        let resolved = self.context.resolve_url(full_path).map_err(|err| {
            RequestError::new(
                format!("Invalid URL: {full_path}"),
                Arc::clone(config),
                Some(ErrorCode::InvalidUrl),
                None,
            )
            .with_source(err)
        })?;
        Ok(build_url(
            resolved.as_str(),
            &config.params,
            config.params_serializer.as_ref(),
        ))
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

fn cancel_reason(config: &RequestDescriptor) -> Cancel {
    config
        .cancel_token
        .as_ref()
        .and_then(CancelToken::reason)
        .cloned()
        .unwrap_or_default()
}

fn parse_method(config: &Arc<RequestDescriptor>) -> Result<Method, DispatchError> {
    Method::from_bytes(config.method.to_ascii_uppercase().as_bytes()).map_err(|err| {
        RequestError::new(
            format!("Invalid method: {:?}", config.method),
            Arc::clone(config),
            Some(ErrorCode::BadOptionValue),
            None,
        )
        .with_source(err)
        .into()
    })
}

fn network_error(config: &Arc<RequestDescriptor>, request: RequestHandle) -> RequestError {
    RequestError::new(NETWORK_ERROR_MESSAGE, Arc::clone(config), None, Some(request))
}

fn normalize(
    config: &Arc<RequestDescriptor>,
    request: RequestHandle,
    signal: AbortSignal,
    raw: RawResponse,
) -> Result<NormalizedResponse, DispatchError> {
    let final_url = raw.url.as_deref().unwrap_or(request.url());
    if raw.status == 0 && !final_url.starts_with("file:") {
        return Err(network_error(config, request).into());
    }

    let data = ResponseData::decode(raw.body, config.response_type)
        .map_err(|err| network_error(config, request.clone()).with_source(err))?;

    Ok(NormalizedResponse {
        data,
        status: raw.status,
        status_text: raw
            .status_text
            .unwrap_or_else(|| canonical_status_text(raw.status)),
        headers: raw.headers,
        config: Arc::clone(config),
        request,
        signal,
    })
}

fn classify_transport_error(
    config: &Arc<RequestDescriptor>,
    request: RequestHandle,
    err: TransportError,
) -> DispatchError {
    match err {
        TransportError::Timeout(elapsed) => {
            let message = config
                .timeout_error_message
                .clone()
                .unwrap_or_else(|| format!("timeout of {}ms exceeded", elapsed.as_millis()));
            RequestError::new(message, Arc::clone(config), Some(ErrorCode::ConnectionAborted), Some(request))
                .with_source(err)
                .into()
        }
        TransportError::Aborted => match config.cancel_token.as_ref().and_then(CancelToken::reason) {
            Some(reason) => DispatchError::Cancelled(reason.clone()),
            None => RequestError::new(
                "Request aborted",
                Arc::clone(config),
                Some(ErrorCode::ConnectionAborted),
                Some(request),
            )
            .with_source(err)
            .into(),
        },
        other => network_error(config, request).with_source(other).into(),
    }
}

/// Pending outcome of [`Dispatcher::spawn`]
///
/// Await it for the outcome; [`state`](Self::state) reports whether the
/// dispatch has settled yet. Dropping the handle aborts the dispatch task.
#[derive(Debug)]
pub struct DispatchHandle {
    task: Option<JoinHandle<Result<NormalizedResponse, DispatchError>>>,
    latch: Arc<SettleLatch>,
    config: Arc<RequestDescriptor>,
}

impl DispatchHandle {
    #[must_use]
    pub fn state(&self) -> SettleState {
        self.latch.state()
    }

    /// Let the dispatch run to completion without observing its outcome
    pub fn detach(mut self) {
        self.task.take();
    }
}

impl Drop for DispatchHandle {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl Future for DispatchHandle {
    type Output = Result<NormalizedResponse, DispatchError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(task) = self.task.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(task).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(join_err)) => Poll::Ready(Err(RequestError::new(
                "Dispatch task failed",
                Arc::clone(&self.config),
                None,
                None,
            )
            .with_source(join_err)
            .into())),
            Poll::Pending => Poll::Pending,
        }
    }
}
