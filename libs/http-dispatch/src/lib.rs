#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Single-shot HTTP request dispatch
//!
//! This crate turns a transport-agnostic [`RequestDescriptor`] into exactly one
//! outcome: a [`NormalizedResponse`] accepted by the settlement policy, or a
//! [`DispatchError`]. Along the way the [`Dispatcher`]:
//! - Drops caller `Content-Type` for multipart bodies and for requests without a body
//! - Injects HTTP Basic `Authorization` from descriptor credentials
//! - Copies the XSRF cookie into a request header for same-origin or
//!   credentialed requests (only when the [`ExecutionContext`] has a cookie store)
//! - Maps `with_credentials` to a [`CredentialsMode`]
//! - Wires an optional [`CancelToken`] to the per-dispatch [`AbortSignal`]
//!
//! The transport is any `tower::Service<TransportRequest>`. [`HyperTransport`]
//! is the default: hyper over rustls with transparent decompression.
//!
//! # Settlement
//!
//! Transport completion and cancellation race for a [`SettleLatch`]; whichever
//! claims it first produces the outcome, the other is dropped.
//!
//! # Example
//!
//! ```ignore
//! use http_dispatch::{CancelToken, Dispatcher, RequestDescriptor};
//!
//! let dispatcher = Dispatcher::builder().build()?;
//! let source = CancelToken::source();
//!
//! let descriptor = RequestDescriptor::new("get", "/users")
//!     .base_url("https://api.example.com")
//!     .param("page", "1")
//!     .cancel_token(source.token());
//!
//! let response = dispatcher.dispatch(descriptor).await?;
//! println!("{} {:?}", response.status, response.data);
//! ```

mod body;
mod builder;
mod cancel;
mod config;
mod context;
mod descriptor;
mod dispatcher;
mod error;
pub mod headers;
mod latch;
mod layers;
mod response;
mod settle;
mod tls;
mod transport;
pub mod url;

pub use body::{FormData, FormPart, FormValue, RequestBody};
pub use builder::{DispatcherBuilder, HyperTransportBuilder};
pub use cancel::{AbortController, AbortSignal, Cancel, CancelToken, CancelTokenSource, Subscription};
pub use config::{
    DEFAULT_USER_AGENT, DEFAULT_XSRF_COOKIE_NAME, DEFAULT_XSRF_HEADER_NAME, TlsRootConfig,
    TransportConfig, TransportSecurity,
};
pub use context::{CookieJar, CookieReader, ExecutionContext};
pub use descriptor::{BasicAuth, ParamsSerializer, RequestDescriptor, ResponseType, StatusValidator};
pub use dispatcher::{DispatchHandle, Dispatcher};
pub use error::{DispatchError, ErrorCode, RequestError, TransportError};
pub use latch::{SettleLatch, SettleState};
pub use layers::{UserAgentLayer, UserAgentService};
pub use response::{NormalizedResponse, RawResponse, RequestHandle, ResponseData};
pub use settle::{SettlementPolicy, ValidateStatus};
pub use transport::{CredentialsMode, HyperTransport, Transport, TransportRequest, boxed};
