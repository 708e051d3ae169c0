//! Tower layers composed into the hyper transport stack.
//!
//! - [`UserAgentLayer`] - fills in a default `User-Agent`

mod user_agent;

pub use user_agent::{UserAgentLayer, UserAgentService};
