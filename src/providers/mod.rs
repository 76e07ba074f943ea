//! Generation backends and the policies layered over them.
//!
//! Raw transports ([`CloudTransport`], [`LocalTransport`]) perform one
//! network call each. [`RetryingTransport`] and [`AdmittedTransport`]
//! decorate them, and [`BackendClient`] adds sanitization, caching and
//! usage logging on top.

pub mod admission;
pub mod client;
pub mod cloud;
mod http;
pub mod local;
pub mod retry;
pub mod sanitize;
pub mod traits;

pub use admission::{AdmissionSemaphore, AdmittedTransport};
pub use client::BackendClient;
pub use cloud::CloudTransport;
pub use local::LocalTransport;
pub use retry::{RetryConfig, RetryingTransport, with_retry, with_retry_if};
pub use traits::Transport;
