//! JSON-over-HTTP boundary.
//!
//! The `Transport` trait is the only place bytes leave the process; the
//! `RetryingHttpClient` layers status classification and exponential backoff on
//! top of it.

mod client;
mod transport;

pub use client::{RetryPolicy, RetryingHttpClient};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};
