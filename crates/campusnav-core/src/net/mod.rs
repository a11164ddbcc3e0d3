//! Network boundary for the cache layer.
//!
//! The `Fetcher` trait is the seam the cache controller intercepts; the
//! `HttpFetcher` implementation talks to the real network through reqwest.

pub mod error;
pub mod fetcher;
#[cfg(test)]
pub(crate) mod testing;

pub use error::NetError;
pub use fetcher::{Fetcher, HttpFetcher, Method, Request, RequestMode, Response, ResponseType};
