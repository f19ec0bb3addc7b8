//! Network side of the interception layer: the request model and the
//! fetcher that talks to the origin.

mod client;
mod types;

pub use client::{Fetcher, HttpFetcher};
pub use types::{Request, RequestMode};
