//! HTTP surface: the admission middleware and the server that mounts it.

mod middleware;
mod server;

pub use middleware::{rate_limit, REJECTION_MESSAGE};
pub use server::{router, HttpServer};
