//! HTTP hosting and upstream transport.

pub mod forwarder;
pub mod server;

pub use forwarder::{Forwarder, HttpForwarder};
pub use server::HttpServer;
