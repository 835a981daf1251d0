//! Request handling and process plumbing around `locator_core`.
//!
//! This crate owns the wire contract (request/reply envelopes), the handlers that map
//! locator outcomes and errors onto status codes, logging bootstrap, and a thin
//! newline-delimited JSON server over TCP.

pub mod contract;
pub mod handlers;
pub mod logging;
pub mod server;

pub use contract::{DriverDetails, ServiceReply, ServiceRequest};
pub use handlers::LocatorService;
pub use server::{LocatorServer, ServerError};
