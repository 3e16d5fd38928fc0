//! dumpdock: database dump/restore orchestration and Docker Compose stack
//! management, exposed as a CLI and an HTTP API.

pub mod core;
pub mod utils;

#[cfg(feature = "server")]
pub mod server;
