//! JSON-RPC API Layer
//!
//! Exposes job acquisition (long poll) and job posting to provisioner
//! daemons and job producers over JSON-RPC 2.0.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig};
