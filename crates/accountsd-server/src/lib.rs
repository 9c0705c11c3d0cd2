//! Service half of accountsd: exports system groups over a Unix socket and
//! carries out authorized renames and membership changes through the
//! shadow-utils tools.

pub mod auth;
pub mod config;
pub mod error;
pub mod group;
pub mod metrics;
pub mod mutation;
pub mod server;
pub mod sys;

pub use config::Config;
pub use error::ServiceError;
pub use server::{run, serve, Context};
