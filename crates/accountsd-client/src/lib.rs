//! Client half of accountsd: cached group objects kept in sync with the
//! daemon through property fetches and change pushes.

pub mod cache;
pub mod connection;
pub mod error;
pub mod group;
pub mod transport;

pub use cache::GroupCache;
pub use connection::Connection;
pub use error::ClientError;
pub use group::{GroupProxy, LoadState};
pub use transport::GroupTransport;

pub use accountsd_proto::{ChangeEvent, ChangeSet, GroupProperties, ObjectPath};
