use accountsd_proto::{ProtoError, Status};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Proto(#[from] ProtoError),

    #[error("remote error {status:?}: {message}")]
    Remote { status: Status, message: String },

    #[error("connection closed")]
    Closed,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),
}
