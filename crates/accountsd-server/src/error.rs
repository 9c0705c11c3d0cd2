use accountsd_proto::Status;
use thiserror::Error;

/// Failure of one pending method call. Each variant terminates exactly that call.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("not authorized: {0}")]
    AuthorizationDenied(String),

    #[error("object '{0}' does not exist")]
    UnknownTarget(String),

    #[error("running '{tool}' failed: {message}")]
    ToolFailure { tool: String, message: String },

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ServiceError {
    pub fn status(&self) -> Status {
        match self {
            ServiceError::AuthorizationDenied(_) => Status::ErrDenied,
            ServiceError::UnknownTarget(_) => Status::NotFound,
            ServiceError::ToolFailure { .. } => Status::ErrFailed,
            ServiceError::BadRequest(_) => Status::ErrBadPayload,
        }
    }
}
