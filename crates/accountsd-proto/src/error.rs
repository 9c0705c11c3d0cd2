use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtoError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad payload")]
    BadPayload,

    #[error("unsupported properties version {0}")]
    UnsupportedVersion(u8),

    #[error("invalid utf-8 in payload")]
    InvalidUtf8,

    #[error("invalid object path: {0}")]
    InvalidObjectPath(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    #[error("string too long for frame field ({0} bytes)")]
    FieldTooLong(usize),
}
