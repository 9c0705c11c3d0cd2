pub mod error;
pub mod framing;
pub mod notify;
pub mod path;
pub mod payload;
pub mod properties;
pub mod types;

pub use error::*;
pub use framing::*;
pub use notify::*;
pub use path::*;
pub use payload::*;
pub use properties::*;
pub use types::*;
