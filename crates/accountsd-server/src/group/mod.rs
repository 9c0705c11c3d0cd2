pub mod record;
pub mod registry;
pub mod users;

pub use record::{GroupEntry, GroupRecord, SharedGroup};
pub use registry::{GroupRegistry, ScanReport};
pub use users::{UserDirectory, UserLookup, UserRef};
