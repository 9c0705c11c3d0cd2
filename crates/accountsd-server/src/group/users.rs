use accountsd_proto::ObjectPath;
use dashmap::DashMap;
use std::sync::Arc;

/// A user account as known to the daemon. Only what group handling needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub uid: u32,
    pub user_name: String,
    pub object_path: ObjectPath,
}

impl UserRef {
    pub fn new(uid: u32, user_name: impl Into<String>) -> Self {
        Self {
            uid,
            user_name: user_name.into(),
            object_path: ObjectPath::for_user(uid),
        }
    }
}

/// Lookup capability over the known users, injected into group handling.
pub trait UserLookup: Send + Sync {
    fn user_by_name(&self, name: &str) -> Option<Arc<UserRef>>;
    fn user_by_path(&self, path: &str) -> Option<Arc<UserRef>>;
}

/// In-memory user table, replaced wholesale on each scan of the passwd database.
#[derive(Default)]
pub struct UserDirectory {
    by_name: DashMap<String, Arc<UserRef>>,
    by_uid: DashMap<u32, Arc<UserRef>>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_users<I: IntoIterator<Item = UserRef>>(users: I) -> Self {
        let dir = Self::new();
        dir.replace_all(users);
        dir
    }

    pub fn replace_all<I: IntoIterator<Item = UserRef>>(&self, users: I) {
        self.by_name.clear();
        self.by_uid.clear();
        for u in users {
            let u = Arc::new(u);
            self.by_uid.insert(u.uid, u.clone());
            self.by_name.insert(u.user_name.clone(), u);
        }
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

impl UserLookup for UserDirectory {
    fn user_by_name(&self, name: &str) -> Option<Arc<UserRef>> {
        self.by_name.get(name).map(|r| r.value().clone())
    }

    fn user_by_path(&self, path: &str) -> Option<Arc<UserRef>> {
        let uid = ObjectPath::parse(path).ok()?.user_id()?;
        self.by_uid.get(&uid).map(|r| r.value().clone())
    }
}
