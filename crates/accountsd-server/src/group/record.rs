use super::users::UserLookup;
use accountsd_proto::{ChangeEvent, ChangeNotifier, ChangeSet, GroupProperties, ObjectPath};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;

/// One row of the system group database, already parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
    pub members: Vec<String>,
}

pub type SharedGroup = Arc<Mutex<GroupRecord>>;

/// Authoritative in-memory mirror of one system group.
///
/// The object path is derived from the gid at construction and never changes.
#[derive(Debug)]
pub struct GroupRecord {
    object_path: ObjectPath,
    gid: u32,
    group_name: String,
    local_group: bool,
    users: Vec<ObjectPath>,
    notifier: ChangeNotifier,
}

impl GroupRecord {
    pub fn new(gid: u32, notify_capacity: usize) -> Self {
        Self {
            object_path: ObjectPath::for_group(gid),
            gid,
            group_name: String::new(),
            local_group: true,
            users: Vec::new(),
            notifier: ChangeNotifier::new(notify_capacity),
        }
    }

    pub fn shared(self) -> SharedGroup {
        Arc::new(Mutex::new(self))
    }

    pub fn object_path(&self) -> &ObjectPath {
        &self.object_path
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn group_name(&self) -> &str {
        &self.group_name
    }

    pub fn local_group(&self) -> bool {
        self.local_group
    }

    pub fn users(&self) -> &[ObjectPath] {
        &self.users
    }

    pub fn properties(&self) -> GroupProperties {
        GroupProperties {
            gid: self.gid as u64,
            group_name: self.group_name.clone(),
            local_group: self.local_group,
            users: self.users.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    /// Merge a fresh database row. Emits at most one change event and
    /// returns whether anything changed.
    pub fn update_from_entry(&mut self, entry: &GroupEntry, users: &dyn UserLookup) -> bool {
        let mut dirty = ChangeSet::empty();

        if self.set_gid(entry.gid) {
            dirty.insert(ChangeSet::GID);
        }
        if self.set_group_name(&entry.name) {
            dirty.insert(ChangeSet::GROUP_NAME);
        }
        if self.set_users(resolve_members(&entry.members, users)) {
            dirty.insert(ChangeSet::USERS);
        }

        if !dirty.is_empty() {
            tracing::debug!(path = %self.object_path, ?dirty, "group changed");
        }
        self.notifier.emit(dirty)
    }

    fn set_gid(&mut self, gid: u32) -> bool {
        if self.gid == gid {
            return false;
        }
        self.gid = gid;
        true
    }

    fn set_group_name(&mut self, name: &str) -> bool {
        if self.group_name == name {
            return false;
        }
        self.group_name = name.to_string();
        true
    }

    fn set_users(&mut self, users: Vec<ObjectPath>) -> bool {
        if self.users == users {
            return false;
        }
        self.users = users;
        true
    }
}

/// Known members only, as sorted object paths.
fn resolve_members(members: &[String], users: &dyn UserLookup) -> Vec<ObjectPath> {
    let mut paths: Vec<ObjectPath> = members
        .iter()
        .filter_map(|name| users.user_by_name(name))
        .map(|u| u.object_path.clone())
        .collect();
    paths.sort();
    paths.dedup();
    paths
}
