use super::record::{GroupEntry, GroupRecord, SharedGroup};
use super::users::UserLookup;
use accountsd_proto::ObjectPath;
use dashmap::DashMap;
use std::collections::HashSet;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Every exported group, keyed by object path.
///
/// Gid uniqueness is the database's business: a duplicate gid in one scan
/// folds into the same record and the later row wins.
pub struct GroupRegistry {
    groups: DashMap<String, SharedGroup>,
    notify_capacity: usize,
}

impl GroupRegistry {
    pub fn new(notify_capacity: usize) -> Self {
        Self {
            groups: DashMap::new(),
            notify_capacity,
        }
    }

    pub fn apply_scan(&self, entries: &[GroupEntry], users: &dyn UserLookup) -> ScanReport {
        let mut report = ScanReport::default();
        let mut seen = HashSet::with_capacity(entries.len());

        for entry in entries {
            let path = ObjectPath::for_group(entry.gid).as_str().to_string();
            let (group, existed) = match self.groups.get(&path) {
                Some(g) => (g.value().clone(), true),
                None => {
                    let g = GroupRecord::new(entry.gid, self.notify_capacity).shared();
                    self.groups.insert(path.clone(), g.clone());
                    tracing::debug!(%path, name = %entry.name, "group added");
                    report.created += 1;
                    (g, false)
                }
            };
            let first = seen.insert(path.clone());
            if !first {
                tracing::warn!(%path, name = %entry.name, "duplicate gid in group database");
            }
            // new records count as created only
            if group.lock().update_from_entry(entry, users) && first && existed {
                report.updated += 1;
            }
        }

        // records the database no longer lists
        let stale: Vec<String> = self
            .groups
            .iter()
            .filter(|r| !seen.contains(r.key()))
            .map(|r| r.key().clone())
            .collect();
        for path in stale {
            self.groups.remove(&path);
            tracing::debug!(%path, "group removed");
            report.removed += 1;
        }

        report
    }

    pub fn get(&self, path: &str) -> Option<SharedGroup> {
        self.groups.get(path).map(|r| r.value().clone())
    }

    pub fn list_paths(&self) -> Vec<ObjectPath> {
        let mut paths: Vec<ObjectPath> = self
            .groups
            .iter()
            .map(|r| r.value().lock().object_path().clone())
            .collect();
        paths.sort();
        paths
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::users::{UserDirectory, UserRef};

    fn entry(name: &str, gid: u32, members: &[&str]) -> GroupEntry {
        GroupEntry {
            name: name.into(),
            gid,
            members: members.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_scan_creates_updates_and_removes() {
        let users = UserDirectory::from_users([UserRef::new(1, "alice")]);
        let reg = GroupRegistry::new(8);

        let r1 = reg.apply_scan(&[entry("wheel", 10, &["alice"]), entry("staff", 50, &[])], &users);
        assert_eq!(r1, ScanReport { created: 2, updated: 0, removed: 0 });
        assert_eq!(reg.len(), 2);

        let r2 = reg.apply_scan(&[entry("wheel", 10, &["alice"]), entry("staff", 50, &[])], &users);
        assert_eq!(r2, ScanReport::default());

        let r3 = reg.apply_scan(&[entry("wheel", 10, &[])], &users);
        assert_eq!(r3, ScanReport { created: 0, updated: 1, removed: 1 });
        assert!(reg.get("/org/freedesktop/Accounts/Group50").is_none());
    }

    #[test]
    fn test_created_records_are_not_counted_as_updated() {
        let users = UserDirectory::new();
        let reg = GroupRegistry::new(8);
        let r1 = reg.apply_scan(&[entry("wheel", 10, &[])], &users);
        assert_eq!((r1.created, r1.updated), (1, 0));

        let r2 = reg.apply_scan(&[entry("wheel", 10, &[]), entry("audio", 11, &[])], &users);
        assert_eq!(r2, ScanReport { created: 1, updated: 0, removed: 0 });

        let r3 = reg.apply_scan(&[entry("admins", 10, &[]), entry("audio", 11, &[])], &users);
        assert_eq!(r3, ScanReport { created: 0, updated: 1, removed: 0 });
    }

    #[test]
    fn test_record_identity_survives_rescans() {
        let users = UserDirectory::new();
        let reg = GroupRegistry::new(8);
        reg.apply_scan(&[entry("wheel", 10, &[])], &users);
        let before = reg.get("/org/freedesktop/Accounts/Group10").unwrap();
        reg.apply_scan(&[entry("admins", 10, &[])], &users);
        let after = reg.get("/org/freedesktop/Accounts/Group10").unwrap();
        assert!(std::sync::Arc::ptr_eq(&before, &after));
        assert_eq!(after.lock().group_name(), "admins");
    }

    #[test]
    fn test_list_paths_sorted() {
        let users = UserDirectory::new();
        let reg = GroupRegistry::new(8);
        reg.apply_scan(&[entry("b", 20, &[]), entry("a", 10, &[])], &users);
        let paths: Vec<String> = reg.list_paths().iter().map(|p| p.to_string()).collect();
        assert_eq!(
            paths,
            vec![
                "/org/freedesktop/Accounts/Group10",
                "/org/freedesktop/Accounts/Group20"
            ]
        );
    }
}
