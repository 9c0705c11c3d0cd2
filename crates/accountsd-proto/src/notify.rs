//! Batched change notification.
//!
//! Owners mark dirty fields in a [`ChangeSet`] while applying an update and
//! hand the set to [`ChangeNotifier::emit`] once the whole batch is applied.
//! Observers therefore never see a partially updated object, and an empty
//! batch produces no event.

use tokio::sync::broadcast;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet(u8);

impl ChangeSet {
    pub const GID: ChangeSet = ChangeSet(1 << 0);
    pub const GROUP_NAME: ChangeSet = ChangeSet(1 << 1);
    pub const LOCAL_GROUP: ChangeSet = ChangeSet(1 << 2);
    pub const USERS: ChangeSet = ChangeSet(1 << 3);
    pub const IS_LOADED: ChangeSet = ChangeSet(1 << 4);
    pub const NONEXISTENT: ChangeSet = ChangeSet(1 << 5);

    pub fn empty() -> Self {
        ChangeSet(0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ChangeSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ChangeSet) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ChangeSet {
    type Output = ChangeSet;

    fn bitor(self, rhs: ChangeSet) -> ChangeSet {
        ChangeSet(self.0 | rhs.0)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ChangeEvent {
    pub fields: ChangeSet,
}

#[derive(Clone, Debug)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Emit one event for the batch. Returns false when nothing was dirty.
    pub fn emit(&self, fields: ChangeSet) -> bool {
        if fields.is_empty() {
            return false;
        }
        self.force(fields);
        true
    }

    /// Emit regardless of dirtiness.
    pub fn force(&self, fields: ChangeSet) {
        // no receivers is fine: delivery is at-most-once
        let _ = self.tx.send(ChangeEvent { fields });
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(64)
    }
}
