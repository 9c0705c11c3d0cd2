//! Client-side cached group object.
//!
//! A [`GroupProxy`] starts `Unloaded`. Attaching it to a remote path subscribes
//! to change pushes and starts a property fetch (`Loading`). The first fetch
//! to finish, successfully or not, makes it `Loaded`; a failed fetch leaves
//! the cached fields as they were. Alternatively a proxy that was never
//! attached can be declared `Nonexistent`, which also counts as loaded.
//!
//! Every change push triggers a new fetch. An outstanding fetch is aborted
//! first and each fetch carries a generation number, so a reply from a
//! superseded fetch is dropped rather than merged.

use crate::{ClientError, GroupTransport};
use accountsd_proto::{
    ChangeEvent, ChangeNotifier, ChangeSet, EventType, GroupProperties, ObjectPath, PushEvent,
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loading,
    Loaded,
    Nonexistent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FetchTicket(u64);

struct ProxyState {
    object_path: Option<ObjectPath>,
    transport: Option<Arc<dyn GroupTransport>>,

    gid: Option<u32>,
    gid_set: bool, // gid came from the daemon
    group_name: Option<String>,
    local_group: bool,
    users: Option<Vec<ObjectPath>>,

    load_state: LoadState,
    fetch_generation: u64,
    fetch_task: Option<JoinHandle<()>>,
    watch_task: Option<JoinHandle<()>>,
}

impl ProxyState {
    fn is_loaded(&self) -> bool {
        matches!(self.load_state, LoadState::Loaded | LoadState::Nonexistent)
    }

    /// Moves to `Loaded` once; returns whether this call did it.
    fn set_loaded(&mut self) -> bool {
        if self.is_loaded() {
            return false;
        }
        self.load_state = LoadState::Loaded;
        true
    }

    fn merge(&mut self, props: GroupProperties) -> ChangeSet {
        let mut dirty = ChangeSet::empty();

        match u32::try_from(props.gid) {
            Ok(gid) if !self.gid_set || self.gid != Some(gid) => {
                self.gid = Some(gid);
                self.gid_set = true;
                dirty.insert(ChangeSet::GID);
            }
            Ok(_) => {}
            Err(_) => tracing::debug!(gid = props.gid, "gid out of range, ignored"),
        }

        if self.group_name.as_deref() != Some(props.group_name.as_str()) {
            self.group_name = Some(props.group_name);
            dirty.insert(ChangeSet::GROUP_NAME);
        }

        if self.local_group != props.local_group {
            self.local_group = props.local_group;
            dirty.insert(ChangeSet::LOCAL_GROUP);
        }

        // Positional: the daemon sends members sorted, so no re-sort here.
        if self.users.as_ref() != Some(&props.users) {
            self.users = Some(props.users);
            dirty.insert(ChangeSet::USERS);
        }

        dirty
    }
}

pub struct GroupProxy {
    state: Mutex<ProxyState>,
    notifier: ChangeNotifier,
}

impl Default for GroupProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupProxy {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ProxyState {
                object_path: None,
                transport: None,
                gid: None,
                gid_set: false,
                group_name: None,
                local_group: true,
                users: None,
                load_state: LoadState::Unloaded,
                fetch_generation: 0,
                fetch_task: None,
                watch_task: None,
            }),
            notifier: ChangeNotifier::default(),
        }
    }

    /// A proxy for a group the caller already knows the name of.
    pub fn with_name(name: impl Into<String>) -> Self {
        let proxy = Self::new();
        proxy.state.lock().group_name = Some(name.into());
        proxy
    }

    /// A proxy for a group the caller already knows the gid of. The daemon's
    /// value still wins once it arrives.
    pub fn with_gid(gid: u32) -> Self {
        let proxy = Self::new();
        proxy.state.lock().gid = Some(gid);
        proxy
    }

    pub fn object_path(&self) -> Option<ObjectPath> {
        self.state.lock().object_path.clone()
    }

    pub fn gid(&self) -> Option<u32> {
        self.state.lock().gid
    }

    pub fn group_name(&self) -> Option<String> {
        self.state.lock().group_name.clone()
    }

    pub fn local_group(&self) -> bool {
        self.state.lock().local_group
    }

    /// Member user paths in the order the daemon sent them.
    pub fn users(&self) -> Vec<ObjectPath> {
        self.state.lock().users.clone().unwrap_or_default()
    }

    pub fn load_state(&self) -> LoadState {
        self.state.lock().load_state
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().is_loaded()
    }

    pub fn is_nonexistent(&self) -> bool {
        self.state.lock().load_state == LoadState::Nonexistent
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }

    /// Resolves once the proxy is loaded, immediately if it already is.
    pub async fn wait_until_loaded(&self) {
        let mut rx = self.notifier.subscribe();
        while !self.is_loaded() {
            match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Declares that the group does not exist. Only valid before the proxy
    /// is attached or loaded; no I/O happens.
    pub fn mark_nonexistent(&self) -> Result<(), ClientError> {
        {
            let mut st = self.state.lock();
            if st.load_state != LoadState::Unloaded || st.object_path.is_some() {
                return Err(ClientError::InvalidState(
                    "nonexistent can only be set before loading",
                ));
            }
            st.load_state = LoadState::Nonexistent;
        }
        self.notifier.emit(ChangeSet::NONEXISTENT | ChangeSet::IS_LOADED);
        Ok(())
    }

    /// Binds the proxy to a remote group: subscribes to its change pushes
    /// and starts the first fetch.
    pub async fn attach(
        self: &Arc<Self>,
        transport: Arc<dyn GroupTransport>,
        path: ObjectPath,
    ) -> Result<(), ClientError> {
        {
            let mut st = self.state.lock();
            if st.object_path.is_some() {
                return Err(ClientError::InvalidState("proxy already attached"));
            }
            if st.load_state == LoadState::Nonexistent {
                return Err(ClientError::InvalidState("proxy marked nonexistent"));
            }
            st.object_path = Some(path.clone());
            st.transport = Some(transport.clone());
        }

        match transport.subscribe(&path).await {
            Ok(rx) => {
                let watch = tokio::spawn(watch_changes(Arc::downgrade(self), rx));
                self.state.lock().watch_task = Some(watch);
            }
            // still fetch once; the proxy just won't follow later changes
            Err(e) => tracing::warn!(%path, "Couldn't subscribe to group changes: {}", e),
        }

        self.refresh();
        Ok(())
    }

    /// Re-fetches all properties, cancelling any fetch still in flight.
    pub fn refresh(self: &Arc<Self>) {
        let Some((transport, path)) = self.remote() else {
            return;
        };
        let ticket = self.begin_fetch();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            let res = transport.get_all(&path).await;
            if let Some(proxy) = weak.upgrade() {
                proxy.complete_fetch(ticket, res);
            }
        });

        let mut st = self.state.lock();
        if st.fetch_generation == ticket.0 && !handle.is_finished() {
            st.fetch_task = Some(handle);
        }
    }

    pub(crate) fn begin_fetch(&self) -> FetchTicket {
        let mut st = self.state.lock();
        if let Some(prev) = st.fetch_task.take() {
            prev.abort();
            tracing::trace!("cancelled outstanding fetch");
        }
        st.fetch_generation += 1;
        if st.load_state == LoadState::Unloaded {
            st.load_state = LoadState::Loading;
        }
        FetchTicket(st.fetch_generation)
    }

    pub(crate) fn complete_fetch(&self, ticket: FetchTicket, res: Result<GroupProperties, ClientError>) {
        let mut dirty;
        {
            let mut st = self.state.lock();
            if ticket.0 != st.fetch_generation {
                tracing::debug!("discarding reply of superseded fetch");
                return;
            }
            st.fetch_task = None;

            match res {
                Ok(props) => {
                    dirty = st.merge(props);
                    if st.set_loaded() {
                        dirty.insert(ChangeSet::IS_LOADED);
                    }
                }
                Err(e) => {
                    tracing::debug!(
                        path = ?st.object_path,
                        "Error calling GetAll() when retrieving properties: {}",
                        e
                    );
                    if st.set_loaded() {
                        drop(st);
                        self.notifier.emit(ChangeSet::IS_LOADED);
                    }
                    return;
                }
            }
        }
        // one event per completed fetch, even when nothing differed
        self.notifier.force(dirty);
    }

    /// Fills in what this proxy lacks from an already loaded proxy of the
    /// same group. Values seeded by the caller are kept.
    pub fn load_from_sibling(&self, other: &GroupProxy) {
        if std::ptr::eq(self, other) {
            return;
        }
        let (gid, name, users) = {
            let o = other.state.lock();
            if !o.is_loaded() {
                return;
            }
            (o.gid, o.group_name.clone(), o.users.clone())
        };

        let mut dirty = ChangeSet::empty();
        {
            let mut st = self.state.lock();
            if !st.gid_set && st.gid.is_none() && gid.is_some() {
                st.gid = gid;
                dirty.insert(ChangeSet::GID);
            }
            if st.group_name.is_none() && name.is_some() {
                st.group_name = name;
                dirty.insert(ChangeSet::GROUP_NAME);
            }
            if st.users.is_none() && users.is_some() {
                st.users = users;
                dirty.insert(ChangeSet::USERS);
            }
            if st.set_loaded() {
                dirty.insert(ChangeSet::IS_LOADED);
            }
        }
        self.notifier.emit(dirty);
    }

    /// Renames the group. Waits for the daemon's reply; failures are logged
    /// and otherwise ignored. See [`GroupProxy::try_set_group_name`].
    pub async fn set_group_name(&self, new_name: &str) {
        if let Err(e) = self.try_set_group_name(new_name).await {
            tracing::warn!("SetGroupName call failed: {}", e);
        }
    }

    /// Makes `user` a direct member. Failures are logged and otherwise ignored.
    pub async fn add_user(&self, user: &ObjectPath) {
        if let Err(e) = self.try_add_user(user).await {
            tracing::warn!("AddUser call failed: {}", e);
        }
    }

    /// Makes sure `user` is not a direct member. Failures are logged and otherwise ignored.
    pub async fn remove_user(&self, user: &ObjectPath) {
        if let Err(e) = self.try_remove_user(user).await {
            tracing::warn!("RemoveUser call failed: {}", e);
        }
    }

    pub async fn try_set_group_name(&self, new_name: &str) -> Result<(), ClientError> {
        let (t, path) = self.remote().ok_or(ClientError::InvalidState("proxy not attached"))?;
        t.set_group_name(&path, new_name).await
    }

    pub async fn try_add_user(&self, user: &ObjectPath) -> Result<(), ClientError> {
        let (t, path) = self.remote().ok_or(ClientError::InvalidState("proxy not attached"))?;
        t.add_user(&path, user).await
    }

    pub async fn try_remove_user(&self, user: &ObjectPath) -> Result<(), ClientError> {
        let (t, path) = self.remote().ok_or(ClientError::InvalidState("proxy not attached"))?;
        t.remove_user(&path, user).await
    }

    fn remote(&self) -> Option<(Arc<dyn GroupTransport>, ObjectPath)> {
        let st = self.state.lock();
        Some((st.transport.clone()?, st.object_path.clone()?))
    }
}

impl Drop for GroupProxy {
    fn drop(&mut self) {
        let st = self.state.get_mut();
        if let Some(t) = st.fetch_task.take() {
            t.abort();
        }
        if let Some(t) = st.watch_task.take() {
            t.abort();
        }
    }
}

async fn watch_changes(weak: Weak<GroupProxy>, mut rx: mpsc::Receiver<PushEvent>) {
    while let Some(ev) = rx.recv().await {
        let Some(proxy) = weak.upgrade() else {
            break;
        };
        match ev.event_type {
            EventType::Changed => proxy.refresh(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio::time::timeout;

    type Reply = Result<GroupProperties, ClientError>;

    struct FakeTransport {
        replies: Mutex<VecDeque<oneshot::Receiver<Reply>>>,
        requested: mpsc::UnboundedSender<ObjectPath>,
        pushes: Mutex<Option<mpsc::Receiver<PushEvent>>>,
        writes: Mutex<Vec<String>>,
        fail_writes: bool,
    }

    struct Harness {
        transport: Arc<FakeTransport>,
        requested: mpsc::UnboundedReceiver<ObjectPath>,
        push: mpsc::Sender<PushEvent>,
    }

    impl Harness {
        fn new(fail_writes: bool) -> Self {
            let (req_tx, requested) = mpsc::unbounded_channel();
            let (push, push_rx) = mpsc::channel(8);
            let transport = Arc::new(FakeTransport {
                replies: Mutex::new(VecDeque::new()),
                requested: req_tx,
                pushes: Mutex::new(Some(push_rx)),
                writes: Mutex::new(Vec::new()),
                fail_writes,
            });
            Self {
                transport,
                requested,
                push,
            }
        }

        fn queue_reply(&self) -> oneshot::Sender<Reply> {
            let (tx, rx) = oneshot::channel();
            self.transport.replies.lock().push_back(rx);
            tx
        }

        async fn next_request(&mut self) -> ObjectPath {
            timeout(Duration::from_secs(5), self.requested.recv())
                .await
                .expect("fetch was not issued")
                .expect("transport dropped")
        }
    }

    #[async_trait]
    impl GroupTransport for FakeTransport {
        async fn get_all(&self, path: &ObjectPath) -> Result<GroupProperties, ClientError> {
            let rx = self.replies.lock().pop_front();
            let _ = self.requested.send(path.clone());
            match rx {
                Some(rx) => rx.await.unwrap_or(Err(ClientError::Closed)),
                None => Err(ClientError::Closed),
            }
        }

        async fn set_group_name(&self, _path: &ObjectPath, new_name: &str) -> Result<(), ClientError> {
            self.write(format!("rename {new_name}"))
        }

        async fn add_user(&self, _path: &ObjectPath, user: &ObjectPath) -> Result<(), ClientError> {
            self.write(format!("add {user}"))
        }

        async fn remove_user(&self, _path: &ObjectPath, user: &ObjectPath) -> Result<(), ClientError> {
            self.write(format!("remove {user}"))
        }

        async fn list_groups(&self) -> Result<Vec<ObjectPath>, ClientError> {
            Ok(vec![])
        }

        async fn subscribe(&self, _path: &ObjectPath) -> Result<mpsc::Receiver<PushEvent>, ClientError> {
            self.pushes.lock().take().ok_or(ClientError::Closed)
        }
    }

    impl FakeTransport {
        fn write(&self, what: String) -> Result<(), ClientError> {
            self.writes.lock().push(what);
            if self.fail_writes {
                return Err(ClientError::Remote {
                    status: accountsd_proto::Status::ErrDenied,
                    message: "not authorized".into(),
                });
            }
            Ok(())
        }
    }

    fn path() -> ObjectPath {
        ObjectPath::for_group(100)
    }

    fn props(name: &str, users: &[u32]) -> GroupProperties {
        GroupProperties {
            gid: 100,
            group_name: name.into(),
            local_group: true,
            users: users.iter().map(|u| ObjectPath::for_user(*u)).collect(),
        }
    }

    async fn loaded(proxy: &GroupProxy) {
        timeout(Duration::from_secs(5), proxy.wait_until_loaded())
            .await
            .expect("proxy never loaded");
    }

    #[tokio::test]
    async fn test_attach_loads_once_and_emits_one_event() {
        let mut h = Harness::new(false);
        let reply = h.queue_reply();
        let proxy = Arc::new(GroupProxy::new());
        let mut events = proxy.subscribe();

        assert_eq!(proxy.load_state(), LoadState::Unloaded);
        proxy.attach(h.transport.clone(), path()).await.unwrap();
        assert_eq!(proxy.load_state(), LoadState::Loading);

        assert_eq!(h.next_request().await, path());
        reply.send(Ok(props("staff", &[1, 2]))).unwrap();
        loaded(&proxy).await;

        assert_eq!(proxy.load_state(), LoadState::Loaded);
        assert_eq!(proxy.gid(), Some(100));
        assert_eq!(proxy.group_name().as_deref(), Some("staff"));
        assert_eq!(proxy.users().len(), 2);

        let ev = events.try_recv().unwrap();
        assert!(ev.fields.contains(ChangeSet::IS_LOADED | ChangeSet::GROUP_NAME | ChangeSet::USERS));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failed_fetch_still_loads() {
        let mut h = Harness::new(false);
        let reply = h.queue_reply();
        let proxy = Arc::new(GroupProxy::with_name("staff"));
        let mut events = proxy.subscribe();

        proxy.attach(h.transport.clone(), path()).await.unwrap();
        h.next_request().await;
        reply.send(Err(ClientError::Closed)).unwrap();
        loaded(&proxy).await;

        assert!(proxy.is_loaded());
        assert_eq!(proxy.group_name().as_deref(), Some("staff"));
        assert_eq!(proxy.gid(), None);
        assert_eq!(events.try_recv().unwrap().fields, ChangeSet::IS_LOADED);

        // a second failure is silent and loaded never reverts
        let again = h.queue_reply();
        proxy.refresh();
        h.next_request().await;
        again.send(Err(ClientError::Closed)).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(proxy.load_state(), LoadState::Loaded);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_superseded_fetch_is_discarded() {
        let proxy = GroupProxy::new();
        let stale = proxy.begin_fetch();
        let fresh = proxy.begin_fetch();

        proxy.complete_fetch(fresh, Ok(props("fresh", &[1])));
        proxy.complete_fetch(stale, Ok(props("stale", &[1, 2, 3])));

        assert_eq!(proxy.group_name().as_deref(), Some("fresh"));
        assert_eq!(proxy.users(), vec![ObjectPath::for_user(1)]);
    }

    #[test]
    fn test_stale_failure_does_not_mark_loaded() {
        let proxy = GroupProxy::new();
        let stale = proxy.begin_fetch();
        let _fresh = proxy.begin_fetch();
        proxy.complete_fetch(stale, Err(ClientError::Closed));
        assert_eq!(proxy.load_state(), LoadState::Loading);
    }

    #[tokio::test]
    async fn test_change_push_triggers_refetch() {
        let mut h = Harness::new(false);
        let first = h.queue_reply();
        let proxy = Arc::new(GroupProxy::new());
        proxy.attach(h.transport.clone(), path()).await.unwrap();
        h.next_request().await;
        first.send(Ok(props("staff", &[1]))).unwrap();
        loaded(&proxy).await;

        let second = h.queue_reply();
        let mut events = proxy.subscribe();
        h.push
            .send(PushEvent { event_type: EventType::Changed, path: path() })
            .await
            .unwrap();
        h.next_request().await;
        second.send(Ok(props("crew", &[1]))).unwrap();

        let ev = timeout(Duration::from_secs(5), events.recv()).await.unwrap().unwrap();
        assert_eq!(ev.fields, ChangeSet::GROUP_NAME);
        assert_eq!(proxy.group_name().as_deref(), Some("crew"));
    }

    #[tokio::test]
    async fn test_refresh_cancels_outstanding_fetch() {
        let mut h = Harness::new(false);
        let first = h.queue_reply();
        let second = h.queue_reply();
        let proxy = Arc::new(GroupProxy::new());
        proxy.attach(h.transport.clone(), path()).await.unwrap();
        h.next_request().await;

        proxy.refresh();
        h.next_request().await;
        second.send(Ok(props("fresh", &[]))).unwrap();
        loaded(&proxy).await;

        // the first fetch was aborted; a late reply goes nowhere
        let _ = first.send(Ok(props("stale", &[])));
        tokio::task::yield_now().await;
        assert_eq!(proxy.group_name().as_deref(), Some("fresh"));
    }

    #[test]
    fn test_member_order_is_compared_positionally() {
        let proxy = GroupProxy::new();
        let t = proxy.begin_fetch();
        proxy.complete_fetch(t, Ok(props("staff", &[1, 2])));

        let mut events = proxy.subscribe();
        let t = proxy.begin_fetch();
        proxy.complete_fetch(t, Ok(props("staff", &[2, 1])));
        assert_eq!(events.try_recv().unwrap().fields, ChangeSet::USERS);

        let t = proxy.begin_fetch();
        proxy.complete_fetch(t, Ok(props("staff", &[2, 1])));
        assert!(events.try_recv().unwrap().fields.is_empty());
    }

    #[tokio::test]
    async fn test_nonexistent_only_before_attach() {
        let proxy = GroupProxy::new();
        let mut events = proxy.subscribe();
        proxy.mark_nonexistent().unwrap();
        assert!(proxy.is_loaded());
        assert!(proxy.is_nonexistent());
        assert!(events.try_recv().unwrap().fields.contains(ChangeSet::NONEXISTENT));
        assert!(proxy.mark_nonexistent().is_err());

        let h = Harness::new(false);
        let attached = Arc::new(GroupProxy::new());
        let _reply = h.queue_reply();
        attached.attach(h.transport.clone(), path()).await.unwrap();
        assert!(attached.mark_nonexistent().is_err());
        assert!(!attached.is_nonexistent());

        let gone = Arc::new(GroupProxy::new());
        gone.mark_nonexistent().unwrap();
        assert!(gone.attach(h.transport.clone(), path()).await.is_err());
    }

    #[test]
    fn test_load_from_sibling_keeps_seeded_values() {
        let source = GroupProxy::new();
        let t = source.begin_fetch();
        source.complete_fetch(t, Ok(props("staff", &[1])));

        let target = GroupProxy::with_name("seeded");
        target.load_from_sibling(&source);
        assert!(target.is_loaded());
        assert_eq!(target.group_name().as_deref(), Some("seeded"));
        assert_eq!(target.gid(), Some(100));
        assert_eq!(target.users(), vec![ObjectPath::for_user(1)]);

        let by_gid = GroupProxy::with_gid(7);
        by_gid.load_from_sibling(&source);
        assert_eq!(by_gid.gid(), Some(7));
        assert_eq!(by_gid.group_name().as_deref(), Some("staff"));
    }

    #[test]
    fn test_load_from_unloaded_sibling_is_noop() {
        let source = GroupProxy::with_name("staff");
        let target = GroupProxy::new();
        target.load_from_sibling(&source);
        assert!(!target.is_loaded());
        assert_eq!(target.group_name(), None);
    }

    #[tokio::test]
    async fn test_write_errors_are_swallowed_or_returned() {
        let h = Harness::new(true);
        let _reply = h.queue_reply();
        let proxy = Arc::new(GroupProxy::new());
        proxy.attach(h.transport.clone(), path()).await.unwrap();

        proxy.set_group_name("crew").await;
        proxy.add_user(&ObjectPath::for_user(1)).await;
        assert!(matches!(
            proxy.try_remove_user(&ObjectPath::for_user(1)).await,
            Err(ClientError::Remote { .. })
        ));
        assert_eq!(
            *h.transport.writes.lock(),
            vec![
                "rename crew".to_string(),
                "add /org/freedesktop/Accounts/User1".to_string(),
                "remove /org/freedesktop/Accounts/User1".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_write_on_detached_proxy_is_invalid() {
        let proxy = GroupProxy::new();
        assert!(matches!(
            proxy.try_set_group_name("crew").await,
            Err(ClientError::InvalidState(_))
        ));
    }
}
