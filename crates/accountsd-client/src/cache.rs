//! One proxy per remote group, shared by everyone asking for it.

use crate::{ClientError, GroupProxy, GroupTransport};
use accountsd_proto::ObjectPath;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::Arc;

pub struct GroupCache {
    transport: RwLock<Arc<dyn GroupTransport>>,
    by_path: DashMap<ObjectPath, Arc<GroupProxy>>,
}

impl GroupCache {
    pub fn new(transport: Arc<dyn GroupTransport>) -> Self {
        Self {
            transport: RwLock::new(transport),
            by_path: DashMap::new(),
        }
    }

    fn transport(&self) -> Arc<dyn GroupTransport> {
        self.transport.read().clone()
    }

    /// The proxy for `path`, created and attached on first use. The returned
    /// proxy may still be loading.
    pub async fn group(&self, path: &ObjectPath) -> Result<Arc<GroupProxy>, ClientError> {
        let proxy = match self.by_path.entry(path.clone()) {
            Entry::Occupied(e) => return Ok(e.get().clone()),
            Entry::Vacant(e) => e.insert(Arc::new(GroupProxy::new())).clone(),
        };
        proxy.attach(self.transport(), path.clone()).await?;
        Ok(proxy)
    }

    /// Looks a group up by name. A name the daemon doesn't know yields a
    /// loaded proxy marked nonexistent, which is not cached.
    pub async fn group_by_name(&self, name: &str) -> Result<Arc<GroupProxy>, ClientError> {
        let cached = self
            .by_path
            .iter()
            .find(|e| e.value().is_loaded() && e.value().group_name().as_deref() == Some(name))
            .map(|e| e.value().clone());
        if let Some(proxy) = cached {
            return Ok(proxy);
        }

        for path in self.transport().list_groups().await? {
            let proxy = self.group(&path).await?;
            proxy.wait_until_loaded().await;
            if proxy.group_name().as_deref() == Some(name) {
                return Ok(proxy);
            }
        }

        tracing::debug!(name, "no such group");
        let missing = GroupProxy::with_name(name);
        missing.mark_nonexistent()?;
        Ok(Arc::new(missing))
    }

    pub async fn list_groups(&self) -> Result<Vec<Arc<GroupProxy>>, ClientError> {
        let paths = self.transport().list_groups().await?;
        let mut out = Vec::with_capacity(paths.len());
        for path in &paths {
            out.push(self.group(path).await?);
        }
        Ok(out)
    }

    pub fn cached(&self, path: &ObjectPath) -> Option<Arc<GroupProxy>> {
        self.by_path.get(path).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// Switches to a new daemon connection. Every cached group gets a fresh
    /// proxy on the new transport that starts out with the old proxy's
    /// values, so readers keep seeing data while the refetch runs. Callers
    /// holding the old proxies keep them; those stop receiving updates.
    pub async fn reconnect(&self, transport: Arc<dyn GroupTransport>) -> Result<(), ClientError> {
        *self.transport.write() = transport.clone();

        let old: Vec<(ObjectPath, Arc<GroupProxy>)> = self
            .by_path
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        tracing::info!(groups = old.len(), "reattaching cached groups");

        for (path, prev) in old {
            let fresh = Arc::new(GroupProxy::new());
            fresh.load_from_sibling(&prev);
            self.by_path.insert(path.clone(), fresh.clone());
            fresh.attach(transport.clone(), path).await?;
        }
        Ok(())
    }
}
