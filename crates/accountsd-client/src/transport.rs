use crate::ClientError;
use accountsd_proto::{GroupProperties, ObjectPath, PushEvent};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Remote side of a group proxy.
#[async_trait]
pub trait GroupTransport: Send + Sync + 'static {
    async fn get_all(&self, path: &ObjectPath) -> Result<GroupProperties, ClientError>;

    async fn set_group_name(&self, path: &ObjectPath, new_name: &str) -> Result<(), ClientError>;

    async fn add_user(&self, path: &ObjectPath, user: &ObjectPath) -> Result<(), ClientError>;

    async fn remove_user(&self, path: &ObjectPath, user: &ObjectPath) -> Result<(), ClientError>;

    async fn list_groups(&self) -> Result<Vec<ObjectPath>, ClientError>;

    /// Change pushes for `path`. The channel closes when the subscription ends.
    async fn subscribe(&self, path: &ObjectPath) -> Result<mpsc::Receiver<PushEvent>, ClientError>;
}
