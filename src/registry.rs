use crate::client::{Client, Role};
use hashbrown::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Connection {0} is already registered")]
    AlreadyRegistered(String),
}

type Clients = Arc<RwLock<HashMap<String, Client>>>;

/// Live connections keyed by connection ID, each with its current [`Role`].
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    clients: Clients,
}

impl ConnectionRegistry {
    pub async fn register(
        &self,
        id: &str,
        remote_addr: Option<SocketAddr>,
    ) -> Result<Registration, RegistryError> {
        let mut clients = self.clients.write().await;
        if clients.contains_key(id) {
            return Err(RegistryError::AlreadyRegistered(id.to_string()));
        }
        clients.insert(id.to_string(), Client::new(remote_addr));
        Ok(Registration {
            id: id.to_string(),
            registry: self.clone(),
            released: false,
        })
    }

    pub async fn unregister(&self, id: &str) -> Option<Client> {
        self.clients.write().await.remove(id)
    }

    pub async fn set_role(&self, id: &str, role: Role) -> bool {
        match self.clients.write().await.get_mut(id) {
            Some(client) => {
                client.role = role;
                true
            }
            None => false,
        }
    }

    // Moves a connection out of Unassigned. Roles are never reassigned afterwards.
    // Only the connection's own read loop changes its role, so the check and the
    // set cannot interleave with another claim for the same connection.
    pub async fn claim(&self, id: &str, role: Role) -> bool {
        if self.role_of(id).await != Role::Unassigned {
            return false;
        }
        let claimed = self.set_role(id, role).await;
        if claimed {
            info!("{} claimed {:?}", id, role);
        }
        claimed
    }

    // A connection that has already gone reads as Unassigned
    pub async fn role_of(&self, id: &str) -> Role {
        self.clients
            .read()
            .await
            .get(id)
            .map_or(Role::Unassigned, |c| c.role)
    }

    #[cfg(test)]
    pub async fn contains(&self, id: &str) -> bool {
        self.clients.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }
}

/// Keeps a connection registered for as long as it is held.
///
/// `release` removes the entry. If the owner is dropped without releasing, for
/// example when its session future is cancelled, the entry is removed on drop.
#[must_use]
#[derive(Debug)]
pub struct Registration {
    id: String,
    registry: ConnectionRegistry,
    released: bool,
}

impl Registration {
    pub async fn release(mut self) {
        if let Some(client) = self.registry.unregister(&self.id).await {
            info!(
                "{} disconnected from {:?} as {:?}",
                self.id, client.remote_addr, client.role
            );
        }
        self.released = true;
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Ok(mut clients) = self.registry.clients.try_write() {
            clients.remove(&self.id);
            return;
        }
        let registry = self.registry.clone();
        let id = std::mem::take(&mut self.id);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    registry.unregister(&id).await;
                });
            }
            Err(_) => warn!("could not unregister {}: no runtime", id),
        }
    }
}
