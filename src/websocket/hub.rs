//! WebSocket Connection Hub
//!
//! Tracks every live connection under its identity key and fans responses
//! out to them. The hub is the only structure shared by all connection
//! tasks; every access goes through its lock.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::connection::{ClientConnection, ConnectionId, ConnectionKey};
use super::messages::Response;
use crate::error::{DispatchError, DispatchResult};
use crate::routing::Delivery;

type KeySlots = HashMap<ConnectionKey, HashMap<ConnectionId, Arc<ClientConnection>>>;

/// Manages all WebSocket connections
pub struct ConnectionHub {
    /// Identity key → connections registered under it
    connections: RwLock<KeySlots>,
    /// Configuration
    config: HubConfig,
}

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a connection under its identity key.
    ///
    /// Fails when the connection limit has been reached.
    pub async fn add(&self, connection: Arc<ClientConnection>) -> DispatchResult<()> {
        let mut slots = self.connections.write().await;

        let total: usize = slots.values().map(HashMap::len).sum();
        if total >= self.config.max_connections {
            return Err(DispatchError::TooManyConnections(self.config.max_connections));
        }

        tracing::info!(
            connection_id = %connection.id,
            key = %connection.key,
            "WebSocket connected"
        );

        slots
            .entry(connection.key.clone())
            .or_default()
            .insert(connection.id.clone(), connection);
        Ok(())
    }

    /// Remove a connection. Removing an absent connection is a no-op.
    ///
    /// Returns whether the connection was registered.
    pub async fn remove(&self, connection: &ClientConnection) -> bool {
        let mut slots = self.connections.write().await;

        let Some(slot) = slots.get_mut(&connection.key) else {
            return false;
        };
        let removed = slot.remove(&connection.id).is_some();

        // Release the key once its last connection is gone
        if slot.is_empty() {
            slots.remove(&connection.key);
        }

        if removed {
            tracing::info!(
                connection_id = %connection.id,
                key = %connection.key,
                duration_secs = connection.age().as_secs_f64(),
                "WebSocket disconnected"
            );
        }
        removed
    }

    /// Connections registered under `key` (empty if none)
    pub async fn get(&self, key: &ConnectionKey) -> Vec<Arc<ClientConnection>> {
        self.connections
            .read()
            .await
            .get(key)
            .map(|slot| slot.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every registered connection
    pub async fn all(&self) -> Vec<Arc<ClientConnection>> {
        self.connections
            .read()
            .await
            .values()
            .flat_map(|slot| slot.values().cloned())
            .collect()
    }

    /// Deliver a response according to its strategy.
    ///
    /// Best effort: a failed write is logged and does not stop delivery to
    /// the remaining targets. Returns the number of successful writes.
    pub async fn deliver(
        &self,
        response: &Response,
        delivery: &Delivery,
        origin: &Arc<ClientConnection>,
    ) -> usize {
        let text = match response.encode() {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response");
                return 0;
            }
        };

        let targets = match delivery {
            Delivery::Respondent => vec![Arc::clone(origin)],
            Delivery::ByKey(key) => self.get(key).await,
            Delivery::Broadcast => self.all().await,
        };

        let mut sent = 0;
        for target in &targets {
            match target.send(text.clone()) {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(
                        connection_id = %target.id,
                        key = %target.key,
                        error_code = e.code(),
                        "Failed to deliver message"
                    );
                }
            }
        }

        tracing::trace!(
            route = %response.route,
            event = %response.event,
            delivery = ?delivery,
            targets = targets.len(),
            sent,
            "Delivered response"
        );
        sent
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.values().map(HashMap::len).sum()
    }

    /// Get the number of distinct identity keys with live connections
    pub async fn key_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

impl Default for ConnectionHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}
