use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use parlor_types::events::GatewayEvent;
use parlor_types::models::{RoomId, UserId};

/// Identifies one live gateway connection.
pub type ConnectionId = Uuid;

/// A fan-out target: a room's subscriber set or a user's private channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Room(RoomId),
    User(UserId),
}

/// Tracks live connections and routes events to the channels they subscribe
/// to. One instance per process; handles are cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<RwLock<DispatcherInner>>,
}

#[derive(Default)]
struct DispatcherInner {
    connections: HashMap<ConnectionId, Registration>,
}

struct Registration {
    user_id: UserId,
    tx: mpsc::UnboundedSender<GatewayEvent>,
    channels: HashSet<Channel>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(DispatcherInner::default())),
        }
    }

    /// Register a connection for `user_id`. The connection starts without
    /// subscriptions; the gateway subscribes it right after registering.
    pub fn register(&self, user_id: UserId) -> (ConnectionId, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.write().connections.insert(
            conn_id,
            Registration {
                user_id,
                tx,
                channels: HashSet::new(),
            },
        );
        (conn_id, rx)
    }

    /// Drop a connection and all of its subscriptions.
    pub fn deregister(&self, conn_id: ConnectionId) {
        self.write().connections.remove(&conn_id);
    }

    pub fn subscribe(&self, conn_id: ConnectionId, channel: Channel) {
        if let Some(reg) = self.write().connections.get_mut(&conn_id) {
            reg.channels.insert(channel);
        }
    }

    pub fn unsubscribe(&self, conn_id: ConnectionId, channel: Channel) {
        if let Some(reg) = self.write().connections.get_mut(&conn_id) {
            reg.channels.remove(&channel);
        }
    }

    /// Subscribe every live connection of `user_id` to `channel`. Used when
    /// an HTTP join lands while the user has gateway connections open.
    pub fn subscribe_user(&self, user_id: UserId, channel: Channel) {
        let mut inner = self.write();
        for reg in inner.connections.values_mut() {
            if reg.user_id == user_id {
                reg.channels.insert(channel);
            }
        }
    }

    /// Remove `channel` from every live connection of `user_id`.
    pub fn unsubscribe_user(&self, user_id: UserId, channel: Channel) {
        let mut inner = self.write();
        for reg in inner.connections.values_mut() {
            if reg.user_id == user_id {
                reg.channels.remove(&channel);
            }
        }
    }

    /// Remove `channel` from every connection. Used after a room is deleted.
    pub fn drop_channel(&self, channel: Channel) {
        let mut inner = self.write();
        for reg in inner.connections.values_mut() {
            reg.channels.remove(&channel);
        }
    }

    /// Deliver `event` to every connection currently subscribed to `channel`.
    /// The subscriber set is snapshotted up front so one consistent set of
    /// connections sees the event. Send failures mean the connection is
    /// already going away and are ignored; cleanup happens on deregister.
    pub fn broadcast(&self, channel: Channel, event: &GatewayEvent) {
        let targets: Vec<mpsc::UnboundedSender<GatewayEvent>> = self
            .read()
            .connections
            .values()
            .filter(|reg| reg.channels.contains(&channel))
            .map(|reg| reg.tx.clone())
            .collect();

        debug!("fanning out {:?} to {} connection(s)", channel, targets.len());
        for tx in targets {
            let _ = tx.send(event.clone());
        }
    }

    /// Number of connections subscribed to `channel`.
    pub fn subscriber_count(&self, channel: Channel) -> usize {
        self.read()
            .connections
            .values()
            .filter(|reg| reg.channels.contains(&channel))
            .count()
    }

    fn read(&self) -> RwLockReadGuard<'_, DispatcherInner> {
        self.inner.read().expect("dispatcher lock poisoned")
    }

    fn write(&self) -> RwLockWriteGuard<'_, DispatcherInner> {
        self.inner.write().expect("dispatcher lock poisoned")
    }
}
