use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use quad_types::events::GatewayEvent;

/// A named broadcast group. Connections join and leave rooms; every event
/// is delivered to the members of exactly one room (or to all connections
/// for presence).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoomKey {
    /// A channel's chat room.
    Channel(Uuid),
    /// The conversation room for a pair of users. Always constructed via
    /// [`RoomKey::dm`] so the pair is sorted.
    Dm(Uuid, Uuid),
    /// A user's private notification room, auto-joined at connect.
    User(Uuid),
}

impl RoomKey {
    /// Deterministic DM room: `dm(a, b) == dm(b, a)`.
    pub fn dm(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Self::Dm(a, b)
        } else {
            Self::Dm(b, a)
        }
    }
}

/// Authoritative registry of connections, room membership, and presence.
/// Single-process by design: this process owns all realtime state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Live connections and their outbound queues.
    conns: RwLock<HashMap<Uuid, mpsc::UnboundedSender<GatewayEvent>>>,

    /// room -> member connections.
    rooms: RwLock<HashMap<RoomKey, HashSet<Uuid>>>,

    /// connection -> rooms it belongs to, for disconnect cleanup.
    memberships: RwLock<HashMap<Uuid, HashSet<RoomKey>>>,

    /// user -> (alias, live connection count). Presence events fire only on
    /// the 0->1 and 1->0 transitions.
    online: RwLock<HashMap<Uuid, (String, usize)>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                conns: RwLock::new(HashMap::new()),
                rooms: RwLock::new(HashMap::new()),
                memberships: RwLock::new(HashMap::new()),
                online: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Register a new connection. Returns its id and the outbound receiver.
    pub async fn register(&self) -> (Uuid, mpsc::UnboundedReceiver<GatewayEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.conns.write().await.insert(conn_id, tx);
        self.inner
            .memberships
            .write()
            .await
            .insert(conn_id, HashSet::new());
        (conn_id, rx)
    }

    /// Drop a connection and scrub it from every room. Runs on every
    /// disconnect, clean or not — the rooms table must never reference a
    /// dead connection.
    pub async fn unregister(&self, conn_id: Uuid) {
        self.inner.conns.write().await.remove(&conn_id);

        let joined = self
            .inner
            .memberships
            .write()
            .await
            .remove(&conn_id)
            .unwrap_or_default();

        let mut rooms = self.inner.rooms.write().await;
        for key in joined {
            if let Some(members) = rooms.get_mut(&key) {
                members.remove(&conn_id);
                if members.is_empty() {
                    rooms.remove(&key);
                }
            }
        }
    }

    pub async fn join(&self, conn_id: Uuid, room: RoomKey) {
        self.inner
            .rooms
            .write()
            .await
            .entry(room)
            .or_default()
            .insert(conn_id);
        if let Some(m) = self.inner.memberships.write().await.get_mut(&conn_id) {
            m.insert(room);
        }
    }

    pub async fn leave(&self, conn_id: Uuid, room: RoomKey) {
        let mut rooms = self.inner.rooms.write().await;
        if let Some(members) = rooms.get_mut(&room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(&room);
            }
        }
        drop(rooms);

        if let Some(m) = self.inner.memberships.write().await.get_mut(&conn_id) {
            m.remove(&room);
        }
    }

    /// Deliver an event to every member of a room, optionally excluding one
    /// connection (the sender, for typing and join notices). Membership is
    /// snapshotted under the read lock before sending, so a concurrent
    /// leave never tears the iteration.
    pub async fn send_to_room(&self, room: RoomKey, event: GatewayEvent, exclude: Option<Uuid>) {
        let members: Vec<Uuid> = {
            let rooms = self.inner.rooms.read().await;
            match rooms.get(&room) {
                Some(members) => members
                    .iter()
                    .copied()
                    .filter(|id| Some(*id) != exclude)
                    .collect(),
                None => return,
            }
        };

        let conns = self.inner.conns.read().await;
        for conn_id in members {
            if let Some(tx) = conns.get(&conn_id) {
                // A full/closed queue means the connection is going away;
                // its cleanup will scrub the room entry.
                let _ = tx.send(event.clone());
            }
        }
    }

    /// Deliver an event to every live connection (presence updates).
    pub async fn broadcast_all(&self, event: GatewayEvent) {
        let conns = self.inner.conns.read().await;
        for tx in conns.values() {
            let _ = tx.send(event.clone());
        }
    }

    /// Deliver an event to one connection only (acks, errors).
    pub async fn send_to_conn(&self, conn_id: Uuid, event: GatewayEvent) {
        let conns = self.inner.conns.read().await;
        if let Some(tx) = conns.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Count a connection for this user. Returns true when this is the
    /// user's first live connection (presence should broadcast).
    pub async fn user_connected(&self, user_id: Uuid, alias: &str) -> bool {
        let mut online = self.inner.online.write().await;
        let entry = online.entry(user_id).or_insert((alias.to_string(), 0));
        entry.1 += 1;
        entry.1 == 1
    }

    /// Drop a connection for this user. Returns true when it was the last
    /// one (presence-offline should broadcast).
    pub async fn user_disconnected(&self, user_id: Uuid) -> bool {
        let mut online = self.inner.online.write().await;
        match online.get_mut(&user_id) {
            Some(entry) => {
                entry.1 = entry.1.saturating_sub(1);
                if entry.1 == 0 {
                    online.remove(&user_id);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    pub async fn is_online(&self, user_id: Uuid) -> bool {
        self.inner.online.read().await.contains_key(&user_id)
    }

    /// Snapshot of who is online, for replay to a fresh connection.
    pub async fn online_users(&self) -> Vec<(Uuid, String)> {
        self.inner
            .online
            .read()
            .await
            .iter()
            .map(|(id, (alias, _))| (*id, alias.clone()))
            .collect()
    }

    /// Join every connection in `room` into `target`. Used to pull both
    /// ends of a DM into the conversation room when a message flows.
    pub async fn merge_room(&self, room: RoomKey, target: RoomKey) {
        let members: Vec<Uuid> = {
            let rooms = self.inner.rooms.read().await;
            rooms
                .get(&room)
                .map(|m| m.iter().copied().collect())
                .unwrap_or_default()
        };
        for conn_id in members {
            self.join(conn_id, target).await;
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quad_types::events::GatewayEvent;

    fn uuid(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn dm_room_is_order_independent() {
        let a = uuid(1);
        let b = uuid(2);
        assert_eq!(RoomKey::dm(a, b), RoomKey::dm(b, a));
        assert_ne!(RoomKey::dm(a, b), RoomKey::dm(a, uuid(3)));
    }

    fn presence_event() -> GatewayEvent {
        GatewayEvent::UserOnline {
            user_id: uuid(9),
            alias: "GentleWren7".into(),
        }
    }

    #[tokio::test]
    async fn room_members_receive_broadcasts() {
        let d = Dispatcher::new();
        let (c1, mut rx1) = d.register().await;
        let (c2, mut rx2) = d.register().await;
        let room = RoomKey::Channel(uuid(7));

        d.join(c1, room).await;
        d.join(c2, room).await;
        d.send_to_room(room, presence_event(), None).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn exclude_skips_the_sender() {
        let d = Dispatcher::new();
        let (c1, mut rx1) = d.register().await;
        let (c2, mut rx2) = d.register().await;
        let room = RoomKey::Channel(uuid(7));

        d.join(c1, room).await;
        d.join(c2, room).await;
        d.send_to_room(room, presence_event(), Some(c1)).await;

        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn leaving_stops_delivery() {
        let d = Dispatcher::new();
        let (c1, mut rx1) = d.register().await;
        let room = RoomKey::Channel(uuid(7));

        d.join(c1, room).await;
        d.leave(c1, room).await;
        d.send_to_room(room, presence_event(), None).await;

        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn unregister_scrubs_all_rooms() {
        let d = Dispatcher::new();
        let (c1, mut rx1) = d.register().await;
        d.join(c1, RoomKey::Channel(uuid(1))).await;
        d.join(c1, RoomKey::User(uuid(2))).await;

        d.unregister(c1).await;

        d.send_to_room(RoomKey::Channel(uuid(1)), presence_event(), None)
            .await;
        d.send_to_room(RoomKey::User(uuid(2)), presence_event(), None)
            .await;
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn presence_fires_only_on_transitions() {
        let d = Dispatcher::new();
        let user = uuid(42);

        assert!(d.user_connected(user, "TwinTanuki1").await);
        assert!(!d.user_connected(user, "TwinTanuki1").await); // second tab

        assert!(!d.user_disconnected(user).await);
        assert!(d.user_disconnected(user).await);
        assert!(!d.is_online(user).await);
    }
}
