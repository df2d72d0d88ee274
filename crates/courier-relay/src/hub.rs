//! The routing hub.
//!
//! A single task owns all routing state and consumes four event channels
//! plus a shutdown signal. Every invariant the relay promises (at most
//! one endpoint per identifier, atomic eviction plus offline-queue drain,
//! exactly one ack per accepted targeted frame) falls out of that single
//! consumer; nothing else may touch the maps.
//!
//! The hub never awaits an endpoint: all deliveries are `try_send` into
//! the endpoint's bounded outbound queue. A full queue during broadcast
//! evicts the endpoint as slow; during targeted routing it diverts the
//! frame to the offline queue; during an offline drain the frame is
//! discarded.

use std::collections::{HashMap, VecDeque};

use axum::extract::ws::Message;
use courier_proto::{Envelope, RELAY_ID};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const EVENT_QUEUE_LEN: usize = 64;

const STATUS_DELIVERED: &str = "delivered";
const STATUS_QUEUED: &str = "queued";

/// The hub's view of one connected endpoint: an identifier, a connection
/// id distinguishing successive connections for the same identifier, the
/// bounded outbound queue, and the close signal. Signalling close is the
/// hub's only way to tell an endpoint to die; the endpoint's own tasks
/// close the socket.
#[derive(Debug)]
pub struct EndpointHandle {
    pub id: String,
    pub conn_id: u64,
    outbound: mpsc::Sender<Message>,
    close: watch::Sender<bool>,
}

impl EndpointHandle {
    pub fn new(
        id: String,
        conn_id: u64,
        outbound: mpsc::Sender<Message>,
        close: watch::Sender<bool>,
    ) -> Self {
        Self {
            id,
            conn_id,
            outbound,
            close,
        }
    }

    fn try_send(&self, msg: Message) -> bool {
        self.outbound.try_send(msg).is_ok()
    }

    fn signal_close(&self) {
        let _ = self.close.send(true);
    }
}

/// A frame routed at a specific recipient.
#[derive(Debug)]
pub struct Targeted {
    pub to: String,
    pub from: String,
    /// The routed message's id, echoed into the hub's ack.
    pub msg_id: String,
    pub frame: String,
}

/// An endpoint announcing its own teardown. Carries the connection id so
/// a late unregister from an evicted endpoint cannot remove its
/// successor.
#[derive(Debug)]
pub struct Unregister {
    pub conn_id: u64,
    pub id: String,
}

/// Cloneable producer side of the hub's event channels.
#[derive(Debug, Clone)]
pub struct HubHandle {
    register: mpsc::Sender<EndpointHandle>,
    unregister: mpsc::Sender<Unregister>,
    broadcast: mpsc::Sender<String>,
    targeted: mpsc::Sender<Targeted>,
    shutdown: watch::Sender<bool>,
}

impl HubHandle {
    pub async fn register(&self, endpoint: EndpointHandle) {
        let _ = self.register.send(endpoint).await;
    }

    pub async fn unregister(&self, event: Unregister) {
        let _ = self.unregister.send(event).await;
    }

    pub async fn broadcast(&self, frame: String) {
        let _ = self.broadcast.send(frame).await;
    }

    pub async fn targeted(&self, event: Targeted) {
        let _ = self.targeted.send(event).await;
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}

pub struct Hub {
    connected: HashMap<u64, EndpointHandle>,
    by_id: HashMap<String, u64>,
    offline: HashMap<String, VecDeque<String>>,

    register_rx: mpsc::Receiver<EndpointHandle>,
    unregister_rx: mpsc::Receiver<Unregister>,
    broadcast_rx: mpsc::Receiver<String>,
    targeted_rx: mpsc::Receiver<Targeted>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Hub {
    pub fn new() -> (Self, HubHandle) {
        let (register, register_rx) = mpsc::channel(EVENT_QUEUE_LEN);
        let (unregister, unregister_rx) = mpsc::channel(EVENT_QUEUE_LEN);
        let (broadcast, broadcast_rx) = mpsc::channel(EVENT_QUEUE_LEN);
        let (targeted, targeted_rx) = mpsc::channel(EVENT_QUEUE_LEN);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let hub = Self {
            connected: HashMap::new(),
            by_id: HashMap::new(),
            offline: HashMap::new(),
            register_rx,
            unregister_rx,
            broadcast_rx,
            targeted_rx,
            shutdown_rx,
        };
        let handle = HubHandle {
            register,
            unregister,
            broadcast,
            targeted,
            shutdown,
        };
        (hub, handle)
    }

    pub async fn run(mut self) {
        info!("hub started");
        loop {
            tokio::select! {
                Some(endpoint) = self.register_rx.recv() => self.handle_register(endpoint),
                Some(event) = self.unregister_rx.recv() => self.handle_unregister(event),
                Some(frame) = self.broadcast_rx.recv() => self.handle_broadcast(frame),
                Some(event) = self.targeted_rx.recv() => self.handle_targeted(event),
                changed = self.shutdown_rx.changed() => {
                    // a dropped handle counts as shutdown
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        self.handle_shutdown();
                        break;
                    }
                }
                else => break,
            }
        }
        info!("hub stopped");
    }

    pub(crate) fn handle_register(&mut self, endpoint: EndpointHandle) {
        // Latest connection wins: evict any endpoint already holding the id.
        if let Some(old_conn) = self.by_id.remove(&endpoint.id) {
            if let Some(old) = self.connected.remove(&old_conn) {
                info!(id = %endpoint.id, old_conn, new_conn = endpoint.conn_id,
                    "replacing existing endpoint");
                old.signal_close();
            }
        }

        let id = endpoint.id.clone();
        let conn_id = endpoint.conn_id;
        self.by_id.insert(id.clone(), conn_id);
        self.connected.insert(conn_id, endpoint);
        info!(%id, conn_id, "endpoint registered");

        // Drain queued frames FIFO. Frames the fresh queue cannot take are
        // discarded; the connection is already backpressured.
        if let Some(queued) = self.offline.remove(&id) {
            let total = queued.len();
            let endpoint = &self.connected[&conn_id];
            let mut delivered = 0usize;
            for frame in queued {
                if endpoint.try_send(Message::Text(frame)) {
                    delivered += 1;
                } else {
                    warn!(%id, dropped = total - delivered, "endpoint backpressured during drain");
                    break;
                }
            }
            debug!(%id, delivered, total, "drained offline queue");
        }
    }

    pub(crate) fn handle_unregister(&mut self, event: Unregister) {
        let Some(endpoint) = self.connected.remove(&event.conn_id) else {
            // already evicted by a takeover or a slow-broadcast eviction
            return;
        };
        if self.by_id.get(&event.id) == Some(&event.conn_id) {
            self.by_id.remove(&event.id);
        }
        endpoint.signal_close();
        info!(id = %event.id, conn_id = event.conn_id, "endpoint unregistered");
    }

    pub(crate) fn handle_broadcast(&mut self, frame: String) {
        debug!(len = frame.len(), "broadcast");
        let mut slow = Vec::new();
        for (conn_id, endpoint) in &self.connected {
            if !endpoint.try_send(Message::Text(frame.clone())) {
                slow.push(*conn_id);
            }
        }
        for conn_id in slow {
            if let Some(endpoint) = self.connected.remove(&conn_id) {
                warn!(id = %endpoint.id, conn_id, "evicting slow endpoint");
                if self.by_id.get(&endpoint.id) == Some(&conn_id) {
                    self.by_id.remove(&endpoint.id);
                }
                endpoint.signal_close();
            }
        }
    }

    pub(crate) fn handle_targeted(&mut self, event: Targeted) {
        let delivered = match self
            .by_id
            .get(&event.to)
            .and_then(|conn_id| self.connected.get(conn_id))
        {
            Some(endpoint) => {
                if endpoint.try_send(Message::Text(event.frame.clone())) {
                    true
                } else {
                    debug!(to = %event.to, "recipient queue full, queueing offline");
                    self.queue_offline(&event.to, event.frame);
                    false
                }
            }
            None => {
                debug!(to = %event.to, "recipient not connected, queueing offline");
                self.queue_offline(&event.to, event.frame);
                false
            }
        };

        let status = if delivered { STATUS_DELIVERED } else { STATUS_QUEUED };
        self.ack_sender(&event.from, &event.to, &event.msg_id, status);
    }

    fn queue_offline(&mut self, id: &str, frame: String) {
        self.offline.entry(id.to_string()).or_default().push_back(frame);
    }

    /// Nonblocking ack back to the sender; dropped if the sender has gone
    /// away or its queue is full. The `recipient` field names the original
    /// destination of the acknowledged message.
    fn ack_sender(&self, from: &str, to: &str, msg_id: &str, status: &str) {
        let Some(sender) = self
            .by_id
            .get(from)
            .and_then(|conn_id| self.connected.get(conn_id))
        else {
            return;
        };
        let ack = Envelope::ack(RELAY_ID, to, msg_id, status);
        match ack.encode() {
            Ok(text) => {
                let _ = sender.try_send(Message::Text(text));
            }
            Err(e) => warn!("failed to encode ack: {e}"),
        }
    }

    fn handle_shutdown(&mut self) {
        info!(endpoints = self.connected.len(), "hub shutting down");
        for (_, endpoint) in self.connected.drain() {
            endpoint.signal_close();
        }
        self.by_id.clear();
        self.offline.clear();
    }

    #[cfg(test)]
    pub(crate) fn offline_len(&self, id: &str) -> usize {
        self.offline.get(id).map_or(0, VecDeque::len)
    }

    #[cfg(test)]
    pub(crate) fn connected_ids_for_test(&self, id: &str) -> usize {
        self.connected.values().filter(|e| e.id == id).count()
    }
}
