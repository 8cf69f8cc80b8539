//! Per-room actor.
//!
//! Every room is owned by exactly one task. Publish, subscribe, unsubscribe,
//! history reads and teardown are messages on the room's mailbox, so they are
//! applied one at a time and every subscriber observes publish order. Rooms do
//! not share any lock with each other.
//!
//! Bus I/O never runs on the actor itself. Relays go through a bounded queue to
//! a separate task, and a lost bus subscription is re-established in the
//! background with backoff while the room keeps delivering locally.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::models::{BusEnvelope, CloseReason, ConnectionId, Message, RoomId};
use super::retention::MessageLog;
use super::subscription::{Subscriber, Subscription};
use crate::bus::{BusStream, MessageBus};
use crate::shared::{AppError, UserId};

/// How many message ids a room remembers for bus echo suppression
const SEEN_IDS_CAPACITY: usize = 4096;

/// Relayed payloads waiting for the bus before new ones are dropped
const RELAY_QUEUE_CAPACITY: usize = 1024;

/// First and longest wait between bus resubscribe attempts
const BUS_RETRY_INITIAL: Duration = Duration::from_secs(1);
const BUS_RETRY_MAX: Duration = Duration::from_secs(30);

type Reconnect = BoxFuture<'static, Option<BusStream>>;

/// Subscribes to the room's topic, giving up after `timeout`.
/// Returns None when the bus is unreachable or stalled.
pub(crate) async fn subscribe_topic(
    bus: &dyn MessageBus,
    room_id: &RoomId,
    timeout: Duration,
) -> Option<BusStream> {
    match tokio::time::timeout(timeout, bus.subscribe(&room_id.topic())).await {
        Ok(Ok(stream)) => Some(stream),
        Ok(Err(e)) => {
            warn!(room_id = %room_id, error = %e, "Bus subscribe failed");
            None
        }
        Err(_) => {
            warn!(
                room_id = %room_id,
                timeout_ms = timeout.as_millis() as u64,
                "Bus subscribe timed out"
            );
            None
        }
    }
}

pub(crate) enum RoomCommand {
    Publish {
        sender_id: UserId,
        body: String,
        respond_to: oneshot::Sender<Message>,
    },
    Subscribe {
        connection_id: ConnectionId,
        subscriber: Subscriber,
        respond_to: oneshot::Sender<u64>,
    },
    Unsubscribe {
        connection_id: ConnectionId,
        token: u64,
    },
    History {
        respond_to: oneshot::Sender<Vec<Message>>,
    },
    SubscriberCount {
        respond_to: oneshot::Sender<usize>,
    },
    Close {
        reason: CloseReason,
        respond_to: oneshot::Sender<()>,
    },
}

/// Handle to a running room actor
#[derive(Clone)]
pub(crate) struct RoomHandle {
    room_id: RoomId,
    commands: mpsc::UnboundedSender<RoomCommand>,
    subscriber_buffer: usize,
}

impl RoomHandle {
    fn gone(&self) -> AppError {
        AppError::NotFound(format!("Room {} not found", self.room_id))
    }

    fn send(&self, command: RoomCommand) -> Result<(), AppError> {
        self.commands.send(command).map_err(|_| self.gone())
    }

    pub(crate) async fn publish(&self, sender_id: UserId, body: String) -> Result<Message, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomCommand::Publish {
            sender_id,
            body,
            respond_to: tx,
        })?;

        rx.await.map_err(|_| self.gone())
    }

    pub(crate) async fn subscribe(
        &self,
        connection_id: ConnectionId,
    ) -> Result<Subscription, AppError> {
        let (messages_tx, messages_rx) = mpsc::channel(self.subscriber_buffer.max(1));
        let (close_tx, close_rx) = oneshot::channel();
        let (tx, rx) = oneshot::channel();

        self.send(RoomCommand::Subscribe {
            connection_id: connection_id.clone(),
            subscriber: Subscriber {
                messages: messages_tx,
                close: close_tx,
            },
            respond_to: tx,
        })?;
        let token = rx.await.map_err(|_| self.gone())?;

        Ok(Subscription::new(
            self.room_id.clone(),
            connection_id,
            token,
            messages_rx,
            close_rx,
            self.commands.clone(),
        ))
    }

    pub(crate) async fn history(&self) -> Result<Vec<Message>, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomCommand::History { respond_to: tx })?;
        rx.await.map_err(|_| self.gone())
    }

    pub(crate) async fn subscriber_count(&self) -> Result<usize, AppError> {
        let (tx, rx) = oneshot::channel();
        self.send(RoomCommand::SubscriberCount { respond_to: tx })?;
        rx.await.map_err(|_| self.gone())
    }

    /// Closes every subscriber with `reason` and stops the actor.
    /// Resolves once the actor has released its subscribers.
    pub(crate) async fn close(&self, reason: CloseReason) {
        let (tx, rx) = oneshot::channel();
        if self
            .send(RoomCommand::Close {
                reason,
                respond_to: tx,
            })
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}

/// Bounded memory of recently seen message ids
struct SeenIds {
    order: VecDeque<Uuid>,
    ids: HashSet<Uuid>,
}

impl SeenIds {
    fn new() -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
        }
    }

    /// Returns false if the id was already seen
    fn insert(&mut self, id: Uuid) -> bool {
        if !self.ids.insert(id) {
            return false;
        }
        self.order.push_back(id);
        if self.order.len() > SEEN_IDS_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        true
    }
}

pub(crate) struct RoomActor {
    room_id: RoomId,
    instance_id: Uuid,
    commands: mpsc::UnboundedReceiver<RoomCommand>,
    subscribers: HashMap<ConnectionId, (u64, Subscriber)>,
    next_token: u64,
    log: Box<dyn MessageLog>,
    seen: SeenIds,
    relay: Option<mpsc::Sender<String>>,
    bus: Arc<dyn MessageBus>,
    bus_timeout: Duration,
}

impl RoomActor {
    /// Starts the actor for `room_id`.
    ///
    /// `inbound` is the room's already-established bus subscription, or `None`
    /// when the bus was unreachable; the actor then keeps retrying in the
    /// background and delivers locally until it succeeds.
    pub(crate) fn spawn(
        room_id: RoomId,
        instance_id: Uuid,
        log: Box<dyn MessageLog>,
        bus: Arc<dyn MessageBus>,
        bus_timeout: Duration,
        inbound: Option<BusStream>,
        subscriber_buffer: usize,
    ) -> (RoomHandle, JoinHandle<()>) {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (relay_tx, relay_rx) = mpsc::channel(RELAY_QUEUE_CAPACITY);

        tokio::spawn(relay_loop(
            room_id.clone(),
            Arc::clone(&bus),
            bus_timeout,
            relay_rx,
        ));

        let actor = Self {
            room_id: room_id.clone(),
            instance_id,
            commands: commands_rx,
            subscribers: HashMap::new(),
            next_token: 0,
            log,
            seen: SeenIds::new(),
            relay: Some(relay_tx),
            bus,
            bus_timeout,
        };

        let task = tokio::spawn(actor.run(inbound));

        let handle = RoomHandle {
            room_id,
            commands: commands_tx,
            subscriber_buffer,
        };

        (handle, task)
    }

    #[instrument(skip_all, name = "room.actor", fields(room_id = %self.room_id))]
    async fn run(mut self, mut inbound: Option<BusStream>) {
        debug!(room_id = %self.room_id, "Room actor started");

        let mut retry_delay = BUS_RETRY_INITIAL;
        let mut reconnect = match inbound {
            Some(_) => None,
            None => Some(self.resubscribe(retry_delay)),
        };

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command) {
                                break;
                            }
                        }
                        None => {
                            // Every handle is gone without an explicit close
                            self.close_all(CloseReason::Shutdown);
                            break;
                        }
                    }
                }

                payload = next_payload(&mut inbound) => {
                    match payload {
                        Some(payload) => self.handle_remote(&payload),
                        None => {
                            warn!(
                                room_id = %self.room_id,
                                "Bus subscription ended, delivering locally until it is restored"
                            );
                            inbound = None;
                            retry_delay = BUS_RETRY_INITIAL;
                            reconnect = Some(self.resubscribe(retry_delay));
                        }
                    }
                }

                attempt = next_reconnect(&mut reconnect) => {
                    match attempt {
                        Some(stream) => {
                            info!(room_id = %self.room_id, "Bus subscription restored");
                            inbound = Some(stream);
                            retry_delay = BUS_RETRY_INITIAL;
                        }
                        None => {
                            retry_delay = (retry_delay * 2).min(BUS_RETRY_MAX);
                            debug!(
                                room_id = %self.room_id,
                                retry_ms = retry_delay.as_millis() as u64,
                                "Bus still unavailable, retrying later"
                            );
                            reconnect = Some(self.resubscribe(retry_delay));
                        }
                    }
                }
            }
        }

        // Dropping the bus stream unsubscribes the topic; dropping the relay
        // sender lets the relay task flush what is queued and exit.
        drop(reconnect);
        drop(inbound);
        self.relay = None;

        debug!(room_id = %self.room_id, "Room actor stopped");
    }

    /// Waits `delay`, then tries the room's topic once
    fn resubscribe(&self, delay: Duration) -> Reconnect {
        let bus = Arc::clone(&self.bus);
        let room_id = self.room_id.clone();
        let timeout = self.bus_timeout;
        async move {
            tokio::time::sleep(delay).await;
            subscribe_topic(bus.as_ref(), &room_id, timeout).await
        }
        .boxed()
    }

    /// Applies one command; returns false once the room has been closed
    fn handle_command(&mut self, command: RoomCommand) -> bool {
        match command {
            RoomCommand::Publish {
                sender_id,
                body,
                respond_to,
            } => {
                let message = Message::new(self.room_id.clone(), sender_id, body);
                self.seen.insert(message.id);
                self.record(message.clone());
                self.relay(&message);
                let _ = respond_to.send(message);
            }
            RoomCommand::Subscribe {
                connection_id,
                subscriber,
                respond_to,
            } => {
                self.next_token += 1;
                let token = self.next_token;
                if let Some((_, previous)) = self
                    .subscribers
                    .insert(connection_id.clone(), (token, subscriber))
                {
                    debug!(
                        room_id = %self.room_id,
                        connection_id = %connection_id,
                        "Connection subscribed again, closing previous stream"
                    );
                    previous.close(CloseReason::Replaced);
                }
                debug!(
                    room_id = %self.room_id,
                    connection_id = %connection_id,
                    subscribers = self.subscribers.len(),
                    "Subscriber attached"
                );
                let _ = respond_to.send(token);
            }
            RoomCommand::Unsubscribe {
                connection_id,
                token,
            } => {
                let current = self
                    .subscribers
                    .get(&connection_id)
                    .is_some_and(|(current, _)| *current == token);
                if current {
                    self.subscribers.remove(&connection_id);
                    debug!(
                        room_id = %self.room_id,
                        connection_id = %connection_id,
                        subscribers = self.subscribers.len(),
                        "Subscriber detached"
                    );
                }
            }
            RoomCommand::History { respond_to } => {
                let _ = respond_to.send(self.log.recent());
            }
            RoomCommand::SubscriberCount { respond_to } => {
                let _ = respond_to.send(self.subscribers.len());
            }
            RoomCommand::Close { reason, respond_to } => {
                self.close_all(reason);
                let _ = respond_to.send(());
                return false;
            }
        }
        true
    }

    /// Appends to the log and delivers to every local subscriber
    fn record(&mut self, message: Message) {
        self.fan_out(&message);
        self.log.append(message);
    }

    fn fan_out(&mut self, message: &Message) {
        let mut overflowed = Vec::new();
        let mut disconnected = Vec::new();

        for (connection_id, (_, subscriber)) in &self.subscribers {
            match subscriber.messages.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => overflowed.push(connection_id.clone()),
                Err(TrySendError::Closed(_)) => disconnected.push(connection_id.clone()),
            }
        }

        for connection_id in overflowed {
            if let Some((_, subscriber)) = self.subscribers.remove(&connection_id) {
                warn!(
                    room_id = %self.room_id,
                    connection_id = %connection_id,
                    "Subscriber buffer overflowed, dropping subscriber"
                );
                subscriber.close(CloseReason::Overflow);
            }
        }

        for connection_id in disconnected {
            self.subscribers.remove(&connection_id);
        }
    }

    fn relay(&self, message: &Message) {
        let Some(relay) = &self.relay else {
            return;
        };

        let envelope = BusEnvelope {
            origin: self.instance_id,
            message: message.clone(),
        };
        match serde_json::to_string(&envelope) {
            Ok(payload) => match relay.try_send(payload) {
                Ok(()) | Err(TrySendError::Closed(_)) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        room_id = %self.room_id,
                        message_id = %message.id,
                        "Bus relay backlog full, message delivered locally only"
                    );
                }
            },
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "Failed to encode bus envelope");
            }
        }
    }

    /// Handles a payload that arrived from the bus
    fn handle_remote(&mut self, payload: &str) {
        let envelope: BusEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "Ignoring malformed bus payload");
                return;
            }
        };

        if envelope.origin == self.instance_id || envelope.message.room_id != self.room_id {
            return;
        }
        if !self.seen.insert(envelope.message.id) {
            debug!(
                room_id = %self.room_id,
                message_id = %envelope.message.id,
                "Duplicate bus message ignored"
            );
            return;
        }

        self.record(envelope.message);
    }

    fn close_all(&mut self, reason: CloseReason) {
        let count = self.subscribers.len();
        for (_, (_, subscriber)) in self.subscribers.drain() {
            subscriber.close(reason);
        }
        self.log.clear();

        info!(
            room_id = %self.room_id,
            subscribers_closed = count,
            reason = reason.as_str(),
            "Room closed"
        );
    }
}

async fn next_payload(inbound: &mut Option<BusStream>) -> Option<String> {
    match inbound {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

/// Resolves with the outcome of the pending resubscribe attempt, if any
async fn next_reconnect(reconnect: &mut Option<Reconnect>) -> Option<BusStream> {
    match reconnect.as_mut() {
        Some(attempt) => {
            let stream = attempt.await;
            *reconnect = None;
            stream
        }
        None => std::future::pending().await,
    }
}

/// Publishes queued payloads to the room's topic, in order.
/// Failures and stalls degrade the room to local-only delivery for that message.
async fn relay_loop(
    room_id: RoomId,
    bus: Arc<dyn MessageBus>,
    timeout: Duration,
    mut payloads: mpsc::Receiver<String>,
) {
    let topic = room_id.topic();
    while let Some(payload) = payloads.recv().await {
        match tokio::time::timeout(timeout, bus.publish(&topic, payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(
                    room_id = %room_id,
                    error = %e,
                    "Bus relay failed, message delivered locally only"
                );
            }
            Err(_) => {
                warn!(
                    room_id = %room_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Bus relay timed out, message delivered locally only"
                );
            }
        }
    }
}
