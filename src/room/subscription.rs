use futures::Stream;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};

use super::actor::RoomCommand;
use super::models::{CloseReason, ConnectionId, Message, RoomEvent, RoomId};

/// Actor-side half of a subscription
pub(crate) struct Subscriber {
    pub(crate) messages: mpsc::Sender<Message>,
    pub(crate) close: oneshot::Sender<CloseReason>,
}

impl Subscriber {
    /// Ends the stream. Messages already buffered are still delivered first.
    pub(crate) fn close(self, reason: CloseReason) {
        let _ = self.close.send(reason);
    }
}

/// A live feed of one room's messages for one connection.
///
/// Yields `RoomEvent::Message` in publish order, then exactly one
/// `RoomEvent::Closed` when the room is deleted, the subscriber overflows or
/// the server shuts down. Dropping it deregisters the connection.
pub struct Subscription {
    room_id: RoomId,
    connection_id: ConnectionId,
    token: u64,
    messages: mpsc::Receiver<Message>,
    close: oneshot::Receiver<CloseReason>,
    commands: mpsc::UnboundedSender<RoomCommand>,
    finished: bool,
}

impl Subscription {
    pub(crate) fn new(
        room_id: RoomId,
        connection_id: ConnectionId,
        token: u64,
        messages: mpsc::Receiver<Message>,
        close: oneshot::Receiver<CloseReason>,
        commands: mpsc::UnboundedSender<RoomCommand>,
    ) -> Self {
        Self {
            room_id,
            connection_id,
            token,
            messages,
            close,
            commands,
            finished: false,
        }
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }
}

impl Stream for Subscription {
    type Item = RoomEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        match this.messages.poll_recv(cx) {
            Poll::Ready(Some(message)) => Poll::Ready(Some(RoomEvent::Message(message))),
            Poll::Ready(None) => match Pin::new(&mut this.close).poll(cx) {
                Poll::Ready(reason) => {
                    this.finished = true;
                    // A vanished actor without a reason only happens when it is torn down
                    let reason = reason.unwrap_or(CloseReason::Shutdown);
                    Poll::Ready(Some(RoomEvent::Closed(reason)))
                }
                Poll::Pending => Poll::Pending,
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.commands.send(RoomCommand::Unsubscribe {
                connection_id: self.connection_id.clone(),
                token: self.token,
            });
        }
    }
}
