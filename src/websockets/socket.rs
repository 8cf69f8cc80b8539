use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket};
use futures::stream::StreamExt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::messages::WebSocketMessage;
use crate::room::{RoomEvent, RoomId, Subscription};
use crate::shared::UserId;

/// Simple WebSocket abstraction - all we care about is send/receive
#[async_trait]
pub trait SocketWrapper: Send {
    /// Send a text message to the client
    async fn send_message(&mut self, message: String) -> Result<(), SocketError>;

    /// Receive the next message from the client (None if connection closed)
    async fn receive_message(&mut self) -> Result<Option<String>, SocketError>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), SocketError>;
}

/// Handler for incoming WebSocket messages
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message from the client. A returned frame is sent
    /// back to that client only.
    async fn handle_message(
        &self,
        user_id: UserId,
        room_id: &RoomId,
        message: String,
    ) -> Option<WebSocketMessage>;
}

#[derive(Debug)]
pub enum SocketError {
    ConnectionClosed,
    SendFailed(String),
    ReceiveFailed(String),
}

/// Direct implementation on axum's WebSocket
#[async_trait]
impl SocketWrapper for WebSocket {
    async fn send_message(&mut self, message: String) -> Result<(), SocketError> {
        self.send(Message::Text(message))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }

    async fn receive_message(&mut self) -> Result<Option<String>, SocketError> {
        loop {
            match self.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(_)) => continue, // Ignore binary/ping/pong
                Some(Err(e)) => return Err(SocketError::ReceiveFailed(e.to_string())),
                None => return Err(SocketError::ConnectionClosed),
            }
        }
    }

    async fn close(&mut self) -> Result<(), SocketError> {
        self.send(Message::Close(None))
            .await
            .map_err(|e| SocketError::SendFailed(e.to_string()))
    }
}

/// Connection bridges one room subscription to one client socket.
/// Room traffic is pushed to the client; client frames go to the message handler.
pub struct Connection {
    pub user_id: UserId,
    pub room_id: RoomId,
    socket: Box<dyn SocketWrapper>,
    subscription: Subscription,
    message_handler: Arc<dyn MessageHandler>,
}

impl Connection {
    pub fn new(
        user_id: UserId,
        socket: Box<dyn SocketWrapper>,
        subscription: Subscription,
        message_handler: Arc<dyn MessageHandler>,
    ) -> Self {
        Self {
            user_id,
            room_id: subscription.room_id().clone(),
            socket,
            subscription,
            message_handler,
        }
    }

    async fn send(&mut self, message: WebSocketMessage) -> Result<(), SocketError> {
        match message.to_json() {
            Ok(json) => self.socket.send_message(json).await,
            Err(e) => {
                warn!(room_id = %self.room_id, error = %e, "Failed to encode WebSocket frame");
                Ok(())
            }
        }
    }

    /// Run the connection - handles both sending and receiving until either
    /// side ends. Dropping the subscription on return deregisters it.
    pub async fn run(mut self) -> Result<(), SocketError> {
        loop {
            tokio::select! {
                // Room traffic (from the room to the client)
                event = self.subscription.next() => {
                    match event {
                        Some(RoomEvent::Message(message)) => {
                            self.send(WebSocketMessage::chat(&message)).await?
                        }
                        Some(RoomEvent::Closed(reason)) => {
                            debug!(
                                room_id = %self.room_id,
                                user_id = self.user_id,
                                reason = reason.as_str(),
                                "Room stream closed, closing socket"
                            );
                            self.send(WebSocketMessage::closed(reason)).await?;
                            break;
                        }
                        None => break,
                    }
                }

                // Client frames (from the client to the room)
                msg = self.socket.receive_message() => {
                    match msg {
                        Ok(Some(message)) => {
                            let reply = self
                                .message_handler
                                .handle_message(self.user_id, &self.room_id, message)
                                .await;
                            if let Some(reply) = reply {
                                self.send(reply).await?;
                            }
                        }
                        Ok(None) => break, // Client disconnected
                        Err(SocketError::ConnectionClosed) => return Ok(()),
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        // Clean disconnect
        let _ = self.socket.close().await;
        Ok(())
    }
}
