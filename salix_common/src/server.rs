//! Connection handling.
//!
//! The wire transport is kept at arm's length: a peer is a pair of message
//! channels, and [`Coordinator::attach`] spawns the session task that
//! demultiplexes inbound frames. The WebSocket acceptor below only pumps
//! frames between the socket and those channels, which is also what lets
//! tests attach in-process peers without a socket.

use crate::control::Coordinator;
use crate::protocol::{parse_frame, Frame, Response};
use crate::session::Session;
use crate::{SalixError, SessionId};
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// A peer's end of the coordinator: frames in, frames out.
pub struct PeerHandle {
    pub session_id: SessionId,
    pub sender: mpsc::UnboundedSender<String>,
    pub receiver: mpsc::UnboundedReceiver<String>,
}

impl Coordinator {
    /// Wire a new peer into the coordinator. Dropping the sender ends the
    /// session and releases everything it owned.
    pub fn attach(self: &Arc<Self>) -> PeerHandle {
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(SessionId::new(), out_tx));
        self.sessions().insert(session.clone());
        tokio::spawn(session_task(self.clone(), session.clone(), in_rx));
        PeerHandle {
            session_id: session.id(),
            sender: in_tx,
            receiver: out_rx,
        }
    }
}

/// Demultiplexes one peer's inbound traffic until the channel closes.
async fn session_task(
    coordinator: Arc<Coordinator>,
    session: Arc<Session>,
    mut inbound: mpsc::UnboundedReceiver<String>,
) {
    while let Some(text) = inbound.recv().await {
        match parse_frame(&text) {
            Ok(Frame::Request(request)) => {
                // Each command gets its own task so a long run_tree never
                // stalls the read loop (stop_tree must get through).
                let coordinator = coordinator.clone();
                let session = session.clone();
                tokio::spawn(async move {
                    let response = coordinator.handle_request(&session, request).await;
                    session.send_response(&response);
                });
            }
            Ok(Frame::Reply(reply)) => {
                let request_id = reply.request_id;
                if !session.complete(reply) {
                    tracing::debug!(session = %session.id(), "dropping late reply {request_id}");
                }
            }
            Err(e) => session.send_response(&Response::from(&e)),
        }
    }
    coordinator.close_session(&session);
}

/// Accept WebSocket peers forever.
pub async fn serve(coordinator: Arc<Coordinator>, listener: TcpListener) -> Result<(), SalixError> {
    loop {
        let (stream, addr) = listener.accept().await?;
        tokio::spawn(handle_connection(coordinator.clone(), stream, addr));
    }
}

async fn handle_connection(coordinator: Arc<Coordinator>, stream: TcpStream, addr: SocketAddr) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!("websocket handshake with {addr} failed: {e}");
            return;
        }
    };
    let (mut write, mut read) = ws.split();
    let PeerHandle {
        session_id,
        sender,
        mut receiver,
    } = coordinator.attach();
    tracing::info!("peer {addr} connected as session {session_id}");

    let writer = tokio::spawn(async move {
        while let Some(text) = receiver.recv().await {
            if write.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                if sender.send(text.to_string()).is_err() {
                    break;
                }
            }
            Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => {
                    if sender.send(text).is_err() {
                        break;
                    }
                }
                Err(_) => tracing::debug!("peer {addr} sent non-utf8 binary frame"),
            },
            Ok(Message::Close(_)) => break,
            // Ping/pong bookkeeping happens inside tungstenite.
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("peer {addr} read error: {e}");
                break;
            }
        }
    }

    // Ending the inbound channel tears the session down; queued outbound
    // frames for a vanished peer are not worth flushing.
    drop(sender);
    writer.abort();
    tracing::info!("peer {addr} disconnected");
}
