//! Worker-side library.
//!
//! A dispatcher owns named boolean callables, registers them with a
//! coordinator over one persistent WebSocket connection and then serves
//! `invoke_func` frames until the coordinator goes away. Each invocation
//! runs on its own task; replies funnel through a single writer so frames
//! never interleave.
//!
//! ```no_run
//! # async fn demo() -> Result<(), salix_dispatcher::DispatcherError> {
//! use salix_dispatcher::Dispatcher;
//!
//! Dispatcher::new("ws://localhost:8765")
//!     .action("greet", || async {
//!         println!("hello!");
//!         true
//!     })
//!     .condition("always_ready", || async { true })
//!     .run()
//!     .await
//! # }
//! ```

use futures_util::{SinkExt, Stream, StreamExt};
use salix_common::protocol::{parse_peer_frame, InvokeReply, PeerFrame, Request};
use salix_common::LeafKind;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

type BoxedCallable =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

struct Leaf {
    kind: LeafKind,
    callable: BoxedCallable,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatcherError {
    #[error("connect to '{uri}' failed: {source}")]
    Connect {
        uri: String,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[error("transport error: {0}")]
    Transport(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("coordinator rejected registration of '{name}': {message}")]
    RegistrationRejected { name: String, message: String },
}

pub struct Dispatcher {
    uri: String,
    leaves: HashMap<String, Leaf>,
}

impl Dispatcher {
    pub fn new(uri: impl Into<String>) -> Self {
        Dispatcher {
            uri: uri.into(),
            leaves: HashMap::new(),
        }
    }

    pub fn action<F, Fut>(self, name: impl Into<String>, callable: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.leaf(name, LeafKind::Action, callable)
    }

    pub fn condition<F, Fut>(self, name: impl Into<String>, callable: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        self.leaf(name, LeafKind::Condition, callable)
    }

    fn leaf<F, Fut>(mut self, name: impl Into<String>, kind: LeafKind, callable: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let callable: BoxedCallable = Arc::new(move || Box::pin(callable()));
        self.leaves.insert(name.into(), Leaf { kind, callable });
        self
    }

    /// Registered names of one kind, sorted.
    pub fn names(&self, kind: LeafKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .leaves
            .iter()
            .filter(|(_, leaf)| leaf.kind == kind)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Connect, register every callable, then serve invocations until the
    /// coordinator closes the connection.
    pub async fn run(self) -> Result<(), DispatcherError> {
        let (ws, _) = tokio_tungstenite::connect_async(&self.uri)
            .await
            .map_err(|source| DispatcherError::Connect {
                uri: self.uri.clone(),
                source,
            })?;
        tracing::info!("connected to {}", self.uri);
        let (mut write, mut read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if write.send(Message::text(text)).await.is_err() {
                    break;
                }
            }
        });

        // Register everything, awaiting one acknowledgement per leaf.
        for (name, leaf) in &self.leaves {
            let request = match leaf.kind {
                LeafKind::Action => Request::RegisterAction { name: name.clone() },
                LeafKind::Condition => Request::RegisterCondition { name: name.clone() },
            };
            let encoded = serde_json::to_string(&request).expect("requests always serialize");
            if out_tx.send(encoded).is_err() {
                break;
            }
            let ack = Self::next_response(&mut read).await?;
            if !ack.is_ok() {
                writer.abort();
                return Err(DispatcherError::RegistrationRejected {
                    name: name.clone(),
                    message: ack.message.unwrap_or_default(),
                });
            }
            tracing::info!("registered {:?} '{name}'", leaf.kind);
        }

        // Serve invocations.
        while let Some(frame) = read.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!("read error: {e}");
                    break;
                }
            };
            let Ok(PeerFrame::Request(Request::InvokeFunc {
                name,
                request_id: Some(request_id),
            })) = parse_peer_frame(&text)
            else {
                tracing::debug!("ignoring frame: {text}");
                continue;
            };
            self.handle_invocation(name, request_id, &out_tx);
        }

        drop(out_tx);
        let _ = writer.await;
        tracing::info!("disconnected from {}", self.uri);
        Ok(())
    }

    /// Answer one `invoke_func` frame. Known callables run on their own
    /// task; an unknown name is answered with an error reply right away.
    fn handle_invocation(
        &self,
        name: String,
        request_id: u64,
        out_tx: &mpsc::UnboundedSender<String>,
    ) {
        match self.leaves.get(&name) {
            Some(leaf) => {
                let callable = leaf.callable.clone();
                let out = out_tx.clone();
                tokio::spawn(async move {
                    let result = callable().await;
                    tracing::debug!("evaluated '{name}' -> {result}");
                    let reply = InvokeReply::ok(request_id, result);
                    let _ = out
                        .send(serde_json::to_string(&reply).expect("replies always serialize"));
                });
            }
            None => {
                let reply =
                    InvokeReply::err(request_id, format!("'{name}' is not registered here"));
                let _ = out_tx
                    .send(serde_json::to_string(&reply).expect("replies always serialize"));
                tracing::warn!("coordinator asked for unknown callable '{name}'");
            }
        }
    }

    async fn next_response<S>(
        read: &mut S,
    ) -> Result<salix_common::Response, DispatcherError>
    where
        S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(frame) = read.next().await {
            match frame? {
                Message::Text(text) => {
                    if let Ok(PeerFrame::Response(response)) = parse_peer_frame(&text) {
                        return Ok(response);
                    }
                    tracing::debug!("ignoring frame while registering: {text}");
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
        Err(DispatcherError::Transport(
            tokio_tungstenite::tungstenite::Error::ConnectionClosed,
        ))
    }
}
