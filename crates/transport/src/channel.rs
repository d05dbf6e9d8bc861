use std::fmt;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use smartchat_storage::UserId;
use snafu::{OptionExt, ResultExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::error::{
    AlreadySubscribedSnafu, ChannelResult, ConnectRefusedSnafu, ConnectTimeoutSnafu,
    ConnectionClosedSnafu, HandshakeClosedSnafu, InvalidEndpointSnafu, NotConnectedSnafu, UnexpectedPacketSnafu,
    WebSocketSnafu,
};
use super::socketio::{ENGINE_IO_PROTOCOL, EnginePacket, OpenHandshake, SocketPacket};
use super::types::{
    ADD_USER_EVENT, InboundMessage, OutboundMessage, RECEIVE_MESSAGE_EVENT, SEND_MESSAGE_EVENT,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, WsMessage>;
type WsSource = SplitStream<WsStream>;

/// Upper bound on the dial plus the Engine.IO and namespace handshakes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

enum Command {
    Emit(String),
    Subscribe {
        sender: mpsc::UnboundedSender<InboundMessage>,
        reply: oneshot::Sender<ChannelResult<u64>>,
    },
    Unsubscribe {
        token: u64,
    },
    Shutdown {
        done: oneshot::Sender<()>,
    },
}

struct Connection {
    endpoint: String,
    commands: mpsc::UnboundedSender<Command>,
    worker: JoinHandle<()>,
}

/// One realtime connection to the relay for the logged-in session.
///
/// The socket is owned by a worker task; this handle only queues commands to it, so
/// `announce` and `send` never wait on the network.
pub struct MessageChannel {
    connection: Option<Connection>,
    connect_timeout: Duration,
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self {
            connection: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl fmt::Debug for MessageChannel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("MessageChannel")
            .field(
                "endpoint",
                &self.connection.as_ref().map(|connection| connection.endpoint.as_str()),
            )
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl MessageChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Opens the connection unless one is already live.
    ///
    /// Fails with `ConnectTimeout` when the relay does not finish the handshake in time.
    pub async fn connect(&mut self, endpoint: &str) -> ChannelResult<()> {
        if let Some(connection) = &self.connection {
            if !connection.worker.is_finished() {
                tracing::debug!(endpoint = %connection.endpoint, "realtime channel already connected");
                return Ok(());
            }
            tracing::info!(endpoint = %connection.endpoint, "previous realtime connection ended; reconnecting");
            self.connection = None;
        }

        let url = socket_url(endpoint)?;
        let Ok(opened) = tokio::time::timeout(self.connect_timeout, open(&url)).await else {
            return ConnectTimeoutSnafu {
                stage: "connect",
                endpoint: url,
                timeout_ms: self.connect_timeout.as_millis() as u64,
            }
            .fail();
        };
        let (write, read, handshake) = opened?;
        tracing::info!(
            endpoint = %url,
            sid = %handshake.sid,
            ping_interval_ms = handshake.ping_interval,
            "realtime channel connected"
        );

        let (commands, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(
            write,
            read,
            receiver,
            handshake.liveness_window(),
        ));
        self.connection = Some(Connection {
            endpoint: url,
            commands,
            worker,
        });
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.connection
            .as_ref()
            .is_some_and(|connection| !connection.worker.is_finished())
    }

    /// Registers the local user with the relay so messages addressed to it are routed here.
    pub fn announce(&self, self_id: &UserId) -> ChannelResult<()> {
        self.emit(
            ADD_USER_EVENT,
            vec![Value::String(self_id.to_string())],
            "announce",
        )
    }

    /// Fire-and-forget; success only means the frame was queued.
    pub fn send(&self, message: &OutboundMessage) -> ChannelResult<()> {
        self.emit(SEND_MESSAGE_EVENT, vec![message.to_payload()], "send")
    }

    /// Registers the single inbound subscriber.
    ///
    /// Fails with `AlreadySubscribed` while another subscription is alive.
    pub async fn subscribe(&self) -> ChannelResult<InboundSubscription> {
        let commands = self.commands("subscribe")?;
        let (sender, receiver) = mpsc::unbounded_channel();
        let (reply, confirmed) = oneshot::channel();
        commands
            .send(Command::Subscribe { sender, reply })
            .ok()
            .context(ConnectionClosedSnafu { stage: "subscribe" })?;
        let token = confirmed
            .await
            .ok()
            .context(ConnectionClosedSnafu { stage: "subscribe" })??;

        Ok(InboundSubscription {
            token,
            receiver,
            commands: commands.clone(),
        })
    }

    /// Closes the connection; a no-op when never connected.
    pub async fn disconnect(&mut self) {
        let Some(connection) = self.connection.take() else {
            return;
        };

        let (done, closed) = oneshot::channel();
        if connection.commands.send(Command::Shutdown { done }).is_ok() {
            let _ = closed.await;
        }
        if let Err(error) = connection.worker.await {
            tracing::warn!(error = %error, "realtime worker ended abnormally");
        }
        tracing::info!(endpoint = %connection.endpoint, "realtime channel disconnected");
    }

    fn emit(&self, event: &str, args: Vec<Value>, stage: &'static str) -> ChannelResult<()> {
        let frame = EnginePacket::Message(SocketPacket::event(event, args)).encode();
        self.commands(stage)?
            .send(Command::Emit(frame))
            .ok()
            .context(ConnectionClosedSnafu { stage })
    }

    fn commands(&self, stage: &'static str) -> ChannelResult<&mpsc::UnboundedSender<Command>> {
        self.connection
            .as_ref()
            .map(|connection| &connection.commands)
            .context(NotConnectedSnafu { stage })
    }
}

impl fmt::Debug for InboundSubscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("InboundSubscription")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

/// Receiving end of the inbound stream. Dropping it frees the subscriber slot.
pub struct InboundSubscription {
    token: u64,
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    commands: mpsc::UnboundedSender<Command>,
}

impl InboundSubscription {
    /// Next delivered message; `None` once the connection is gone.
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.receiver.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for InboundSubscription {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Unsubscribe { token: self.token });
    }
}

/// Maps a relay base URL to its Engine.IO websocket endpoint.
pub fn socket_url(endpoint: &str) -> ChannelResult<String> {
    let trimmed = endpoint.trim().trim_end_matches('/');
    let base = if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if trimmed.starts_with("ws://") || trimmed.starts_with("wss://") {
        trimmed.to_string()
    } else {
        return InvalidEndpointSnafu {
            stage: "socket-url",
            endpoint: endpoint.to_string(),
        }
        .fail();
    };

    Ok(format!(
        "{base}/socket.io/?EIO={ENGINE_IO_PROTOCOL}&transport=websocket"
    ))
}

async fn open(url: &str) -> ChannelResult<(WsSink, WsSource, OpenHandshake)> {
    let (stream, _) = connect_async(url)
        .await
        .context(WebSocketSnafu { stage: "connect" })?;
    let (mut write, mut read) = stream.split();
    let handshake = open_namespace(&mut write, &mut read).await?;
    Ok((write, read, handshake))
}

async fn open_namespace(write: &mut WsSink, read: &mut WsSource) -> ChannelResult<OpenHandshake> {
    let handshake = loop {
        match next_packet(read, "await-open").await? {
            EnginePacket::Open(handshake) => break handshake,
            EnginePacket::Noop => continue,
            other => {
                return UnexpectedPacketSnafu {
                    stage: "await-open",
                    packet: other.encode(),
                }
                .fail();
            }
        }
    };

    write
        .send(WsMessage::Text(
            EnginePacket::Message(SocketPacket::connect()).encode(),
        ))
        .await
        .context(WebSocketSnafu {
            stage: "send-connect",
        })?;

    loop {
        match next_packet(read, "await-connect").await? {
            EnginePacket::Message(SocketPacket::Connect { .. }) => return Ok(handshake),
            EnginePacket::Message(SocketPacket::ConnectError { message, .. }) => {
                return ConnectRefusedSnafu {
                    stage: "await-connect",
                    reason: message,
                }
                .fail();
            }
            EnginePacket::Ping(data) => {
                write
                    .send(WsMessage::Text(EnginePacket::Pong(data).encode()))
                    .await
                    .context(WebSocketSnafu {
                        stage: "handshake-pong",
                    })?;
            }
            EnginePacket::Noop => {}
            other => {
                return UnexpectedPacketSnafu {
                    stage: "await-connect",
                    packet: other.encode(),
                }
                .fail();
            }
        }
    }
}

async fn next_packet(read: &mut WsSource, stage: &'static str) -> ChannelResult<EnginePacket> {
    loop {
        let frame = read
            .next()
            .await
            .context(HandshakeClosedSnafu { stage })?
            .context(WebSocketSnafu { stage })?;

        match frame {
            WsMessage::Text(text) => return EnginePacket::parse(&text),
            WsMessage::Close(_) => return HandshakeClosedSnafu { stage }.fail(),
            _ => continue,
        }
    }
}

async fn run_worker(
    mut write: WsSink,
    mut read: WsSource,
    mut commands: mpsc::UnboundedReceiver<Command>,
    liveness: Duration,
) {
    let mut subscriber: Option<(u64, mpsc::UnboundedSender<InboundMessage>)> = None;
    let mut next_token = 0_u64;
    let mut deadline = Instant::now() + liveness;

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Emit(frame)) => {
                    if let Err(error) = write.send(WsMessage::Text(frame)).await {
                        tracing::warn!(error = %error, "failed to write to realtime channel");
                        break;
                    }
                }
                Some(Command::Subscribe { sender, reply }) => {
                    let occupied = subscriber
                        .as_ref()
                        .is_some_and(|(_, active)| !active.is_closed());
                    if occupied {
                        let _ = reply.send(AlreadySubscribedSnafu { stage: "subscribe" }.fail());
                    } else {
                        next_token += 1;
                        subscriber = Some((next_token, sender));
                        let _ = reply.send(Ok(next_token));
                    }
                }
                Some(Command::Unsubscribe { token }) => {
                    if subscriber.as_ref().is_some_and(|(active, _)| *active == token) {
                        subscriber = None;
                    }
                }
                Some(Command::Shutdown { done }) => {
                    close(&mut write).await;
                    let _ = done.send(());
                    return;
                }
                None => {
                    close(&mut write).await;
                    return;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    deadline = Instant::now() + liveness;
                    match EnginePacket::parse(&text) {
                        Ok(EnginePacket::Ping(data)) => {
                            if let Err(error) = write.send(WsMessage::Text(EnginePacket::Pong(data).encode())).await {
                                tracing::warn!(error = %error, "failed to answer relay ping");
                                break;
                            }
                        }
                        Ok(EnginePacket::Message(SocketPacket::Event { name, args, .. }))
                            if name == RECEIVE_MESSAGE_EVENT =>
                        {
                            deliver(&mut subscriber, &args);
                        }
                        Ok(EnginePacket::Close | EnginePacket::Message(SocketPacket::Disconnect { .. })) => {
                            tracing::info!("relay closed the realtime session");
                            break;
                        }
                        Ok(other) => tracing::debug!(packet = %other.encode(), "ignoring relay packet"),
                        Err(error) => tracing::warn!(error = %error, "discarding malformed relay frame"),
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => {
                    tracing::info!("realtime connection closed by relay");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    tracing::warn!(error = %error, "realtime connection failed");
                    break;
                }
            },
            _ = tokio::time::sleep_until(deadline) => {
                tracing::warn!(window_ms = liveness.as_millis() as u64, "relay heartbeat missed");
                break;
            }
        }
    }
}

fn deliver(
    subscriber: &mut Option<(u64, mpsc::UnboundedSender<InboundMessage>)>,
    args: &[Value],
) {
    let Some(message) = InboundMessage::from_event_args(args) else {
        tracing::warn!("inbound message without text payload");
        return;
    };

    let Some((_, sender)) = subscriber.as_ref() else {
        tracing::debug!("no inbound subscriber; dropping message");
        return;
    };

    if sender.send(message).is_err() {
        tracing::debug!("inbound subscriber went away; dropping message");
        *subscriber = None;
    }
}

async fn close(write: &mut WsSink) {
    let goodbye = EnginePacket::Message(SocketPacket::disconnect()).encode();
    if let Err(error) = write.send(WsMessage::Text(goodbye)).await {
        tracing::debug!(error = %error, "relay already gone while disconnecting");
        return;
    }
    let _ = write.send(WsMessage::Close(None)).await;
}
