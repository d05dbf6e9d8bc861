use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChannelError {
    #[snafu(display("realtime endpoint '{endpoint}' must use http(s) or ws(s)"))]
    InvalidEndpoint {
        stage: &'static str,
        endpoint: String,
    },
    #[snafu(display("websocket failure on `{stage}`: {source}"))]
    WebSocket {
        stage: &'static str,
        source: tokio_tungstenite::tungstenite::Error,
    },
    #[snafu(display("relay at '{endpoint}' did not complete the handshake within {timeout_ms}ms"))]
    ConnectTimeout {
        stage: &'static str,
        endpoint: String,
        timeout_ms: u64,
    },
    #[snafu(display("relay closed the connection during `{stage}`"))]
    HandshakeClosed { stage: &'static str },
    #[snafu(display("relay sent an unexpected packet during `{stage}`: {packet}"))]
    UnexpectedPacket {
        stage: &'static str,
        packet: String,
    },
    #[snafu(display("relay refused the namespace connection: {reason}"))]
    ConnectRefused {
        stage: &'static str,
        reason: String,
    },
    #[snafu(display("empty socket packet"))]
    EmptyPacket { stage: &'static str },
    #[snafu(display("unknown {layer} packet type in '{raw}'"))]
    UnknownPacketType {
        stage: &'static str,
        layer: &'static str,
        raw: String,
    },
    #[snafu(display("binary socket packets are not supported: '{raw}'"))]
    UnsupportedBinaryPacket { stage: &'static str, raw: String },
    #[snafu(display("socket packet payload is not valid JSON on `{stage}`: {source}"))]
    MalformedPayload {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("realtime channel is not connected"))]
    NotConnected { stage: &'static str },
    #[snafu(display("realtime connection has shut down"))]
    ConnectionClosed { stage: &'static str },
    #[snafu(display("an inbound subscriber is already registered"))]
    AlreadySubscribed { stage: &'static str },
}

pub type ChannelResult<T> = Result<T, ChannelError>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum BackendError {
    #[snafu(display("failed to build backend HTTP client: {source}"))]
    BuildClient {
        stage: &'static str,
        source: reqwest::Error,
    },
    #[snafu(display("request to {route} failed on `{stage}`: {source}"))]
    Request {
        stage: &'static str,
        route: String,
        source: reqwest::Error,
    },
    #[snafu(display("{route} answered with status {status}"))]
    UnexpectedStatus {
        stage: &'static str,
        route: String,
        status: u16,
    },
    #[snafu(display("{route} returned an unreadable body on `{stage}`: {source}"))]
    DecodeBody {
        stage: &'static str,
        route: String,
        source: reqwest::Error,
    },
    #[snafu(display("{route} returned an incomplete body: {details}"))]
    IncompleteBody {
        stage: &'static str,
        route: String,
        details: String,
    },
}

pub type BackendResult<T> = Result<T, BackendError>;
