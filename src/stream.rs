// Streaming timeline listener.
//
// `StreamListener` owns one WebSocket connection at a time to the
// streaming endpoint. It sends the `connect` handshake, answers `ping`
// frames, turns `message` frames into validated `Post`s and pushes
// `StreamEvent`s to the consumer in arrival order.
//
// When the connection closes for any reason a `Close` event is emitted
// and, after `RECONNECT_DELAY`, the listener connects again with the
// same stream name and token. Reconnecting replaces the inner connection;
// the task and the consumer's `StreamHandle` stay the same. Only
// `StreamHandle::disconnect` (or dropping the handle) ends the loop.
//
// Events go through an unbounded channel, so the socket is always read
// and a slow consumer never holds up ping replies or a disconnect.

use std::borrow::Cow;
use std::time::Duration;

use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Interval;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::StreamProtocolError;
use crate::models::{Model, Post};

/// Fixed delay between a close and the next connection attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Period of the liveness timer.
pub const LIVENESS_INTERVAL: Duration = Duration::from_secs(10);

/// Close code used when a frame is rejected.
const PROTOCOL_ERROR_CODE: u16 = 1002;
/// Close code reported when the socket ended without a close frame.
const ABNORMAL_CLOSE_CODE: u16 = 1006;
/// Close code reported for a close frame without a status.
const NO_STATUS_CODE: u16 = 1005;

/// Control frame payload limit minus the two status bytes.
const MAX_CLOSE_REASON: usize = 123;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// What the consumer sees.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The server accepted the handshake.
    Connect,
    /// A new post arrived.
    Message(Box<Post>),
    /// The connection closed. Fires before the automatic reconnect.
    Close { code: u16, reason: String },
}

/// How to treat a `message` frame whose content is not a valid post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InvalidMessagePolicy {
    /// Close the connection (and reconnect).
    #[default]
    Close,
    /// Log the frame and keep the connection.
    Skip,
}

#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub invalid_message: InvalidMessagePolicy,
    pub reconnect_delay: Duration,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            invalid_message: InvalidMessagePolicy::default(),
            reconnect_delay: RECONNECT_DELAY,
        }
    }
}

/// Request to close the stream for good.
#[derive(Debug, Clone)]
pub struct Disconnect {
    pub code: u16,
    pub reason: String,
}

impl Default for Disconnect {
    fn default() -> Self {
        Self {
            code: 1000,
            reason: String::new(),
        }
    }
}

/// Frames the client sends.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum OutboundFrame<'a> {
    Connect { stream: &'a str, token: &'a str },
    Ping,
}

impl OutboundFrame<'_> {
    fn to_message(&self) -> Result<Message, StreamProtocolError> {
        serde_json::to_string(self)
            .map(Message::Text)
            .map_err(StreamProtocolError::Malformed)
    }
}

#[derive(Deserialize)]
struct FrameHeader {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Deserialize)]
struct MessageFrame {
    content: Post,
}

/// Result of handling one inbound text frame.
#[derive(Debug, PartialEq)]
enum FrameAction {
    Emit(StreamEvent),
    ReplyPing,
    Ignore,
}

/// Decide what an inbound text frame means.
fn handle_frame(text: &str, policy: InvalidMessagePolicy) -> Result<FrameAction, StreamProtocolError> {
    let header: FrameHeader = serde_json::from_str(text).map_err(StreamProtocolError::Malformed)?;
    match header.kind.as_str() {
        "success" => Ok(FrameAction::Emit(StreamEvent::Connect)),
        "ping" => Ok(FrameAction::ReplyPing),
        "message" => match parse_message_frame(text) {
            Ok(post) => Ok(FrameAction::Emit(StreamEvent::Message(Box::new(post)))),
            Err(e) if policy == InvalidMessagePolicy::Skip => {
                tracing::warn!(error = %e, raw = %text, "Skipping invalid message frame");
                Ok(FrameAction::Ignore)
            }
            Err(e) => Err(e),
        },
        "error" => Err(StreamProtocolError::Server(text.to_string())),
        other => Err(StreamProtocolError::UnknownType(other.to_string())),
    }
}

fn parse_message_frame(text: &str) -> Result<Post, StreamProtocolError> {
    let frame: MessageFrame = serde_json::from_str(text)
        .map_err(|e| StreamProtocolError::InvalidPost(e.into()))?;
    frame
        .content
        .validate()
        .map_err(StreamProtocolError::InvalidPost)?;
    Ok(frame.content)
}

/// How a single connection ended.
struct Closed {
    code: u16,
    reason: String,
    /// The consumer asked to stop, or went away.
    stopped: bool,
}

impl Closed {
    fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: ABNORMAL_CLOSE_CODE,
            reason: reason.into(),
            stopped: false,
        }
    }
}

/// Connection settings for one named stream.
pub struct StreamListener {
    url: Url,
    stream: String,
    token: String,
    options: StreamOptions,
}

/// Consumer side of a running listener.
pub struct StreamHandle {
    events: mpsc::UnboundedReceiver<StreamEvent>,
    control: mpsc::UnboundedSender<Disconnect>,
    task: JoinHandle<()>,
}

impl StreamHandle {
    /// Next event, or `None` once the listener has stopped.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// Close the socket once and stop reconnecting. A default code of
    /// 1000 is used when `code` is `None`.
    pub fn disconnect(&self, code: Option<u16>, reason: Option<&str>) {
        let request = Disconnect {
            code: code.unwrap_or(1000),
            reason: reason.unwrap_or_default().to_string(),
        };
        if self.control.send(request).is_err() {
            tracing::debug!("Stream listener already stopped");
        }
    }

    /// Stop the listener, as dropping the handle would, then wait for its
    /// task to finish. Call `disconnect` first to choose the close code.
    pub async fn join(self) {
        let StreamHandle { events, control, task } = self;
        drop(events);
        drop(control);
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Stream listener task failed");
        }
    }
}

impl StreamListener {
    pub fn new(url: Url, stream: &str, token: String, options: StreamOptions) -> Self {
        Self {
            url,
            stream: stream.to_string(),
            token,
            options,
        }
    }

    /// Start the listener on the current tokio runtime.
    pub fn spawn(self) -> StreamHandle {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(async move {
            tracing::info!(stream = %self.stream, url = %self.url, "Starting stream listener");
            self.run(event_tx, control_rx).await;
            tracing::info!("Stream listener exited");
        });
        StreamHandle { events, control, task }
    }

    /// Connect, receive until closed, wait, repeat.
    async fn run(
        &self,
        events: mpsc::UnboundedSender<StreamEvent>,
        mut control: mpsc::UnboundedReceiver<Disconnect>,
    ) {
        let mut liveness = tokio::time::interval(LIVENESS_INTERVAL);
        let mut attempt = 0u64;

        loop {
            attempt += 1;
            tracing::debug!(stream = %self.stream, attempt, "Connecting");
            let closed = self.run_session(&events, &mut control, &mut liveness).await;

            tracing::info!(
                stream = %self.stream,
                code = closed.code,
                reason = %closed.reason,
                "Stream connection closed",
            );
            let event = StreamEvent::Close {
                code: closed.code,
                reason: closed.reason,
            };
            if events.send(event).is_err() || closed.stopped {
                return;
            }

            let sleep = tokio::time::sleep(self.options.reconnect_delay);
            tokio::pin!(sleep);
            loop {
                tokio::select! {
                    _ = &mut sleep => break,
                    _ = liveness.tick() => tracing::trace!("Stream listener alive"),
                    request = control.recv() => {
                        tracing::info!(?request, "Disconnect requested while waiting to reconnect");
                        return;
                    }
                }
            }
        }
    }

    /// Drive one connection until it closes.
    async fn run_session(
        &self,
        events: &mpsc::UnboundedSender<StreamEvent>,
        control: &mut mpsc::UnboundedReceiver<Disconnect>,
        liveness: &mut Interval,
    ) -> Closed {
        let ws_stream = tokio::select! {
            result = connect_async(self.url.as_str()) => match result {
                Ok((ws_stream, _response)) => ws_stream,
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, "Stream connection failed");
                    return Closed::abnormal(e.to_string());
                }
            },
            request = control.recv() => {
                let request = request.unwrap_or_default();
                return Closed { code: request.code, reason: request.reason, stopped: true };
            }
        };
        let (mut sink, mut source) = ws_stream.split();

        let handshake = OutboundFrame::Connect {
            stream: &self.stream,
            token: &self.token,
        };
        if let Err(e) = send_frame(&mut sink, &handshake).await {
            return Closed::abnormal(e);
        }

        loop {
            tokio::select! {
                _ = liveness.tick() => tracing::trace!("Stream listener alive"),
                request = control.recv() => {
                    let request = request.unwrap_or_default();
                    tracing::info!(code = request.code, "Disconnecting stream");
                    close_socket(&mut sink, request.code, &request.reason).await;
                    return Closed { code: request.code, reason: request.reason, stopped: true };
                }
                msg = source.next() => {
                    if let Some(closed) = self.handle_incoming(msg, &mut sink, events).await {
                        return closed;
                    }
                }
            }
        }
    }

    /// Handle one socket item. Returns `Some` when the connection is over.
    async fn handle_incoming(
        &self,
        msg: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        sink: &mut WsSink,
        events: &mpsc::UnboundedSender<StreamEvent>,
    ) -> Option<Closed> {
        match msg {
            Some(Ok(Message::Text(text))) => match handle_frame(&text, self.options.invalid_message) {
                Ok(FrameAction::Emit(event)) => {
                    if events.send(event).is_err() {
                        close_socket(sink, 1000, "").await;
                        return Some(Closed {
                            code: 1000,
                            reason: String::new(),
                            stopped: true,
                        });
                    }
                    None
                }
                Ok(FrameAction::ReplyPing) => match send_frame(sink, &OutboundFrame::Ping).await {
                    Ok(()) => None,
                    Err(e) => Some(Closed::abnormal(e)),
                },
                Ok(FrameAction::Ignore) => None,
                Err(e) => {
                    tracing::error!(stream = %self.stream, error = %e, "Stream protocol error");
                    let reason = e.to_string();
                    close_socket(sink, PROTOCOL_ERROR_CODE, &reason).await;
                    Some(Closed {
                        code: PROTOCOL_ERROR_CODE,
                        reason,
                        stopped: false,
                    })
                }
            },
            Some(Ok(Message::Close(frame))) => {
                let closed = match frame {
                    Some(frame) => Closed {
                        code: u16::from(frame.code),
                        reason: frame.reason.into_owned(),
                        stopped: false,
                    },
                    None => Closed {
                        code: NO_STATUS_CODE,
                        reason: String::new(),
                        stopped: false,
                    },
                };
                Some(closed)
            }
            Some(Ok(_)) => {
                // Binary / control frames; tungstenite answers pings itself.
                None
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, "WebSocket receive error");
                Some(Closed::abnormal(e.to_string()))
            }
            None => Some(Closed::abnormal("stream ended")),
        }
    }
}

async fn send_frame(sink: &mut WsSink, frame: &OutboundFrame<'_>) -> Result<(), String> {
    let message = frame.to_message().map_err(|e| e.to_string())?;
    sink.send(message).await.map_err(|e| {
        tracing::warn!(error = %e, "Failed to send frame");
        e.to_string()
    })
}

async fn close_socket(sink: &mut WsSink, code: u16, reason: &str) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: Cow::Owned(close_reason(reason).to_string()),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        tracing::debug!(error = %e, "Close frame not sent");
    }
}

/// Close reasons must fit in a control frame.
fn close_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason;
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}
