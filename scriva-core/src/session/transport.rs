//! WebSocket transport task.
//!
//! One task per connection: it owns both halves of the socket, reads inbound
//! frames in FIFO order, and drains an outbound channel fed by the session
//! handle. All protocol decisions live in the state machine — this loop only
//! moves frames and reports transport facts (`opened`, `failed`, `closed`).

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::protocol::ServerMessage;
use crate::session::{SessionEvent, Shared, TransportDirective};

/// Frames the session handle pushes toward the socket.
#[derive(Debug)]
pub(crate) enum OutboundFrame {
    /// A JSON control frame (handshake, stop).
    Text(String),
    /// One captured audio slice.
    Audio(Vec<u8>),
    /// Close the connection with a normal-closure code.
    Close,
}

/// Outcome of executing one directive against the socket.
enum Executed {
    Sent,
    Closed,
    Failed(String),
}

type Sink = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Run one connection to completion.
///
/// `generation` fences this task: every event it reports and its final
/// cleanup go through the generation-checked [`Shared`] entry points, so a
/// task that outlives its session cannot disturb the one that replaced it.
pub(crate) async fn run(
    endpoint: String,
    shared: Arc<Shared>,
    generation: u64,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    let (ws, _response) = match connect_async(endpoint.as_str()).await {
        Ok(pair) => pair,
        Err(e) => {
            warn!(error = %e, %endpoint, "failed to open transport");
            shared.dispatch_from(
                generation,
                SessionEvent::TransportFailed {
                    message: format!("connection failed: {e}"),
                },
            );
            shared.clear_outbound_from(generation);
            return;
        }
    };
    info!(%endpoint, "transport open");

    let (mut sink, mut stream) = ws.split();

    // Handshake goes out before anything else.
    for directive in shared.dispatch_from(generation, SessionEvent::TransportOpened) {
        match execute(&mut sink, directive).await {
            Executed::Sent => {}
            Executed::Closed => {
                shared.clear_outbound_from(generation);
                return;
            }
            Executed::Failed(message) => {
                shared.dispatch_from(generation, SessionEvent::TransportFailed { message });
                shared.clear_outbound_from(generation);
                return;
            }
        }
    }

    'connection: loop {
        tokio::select! {
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(raw))) => {
                    let message = match ServerMessage::parse(&raw) {
                        Ok(m) => m,
                        Err(e) => {
                            // Protocol violation: drop the single frame.
                            warn!(error = %e, "discarding malformed inbound message");
                            continue;
                        }
                    };
                    for directive in shared.dispatch_from(generation, SessionEvent::Inbound(message)) {
                        match execute(&mut sink, directive).await {
                            Executed::Sent => {}
                            Executed::Closed => break 'connection,
                            Executed::Failed(message) => {
                                shared.dispatch_from(
                                    generation,
                                    SessionEvent::TransportFailed { message },
                                );
                                break 'connection;
                            }
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "server closed the connection");
                    shared.dispatch_from(generation, SessionEvent::TransportClosed);
                    break;
                }
                // Ping/pong are answered by tungstenite; binary from the
                // server is not part of the protocol.
                Some(Ok(other)) => debug!(kind = frame_kind(&other), "ignoring inbound frame"),
                Some(Err(e)) => {
                    shared.dispatch_from(
                        generation,
                        SessionEvent::TransportFailed {
                            message: format!("transport read failed: {e}"),
                        },
                    );
                    break;
                }
                None => {
                    shared.dispatch_from(generation, SessionEvent::TransportClosed);
                    break;
                }
            },
            frame = outbound_rx.recv() => {
                let directive = match frame {
                    Some(OutboundFrame::Text(json)) => TransportDirective::SendText(json),
                    Some(OutboundFrame::Audio(bytes)) => TransportDirective::SendBinary(bytes),
                    Some(OutboundFrame::Close) => TransportDirective::Close,
                    // Session handle dropped — tear the connection down.
                    None => TransportDirective::Close,
                };
                match execute(&mut sink, directive).await {
                    Executed::Sent => {}
                    Executed::Closed => break,
                    Executed::Failed(message) => {
                        shared.dispatch_from(generation, SessionEvent::TransportFailed { message });
                        break;
                    }
                }
            },
        }
    }

    shared.clear_outbound_from(generation);
    debug!("transport task finished");
}

/// Perform one transport directive against the socket.
async fn execute(sink: &mut Sink, directive: TransportDirective) -> Executed {
    match directive {
        TransportDirective::SendText(json) => match sink.send(Message::Text(json)).await {
            Ok(()) => Executed::Sent,
            Err(e) => Executed::Failed(format!("transport write failed: {e}")),
        },
        TransportDirective::SendBinary(bytes) => match sink.send(Message::Binary(bytes)).await {
            Ok(()) => Executed::Sent,
            Err(e) => Executed::Failed(format!("transport write failed: {e}")),
        },
        TransportDirective::Close => {
            // Best effort — the peer may already be gone.
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: CloseCode::Normal,
                    reason: "client disconnect".into(),
                })))
                .await;
            Executed::Closed
        }
        // Open never reaches a live connection.
        TransportDirective::Open => Executed::Sent,
    }
}

fn frame_kind(message: &Message) -> &'static str {
    match message {
        Message::Text(_) => "text",
        Message::Binary(_) => "binary",
        Message::Ping(_) => "ping",
        Message::Pong(_) => "pong",
        Message::Close(_) => "close",
        Message::Frame(_) => "raw",
    }
}
