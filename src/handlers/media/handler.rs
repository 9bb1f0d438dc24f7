//! Axum WebSocket handler for the media stream.
//!
//! The socket is split: a sender task serializes bridge output into
//! envelopes, while this task parses envelopes into bridge input. The bridge
//! itself runs on its own task and owns all call logic.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::select;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::core::bridge::{BridgeInput, BridgeOutput, MediaBridge};
use crate::state::AppState;

use super::error::MediaStreamError;
use super::messages::{InboundMessage, OutboundMessage};

/// Room for about a second of frames in either direction.
const CHANNEL_BUFFER_SIZE: usize = 64;

/// Media stream WebSocket handler.
pub async fn media_stream_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> Response {
    debug!("Media stream upgrade requested");
    ws.on_upgrade(move |socket| handle_media_socket(socket, state))
}

async fn handle_media_socket(socket: WebSocket, app_state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    let (input_tx, input_rx) = mpsc::channel::<BridgeInput>(CHANNEL_BUFFER_SIZE);
    let (output_tx, mut output_rx) = mpsc::channel::<BridgeOutput>(CHANNEL_BUFFER_SIZE);
    // Outbound envelopes need the stream id from `start`.
    let stream_sid: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

    let bridge = MediaBridge::new(app_state.bridge.clone(), app_state.bridge_config.clone());
    let shutdown_grace = app_state.bridge_config.shutdown_grace;
    let mut bridge_task = tokio::spawn(async move { bridge.run(input_rx, output_tx).await });

    let sender_sid = stream_sid.clone();
    let mut sender_task = tokio::spawn(async move {
        while let Some(output) = output_rx.recv().await {
            let Some(sid) = sender_sid.lock().clone() else {
                debug!("Dropping output before stream start");
                continue;
            };
            let Some(message) = OutboundMessage::from_output(&sid, output) else {
                debug!(stream_id = %sid, "Bridge closed the stream");
                let _ = sender.send(Message::Close(None)).await;
                break;
            };
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to serialize media envelope: {}", e);
                    continue;
                }
            };
            if let Err(e) = sender.send(Message::Text(json.into())).await {
                warn!("Failed to send media envelope: {}", e);
                break;
            }
        }
    });

    let mut stopped = false;
    loop {
        select! {
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        match process_message(msg, &stream_sid) {
                            Ok(Some(input)) => {
                                stopped = matches!(input, BridgeInput::Stop);
                                if input_tx.send(input).await.is_err() || stopped {
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(ProcessError::Closed) => break,
                            Err(ProcessError::Protocol(e)) => {
                                // Malformed envelopes are dropped; the stream continues.
                                warn!(error = %e, "Dropping media envelope");
                            }
                        }
                    }
                    Some(Err(e)) => {
                        warn!("Media stream error: {}", e);
                        let _ = input_tx.send(BridgeInput::TransportError(e.to_string())).await;
                        stopped = true;
                        break;
                    }
                    None => break,
                }
            }
            _ = &mut sender_task => {
                debug!("Media sender finished");
                break;
            }
        }
    }

    if !stopped {
        let _ = input_tx
            .send(BridgeInput::TransportError(
                "media connection closed without stop".to_string(),
            ))
            .await;
    }
    drop(input_tx);

    match timeout(shutdown_grace * 2, &mut bridge_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "Media bridge ended with error"),
        Ok(Err(e)) => error!("Media bridge task failed: {}", e),
        Err(_) => {
            warn!("Media bridge did not stop in time");
            bridge_task.abort();
        }
    }
    sender_task.abort();

    info!(
        stream_id = stream_sid.lock().as_deref().unwrap_or("-"),
        "Media stream connection terminated"
    );
}

enum ProcessError {
    Closed,
    Protocol(MediaStreamError),
}

impl From<MediaStreamError> for ProcessError {
    fn from(err: MediaStreamError) -> Self {
        ProcessError::Protocol(err)
    }
}

fn process_message(
    msg: Message,
    stream_sid: &Mutex<Option<String>>,
) -> Result<Option<BridgeInput>, ProcessError> {
    match msg {
        Message::Text(text) => {
            let envelope: InboundMessage =
                serde_json::from_str(&text).map_err(MediaStreamError::from)?;
            let input = envelope.into_input()?;
            if let Some(BridgeInput::Start(start)) = &input {
                *stream_sid.lock() = Some(start.stream_id.clone());
            }
            Ok(input)
        }
        Message::Binary(data) => Err(MediaStreamError::UnexpectedBinary(data.len()).into()),
        Message::Ping(_) | Message::Pong(_) => Ok(None),
        Message::Close(_) => {
            debug!("Media stream closed by provider");
            Err(ProcessError::Closed)
        }
    }
}
