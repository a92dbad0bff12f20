//! WebSocket signaling endpoint. Owns nothing beyond one connection's
//! lifecycle -- client identity and negotiation state live in the
//! [`crate::streamer::Streamer`] this is handed at startup.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, warn};

use crate::streamer::Streamer;

#[derive(Debug, Deserialize)]
struct IncomingMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    client_type: Option<String>,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Accepts connections on `addr` until the process exits; each connection
/// gets its own task so one slow or malicious client can't stall another.
pub(crate) async fn run_signaling_server(addr: SocketAddr, streamer: Arc<Streamer>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            warn!(%addr, error = %err, "failed to bind signaling listener");
            return;
        }
    };
    info!(%addr, "signaling server listening");

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(pair) => pair,
            Err(err) => {
                warn!(error = %err, "signaling accept failed");
                continue;
            }
        };
        let streamer = Arc::clone(&streamer);
        tokio::spawn(async move {
            if let Err(err) = handle_connection(stream, streamer).await {
                debug!(%peer_addr, error = %err, "signaling connection ended");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, streamer: Arc<Streamer>) -> Result<(), WsError> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let welcome = json!({
        "type": "welcome",
        "message": "Please send authentication info",
        "timestamp": epoch_seconds(),
    });
    ws_tx.send(Message::Text(welcome.to_string())).await?;

    // The streamer (via ICE candidate / offer callbacks) and this task both
    // need to push text frames to the client; route both through one
    // channel so only this task ever touches the socket sink.
    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    let mut client_id: Option<String> = None;

    loop {
        tokio::select! {
            biased;

            outgoing = out_rx.recv() => {
                match outgoing {
                    Some(text) => ws_tx.send(Message::Text(text)).await?,
                    None => break,
                }
            }
            incoming = ws_rx.next() => {
                let Some(incoming) = incoming else { break };
                let incoming = incoming?;
                if !incoming.is_text() {
                    continue;
                }
                let text = incoming.into_text()?;
                let Ok(parsed) = serde_json::from_str::<IncomingMessage>(&text) else {
                    warn!("ignoring malformed signaling message");
                    continue;
                };

                match client_id.clone() {
                    None => {
                        if parsed.kind != "auth" {
                            continue;
                        }
                        let client_type = parsed
                            .client_type
                            .or_else(|| {
                                parsed
                                    .data
                                    .as_ref()
                                    .and_then(|d| d.get("client_type"))
                                    .and_then(|v| v.as_str())
                                    .map(str::to_string)
                            })
                            .unwrap_or_else(|| "unknown".into());
                        let id = streamer.register_client(client_type, out_tx.clone());
                        let reply = json!({"type": "auth_success", "client_id": id});
                        let _ = out_tx.send(reply.to_string());
                        client_id = Some(id);
                    }
                    Some(id) => {
                        streamer.handle_client_message(&id, &parsed.kind, parsed.data).await;
                    }
                }
            }
        }
    }

    if let Some(id) = client_id {
        streamer.remove_client(&id);
    }
    Ok(())
}

fn epoch_seconds() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_message_parses_client_type_from_top_level_field() {
        let text = r#"{"type": "auth", "client_type": "viewer"}"#;
        let parsed: IncomingMessage = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.kind, "auth");
        assert_eq!(parsed.client_type.as_deref(), Some("viewer"));
        assert!(parsed.data.is_none());
    }

    #[test]
    fn request_offer_parses_nested_data_without_client_type() {
        let text = r#"{"type": "request_offer", "data": {"source_id": "camera_02"}}"#;
        let parsed: IncomingMessage = serde_json::from_str(text).unwrap();
        assert_eq!(parsed.kind, "request_offer");
        assert!(parsed.client_type.is_none());
        assert_eq!(
            parsed.data.unwrap().get("source_id").and_then(|v| v.as_str()),
            Some("camera_02")
        );
    }

    #[test]
    fn epoch_seconds_is_plausible() {
        // Sanity check only: must be a positive, roughly-current Unix timestamp.
        assert!(epoch_seconds() > 1_700_000_000);
    }
}
