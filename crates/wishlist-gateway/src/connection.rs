use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{info, trace, warn};

use crate::hub::Hub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive intervals pass without hearing from the client (~30s),
/// the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const MAX_MISSED_HEARTBEATS: u8 = 2;

/// Serve one live-view socket for `share_id`. The viewer's session was
/// checked at the HTTP upgrade. Returns once the socket is gone, by which
/// point the connection is no longer registered in the hub.
pub async fn handle_live_view(socket: WebSocket, hub: Hub, share_id: String, viewer_id: i64) {
    let (mut sender, mut receiver) = socket.split();
    let mut subscription = hub.subscribe(&share_id, viewer_id);
    let conn_id = subscription.conn_id;

    info!("Viewer {} joined {} ({})", viewer_id, share_id, conn_id);

    // Any inbound frame counts as a sign of life
    let alive = Arc::new(AtomicBool::new(true));
    let alive_send = alive.clone();

    // Forward snapshots -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                snapshot = subscription.next() => {
                    // None: the hub dropped this connection
                    let Some(json) = snapshot else { break };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if alive_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= MAX_MISSED_HEARTBEATS {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Nothing meaningful comes from the client; only watch for liveness and close
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => break,
                other => {
                    if let Message::Text(text) = &other {
                        trace!("Ignoring inbound text frame ({} bytes)", text.len());
                    }
                    alive.store(true, Ordering::Release);
                }
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    hub.unsubscribe(&share_id, conn_id);
    info!("Viewer {} left {} ({})", viewer_id, share_id, conn_id);
}
