use crate::handlers::checkout::AppState;
use crate::models::Stats;
use crate::services::MonitorState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::{interval, Duration};

/// One frame of the live checkout dashboard: the monitor's current state
/// next to the running counters, pushed every second.
#[derive(Serialize)]
struct DashboardFrame {
    monitor: MonitorState,
    stats: Stats,
}

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| stream_dashboard(socket, state))
}

async fn stream_dashboard(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut ticker = interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let frame = DashboardFrame {
                    monitor: state.monitor.status().await,
                    stats: state.analytics.get_stats().await,
                };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::debug!("Dashboard socket closed");
}
