use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use parlor_core::coordinator::{AuthContext, Coordinator};
use parlor_core::dispatcher::{Channel, Dispatcher};
use parlor_types::events::GatewayCommand;
use parlor_types::models::UserId;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Handle a pre-authenticated WebSocket connection. The JWT was already
/// validated at the HTTP upgrade layer, so the connection goes straight to
/// its subscriptions and the event loop.
pub async fn handle_connection(
    socket: WebSocket,
    dispatcher: Dispatcher,
    coordinator: Arc<Coordinator>,
    user_id: UserId,
    username: String,
) {
    let (mut sender, mut receiver) = socket.split();

    info!("{} ({}) connected to gateway", username, user_id);

    // Connect-time subscriptions: the private channel plus every current
    // membership. Rooms joined or left later are adjusted live by the
    // coordinator through the dispatcher.
    let rooms = match coordinator.connect_subscriptions(user_id).await {
        Ok(rooms) => rooms,
        Err(e) => {
            warn!("failed to load subscriptions for {}: {}", username, e);
            return;
        }
    };

    let (conn_id, mut user_rx) = dispatcher.register(user_id);
    dispatcher.subscribe(conn_id, Channel::User(user_id));
    for room_id in rooms {
        dispatcher.subscribe(conn_id, Channel::Room(room_id));
    }

    // Shared flag for heartbeat
    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward routed events to the client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = user_rx.recv() => {
                    let Some(event) = result else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to serialize event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
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

    // Read commands from client
    let ctx = AuthContext::user(user_id, username.clone());
    let username_recv = username.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => match serde_json::from_str::<GatewayCommand>(&text) {
                    Ok(cmd) => handle_command(&coordinator, &ctx, cmd).await,
                    Err(e) => {
                        let preview: String = text.chars().take(200).collect();
                        warn!("{} ({}) bad command: {} -- raw: {}", username_recv, user_id, e, preview);
                    }
                },
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    dispatcher.deregister(conn_id);
    info!("{} ({}) disconnected from gateway", username, user_id);
}

async fn handle_command(coordinator: &Coordinator, ctx: &AuthContext, cmd: GatewayCommand) {
    match cmd {
        GatewayCommand::SendMessage { room_id, body } => {
            // Rejections are logged and dropped on the socket path; callers
            // that want errors use the REST endpoint.
            if let Err(e) = coordinator.send_message(ctx, room_id, &body).await {
                debug!("gateway send_message to room {} rejected: {}", room_id, e);
            }
        }
    }
}
