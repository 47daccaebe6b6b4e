//! WebSocket transport that feeds one connection from a live install log stream.
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use futures_util::stream::SplitSink;

use super::*;

type WsSender = SplitSink<WebSocket, WsMessage>;

pub(super) async fn handle_install_log_ws_upgrade(
    State(state): State<Arc<GatewayServerState>>,
    Query(query): Query<LogTaskQuery>,
    websocket: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let task_id = match query.required_task_id() {
        Ok(task_id) => task_id,
        Err(error) => return error.into_response(),
    };
    let websocket = match websocket {
        Ok(websocket) => websocket,
        Err(rejection) => return rejection.into_response(),
    };
    websocket
        .on_upgrade(move |socket| run_install_log_ws_connection(state, socket, task_id))
        .into_response()
}

fn log_message_frame(message: &LogMessage) -> Result<WsMessage, LogStreamClientError> {
    serde_json::to_string(message)
        .map(|raw| WsMessage::Text(raw.into()))
        .map_err(|error| LogStreamClientError::Transport(error.to_string()))
}

async fn send_bounded(
    sender: &mut WsSender,
    message: WsMessage,
    write_timeout: Duration,
) -> Result<(), LogStreamClientError> {
    match tokio::time::timeout(write_timeout, sender.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(error)) => Err(LogStreamClientError::Transport(error.to_string())),
        Err(_) => Err(LogStreamClientError::Transport(format!(
            "write exceeded {}ms",
            write_timeout.as_millis()
        ))),
    }
}

async fn send_log_message(
    sender: &mut WsSender,
    message: &LogMessage,
    write_timeout: Duration,
) -> Result<(), LogStreamClientError> {
    let frame = log_message_frame(message)?;
    send_bounded(sender, frame, write_timeout).await
}

async fn close_socket(sender: &mut WsSender, write_timeout: Duration) {
    let _ = send_bounded(sender, WsMessage::Close(None), write_timeout).await;
}

async fn send_replay(
    sender: &mut WsSender,
    attachment: &LogStreamAttachment,
    write_timeout: Duration,
) -> Result<(), LogStreamClientError> {
    if !attachment.log_file_exists {
        send_log_message(sender, &LogMessage::preparing(), write_timeout).await?;
    }
    for message in &attachment.history {
        send_log_message(sender, message, write_timeout).await?;
    }
    if let Some(terminal) = attachment.terminal.as_ref() {
        send_log_message(sender, terminal, write_timeout).await?;
    }
    Ok(())
}

pub(super) async fn run_install_log_ws_connection(
    state: Arc<GatewayServerState>,
    socket: WebSocket,
    task_id: String,
) {
    let (mut sender, mut receiver) = socket.split();
    let write_timeout = state.config.client_write_timeout;

    let Some(stream) = state.runner.registry().get(&task_id) else {
        let frame = json!({
            "error": "task not found",
            "task_id": task_id,
        });
        let _ = send_bounded(
            &mut sender,
            WsMessage::Text(frame.to_string().into()),
            write_timeout,
        )
        .await;
        close_socket(&mut sender, write_timeout).await;
        return;
    };

    let client_id = state.next_client_id();
    let (client, mut queue) =
        ChannelLogStreamClient::new(state.runner.config().client_queue_capacity);
    // Replay reads the log file synchronously; keep it off the async workers.
    let attaching_stream = Arc::clone(&stream);
    let attaching_id = client_id.clone();
    let attached =
        tokio::task::spawn_blocking(move || attaching_stream.attach(attaching_id, client))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|attached| attached);
    let attachment = match attached {
        Ok(attachment) => attachment,
        Err(error) => {
            tracing::warn!(
                task_id = %task_id,
                client_id = %client_id,
                error = %error,
                "install log replay failed"
            );
            close_socket(&mut sender, write_timeout).await;
            return;
        }
    };

    if let Err(error) = send_replay(&mut sender, &attachment, write_timeout).await {
        tracing::debug!(
            task_id = %task_id,
            client_id = %client_id,
            error = %error,
            "install log client dropped during replay"
        );
        stream.detach(&client_id);
        return;
    }
    if !attachment.registered {
        close_socket(&mut sender, write_timeout).await;
        return;
    }

    let mut heartbeat =
        tokio::time::interval(state.config.heartbeat_interval.max(Duration::from_millis(1)));
    heartbeat.tick().await;

    loop {
        tokio::select! {
            queued = queue.recv() => {
                let Some(message) = queued else {
                    // Stream completed or was removed and the queue is drained.
                    break;
                };
                if let Err(error) = send_log_message(&mut sender, &message, write_timeout).await {
                    tracing::debug!(
                        task_id = %task_id,
                        client_id = %client_id,
                        error = %error,
                        "install log client write failed"
                    );
                    break;
                }
            }
            inbound = receiver.next() => {
                match inbound {
                    Some(Ok(WsMessage::Ping(payload))) => {
                        if send_bounded(&mut sender, WsMessage::Pong(payload), write_timeout)
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
            _ = heartbeat.tick() => {
                if send_bounded(&mut sender, WsMessage::Ping(Vec::new().into()), write_timeout)
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    stream.detach(&client_id);
    close_socket(&mut sender, write_timeout).await;
    tracing::debug!(task_id = %task_id, client_id = %client_id, "install log client finished");
}
