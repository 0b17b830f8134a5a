use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Message, Utf8Bytes};
use tokio_tungstenite::MaybeTlsStream;

use crate::channel::manager::{
    CloseAction, ConnectionManager, ABNORMAL_CLOSURE, NORMAL_CLOSURE, NO_STATUS,
};
use crate::error::ChannelError;
use crate::message::ClientMessage;

type WsStream = tokio_tungstenite::WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;
type WsSink = futures::stream::SplitSink<WsStream, Message>;

/// Owns the socket for the lifetime of the channel.
///
/// Connects, runs the read/write/ping loop until the socket ends, then asks
/// the manager whether to reconnect. Only one socket exists at a time: a new
/// attempt starts after the previous stream is dropped.
pub(crate) async fn connection_loop(
    url: String,
    manager: ConnectionManager,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientMessage>,
    ping_interval: Option<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            return;
        }

        // Anything still queued was meant for the previous socket.
        while outbound_rx.try_recv().is_ok() {}

        let connect_result = tokio::select! {
            res = tokio_tungstenite::connect_async(url.as_str()) => res,
            _ = shutdown_rx.changed() => return,
        };

        let close_code = match connect_result {
            Ok((ws_stream, _)) => {
                tracing::info!(url = %url, "notification channel connected");
                let resume = manager.on_open();
                run_connection(
                    ws_stream,
                    &manager,
                    resume,
                    &mut outbound_rx,
                    ping_interval,
                    &mut shutdown_rx,
                )
                .await
            }
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "connection failed");
                manager.on_error(e.into());
                ABNORMAL_CLOSURE
            }
        };

        if *shutdown_rx.borrow() {
            manager.on_close(NORMAL_CLOSURE);
            return;
        }

        match manager.on_close(close_code) {
            CloseAction::Stop => {
                tracing::info!(url = %url, code = close_code, "notification channel closed");
                return;
            }
            CloseAction::Reconnect(delay) => {
                tracing::warn!(
                    url = %url,
                    code = close_code,
                    attempt = manager.reconnect_state().attempts,
                    delay_ms = delay.as_millis() as u64,
                    "notification channel dropped, reconnecting"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.changed() => { return; }
                }
            }
        }
    }
}

/// Run one connected socket. Returns the close code it ended with.
async fn run_connection(
    ws_stream: WsStream,
    manager: &ConnectionManager,
    resume: Vec<ClientMessage>,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
    ping_interval: Option<Duration>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> u16 {
    let (mut sink, mut stream) = ws_stream.split();

    for msg in &resume {
        if let Err(e) = send_message(&mut sink, msg).await {
            manager.on_error(e);
            return ABNORMAL_CLOSURE;
        }
    }

    // First tick one full interval after open.
    let mut ping = ping_interval.map(|period| {
        tokio::time::interval_at(tokio::time::Instant::now() + period, period)
    });

    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => manager.on_message(text.as_str()),
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            return ABNORMAL_CLOSURE;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Binary(data))) => {
                        manager.on_unexpected(&format!("binary frame of {} bytes", data.len()));
                    }
                    Some(Ok(Message::Frame(_))) => manager.on_unexpected("raw frame"),
                    Some(Ok(Message::Close(frame))) => {
                        return frame.map(|f| u16::from(f.code)).unwrap_or(NO_STATUS);
                    }
                    Some(Err(e)) => {
                        manager.on_error(e.into());
                        return ABNORMAL_CLOSURE;
                    }
                    None => return ABNORMAL_CLOSURE,
                }
            }
            Some(msg) = outbound_rx.recv() => {
                if let Err(e) = send_message(&mut sink, &msg).await {
                    manager.on_error(e);
                    return ABNORMAL_CLOSURE;
                }
            }
            _ = next_tick(&mut ping) => {
                if let Some(msg) = manager.on_ping() {
                    if let Err(e) = send_message(&mut sink, &msg).await {
                        manager.on_error(e);
                        return ABNORMAL_CLOSURE;
                    }
                }
            }
            _ = shutdown_rx.changed() => {
                let _ = sink
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: Utf8Bytes::from_static("client shutdown"),
                    })))
                    .await;
                return NORMAL_CLOSURE;
            }
        }
    }
}

async fn next_tick(ping: &mut Option<tokio::time::Interval>) {
    match ping {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_message(sink: &mut WsSink, msg: &ClientMessage) -> Result<(), ChannelError> {
    let text = msg
        .to_json()
        .map_err(|e| ChannelError::Transport(e.to_string()))?;
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}
