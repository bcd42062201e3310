use crate::http::HttpState;
use crate::DaemonEvent;
use audiogrid_proto::protocol::{Message, ShellCommand, ShellEvent, PROTOCOL_VERSION};
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

/// Accept desktop-shell connections on `listener` until the task is dropped.
pub fn start_server(
    listener: TcpListener,
    state: HttpState,
    events: broadcast::Sender<ShellEvent>,
    event_tx: mpsc::Sender<DaemonEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match listener.local_addr() {
            Ok(addr) => info!("Shell socket listening at {}", addr),
            Err(e) => warn!("Shell socket listening on unknown address: {}", e),
        }

        let mut client_id = 0usize;
        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Shell {} connected from {}", id, peer);

                    let state = state.clone();
                    let event_tx = event_tx.clone();
                    let events_rx = events.subscribe();
                    tokio::spawn(async move {
                        handle_client(stream, state, id, event_tx, events_rx).await;
                        info!("Shell {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept shell connection: {}", e);
                }
            }
        }
    })
}

async fn handle_client(
    stream: TcpStream,
    state: HttpState,
    client_id: usize,
    event_tx: mpsc::Sender<DaemonEvent>,
    mut events_rx: broadcast::Receiver<ShellEvent>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    let hello = ShellEvent::Hello {
        protocol_version: PROTOCOL_VERSION,
        status: state.status(),
    };
    if send_event(&mut write_half, hello).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => break,
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        loop {
                            if read_buf.len() < 4 { break; }
                            match Message::decode(&read_buf) {
                                Ok((Message::Command(cmd), consumed)) => {
                                    read_buf.drain(..consumed);
                                    info!("Shell {} sent command: {:?}", client_id, cmd);
                                    match cmd {
                                        ShellCommand::GetStatus => {
                                            let event = ShellEvent::Status { data: state.status() };
                                            if send_event(&mut write_half, event).await.is_err() {
                                                return;
                                            }
                                        }
                                        ShellCommand::Shutdown => {
                                            if event_tx.send(DaemonEvent::Shutdown).await.is_err() {
                                                warn!("DaemonEvent channel closed");
                                            }
                                            return;
                                        }
                                    }
                                }
                                Ok((_, consumed)) => {
                                    read_buf.drain(..consumed);
                                }
                                // Incomplete frame; wait for more bytes.
                                Err(_) => break,
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from shell {}: {}", client_id, e);
                        break;
                    }
                }
            }

            event = events_rx.recv() => {
                match event {
                    Ok(event) => {
                        if send_event(&mut write_half, event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Shell {} missed {} events", client_id, n);
                    }
                    Err(_) => break,
                }
            }
        }
    }
}

async fn send_event<W>(writer: &mut W, event: ShellEvent) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let encoded = Message::Event(event).encode()?;
    writer.write_all(&encoded).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::AudioCatalog;
    use crate::notify::{NotificationSink, ShellNotifier};
    use audiogrid_proto::i18n::Messages;
    use audiogrid_proto::protocol::{Notification, NotificationLevel};
    use std::sync::Arc;
    use std::time::Duration;

    async fn read_frame(stream: &mut TcpStream) -> Message {
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await.unwrap();
        let len = u32::from_be_bytes(header) as usize;
        let mut frame = header.to_vec();
        frame.resize(4 + len, 0);
        stream.read_exact(&mut frame[4..]).await.unwrap();
        Message::decode(&frame).unwrap().0
    }

    async fn spawn_shell_server(
        events: broadcast::Sender<ShellEvent>,
    ) -> (std::net::SocketAddr, mpsc::Receiver<DaemonEvent>, Arc<ShellNotifier>) {
        let notifier = Arc::new(ShellNotifier::new(events.clone()));
        let state = HttpState::new(
            None,
            AudioCatalog::new(std::env::temp_dir().join("audiogrid-socket-test")),
            notifier.clone(),
            Messages::default(),
            "index.html".into(),
            "10.1.2.3".to_string(),
            3000,
        );
        let (event_tx, event_rx) = mpsc::channel(4);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        start_server(listener, state, events, event_tx);
        (addr, event_rx, notifier)
    }

    #[tokio::test]
    async fn test_hello_status_and_notifications() {
        let (events, _) = broadcast::channel(16);
        let (addr, _event_rx, notifier) = spawn_shell_server(events).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        match read_frame(&mut stream).await {
            Message::Event(ShellEvent::Hello {
                protocol_version,
                status,
            }) => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(status.ip, "10.1.2.3");
                assert!(!status.player_running);
            }
            other => panic!("Wrong first frame: {:?}", other),
        }

        let request = Message::Command(ShellCommand::GetStatus).encode().unwrap();
        stream.write_all(&request).await.unwrap();
        match read_frame(&mut stream).await {
            Message::Event(ShellEvent::Status { data }) => assert_eq!(data.port, 3000),
            other => panic!("Wrong reply: {:?}", other),
        }

        notifier
            .notify(&Notification::new(NotificationLevel::Error, "Error", "boom"))
            .unwrap();
        match read_frame(&mut stream).await {
            Message::Event(ShellEvent::Notification { body, level, .. }) => {
                assert_eq!(body, "boom");
                assert_eq!(level, NotificationLevel::Error);
            }
            other => panic!("Wrong event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shutdown_command_reaches_daemon() {
        let (events, _) = broadcast::channel(16);
        let (addr, mut event_rx, _notifier) = spawn_shell_server(events).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let _hello = read_frame(&mut stream).await;

        let request = Message::Command(ShellCommand::Shutdown).encode().unwrap();
        stream.write_all(&request).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(DaemonEvent::Shutdown)));
    }
}
