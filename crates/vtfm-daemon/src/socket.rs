use crate::coordinator::CoordinatorHandle;
use crate::BroadcastMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use vtfm_proto::protocol::{Broadcast, Command, Message, PlayerState, PROTOCOL_VERSION};

pub fn start_server(
    bind_address: String,
    port: u16,
    coordinator: CoordinatorHandle,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("{}:{}", bind_address, port);

        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                error!("Failed to bind TCP socket {}: {}", addr, e);
                return;
            }
        };

        info!("TCP server listening at {}", addr);
        serve(listener, coordinator, broadcast_tx).await;
    })
}

async fn serve(
    listener: TcpListener,
    coordinator: CoordinatorHandle,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) {
    let connected = Arc::new(AtomicUsize::new(0));
    let mut client_id = 0usize;

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                client_id += 1;
                let id = client_id;
                let count = connected.fetch_add(1, Ordering::Relaxed) + 1;
                info!("Client {} connected from {} ({} connected)", id, peer, count);

                let coordinator = coordinator.clone();
                let bcast_rx = broadcast_tx.subscribe();
                let connected = connected.clone();

                tokio::spawn(async move {
                    handle_client(stream, coordinator, id, bcast_rx).await;
                    let count = connected.fetch_sub(1, Ordering::Relaxed) - 1;
                    info!("Client {} disconnected ({} connected)", id, count);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn send(write_half: &mut OwnedWriteHalf, broadcast: Broadcast) -> anyhow::Result<()> {
    let encoded = Message::Broadcast(broadcast).encode()?;
    write_half.write_all(&encoded).await?;
    Ok(())
}

fn state(data: PlayerState) -> Broadcast {
    Broadcast::State { data }
}

async fn handle_client(
    stream: TcpStream,
    coordinator: CoordinatorHandle,
    client_id: usize,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::new();

    // Hello with the current snapshot on connect
    match coordinator.snapshot().await {
        Ok(snapshot) => {
            let hello = Broadcast::Hello {
                protocol_version: PROTOCOL_VERSION,
                state: snapshot,
            };
            if send(&mut write_half, hello).await.is_err() {
                return;
            }
        }
        Err(e) => {
            warn!("Client {}: no snapshot for hello: {}", client_id, e);
            return;
        }
    }

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                match result {
                    Ok(0) => {
                        info!("Client {} closed connection", client_id);
                        break;
                    }
                    Ok(n) => {
                        read_buf.extend_from_slice(&tmp[..n]);

                        loop {
                            match Message::decode(&read_buf) {
                                Ok(Some((Message::Command(cmd), consumed))) => {
                                    read_buf.drain(..consumed);
                                    info!("Client {} sent command: {:?}", client_id, cmd);
                                    if run_command(&coordinator, &mut write_half, cmd).await.is_err() {
                                        return;
                                    }
                                }
                                Ok(Some((_, consumed))) => {
                                    read_buf.drain(..consumed);
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    warn!("Client {} sent a corrupt frame: {}", client_id, e);
                                    return;
                                }
                            }
                        }
                    }
                    Err(e) => {
                        error!("Read error from client {}: {}", client_id, e);
                        break;
                    }
                }
            }

            msg = broadcast_rx.recv() => {
                let outgoing = match msg {
                    Ok(BroadcastMessage::StateUpdated(snapshot)) => state((*snapshot).clone()),
                    Ok(BroadcastMessage::TitleUpdated(title)) => Broadcast::Title { title },
                    Ok(BroadcastMessage::Notice(message)) => Broadcast::Notice { message },
                    Ok(BroadcastMessage::Log(message)) => Broadcast::Log { message },
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Client {} missed {} broadcast messages", client_id, n);
                        match coordinator.snapshot().await {
                            Ok(snapshot) => state(snapshot),
                            Err(_) => break,
                        }
                    }
                    Err(_) => break,
                };
                if send(&mut write_half, outgoing).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Forward one command.  State changes reach every client through the
/// broadcast channel; only `GetState` gets a direct answer here.
async fn run_command(
    coordinator: &CoordinatorHandle,
    write_half: &mut OwnedWriteHalf,
    cmd: Command,
) -> anyhow::Result<()> {
    let wants_state = cmd == Command::GetState;
    match coordinator.execute(cmd).await {
        Ok(snapshot) if wants_state => send(write_half, state(snapshot)).await,
        Ok(_) => Ok(()),
        Err(e) => {
            debug!("command rejected: {}", e);
            send(
                write_half,
                Broadcast::Notice {
                    message: e.to_string(),
                },
            )
            .await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::{Coordinator, CoordinatorParts, CoordinatorSettings};
    use crate::testing::{FakeEngine, ScriptedTitles};
    use std::time::Duration;
    use tokio::time::timeout;
    use vtfm_proto::catalog::{Catalog, StationId};
    use vtfm_proto::protocol::LoadState;
    use vtfm_proto::store::MemoryStore;

    struct Client {
        stream: TcpStream,
        buf: Vec<u8>,
    }

    impl Client {
        async fn send(&mut self, cmd: Command) {
            let frame = Message::Command(cmd).encode().unwrap();
            self.stream.write_all(&frame).await.unwrap();
        }

        async fn next(&mut self) -> Broadcast {
            let mut tmp = [0u8; 4096];
            loop {
                if let Some((msg, consumed)) = Message::decode(&self.buf).unwrap() {
                    self.buf.drain(..consumed);
                    if let Message::Broadcast(b) = msg {
                        return b;
                    }
                    continue;
                }
                let n = timeout(Duration::from_secs(5), self.stream.read(&mut tmp))
                    .await
                    .expect("timed out waiting for a frame")
                    .unwrap();
                assert!(n > 0, "daemon closed the connection");
                self.buf.extend_from_slice(&tmp[..n]);
            }
        }
    }

    async fn connect() -> Client {
        let (broadcast_tx, _) = broadcast::channel(64);
        let parts = CoordinatorParts {
            catalog: Arc::new(Catalog::builtin()),
            engine: Arc::new(FakeEngine::default()),
            store: Arc::new(MemoryStore::new()),
            titles: Arc::new(ScriptedTitles::default()),
            broadcast_tx: broadcast_tx.clone(),
        };
        let (coordinator, _task) = Coordinator::spawn(parts, CoordinatorSettings::default()).await;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, coordinator, broadcast_tx));

        Client {
            stream: TcpStream::connect(addr).await.unwrap(),
            buf: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_hello_carries_snapshot() {
        let mut client = connect().await;
        match client.next().await {
            Broadcast::Hello {
                protocol_version,
                state,
            } => {
                assert_eq!(protocol_version, PROTOCOL_VERSION);
                assert_eq!(state.selection.track_key().as_str(), "1112");
            }
            other => panic!("expected hello, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_command_change_is_broadcast() {
        let mut client = connect().await;
        client.next().await;

        client
            .send(Command::ChangeStation {
                station: StationId::new(333),
            })
            .await;
        loop {
            if let Broadcast::State { data } = client.next().await {
                if data.load_state == LoadState::Loaded {
                    assert_eq!(data.selection.station, StationId::new(333));
                    break;
                }
            }
        }
    }

    #[tokio::test]
    async fn test_rejected_command_answers_with_notice() {
        let mut client = connect().await;
        client.next().await;

        client
            .send(Command::ChangeStation {
                station: StationId::new(999),
            })
            .await;
        loop {
            if let Broadcast::Notice { message } = client.next().await {
                assert!(message.starts_with("unknown"), "{message}");
                break;
            }
        }
    }
}
