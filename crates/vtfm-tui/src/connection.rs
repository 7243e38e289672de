//! Daemon connection: one background task that keeps a TCP session to the
//! daemon alive, forwards its broadcasts to the App and writes commands out.
//!
//! When the daemon goes away the task reports `Disconnected` and retries
//! after a fixed delay.  Commands issued while disconnected are dropped.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use vtfm_proto::protocol::{Command, Message};

use crate::app::AppMessage;

pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Run until the App goes away (either channel closed).
pub async fn run(
    address: String,
    retry: Duration,
    mut cmd_rx: mpsc::Receiver<Command>,
    tx: mpsc::Sender<AppMessage>,
) {
    loop {
        match TcpStream::connect(&address).await {
            Ok(stream) => {
                info!("Connected to daemon at {}", address);
                if tx.send(AppMessage::Connected).await.is_err() {
                    return;
                }
                match session(stream, &mut cmd_rx, &tx).await {
                    Ok(()) => info!("Daemon closed the connection"),
                    Err(e) => warn!("Daemon connection lost: {}", e),
                }
                if tx.send(AppMessage::Disconnected).await.is_err() {
                    return;
                }
            }
            Err(e) => debug!("Daemon not reachable at {}: {}", address, e),
        }

        let wait = tokio::time::sleep(retry);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => debug!("Not connected, dropping {:?}", cmd),
                    None => return,
                },
            }
        }
    }
}

async fn session(
    stream: TcpStream,
    cmd_rx: &mut mpsc::Receiver<Command>,
    tx: &mpsc::Sender<AppMessage>,
) -> anyhow::Result<()> {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut tmp = [0u8; 4096];
    let mut read_buf: Vec<u8> = Vec::with_capacity(4096);

    loop {
        tokio::select! {
            result = read_half.read(&mut tmp) => {
                let n = result?;
                if n == 0 {
                    return Ok(());
                }
                read_buf.extend_from_slice(&tmp[..n]);

                while let Some((msg, consumed)) = Message::decode(&read_buf)? {
                    read_buf.drain(..consumed);
                    match msg {
                        Message::Broadcast(broadcast) => {
                            if tx.send(AppMessage::Daemon(broadcast)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Message::Command(cmd) => debug!("Ignoring command from daemon: {:?}", cmd),
                    }
                }
            }

            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { return Ok(()) };
                debug!("Sending command: {:?}", cmd);
                let encoded = Message::Command(cmd).encode()?;
                write_half.write_all(&encoded).await?;
            }
        }
    }
}
