//! TCP line-oriented management socket: `newface`, `newforwardingrule`,
//! `newcontent`, `shutdown`. Administrative surface only — addressed at
//! the forwarder's owning tasks through the same request/`oneshot`-reply
//! channels an ordinary peer never sees, never a shared `Mutex` over CS/
//! PIT/FIB.

use std::sync::Arc;

use bytes::Bytes;
use log::{info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use udcn_common::{Content, FaceId, Name};

use crate::icn::{IcnCommand, IcnCommandResponse, IcnHandle};
use udcn_transport::FaceTable;

pub struct ManagementLayer {
    listener: TcpListener,
    icn: IcnHandle,
    faces: Arc<Mutex<FaceTable>>,
    shutdown: mpsc::Sender<()>,
}

impl ManagementLayer {
    pub fn new(
        listener: TcpListener,
        icn: IcnHandle,
        faces: Arc<Mutex<FaceTable>>,
        shutdown: mpsc::Sender<()>,
    ) -> Self {
        Self {
            listener,
            icn,
            faces,
            shutdown,
        }
    }

    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Management connection from {}", addr);
                    let icn = self.icn.clone();
                    let faces = self.faces.clone();
                    let shutdown = self.shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve_connection(stream, icn, faces, shutdown).await {
                            warn!("Management connection {} ended with error: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Management socket accept failed: {}", e);
                    return;
                }
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    icn: IcnHandle,
    faces: Arc<Mutex<FaceTable>>,
    shutdown: mpsc::Sender<()>,
) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    while let Some(line) = lines.next_line().await? {
        let response = match handle_line(&line, &icn, &faces, &shutdown).await {
            Ok(reply) => reply,
            Err(e) => format!("ERR {}", e),
        };
        write_half.write_all(response.as_bytes()).await?;
        write_half.write_all(b"\n").await?;
    }
    Ok(())
}

async fn handle_line(
    line: &str,
    icn: &IcnHandle,
    faces: &Arc<Mutex<FaceTable>>,
    shutdown: &mpsc::Sender<()>,
) -> anyhow::Result<String> {
    let mut parts = line.split_whitespace();
    let command = parts
        .next()
        .ok_or_else(|| anyhow::anyhow!("empty command"))?
        .to_ascii_uppercase();

    match command.as_str() {
        "NEWFACE" => {
            let addr_str = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("NEWFACE requires an address"))?;
            let addr = addr_str.parse()?;
            let face = faces.lock().await.register(addr);
            Ok(format!("OK {}", face.0))
        }
        "NEWFORWARDINGRULE" => {
            let name_str = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("NEWFORWARDINGRULE requires a name"))?;
            let face_str = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("NEWFORWARDINGRULE requires a face id"))?;
            let face = FaceId(face_str.parse()?);
            let prefix = Name::from_string(name_str);
            match icn
                .send(IcnCommand::AddRoute { prefix, face })
                .await?
            {
                IcnCommandResponse::Ack => Ok("OK".to_string()),
                other => Err(anyhow::anyhow!("unexpected ICN response {:?}", other)),
            }
        }
        "NEWCONTENT" => {
            let name_str = parts
                .next()
                .ok_or_else(|| anyhow::anyhow!("NEWCONTENT requires a name"))?;
            let payload_hex = parts.next().unwrap_or("");
            let payload = hex_decode(payload_hex)?;
            let content = Content::new(Name::from_string(name_str), Bytes::from(payload));
            match icn.send(IcnCommand::InsertContent { content }).await? {
                IcnCommandResponse::Ack => Ok("OK".to_string()),
                other => Err(anyhow::anyhow!("unexpected ICN response {:?}", other)),
            }
        }
        "SHUTDOWN" => {
            let _ = shutdown.send(()).await;
            Ok("OK shutting down".to_string())
        }
        other => Err(anyhow::anyhow!("unknown command {:?}", other)),
    }
}

fn hex_decode(s: &str) -> anyhow::Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        anyhow::bail!("odd-length hex payload");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .map_err(|_| anyhow::anyhow!("invalid hex byte at offset {}", i))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_decode_rejects_odd_length() {
        assert!(hex_decode("abc").is_err());
    }

    #[test]
    fn hex_decode_accepts_valid_payload() {
        assert_eq!(hex_decode("68656c6c6f").unwrap(), b"hello".to_vec());
    }
}
