//! Management-socket command implementations for µDCN CLI.
//!
//! Speaks the forwarder's line-oriented TCP control protocol: one line
//! out, one `OK ...` or `ERR ...` line back.

use anyhow::{bail, Context, Result};
use log::info;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// Sends a single line to the management socket at `addr` and returns
/// its one-line reply, stripped of the trailing `OK`/`ERR` framing.
pub(crate) async fn send_line(addr: &str, line: &str) -> Result<String> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to management socket at {}", addr))?;
    let (read_half, mut write_half) = stream.into_split();
    write_half.write_all(line.as_bytes()).await?;
    write_half.write_all(b"\n").await?;

    let mut reply = String::new();
    BufReader::new(read_half).read_line(&mut reply).await?;
    let reply = reply.trim_end().to_string();
    if let Some(rest) = reply.strip_prefix("ERR ") {
        bail!("{}", rest);
    }
    Ok(reply)
}

pub async fn new_face(management: String, addr: String) -> Result<()> {
    info!("Registering face for {}", addr);
    let reply = send_line(&management, &format!("NEWFACE {}", addr)).await?;
    println!("{}", reply);
    Ok(())
}

pub async fn new_forwarding_rule(management: String, prefix: String, face: u32) -> Result<()> {
    info!("Adding forwarding rule {} -> face {}", prefix, face);
    let reply = send_line(&management, &format!("NEWFORWARDINGRULE {} {}", prefix, face)).await?;
    println!("{}", reply);
    Ok(())
}

pub async fn new_content(management: String, name: String, payload: String) -> Result<()> {
    info!("Inserting content for {}", name);
    let hex_payload = hex_encode(payload.as_bytes());
    let reply = send_line(&management, &format!("NEWCONTENT {} {}", name, hex_payload)).await?;
    println!("{}", reply);
    Ok(())
}

pub async fn shutdown(management: String) -> Result<()> {
    info!("Requesting forwarder shutdown");
    let reply = send_line(&management, "SHUTDOWN").await?;
    println!("{}", reply);
    Ok(())
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(s, "{:02x}", b);
    }
    s
}
