//! Data publishing command implementation for µDCN CLI.
//!
//! Registers itself as a producer face with the forwarder, then answers
//! any Interest matching the published name from its own raw UDP socket
//! until interrupted.

use anyhow::{Context, Result};
use bytes::Bytes;
use log::{debug, info, warn};
use tokio::net::UdpSocket;
use tokio::signal;
use udcn_common::{Content, Encoder, Name, Packet, TlvEncoder};

use crate::commands::management;

/// Publishes `content` under `name`, answering Interests until Ctrl+C.
pub async fn publish_data(
    name_str: String,
    content: String,
    management_addr: String,
    advertise_addr: String,
) -> Result<()> {
    info!(
        "Publishing data: name={}, content_len={}",
        name_str,
        content.len()
    );

    let name = Name::from_string(&name_str);
    let payload = Bytes::from(content.clone());

    let socket = UdpSocket::bind(&advertise_addr)
        .await
        .with_context(|| format!("failed to bind producer socket on {}", advertise_addr))?;
    let local_addr = socket.local_addr()?;

    println!("Publishing Data:");
    println!("  Name: {}", name_str);
    println!(
        "  Content ({} bytes): {}",
        content.len(),
        if content.len() > 32 {
            format!("{}...", &content[..30])
        } else {
            content.clone()
        }
    );
    println!("  Listening on {}", local_addr);

    let reply = management::send_line(&management_addr, &format!("NEWFACE {}", local_addr)).await?;
    let face: u32 = reply
        .strip_prefix("OK ")
        .and_then(|id| id.trim().parse().ok())
        .context("forwarder did not return a face id for NEWFACE")?;
    management::send_line(&management_addr, &format!("NEWFORWARDINGRULE {} {}", name_str, face))
        .await?;

    println!("Registered as face {} for prefix {}", face, name_str);
    println!("Waiting for Interests (press Ctrl+C to exit)...");

    let mut buf = vec![0u8; 65_507];
    loop {
        tokio::select! {
            result = socket.recv_from(&mut buf) => {
                let (len, from) = result?;
                match TlvEncoder.decode(&buf[..len]) {
                    Ok(Packet::Interest(interest)) if name.is_prefix_of(&interest.name) => {
                        debug!("Answering Interest {} from {}", interest.name, from);
                        let content: Packet = Content::new(interest.name, payload.clone()).into();
                        let wire = TlvEncoder.encode(&content)?;
                        socket.send_to(&wire, from).await?;
                    }
                    Ok(Packet::Interest(other)) => {
                        debug!("Ignoring Interest for unrelated name {}", other.name);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Dropping malformed datagram from {}: {}", from, e),
                }
            }
            _ = signal::ctrl_c() => {
                println!("Shutting down producer...");
                break;
            }
        }
    }

    Ok(())
}
