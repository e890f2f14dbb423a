//! Interest sending command implementation for µDCN CLI.

use anyhow::{Context, Result};
use log::info;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use udcn_common::{Encoder, Interest, Name, Packet, TlvEncoder};

use crate::utils::Timer;

/// Sends an Interest to `server` and prints the Content/Nack reply.
pub async fn send_interest(name_str: String, timeout_ms: u64, server: String) -> Result<()> {
    info!("Sending Interest: name={}, timeout={}ms", name_str, timeout_ms);

    let name = Name::from_string(&name_str);
    let packet: Packet = Interest::new(name).into();
    let wire = TlvEncoder.encode(&packet)?;

    println!("Sending Interest: {}", name_str);
    println!("Timeout: {}ms", timeout_ms);

    let socket = UdpSocket::bind("0.0.0.0:0").await?;
    socket.connect(&server).await.with_context(|| format!("failed to reach {}", server))?;

    let _timer = Timer::new(&format!("interest {}", name_str));
    socket.send(&wire).await?;

    let mut buf = vec![0u8; 65_507];
    match timeout(std::time::Duration::from_millis(timeout_ms), socket.recv(&mut buf)).await {
        Ok(Ok(len)) => match TlvEncoder.decode(&buf[..len]) {
            Ok(Packet::Content(content)) => {
                println!("\nReceived Content:");
                println!("  Name: {}", content.name);
                if let Ok(text) = std::str::from_utf8(&content.payload) {
                    println!("  Payload ({} bytes): {}", content.payload.len(), text);
                } else {
                    println!("  Payload: {} bytes", content.payload.len());
                }
            }
            Ok(Packet::Nack(nack)) => {
                println!("\nReceived Nack for {}: {}", nack.name, nack.reason);
            }
            Ok(Packet::Interest(_)) => {
                println!("\nUnexpected Interest echoed back, ignoring");
            }
            Err(e) => println!("Failed to decode reply: {}", e),
        },
        Ok(Err(e)) => println!("Socket error: {}", e),
        Err(_) => println!("Timeout after {}ms", timeout_ms),
    }

    Ok(())
}
