//! UDP/IPv4 LinkLayer: binds a datagram socket and exchanges
//! `(face_id, raw_bytes)` with the PacketEncodingLayer above.
//!
//! The link layer is the leaf of the pipeline — it owns no forwarding
//! state, only the socket and the face table that maps peer addresses
//! to face ids. Under sustained overload it drops incoming datagrams
//! rather than blocking on a full upward queue.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use log::{debug, trace, warn};
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, Mutex};
use udcn_common::FaceId;

use crate::face::{FaceEvent, FaceTable};

/// Maximum UDP datagram this link layer will attempt to receive.
const MAX_DATAGRAM: usize = 65_507;

/// A single inbound item: the face a datagram arrived on, and its raw
/// bytes, to be handed to the PacketEncodingLayer for decoding.
pub type LinkInbound = (FaceId, Bytes);
/// A single outbound item: the face to address bytes to, and the raw
/// bytes to send, as produced by the PacketEncodingLayer below.
pub type LinkOutbound = (FaceId, Bytes);

/// UDP/IPv4 LinkLayer. Runs its own `tokio::task`; communicates with the
/// layer above exclusively through the two bounded channels returned by
/// [`UdpLinkLayer::spawn`].
pub struct UdpLinkLayer {
    socket: Arc<UdpSocket>,
    faces: Arc<Mutex<FaceTable>>,
}

impl UdpLinkLayer {
    pub async fn bind(port: u16) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        debug!("LinkLayer bound to 0.0.0.0:{}", port);
        Ok(Self {
            socket: Arc::new(socket),
            faces: Arc::new(Mutex::new(FaceTable::new())),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn faces(&self) -> Arc<Mutex<FaceTable>> {
        Arc::clone(&self.faces)
    }

    /// Spawns the recv/send tasks and returns the channel endpoints the
    /// PacketEncodingLayer uses to talk to this link: a receiver of
    /// `(face, bytes)` pulled off the wire, and a sender of `(face,
    /// bytes)` to push onto the wire.
    pub fn spawn(
        self,
        inbound_capacity: usize,
    ) -> (
        mpsc::Receiver<LinkInbound>,
        mpsc::Sender<LinkOutbound>,
        mpsc::Sender<FaceEvent>,
        mpsc::Receiver<FaceEvent>,
    ) {
        let (up_tx, up_rx) = mpsc::channel(inbound_capacity);
        let (down_tx, mut down_rx) = mpsc::channel::<LinkOutbound>(inbound_capacity);
        let (event_tx, event_rx) = mpsc::channel(inbound_capacity);

        let recv_socket = Arc::clone(&self.socket);
        let recv_faces = Arc::clone(&self.faces);
        let recv_events = event_tx.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM];
            loop {
                let (len, addr) = match recv_socket.recv_from(&mut buf).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("LinkLayer recv error: {}", e);
                        continue;
                    }
                };
                let (face_id, event) = recv_faces.lock().await.face_for(addr);
                if let Some(event) = event {
                    let _ = recv_events.try_send(event);
                }
                let bytes = Bytes::copy_from_slice(&buf[..len]);
                // Bounded back-pressure: drop rather than block the socket
                // recv loop under sustained overload.
                if up_tx.try_send((face_id, bytes)).is_err() {
                    warn!("LinkLayer inbound queue full, dropping datagram from {}", addr);
                }
            }
        });

        let send_socket = Arc::clone(&self.socket);
        let send_faces = Arc::clone(&self.faces);
        tokio::spawn(async move {
            while let Some((face_id, bytes)) = down_rx.recv().await {
                let addr = send_faces.lock().await.addr_of(face_id);
                match addr {
                    Some(addr) => {
                        if let Err(e) = send_socket.send_to(&bytes, addr).await {
                            warn!("LinkLayer send error to {}: {}", addr, e);
                        } else {
                            trace!("LinkLayer sent {} bytes to {} ({})", bytes.len(), addr, face_id);
                        }
                    }
                    None => warn!("LinkLayer: no address known for {}", face_id),
                }
            }
        });

        (up_rx, down_tx, event_tx, event_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn roundtrips_a_datagram_between_two_link_layers() {
        let a = UdpLinkLayer::bind(0).await.unwrap();
        let b = UdpLinkLayer::bind(0).await.unwrap();
        let a_addr = a.local_addr().unwrap();

        let (mut a_up, a_down, _a_evt_tx, _a_evt_rx) = a.spawn(16);
        let (mut b_up, _b_down, _b_evt_tx, _b_evt_rx) = b.spawn(16);

        // A raw probe socket plays the role of the first-ever peer: its
        // first datagram creates a face on `a` (face ids are assigned on
        // first reception, not pre-registered).
        let probe = UdpSocket::bind("0.0.0.0:0").await.unwrap();
        probe.connect(a_addr).await.unwrap();
        probe.send(b"hello").await.unwrap();

        let (from_face, bytes) = a_up.recv().await.unwrap();
        assert_eq!(bytes.as_ref(), b"hello");
        assert_eq!(from_face, FaceId(1));

        // a now knows the probe's face id and can address a reply to it.
        a_down
            .send((from_face, Bytes::from_static(b"world")))
            .await
            .unwrap();
        let mut reply = vec![0u8; 16];
        let (len, _) = probe.recv_from(&mut reply).await.unwrap();
        assert_eq!(&reply[..len], b"world");

        drop(b_up.recv());
    }
}
