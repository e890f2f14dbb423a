//! PacketEncodingLayer: bridges the LinkLayer's raw `(FaceId, Bytes)`
//! channels and the rest of the stack's `(FaceId, Packet)` channels
//! through a pluggable [`Encoder`]. Malformed wire data is logged and
//! dropped; the originating face is otherwise unaffected.

use std::sync::Arc;

use bytes::Bytes;
use log::warn;
use tokio::sync::mpsc;
use udcn_common::{Encoder, FaceId, Packet, UdcnMetrics};

pub struct PacketEncodingLayer<E: Encoder> {
    encoder: Arc<E>,
    metrics: Arc<UdcnMetrics>,

    from_link: mpsc::Receiver<(FaceId, Bytes)>,
    to_link: mpsc::Sender<(FaceId, Bytes)>,
    from_icn: mpsc::Receiver<(FaceId, Packet)>,
    to_icn: mpsc::Sender<(FaceId, Packet)>,
}

impl<E: Encoder + 'static> PacketEncodingLayer<E> {
    pub fn new(
        encoder: Arc<E>,
        metrics: Arc<UdcnMetrics>,
        from_link: mpsc::Receiver<(FaceId, Bytes)>,
        to_link: mpsc::Sender<(FaceId, Bytes)>,
        from_icn: mpsc::Receiver<(FaceId, Packet)>,
        to_icn: mpsc::Sender<(FaceId, Packet)>,
    ) -> Self {
        Self {
            encoder,
            metrics,
            from_link,
            to_link,
            from_icn,
            to_icn,
        }
    }

    pub async fn run(mut self) {
        loop {
            tokio::select! {
                Some((face, bytes)) = self.from_link.recv() => {
                    self.decode_and_forward(face, bytes).await;
                }
                Some((face, packet)) = self.from_icn.recv() => {
                    self.encode_and_forward(face, packet).await;
                }
                else => break,
            }
        }
    }

    async fn decode_and_forward(&mut self, face: FaceId, bytes: Bytes) {
        match self.encoder.decode(&bytes) {
            Ok(packet) => {
                self.metrics.bytes_received.add(bytes.len() as u64);
                let _ = self.to_icn.send((face, packet)).await;
            }
            Err(e) => {
                warn!("Dropping malformed packet from {}: {}", face, e);
            }
        }
    }

    async fn encode_and_forward(&mut self, face: FaceId, packet: Packet) {
        match self.encoder.encode(&packet) {
            Ok(bytes) => {
                self.metrics.bytes_sent.add(bytes.len() as u64);
                let _ = self.to_link.send((face, bytes)).await;
            }
            Err(e) => {
                warn!("Failed to encode outgoing {} for {}: {}", packet.kind(), face, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udcn_common::{Interest, Name, TlvEncoder};

    #[tokio::test]
    async fn decodes_inbound_and_encodes_outbound_symmetrically() {
        let (link_tx, link_rx) = mpsc::channel(8);
        let (to_link_tx, mut to_link_rx) = mpsc::channel(8);
        let (icn_tx, mut icn_rx) = mpsc::channel(8);
        let (to_icn_tx, to_icn_rx) = mpsc::channel(8);

        let layer = PacketEncodingLayer::new(
            Arc::new(TlvEncoder),
            Arc::new(UdcnMetrics::new()),
            link_rx,
            to_link_tx,
            to_icn_rx,
            icn_tx,
        );
        tokio::spawn(layer.run());

        let packet: Packet = Interest::new(Name::from_string("/a/b")).into();
        let wire = TlvEncoder.encode(&packet).unwrap();
        link_tx.send((FaceId(3), wire)).await.unwrap();

        let (face, decoded) = icn_rx.recv().await.unwrap();
        assert_eq!(face, FaceId(3));
        assert_eq!(decoded.name(), packet.name());

        to_icn_tx.send((FaceId(3), packet.clone())).await.unwrap();
        let (face, bytes) = to_link_rx.recv().await.unwrap();
        assert_eq!(face, FaceId(3));
        assert_eq!(TlvEncoder.decode(&bytes).unwrap().name(), packet.name());
    }

    #[tokio::test]
    async fn malformed_inbound_bytes_are_dropped_not_forwarded() {
        let (link_tx, link_rx) = mpsc::channel(8);
        let (to_link_tx, _to_link_rx) = mpsc::channel(8);
        let (icn_tx, mut icn_rx) = mpsc::channel(8);
        let (_to_icn_tx, to_icn_rx) = mpsc::channel(8);

        let layer = PacketEncodingLayer::new(
            Arc::new(TlvEncoder),
            Arc::new(UdcnMetrics::new()),
            link_rx,
            to_link_tx,
            to_icn_rx,
            icn_tx,
        );
        tokio::spawn(layer.run());

        link_tx
            .send((FaceId(1), Bytes::from_static(b"not a tlv packet")))
            .await
            .unwrap();
        link_tx
            .send((FaceId(1), TlvEncoder.encode(&Interest::new(Name::from_string("/ok")).into()).unwrap()))
            .await
            .unwrap();

        let (_face, packet) = icn_rx.recv().await.unwrap();
        assert_eq!(packet.name(), &Name::from_string("/ok"));
    }
}
