//! ChunkLayer: fragments outgoing Content whose payload exceeds
//! `chunk_size` into numbered chunks plus a manifest, and reassembles
//! incoming chunk sequences addressed by a manifest. The upper layer
//! (TimeoutPrevention/NFN) sees only whole Content objects; fragments
//! never cross that boundary.
//!
//! Wire convention: a manifest Content keeps the original name (so it
//! satisfies the ICN Pending Interest Table entry for that name) and is
//! distinguished from ordinary payload by a one-byte sentinel prefix
//! ([`MANIFEST_MARKER`]) that only this layer interprets. Individual
//! chunk `k` of `<name>` is addressed on the wire as `<name>/CHUNK/<k>`
//! — an ordinary `Name`, indistinguishable at any other layer from a
//! user-chosen component.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, Bytes, BytesMut};
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::time::interval;
use udcn_common::{Content, Name, Nack, NackReason, Packet, UdcnMetrics};

/// First byte of a manifest payload; distinguishes it from ordinary
/// content so ChunkLayer never hands a manifest up as if it were final
/// data.
const MANIFEST_MARKER: u8 = 0xCE;

fn chunk_name(base: &Name, k: usize) -> Name {
    base.clone()
        .with_pushed(b"CHUNK".to_vec())
        .with_pushed(k.to_string().into_bytes())
}

/// True if `name`'s last two components are `CHUNK/<k>`; returns the
/// base name and chunk index.
fn parse_chunk_name(name: &Name) -> Option<(Name, usize)> {
    if name.len() < 2 {
        return None;
    }
    let components = name.components();
    let k_component = &components[components.len() - 1];
    let tag_component = &components[components.len() - 2];
    if tag_component.as_bytes().as_ref() != b"CHUNK" {
        return None;
    }
    let k: usize = std::str::from_utf8(k_component.as_bytes())
        .ok()?
        .parse()
        .ok()?;
    Some((name.prefix(name.len() - 2), k))
}

fn encode_manifest(chunk_sizes: &[usize]) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u8(MANIFEST_MARKER);
    buf.put_u32(chunk_sizes.len() as u32);
    for &size in chunk_sizes {
        buf.put_u32(size as u32);
    }
    buf.freeze()
}

fn decode_manifest(payload: &Bytes) -> Option<Vec<usize>> {
    if payload.first() != Some(&MANIFEST_MARKER) {
        return None;
    }
    let mut buf = payload.slice(1..);
    if buf.remaining() < 4 {
        return None;
    }
    let count = buf.get_u32() as usize;
    let mut sizes = Vec::with_capacity(count);
    for _ in 0..count {
        if buf.remaining() < 4 {
            return None;
        }
        sizes.push(buf.get_u32() as usize);
    }
    Some(sizes)
}

/// Fragments served by this node for names it produced large Content
/// for; answers chunk/manifest Interests directly without bothering the
/// layer above.
struct OutgoingChunks {
    manifest: Bytes,
    chunks: Vec<Bytes>,
}

struct ReassemblyState {
    total: usize,
    collected: Vec<Option<Bytes>>,
    remaining: usize,
    deadline: Instant,
}

pub struct ChunkLayer {
    chunk_size: usize,
    chunk_timeout: Duration,
    metrics: std::sync::Arc<UdcnMetrics>,

    outgoing: HashMap<Name, OutgoingChunks>,
    reassembly: HashMap<Name, ReassemblyState>,

    from_below: mpsc::Receiver<Packet>,
    to_below: mpsc::Sender<Packet>,
    from_above: mpsc::Receiver<Packet>,
    to_above: mpsc::Sender<Packet>,
}

impl ChunkLayer {
    pub fn new(
        chunk_size: usize,
        chunk_timeout: Duration,
        metrics: std::sync::Arc<UdcnMetrics>,
        from_below: mpsc::Receiver<Packet>,
        to_below: mpsc::Sender<Packet>,
        from_above: mpsc::Receiver<Packet>,
        to_above: mpsc::Sender<Packet>,
    ) -> Self {
        Self {
            chunk_size,
            chunk_timeout,
            metrics,
            outgoing: HashMap::new(),
            reassembly: HashMap::new(),
            from_below,
            to_below,
            from_above,
            to_above,
        }
    }

    pub async fn run(mut self) {
        let mut ageing = interval(self.chunk_timeout.min(Duration::from_secs(1)));
        loop {
            tokio::select! {
                Some(packet) = self.from_below.recv() => {
                    self.handle_from_below(packet).await;
                }
                Some(packet) = self.from_above.recv() => {
                    self.handle_from_above(packet).await;
                }
                _ = ageing.tick() => {
                    self.age().await;
                }
                else => break,
            }
        }
    }

    async fn handle_from_above(&mut self, packet: Packet) {
        match packet {
            Packet::Content(content) if content.payload.len() > self.chunk_size => {
                self.fragment_and_reply(content).await;
            }
            other => {
                let _ = self.to_below.send(other).await;
            }
        }
    }

    async fn fragment_and_reply(&mut self, content: Content) {
        let name = content.name.clone();
        let chunks: Vec<Bytes> = content
            .payload
            .chunks(self.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect();
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        let manifest = encode_manifest(&sizes);

        debug!(
            "Fragmenting {} ({} bytes) into {} chunks",
            name,
            content.payload.len(),
            chunks.len()
        );
        self.metrics.chunks_fragmented.add(chunks.len() as u64);

        self.outgoing.insert(
            name.clone(),
            OutgoingChunks {
                manifest: manifest.clone(),
                chunks,
            },
        );

        let _ = self
            .to_below
            .send(Content::new(name, manifest).into())
            .await;
    }

    async fn handle_from_below(&mut self, packet: Packet) {
        match packet {
            Packet::Interest(interest) => self.handle_interest_from_below(interest.name).await,
            Packet::Content(content) => self.handle_content_from_below(content).await,
            Packet::Nack(nack) => self.handle_nack_from_below(nack).await,
        }
    }

    async fn handle_interest_from_below(&mut self, name: Name) {
        if let Some((base, k)) = parse_chunk_name(&name) {
            if let Some(fragments) = self.outgoing.get(&base) {
                if let Some(chunk) = fragments.chunks.get(k) {
                    let _ = self
                        .to_below
                        .send(Content::new(name, chunk.clone()).into())
                        .await;
                    return;
                }
            }
        }
        if let Some(fragments) = self.outgoing.get(&name) {
            let _ = self
                .to_below
                .send(Content::new(name, fragments.manifest.clone()).into())
                .await;
            return;
        }
        let _ = self.to_below.send(Packet::Interest(udcn_common::Interest::new(name))).await;
    }

    async fn handle_content_from_below(&mut self, content: Content) {
        if let Some((base, k)) = parse_chunk_name(&content.name) {
            self.record_chunk(base, k, content.payload).await;
            return;
        }
        if let Some(sizes) = decode_manifest(&content.payload) {
            self.begin_reassembly(content.name, sizes).await;
            return;
        }
        let _ = self.to_above.send(Packet::Content(content)).await;
    }

    async fn handle_nack_from_below(&mut self, nack: Nack) {
        if let Some((base, _)) = parse_chunk_name(&nack.name) {
            if self.reassembly.remove(&base).is_some() {
                self.metrics.chunk_reassembly_timeouts.increment();
                let _ = self
                    .to_above
                    .send(Nack::new(base, nack.reason).into())
                    .await;
            }
            return;
        }
        let _ = self.to_above.send(Packet::Nack(nack)).await;
    }

    async fn begin_reassembly(&mut self, base: Name, sizes: Vec<usize>) {
        let total = sizes.len();
        debug!("Beginning reassembly of {} ({} chunks)", base, total);
        self.reassembly.insert(
            base.clone(),
            ReassemblyState {
                total,
                collected: vec![None; total],
                remaining: total,
                deadline: Instant::now() + self.chunk_timeout,
            },
        );
        for k in 0..total {
            let _ = self
                .to_below
                .send(Packet::Interest(udcn_common::Interest::new(chunk_name(&base, k))))
                .await;
        }
    }

    async fn record_chunk(&mut self, base: Name, k: usize, payload: Bytes) {
        let finished = {
            let state = match self.reassembly.get_mut(&base) {
                Some(state) => state,
                None => return,
            };
            if k >= state.total || state.collected[k].is_some() {
                return;
            }
            state.collected[k] = Some(payload);
            state.remaining -= 1;
            state.remaining == 0
        };

        if finished {
            let state = self.reassembly.remove(&base).expect("just matched above");
            let mut whole = BytesMut::new();
            for chunk in state.collected.into_iter().flatten() {
                whole.extend_from_slice(&chunk);
            }
            self.metrics.chunks_reassembled.increment();
            let _ = self
                .to_above
                .send(Content::new(base, whole.freeze()).into())
                .await;
        }
    }

    async fn age(&mut self) {
        let now = Instant::now();
        let expired: Vec<Name> = self
            .reassembly
            .iter()
            .filter(|(_, state)| now >= state.deadline)
            .map(|(name, _)| name.clone())
            .collect();
        for name in expired {
            self.reassembly.remove(&name);
            warn!("Chunk reassembly of {} timed out", name);
            self.metrics.chunk_reassembly_timeouts.increment();
            let _ = self
                .to_above
                .send(Nack::new(name, NackReason::NotSet).into())
                .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_name_roundtrip() {
        let base = Name::from_string("/bulk");
        let name = chunk_name(&base, 2);
        assert_eq!(name.to_string(), "/bulk/CHUNK/2");
        let (parsed_base, k) = parse_chunk_name(&name).unwrap();
        assert_eq!(parsed_base, base);
        assert_eq!(k, 2);
    }

    #[test]
    fn manifest_roundtrip() {
        let sizes = vec![4096, 4096, 3808];
        let encoded = encode_manifest(&sizes);
        let decoded = decode_manifest(&encoded).unwrap();
        assert_eq!(decoded, sizes);
    }

    #[test]
    fn non_manifest_payload_is_not_misread() {
        let payload = Bytes::from_static(b"ordinary content");
        assert!(decode_manifest(&payload).is_none());
    }

    struct Harness {
        below_tx: mpsc::Sender<Packet>,
        to_below_rx: mpsc::Receiver<Packet>,
        above_tx: mpsc::Sender<Packet>,
        to_above_rx: mpsc::Receiver<Packet>,
    }

    fn spawn_layer(chunk_size: usize, chunk_timeout: Duration) -> Harness {
        let (below_tx, below_rx) = mpsc::channel(32);
        let (to_below_tx, to_below_rx) = mpsc::channel(32);
        let (above_tx, above_rx) = mpsc::channel(32);
        let (to_above_tx, to_above_rx) = mpsc::channel(32);

        let layer = ChunkLayer::new(
            chunk_size,
            chunk_timeout,
            std::sync::Arc::new(UdcnMetrics::new()),
            below_rx,
            to_below_tx,
            above_rx,
            to_above_tx,
        );
        tokio::spawn(layer.run());

        Harness {
            below_tx,
            to_below_rx,
            above_tx,
            to_above_rx,
        }
    }

    #[tokio::test]
    async fn fragmenting_large_content_emits_manifest_under_original_name() {
        let mut h = spawn_layer(4096, Duration::from_secs(5));
        let name = Name::from_string("/bulk");
        let original = vec![7u8; 12_000];
        h.above_tx
            .send(Content::new(name.clone(), Bytes::from(original)).into())
            .await
            .unwrap();

        let manifest_content = match h.to_below_rx.recv().await.unwrap() {
            Packet::Content(c) => c,
            other => panic!("expected manifest Content, got {:?}", other),
        };
        assert_eq!(manifest_content.name, name);
        let sizes = decode_manifest(&manifest_content.payload).unwrap();
        assert_eq!(sizes, vec![4096, 4096, 3808]);
    }

    #[tokio::test]
    async fn chunk_interest_is_served_from_local_store() {
        let mut h = spawn_layer(4096, Duration::from_secs(5));
        let name = Name::from_string("/bulk");
        h.above_tx
            .send(Content::new(name.clone(), Bytes::from(vec![9u8; 8200])).into())
            .await
            .unwrap();
        let _manifest = h.to_below_rx.recv().await.unwrap();

        h.below_tx
            .send(Packet::Interest(udcn_common::Interest::new(chunk_name(&name, 1))))
            .await
            .unwrap();
        let reply = match h.to_below_rx.recv().await.unwrap() {
            Packet::Content(c) => c,
            other => panic!("expected chunk Content, got {:?}", other),
        };
        assert_eq!(reply.name, chunk_name(&name, 1));
        assert_eq!(reply.payload.len(), 4096);
    }

    #[tokio::test]
    async fn reassembles_manifest_and_chunks_into_original_payload() {
        let mut h = spawn_layer(4096, Duration::from_secs(5));
        let name = Name::from_string("/bulk");
        let original: Vec<u8> = (0..12_000u32).map(|i| (i % 251) as u8).collect();

        let sizes = vec![4096usize, 4096, 3808];
        let manifest = Content::new(name.clone(), encode_manifest(&sizes));
        h.below_tx.send(Packet::Content(manifest)).await.unwrap();

        let mut served = Vec::new();
        for _ in 0..3 {
            let interest_name = match h.to_below_rx.recv().await.unwrap() {
                Packet::Interest(i) => i.name,
                other => panic!("expected chunk Interest, got {:?}", other),
            };
            let (base, k) = parse_chunk_name(&interest_name).unwrap();
            assert_eq!(base, name);
            served.push(k);
        }
        served.sort_unstable();
        assert_eq!(served, vec![0, 1, 2]);

        let mut offset = 0;
        for k in 0..3 {
            let end = offset + sizes[k];
            h.below_tx
                .send(Packet::Content(Content::new(
                    chunk_name(&name, k),
                    Bytes::copy_from_slice(&original[offset..end]),
                )))
                .await
                .unwrap();
            offset = end;
        }

        let reassembled = match h.to_above_rx.recv().await.unwrap() {
            Packet::Content(c) => c,
            other => panic!("expected reassembled Content, got {:?}", other),
        };
        assert_eq!(reassembled.name, name);
        assert_eq!(reassembled.payload.as_ref(), original.as_slice());
    }

    #[tokio::test]
    async fn reassembly_times_out_and_nacks_upward() {
        let mut h = spawn_layer(4096, Duration::from_millis(30));
        let name = Name::from_string("/bulk");
        let manifest = Content::new(name.clone(), encode_manifest(&[4096, 100]));
        h.below_tx.send(Packet::Content(manifest)).await.unwrap();

        // Drain the two chunk Interests the layer emits but never answer them.
        for _ in 0..2 {
            let _ = h.to_below_rx.recv().await.unwrap();
        }

        let nack = tokio::time::timeout(Duration::from_millis(500), h.to_above_rx.recv())
            .await
            .expect("reassembly should time out")
            .unwrap();
        match nack {
            Packet::Nack(n) => assert_eq!(n.name, name),
            other => panic!("expected Nack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ordinary_content_passes_through_unchanged() {
        let mut h = spawn_layer(4096, Duration::from_secs(5));
        let name = Name::from_string("/small");
        h.below_tx
            .send(Content::new(name.clone(), Bytes::from_static(b"tiny")).into())
            .await
            .unwrap();
        match h.to_above_rx.recv().await.unwrap() {
            Packet::Content(c) => assert_eq!(c.name, name),
            other => panic!("expected passthrough Content, got {:?}", other),
        }
    }
}
