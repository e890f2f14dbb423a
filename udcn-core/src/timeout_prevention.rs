//! TimeoutPreventionLayer (R2C): keeps the downstream Pending Interest
//! Table entry for a long-running NFN computation alive by periodically
//! re-issuing a keep-alive Interest for it, and answers keep-alive
//! Interests directed at this node's own running computations.
//!
//! Sits between ChunkLayer (below) and NFNLayer (above). Ordinary
//! traffic passes through unchanged; only names ending `KEEPALIVE/NFN`
//! and the bookkeeping around an in-flight NFN Interest are intercepted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use udcn_common::{Content, Interest, Name, Nack, NackReason, Packet, UdcnMetrics};

/// Handle for asking whatever owns the NFN Computation Table whether a
/// computation is still running, without TimeoutPrevention owning the
/// table itself.
#[derive(Clone)]
pub struct ComputationLookup {
    tx: mpsc::Sender<(Name, oneshot::Sender<bool>)>,
}

impl ComputationLookup {
    pub fn new(tx: mpsc::Sender<(Name, oneshot::Sender<bool>)>) -> Self {
        Self { tx }
    }

    pub async fn is_running(&self, name: &Name) -> bool {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send((name.clone(), reply_tx)).await.is_err() {
            return false;
        }
        reply_rx.await.unwrap_or(false)
    }
}

struct TrackedEntry {
    timestamp: Instant,
}

#[derive(Default)]
struct MessageDict {
    entries: HashMap<Name, TrackedEntry>,
}

impl MessageDict {
    fn create(&mut self, name: Name) {
        self.entries.insert(
            name,
            TrackedEntry {
                timestamp: Instant::now(),
            },
        );
    }

    fn touch(&mut self, name: &Name) {
        if let Some(entry) = self.entries.get_mut(name) {
            entry.timestamp = Instant::now();
        }
    }

    fn remove(&mut self, name: &Name) -> bool {
        self.entries.remove(name).is_some()
    }

    fn names(&self) -> Vec<Name> {
        self.entries.keys().cloned().collect()
    }

    fn timestamp(&self, name: &Name) -> Option<Instant> {
        self.entries.get(name).map(|e| e.timestamp)
    }
}

pub struct TimeoutPreventionLayer {
    timeout_interval: Duration,
    ageing_interval: Duration,
    computations: Option<ComputationLookup>,
    dict: MessageDict,
    metrics: Arc<UdcnMetrics>,

    from_below: mpsc::Receiver<Packet>,
    to_below: mpsc::Sender<Packet>,
    from_above: mpsc::Receiver<Packet>,
    to_above: mpsc::Sender<Packet>,
}

impl TimeoutPreventionLayer {
    pub fn new(
        timeout_interval: Duration,
        ageing_interval: Duration,
        computations: Option<ComputationLookup>,
        metrics: Arc<UdcnMetrics>,
        from_below: mpsc::Receiver<Packet>,
        to_below: mpsc::Sender<Packet>,
        from_above: mpsc::Receiver<Packet>,
        to_above: mpsc::Sender<Packet>,
    ) -> Self {
        Self {
            timeout_interval,
            ageing_interval,
            computations,
            dict: MessageDict::default(),
            metrics,
            from_below,
            to_below,
            from_above,
            to_above,
        }
    }

    pub async fn run(mut self) {
        let mut ageing = interval(self.ageing_interval);
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

    async fn handle_from_below(&mut self, packet: Packet) {
        match packet {
            Packet::Interest(interest) if interest.name.is_keep_alive() => {
                self.answer_keep_alive(interest.name).await;
            }
            Packet::Interest(interest) => {
                let _ = self.to_above.send(Packet::Interest(interest)).await;
            }
            Packet::Content(content) if content.name.is_keep_alive() => {
                self.dict.touch(&content.name);
            }
            Packet::Content(content) => {
                self.clear_tracking(&content.name);
                let _ = self.to_above.send(Packet::Content(content)).await;
            }
            Packet::Nack(nack) => {
                self.clear_tracking(&nack.name);
                let _ = self.to_above.send(Packet::Nack(nack)).await;
            }
        }
    }

    /// A non-keep-alive Content/Nack satisfies the tracked NFN Interest:
    /// drop bookkeeping for both the plain and keep-alive name variants.
    fn clear_tracking(&mut self, name: &Name) {
        if self.dict.remove(name) {
            self.dict.remove(&name.add_keep_alive());
        }
    }

    async fn answer_keep_alive(&mut self, name: Name) {
        self.metrics.r2c_keepalives_received.increment();
        let running = match &self.computations {
            Some(lookup) => lookup.is_running(&name.remove_keep_alive()).await,
            None => false,
        };
        let reply: Packet = if running {
            Content::new(name, Bytes::new()).into()
        } else {
            self.metrics.r2c_orphan_keepalives.increment();
            Nack::new(name.clone(), NackReason::CompNotRunning)
                .with_originating_interest(Interest::new(name))
                .into()
        };
        let _ = self.to_below.send(reply).await;
    }

    async fn handle_from_above(&mut self, packet: Packet) {
        if let Packet::Interest(ref interest) = packet {
            if interest.name.is_nfn() && !interest.name.is_keep_alive() {
                debug!("Tracking {} for timeout prevention", interest.name);
                self.dict.create(interest.name.clone());
                self.dict.create(interest.name.add_keep_alive());
            }
        }
        let _ = self.to_below.send(packet).await;
    }

    /// Every tick: keep-alive-named entries past `timeout_interval` time
    /// out (Nack upward, drop both variants); those still fresh get a
    /// probing keep-alive Interest resent downward. Plain-named entries
    /// get their original Interest resent downward too, so intermediate
    /// hops that run their own R2C layer keep refreshing their own PIT.
    async fn age(&mut self) {
        let now = Instant::now();
        let mut expired = Vec::new();
        for name in self.dict.names() {
            let Some(timestamp) = self.dict.timestamp(&name) else {
                continue;
            };
            if name.is_keep_alive() {
                if now.duration_since(timestamp) >= self.timeout_interval {
                    expired.push(name);
                } else {
                    self.metrics.r2c_keepalives_sent.increment();
                    let _ = self
                        .to_below
                        .send(Packet::Interest(Interest::new(name)))
                        .await;
                }
            } else {
                let _ = self
                    .to_below
                    .send(Packet::Interest(Interest::new(name)))
                    .await;
            }
        }
        for name in expired {
            let original = name.remove_keep_alive();
            warn!("Timeout prevention for {} expired", original);
            self.metrics.r2c_timeouts.increment();
            self.dict.remove(&name);
            self.dict.remove(&original);
            let nack = Nack::new(original.clone(), NackReason::NotSet)
                .with_originating_interest(Interest::new(original));
            let _ = self.to_above.send(nack.into()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Harness {
        below_tx: mpsc::Sender<Packet>,
        to_below_rx: mpsc::Receiver<Packet>,
        above_tx: mpsc::Sender<Packet>,
        to_above_rx: mpsc::Receiver<Packet>,
    }

    fn spawn_layer(
        timeout_interval: Duration,
        ageing_interval: Duration,
        computations: Option<ComputationLookup>,
    ) -> Harness {
        let (below_tx, below_rx) = mpsc::channel(32);
        let (to_below_tx, to_below_rx) = mpsc::channel(32);
        let (above_tx, above_rx) = mpsc::channel(32);
        let (to_above_tx, to_above_rx) = mpsc::channel(32);

        let layer = TimeoutPreventionLayer::new(
            timeout_interval,
            ageing_interval,
            computations,
            Arc::new(UdcnMetrics::new()),
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
    async fn nfn_interest_from_above_is_tracked_and_forwarded() {
        let mut h = spawn_layer(Duration::from_secs(5), Duration::from_millis(10), None);
        let name = Name::from_string("/lib/f(/data)/NFN");
        h.above_tx
            .send(Interest::new(name.clone()).into())
            .await
            .unwrap();

        match h.to_below_rx.recv().await.unwrap() {
            Packet::Interest(i) => assert_eq!(i.name, name),
            other => panic!("expected Interest, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn content_satisfying_tracked_interest_clears_bookkeeping_and_forwards_up() {
        let mut h = spawn_layer(Duration::from_secs(5), Duration::from_millis(10), None);
        let name = Name::from_string("/lib/f(/data)/NFN");
        h.above_tx
            .send(Interest::new(name.clone()).into())
            .await
            .unwrap();
        let _ = h.to_below_rx.recv().await.unwrap();

        h.below_tx
            .send(Content::new(name.clone(), Bytes::from_static(b"result")).into())
            .await
            .unwrap();

        match h.to_above_rx.recv().await.unwrap() {
            Packet::Content(c) => assert_eq!(c.name, name),
            other => panic!("expected Content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn keep_alive_interest_is_answered_when_computation_is_running() {
        let (lookup_tx, mut lookup_rx) = mpsc::channel(8);
        tokio::spawn(async move {
            while let Some((_name, reply)) = lookup_rx.recv().await {
                let _ = reply.send(true);
            }
        });
        let mut h = spawn_layer(
            Duration::from_secs(5),
            Duration::from_millis(10),
            Some(ComputationLookup::new(lookup_tx)),
        );

        let base = Name::from_string("/lib/f(/data)/NFN");
        let keep_alive_name = base.add_keep_alive();
        h.below_tx
            .send(Interest::new(keep_alive_name.clone()).into())
            .await
            .unwrap();

        match h.to_below_rx.recv().await.unwrap() {
            Packet::Content(c) => assert_eq!(c.name, keep_alive_name),
            other => panic!("expected keep-alive ack Content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn keep_alive_interest_is_nacked_when_computation_is_unknown() {
        let mut h = spawn_layer(Duration::from_secs(5), Duration::from_millis(10), None);
        let keep_alive_name = Name::from_string("/lib/f(/data)/NFN").add_keep_alive();
        h.below_tx
            .send(Interest::new(keep_alive_name.clone()).into())
            .await
            .unwrap();

        match h.to_below_rx.recv().await.unwrap() {
            Packet::Nack(n) => {
                assert_eq!(n.name, keep_alive_name);
                assert_eq!(n.reason, NackReason::CompNotRunning);
            }
            other => panic!("expected Nack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn expired_tracking_nacks_upward() {
        let mut h = spawn_layer(Duration::from_millis(20), Duration::from_millis(5), None);
        let name = Name::from_string("/lib/f(/data)/NFN");
        h.above_tx
            .send(Interest::new(name.clone()).into())
            .await
            .unwrap();
        let _ = h.to_below_rx.recv().await.unwrap();

        let nack = tokio::time::timeout(Duration::from_millis(500), h.to_above_rx.recv())
            .await
            .expect("tracking should expire")
            .unwrap();
        match nack {
            Packet::Nack(n) => assert_eq!(n.name, name),
            other => panic!("expected Nack, got {:?}", other),
        }
    }
}
