//! ICNLayer: the core forwarding engine. Owns the Content Store,
//! Pending Interest Table and Forwarding Information Base, and runs the
//! Interest/Content/Nack state machine described in spec §4.1.
//!
//! Runs as its own `tokio::task`. Every other layer and the management
//! socket reach the tables only by sending an [`IcnCommand`] across
//! [`IcnHandle`] and awaiting the `oneshot` reply — there is no shared
//! `Mutex` crossing a layer boundary.

use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use udcn_common::{
    Content, FaceId, Interest, Nack, NackReason, Name, Packet, UdcnMetrics, APP_FACE,
};

use crate::cs::ContentStore;
use crate::fib::ForwardingInformationBase;
use crate::pit::PendingInterestTable;

/// An item exchanged with a peer face: the face it arrived from / must
/// be sent to, and the packet itself.
pub type FacePacket = (FaceId, Packet);

/// Requests the owning task serializes control-plane access through.
#[derive(Debug)]
pub enum IcnCommand {
    AddRoute { prefix: Name, face: FaceId },
    RemoveRoute { prefix: Name },
    InsertContent { content: Content },
    ListRoutes,
    /// Forwards `name` to its FIB-resolved face directly, bypassing the
    /// PIT. Used by the NFN layer's REWRITE state to delegate a whole
    /// computation to a peer: re-emitting a plain Interest instead would
    /// be silently absorbed by ordinary PIT aggregation against the
    /// caller's own still-pending entry for the same name.
    ForwardInterest { name: Name },
}

#[derive(Debug)]
pub enum IcnCommandResponse {
    Ack,
    Routes(Vec<(Name, FaceId)>),
    /// Whether `ForwardInterest` found a FIB route to send on.
    Forwarded(bool),
}

/// Handle used by foreign tasks (the management socket) to reach the
/// ICNLayer's tables without sharing memory.
#[derive(Clone)]
pub struct IcnHandle {
    tx: mpsc::Sender<(IcnCommand, oneshot::Sender<IcnCommandResponse>)>,
}

impl IcnHandle {
    pub async fn send(&self, command: IcnCommand) -> anyhow::Result<IcnCommandResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send((command, reply_tx))
            .await
            .map_err(|_| anyhow::anyhow!("ICNLayer command channel closed"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("ICNLayer dropped the reply channel"))
    }
}

/// Configuration the ICNLayer needs beyond the tables themselves.
pub struct IcnConfig {
    pub pit_timeout: Duration,
    pub ageing_interval: Duration,
    pub interest_to_app: bool,
    pub cache_unsolicited: bool,
}

pub struct IcnLayer {
    cs: ContentStore,
    pit: PendingInterestTable,
    fib: ForwardingInformationBase,
    config: IcnConfig,
    metrics: std::sync::Arc<UdcnMetrics>,

    from_below: mpsc::Receiver<FacePacket>,
    to_below: mpsc::Sender<FacePacket>,
    from_above: mpsc::Receiver<Packet>,
    to_above: mpsc::Sender<Packet>,
    commands: mpsc::Receiver<(IcnCommand, oneshot::Sender<IcnCommandResponse>)>,
}

impl IcnLayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        cs: ContentStore,
        fib: ForwardingInformationBase,
        config: IcnConfig,
        metrics: std::sync::Arc<UdcnMetrics>,
        from_below: mpsc::Receiver<FacePacket>,
        to_below: mpsc::Sender<FacePacket>,
        from_above: mpsc::Receiver<Packet>,
        to_above: mpsc::Sender<Packet>,
    ) -> (Self, IcnHandle) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let layer = Self {
            cs,
            pit: PendingInterestTable::new(),
            fib,
            config,
            metrics,
            from_below,
            to_below,
            from_above,
            to_above,
            commands: cmd_rx,
        };
        (layer, IcnHandle { tx: cmd_tx })
    }

    pub async fn run(mut self) {
        let mut ageing = interval(self.config.ageing_interval);
        loop {
            tokio::select! {
                Some((face, packet)) = self.from_below.recv() => {
                    self.handle_packet(face, packet).await;
                }
                Some(packet) = self.from_above.recv() => {
                    self.handle_packet(APP_FACE, packet).await;
                }
                Some((command, reply)) = self.commands.recv() => {
                    let response = self.handle_command(command).await;
                    let _ = reply.send(response);
                }
                _ = ageing.tick() => {
                    self.age().await;
                }
                else => break,
            }
        }
        info!("ICNLayer shutting down");
    }

    async fn handle_command(&mut self, command: IcnCommand) -> IcnCommandResponse {
        match command {
            IcnCommand::AddRoute { prefix, face } => {
                self.fib.insert(prefix, face);
                IcnCommandResponse::Ack
            }
            IcnCommand::RemoveRoute { prefix } => {
                self.fib.remove(&prefix);
                IcnCommandResponse::Ack
            }
            IcnCommand::InsertContent { content } => {
                self.cs.insert(content);
                IcnCommandResponse::Ack
            }
            IcnCommand::ListRoutes => {
                IcnCommandResponse::Routes(self.fib.entries().to_vec())
            }
            IcnCommand::ForwardInterest { name } => match self.fib.lookup(&name) {
                Some(fib_face) => {
                    debug!("Delegating Interest {} to {} on behalf of NFN layer", name, fib_face);
                    self.emit_downstream(fib_face, Interest::new(name).into()).await;
                    IcnCommandResponse::Forwarded(true)
                }
                None => IcnCommandResponse::Forwarded(false),
            },
        }
    }

    async fn handle_packet(&mut self, face: FaceId, packet: Packet) {
        match packet {
            Packet::Interest(interest) => self.handle_interest(face, interest).await,
            Packet::Content(content) => self.handle_content(face, content).await,
            Packet::Nack(nack) => self.handle_nack(face, nack).await,
        }
        self.cs.record_metrics(&self.metrics);
        self.pit.record_metrics(&self.metrics);
        self.fib.record_metrics(&self.metrics);
    }

    async fn handle_interest(&mut self, face: FaceId, interest: Interest) {
        self.metrics.interests_received.increment();
        let name = interest.name.clone();

        if let Some(content) = self.cs.get(&name) {
            debug!("CS hit for {}", name);
            self.metrics.cs_hits.increment();
            self.emit_to(face, Content::new(content.name, content.payload).into())
                .await;
            return;
        }
        self.metrics.cs_misses.increment();

        if self.pit.contains(&name) {
            debug!("Aggregating Interest for {} from {}", name, face);
            self.pit.add_or_aggregate(name, face, None, face == APP_FACE);
            self.metrics.pit_hits.increment();
            return;
        }

        if self.config.interest_to_app && name.is_nfn() && self.fib.lookup(&name).is_none() {
            debug!("Handing unmatched NFN Interest {} to local app", name);
            self.pit.add_or_aggregate(name, face, None, true);
            let _ = self.to_above.send(Interest::new(interest.name).into()).await;
            return;
        }

        match self.fib.lookup(&name) {
            Some(fib_face) => {
                debug!("Forwarding Interest {} to {}", name, fib_face);
                self.metrics.fib_hits.increment();
                self.pit.add_or_aggregate(name.clone(), face, Some(fib_face), false);
                self.metrics.pit_inserts.increment();
                self.metrics.interests_forwarded.increment();
                self.emit_downstream(fib_face, Interest::new(name).into()).await;
            }
            None => {
                warn!("No route for {}", name);
                self.metrics.fib_misses.increment();
                self.emit_to(face, Nack::new(name, NackReason::NoRoute).into()).await;
            }
        }
    }

    async fn handle_content(&mut self, _face: FaceId, content: Content) {
        self.metrics.data_received.increment();
        let name = content.name.clone();

        let entry = match self.pit.remove(&name) {
            Some(entry) => entry,
            None => {
                if self.config.cache_unsolicited {
                    self.cs.insert(content);
                    self.metrics.cs_inserts.increment();
                }
                return;
            }
        };

        for incoming in &entry.incoming_faces {
            if *incoming == APP_FACE {
                let _ = self.to_above.send(Packet::Content(content.clone())).await;
            } else {
                self.emit_downstream(*incoming, Packet::Content(content.clone())).await;
            }
        }

        self.cs.insert(content);
        self.metrics.cs_inserts.increment();
        self.metrics.interests_satisfied.increment();
    }

    async fn handle_nack(&mut self, _face: FaceId, nack: Nack) {
        let entry = match self.pit.remove(&nack.name) {
            Some(entry) => entry,
            None => return,
        };
        for incoming in &entry.incoming_faces {
            if *incoming == APP_FACE {
                let _ = self.to_above.send(Packet::Nack(nack.clone())).await;
            } else {
                self.emit_downstream(*incoming, Packet::Nack(nack.clone())).await;
            }
        }
    }

    async fn age(&mut self) {
        let timed_out = self.pit.age(self.config.pit_timeout);
        for (name, entry) in timed_out {
            self.metrics.pit_expirations.increment();
            let nack: Packet = Nack::new(name.clone(), NackReason::NotSet).into();
            for incoming in &entry.incoming_faces {
                if *incoming == APP_FACE {
                    let _ = self.to_above.send(nack.clone()).await;
                } else {
                    self.emit_downstream(*incoming, nack.clone()).await;
                }
            }
        }
        let evicted = self.cs.age();
        if !evicted.is_empty() {
            debug!("CS ageing evicted {} entries", evicted.len());
        }
        self.cs.record_metrics(&self.metrics);
        self.pit.record_metrics(&self.metrics);
    }

    /// Sends a packet back to whoever originated the Interest: downward
    /// to a peer face, or upward if the origin was the local app.
    async fn emit_to(&mut self, face: FaceId, packet: Packet) {
        if face == APP_FACE {
            let _ = self.to_above.send(packet).await;
        } else {
            self.emit_downstream(face, packet).await;
        }
    }

    async fn emit_downstream(&mut self, face: FaceId, packet: Packet) {
        if self.to_below.send((face, packet)).await.is_err() {
            warn!("ICNLayer: downstream channel closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn spawn_layer() -> (
        mpsc::Sender<FacePacket>,
        mpsc::Receiver<FacePacket>,
        mpsc::Sender<Packet>,
        mpsc::Receiver<Packet>,
        IcnHandle,
    ) {
        let (below_tx, below_rx) = mpsc::channel(16);
        let (to_below_tx, to_below_rx) = mpsc::channel(16);
        let (above_tx, above_rx) = mpsc::channel(16);
        let (to_above_tx, to_above_rx) = mpsc::channel(16);

        let cs = ContentStore::new(16, Duration::from_secs(10));
        let fib = ForwardingInformationBase::new();
        let config = IcnConfig {
            pit_timeout: Duration::from_millis(50),
            ageing_interval: Duration::from_millis(10),
            interest_to_app: false,
            cache_unsolicited: false,
        };
        let (layer, handle) = IcnLayer::new(
            cs,
            fib,
            config,
            Arc::new(UdcnMetrics::new()),
            below_rx,
            to_below_tx,
            above_rx,
            to_above_tx,
        );
        tokio::spawn(layer.run());
        (below_tx, to_below_rx, above_tx, to_above_rx, handle)
    }

    #[tokio::test]
    async fn aggregates_duplicate_interests_and_fans_out_content() {
        let (below_tx, mut to_below_rx, _above_tx, _to_above_rx, handle) = spawn_layer();
        let name = Name::from_string("/foo/bar");
        handle
            .send(IcnCommand::AddRoute {
                prefix: Name::from_string("/foo"),
                face: FaceId(9),
            })
            .await
            .unwrap();

        below_tx
            .send((FaceId(1), Interest::new(name.clone()).into()))
            .await
            .unwrap();
        below_tx
            .send((FaceId(2), Interest::new(name.clone()).into()))
            .await
            .unwrap();

        // Only one Interest forwarded, to face 9.
        let (fwd_face, fwd_packet) = to_below_rx.recv().await.unwrap();
        assert_eq!(fwd_face, FaceId(9));
        assert_eq!(fwd_packet.kind(), "Interest");

        // Content from the FIB face satisfies both waiters.
        below_tx
            .send((
                FaceId(9),
                Content::new(name.clone(), bytes::Bytes::from_static(b"hi")).into(),
            ))
            .await
            .unwrap();

        let mut seen = std::collections::HashSet::new();
        for _ in 0..2 {
            let (face, packet) = to_below_rx.recv().await.unwrap();
            assert_eq!(packet.kind(), "Content");
            seen.insert(face);
        }
        assert!(seen.contains(&FaceId(1)));
        assert!(seen.contains(&FaceId(2)));
    }

    #[tokio::test]
    async fn no_route_yields_nack_to_originator_only() {
        let (below_tx, mut to_below_rx, _above_tx, _to_above_rx, _handle) = spawn_layer();
        let name = Name::from_string("/unknown/x");
        below_tx
            .send((FaceId(1), Interest::new(name.clone()).into()))
            .await
            .unwrap();

        let (face, packet) = to_below_rx.recv().await.unwrap();
        assert_eq!(face, FaceId(1));
        match packet {
            Packet::Nack(nack) => {
                assert_eq!(nack.name, name);
                assert_eq!(nack.reason, NackReason::NoRoute);
            }
            other => panic!("expected Nack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn pit_ageing_nacks_all_waiters() {
        let (below_tx, mut to_below_rx, _above_tx, _to_above_rx, handle) = spawn_layer();
        handle
            .send(IcnCommand::AddRoute {
                prefix: Name::from_string("/slow"),
                face: FaceId(9),
            })
            .await
            .unwrap();
        let name = Name::from_string("/slow");
        below_tx
            .send((FaceId(1), Interest::new(name.clone()).into()))
            .await
            .unwrap();

        // Drain the forwarded Interest toward face 9.
        let _ = to_below_rx.recv().await.unwrap();

        // No Content ever arrives; ageing should Nack face 1 with NOT_SET.
        let (face, packet) = to_below_rx.recv().await.unwrap();
        assert_eq!(face, FaceId(1));
        match packet {
            Packet::Nack(nack) => assert_eq!(nack.reason, NackReason::NotSet),
            other => panic!("expected Nack, got {:?}", other),
        }
    }
}
