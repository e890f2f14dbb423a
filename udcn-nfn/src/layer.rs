//! NFNLayer: parses NFN Interests into expressions, fetches any named
//! data they still need, runs them on the executor pool or delegates
//! them to a peer, and replies with Content or Nack. Implements the
//! state machine described in [`crate::table`].
//!
//! Sits above TimeoutPreventionLayer — the topmost layer in the stack,
//! playing the role the local application plays for ordinary ICN
//! traffic. Reaches the ICNLayer's FIB only through [`IcnHandle`] (to
//! delegate a REWRITE), never by sharing its tables.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use udcn_common::{Content, Error, Interest, Name, Nack, NackReason, Packet, UdcnMetrics};
use udcn_core::{IcnCommand, IcnCommandResponse, IcnHandle};

use crate::executor::{ExecValue, ExecutorPool};
use crate::optimizer::{ForwardingDecision, NfnOptimizer};
use crate::parser::parse_network_name;
use crate::table::{ComputationState, NfnComputationTable};

pub use udcn_core::ComputationLookup;

/// Configuration the NFNLayer needs beyond the executor pool itself.
pub struct NfnConfig {
    /// How long a Finished/Failed computation is kept around (for
    /// introspection and any in-flight duplicate lookups) before the
    /// periodic sweep drops it.
    pub computation_grace: Duration,
    /// How often the sweep runs.
    pub sweep_interval: Duration,
}

pub struct NfnLayer {
    table: NfnComputationTable,
    optimizer: Box<dyn NfnOptimizer>,
    executors: Arc<ExecutorPool>,
    icn: IcnHandle,
    config: NfnConfig,
    metrics: Arc<UdcnMetrics>,

    /// Dependency name -> computations waiting on it, so an arriving
    /// Content/Nack can be routed back to every computation it unblocks.
    dependency_waiters: HashMap<Name, Vec<Name>>,

    from_below: mpsc::Receiver<Packet>,
    to_below: mpsc::Sender<Packet>,
    lookup_rx: mpsc::Receiver<(Name, oneshot::Sender<bool>)>,

    done_tx: mpsc::Sender<(Name, Result<ExecValue, Error>)>,
    done_rx: mpsc::Receiver<(Name, Result<ExecValue, Error>)>,
}

impl NfnLayer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        optimizer: Box<dyn NfnOptimizer>,
        executors: Arc<ExecutorPool>,
        icn: IcnHandle,
        config: NfnConfig,
        metrics: Arc<UdcnMetrics>,
        from_below: mpsc::Receiver<Packet>,
        to_below: mpsc::Sender<Packet>,
    ) -> (Self, ComputationLookup) {
        let (lookup_tx, lookup_rx) = mpsc::channel(64);
        let (done_tx, done_rx) = mpsc::channel(64);
        let layer = Self {
            table: NfnComputationTable::new(),
            optimizer,
            executors,
            icn,
            config,
            metrics,
            dependency_waiters: HashMap::new(),
            from_below,
            to_below,
            lookup_rx,
            done_tx,
            done_rx,
        };
        (layer, ComputationLookup::new(lookup_tx))
    }

    pub async fn run(mut self) {
        let mut sweep = interval(self.config.sweep_interval);
        loop {
            tokio::select! {
                Some(packet) = self.from_below.recv() => {
                    self.handle_packet(packet).await;
                }
                Some((name, reply)) = self.lookup_rx.recv() => {
                    let _ = reply.send(self.table.is_running(&name));
                }
                Some((name, result)) = self.done_rx.recv() => {
                    self.handle_computation_result(name, result).await;
                }
                _ = sweep.tick() => {
                    let swept = self.table.sweep_finished(self.config.computation_grace);
                    if !swept.is_empty() {
                        debug!("NFNLayer swept {} finished computations", swept.len());
                    }
                }
                else => break,
            }
        }
        log::info!("NFNLayer shutting down");
    }

    async fn handle_packet(&mut self, packet: Packet) {
        match packet {
            Packet::Interest(interest) => self.handle_interest(interest).await,
            Packet::Content(content) => self.handle_content(content).await,
            Packet::Nack(nack) => self.handle_nack(nack).await,
        }
    }

    async fn handle_interest(&mut self, interest: Interest) {
        let name = interest.name;
        if !name.is_nfn() {
            warn!("NFNLayer received a non-NFN Interest {}, dropping", name);
            return;
        }

        let (prefix, expr) = match parse_network_name(&name) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("failed to parse NFN expression in {}: {}", name, e);
                let _ = self
                    .to_below
                    .send(Nack::new(name, NackReason::NotSet).into())
                    .await;
                return;
            }
        };

        if !self.table.start(&name, &prefix, &expr) {
            debug!("NFNLayer: {} already in flight", name);
            return;
        }
        self.metrics.nfn_computations_started.increment();
        self.metrics.nfn_computations_active.increment();
        self.plan(name).await;
    }

    /// Looks at what a computation still needs and advances its state:
    /// fetch more data, run it locally, or delegate it to a peer.
    async fn plan(&mut self, name: Name) {
        let Some(entry) = self.table.get(&name) else {
            return;
        };
        let expr = entry.expr.clone();
        let available: Vec<Name> = entry.resolved.keys().cloned().collect();
        let required = self.optimizer.required_data(&expr, &available);

        if !required.is_empty() {
            self.table.set_state(&name, ComputationState::PendingData);
            for dep in required {
                let already_outstanding = {
                    let entry = self.table.get_mut(&name).expect("entry exists, set above");
                    !entry.outstanding.insert(dep.clone())
                };
                if already_outstanding {
                    continue;
                }
                self.dependency_waiters
                    .entry(dep.clone())
                    .or_default()
                    .push(name.clone());
                let _ = self.to_below.send(Interest::new(dep).into()).await;
            }
            return;
        }

        let known_languages = self.executors.languages();
        match self.optimizer.forwarding_decision(&expr, &name, &known_languages) {
            ForwardingDecision::RunLocally => self.run_locally(name, expr).await,
            ForwardingDecision::Forward(rewritten) => self.delegate(name, rewritten).await,
        }
    }

    async fn run_locally(&mut self, name: Name, expr: crate::ast::Expr) {
        self.table.set_state(&name, ComputationState::Exec);
        let resolved = self
            .table
            .get(&name)
            .map(|e| e.resolved.clone())
            .unwrap_or_default();
        let executors = self.executors.clone();
        let done_tx = self.done_tx.clone();
        tokio::spawn(async move {
            let result = executors.evaluate(&expr, &resolved).await;
            let _ = done_tx.send((name, result)).await;
        });
    }

    async fn delegate(&mut self, name: Name, rewritten: Name) {
        self.table.set_state(&name, ComputationState::Rewrite);
        match self.icn.send(IcnCommand::ForwardInterest { name: rewritten }).await {
            Ok(IcnCommandResponse::Forwarded(true)) => {
                // Reply arrives later on `from_below` addressed to `name`.
            }
            _ => {
                self.fail_computation(&name, NackReason::NoRoute).await;
            }
        }
    }

    async fn handle_computation_result(&mut self, name: Name, result: Result<ExecValue, Error>) {
        match result {
            Ok(value) => {
                self.metrics.nfn_computations_finished.increment();
                self.metrics.nfn_computations_active.decrement();
                if let Some(entry) = self.table.get(&name) {
                    let elapsed = entry.created_at.elapsed();
                    self.metrics
                        .nfn_computation_time
                        .histogram()
                        .observe(elapsed.as_micros() as u64);
                }
                self.table.set_state(&name, ComputationState::Finished);
                let payload = value_to_bytes(value);
                let _ = self
                    .to_below
                    .send(Content::new(name, payload).into())
                    .await;
            }
            Err(e) => {
                warn!("NFN computation for {} failed: {}", name, e);
                self.fail_computation(&name, NackReason::NotSet).await;
            }
        }
    }

    async fn fail_computation(&mut self, name: &Name, reason: NackReason) {
        self.metrics.nfn_computations_failed.increment();
        self.metrics.nfn_computations_active.decrement();
        self.table.set_state(name, ComputationState::Failed);
        let _ = self
            .to_below
            .send(Nack::new(name.clone(), reason).into())
            .await;
    }

    async fn handle_content(&mut self, content: Content) {
        if let Some(entry) = self.table.get(&content.name) {
            if entry.state == ComputationState::Rewrite {
                self.metrics.nfn_computations_finished.increment();
                self.metrics.nfn_computations_active.decrement();
                self.table.set_state(&content.name, ComputationState::Finished);
                let _ = self.to_below.send(Packet::Content(content)).await;
                return;
            }
        }

        let Some(waiters) = self.dependency_waiters.remove(&content.name) else {
            debug!("NFNLayer: unsolicited Content for {}, dropping", content.name);
            return;
        };
        let value = ExecValue::Bytes(content.payload);
        for waiter in waiters {
            let ready = {
                let Some(entry) = self.table.get_mut(&waiter) else {
                    continue;
                };
                entry.resolved.insert(content.name.clone(), value.clone());
                entry.outstanding.remove(&content.name);
                entry.outstanding.is_empty()
            };
            if ready {
                self.plan(waiter).await;
            }
        }
    }

    async fn handle_nack(&mut self, nack: Nack) {
        if let Some(entry) = self.table.get(&nack.name) {
            if entry.state == ComputationState::Rewrite {
                self.metrics.nfn_computations_failed.increment();
                self.metrics.nfn_computations_active.decrement();
                self.table.set_state(&nack.name, ComputationState::Failed);
                let _ = self.to_below.send(Packet::Nack(nack)).await;
                return;
            }
        }

        let Some(waiters) = self.dependency_waiters.remove(&nack.name) else {
            return;
        };
        for waiter in waiters {
            if let Some(entry) = self.table.remove(&waiter) {
                for dep in &entry.outstanding {
                    if let Some(list) = self.dependency_waiters.get_mut(dep) {
                        list.retain(|n| n != &waiter);
                    }
                }
            }
            self.fail_computation(&waiter, nack.reason).await;
        }
    }
}

fn value_to_bytes(value: ExecValue) -> Bytes {
    match value {
        ExecValue::Int(n) => Bytes::from(n.to_string().into_bytes()),
        ExecValue::Str(s) => Bytes::from(s.into_bytes()),
        ExecValue::Bytes(b) => b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::ToDataFirstOptimizer;
    use std::time::Duration;
    use udcn_common::{FaceId, Name};
    use udcn_core::cs::ContentStore;
    use udcn_core::fib::ForwardingInformationBase;
    use udcn_core::icn::{IcnConfig, IcnLayer};

    fn spawn_icn() -> (IcnHandle, mpsc::Sender<(FaceId, Packet)>, mpsc::Receiver<(FaceId, Packet)>) {
        let (below_tx, below_rx) = mpsc::channel(16);
        let (to_below_tx, to_below_rx) = mpsc::channel(16);
        let (_above_tx, above_rx) = mpsc::channel(16);
        let (to_above_tx, _to_above_rx) = mpsc::channel(16);
        let cs = ContentStore::new(16, Duration::from_secs(10));
        let fib = ForwardingInformationBase::new();
        let config = IcnConfig {
            pit_timeout: Duration::from_secs(5),
            ageing_interval: Duration::from_millis(50),
            interest_to_app: true,
            cache_unsolicited: false,
        };
        let (icn, handle) = IcnLayer::new(
            cs,
            fib,
            config,
            Arc::new(UdcnMetrics::new()),
            below_rx,
            to_below_tx,
            above_rx,
            to_above_tx,
        );
        tokio::spawn(icn.run());
        (handle, below_tx, to_below_rx)
    }

    fn spawn_nfn(icn: IcnHandle) -> (mpsc::Sender<Packet>, mpsc::Receiver<Packet>, ComputationLookup) {
        let (below_tx, below_rx) = mpsc::channel(16);
        let (to_below_tx, to_below_rx) = mpsc::channel(16);
        let mut pool = ExecutorPool::new(Duration::from_secs(1));
        pool.register(Arc::new(crate::executor::ArithmeticExecutor));
        let config = NfnConfig {
            computation_grace: Duration::from_secs(5),
            sweep_interval: Duration::from_millis(50),
        };
        let (layer, lookup) = NfnLayer::new(
            Box::new(ToDataFirstOptimizer),
            Arc::new(pool),
            icn,
            config,
            Arc::new(UdcnMetrics::new()),
            below_rx,
            to_below_tx,
        );
        tokio::spawn(layer.run());
        (below_tx, to_below_rx, lookup)
    }

    #[tokio::test]
    async fn runs_a_self_contained_expression_locally() {
        let (icn, _icn_below_tx, _icn_to_below_rx) = spawn_icn();
        let (nfn_tx, mut nfn_to_below_rx, _lookup) = spawn_nfn(icn);

        let name = Name::from_string("/lib/add(2,3)/NFN");
        nfn_tx.send(Interest::new(name.clone()).into()).await.unwrap();

        match nfn_to_below_rx.recv().await.unwrap() {
            Packet::Content(c) => {
                assert_eq!(c.name, name);
                assert_eq!(&c.payload[..], b"5");
            }
            other => panic!("expected Content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn fetches_named_dependency_before_running() {
        let (icn, _icn_below_tx, _icn_to_below_rx) = spawn_icn();
        let (nfn_tx, mut nfn_to_below_rx, _lookup) = spawn_nfn(icn);

        let name = Name::from_string("/lib/add(/data,3)/NFN");
        nfn_tx.send(Interest::new(name.clone()).into()).await.unwrap();

        match nfn_to_below_rx.recv().await.unwrap() {
            Packet::Interest(i) => assert_eq!(i.name, Name::from_string("/data")),
            other => panic!("expected dependency Interest, got {:?}", other),
        }

        nfn_tx
            .send(Content::new(Name::from_string("/data"), Bytes::from_static(b"4")).into())
            .await
            .unwrap();

        match nfn_to_below_rx.recv().await.unwrap() {
            Packet::Content(c) => {
                assert_eq!(c.name, name);
                assert_eq!(&c.payload[..], b"7");
            }
            other => panic!("expected Content, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn unparseable_expression_is_nacked() {
        let (icn, _icn_below_tx, _icn_to_below_rx) = spawn_icn();
        let (nfn_tx, mut nfn_to_below_rx, _lookup) = spawn_nfn(icn);

        let name = Name::from_string("/lib/add(/NFN");
        nfn_tx.send(Interest::new(name.clone()).into()).await.unwrap();

        match nfn_to_below_rx.recv().await.unwrap() {
            Packet::Nack(n) => assert_eq!(n.name, name),
            other => panic!("expected Nack, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn computation_lookup_reports_running_then_finished() {
        let (icn, _icn_below_tx, _icn_to_below_rx) = spawn_icn();
        let (nfn_tx, mut nfn_to_below_rx, lookup) = spawn_nfn(icn);

        let name = Name::from_string("/lib/add(/data,3)/NFN");
        nfn_tx.send(Interest::new(name.clone()).into()).await.unwrap();
        let _ = nfn_to_below_rx.recv().await.unwrap(); // the /data Interest

        assert!(lookup_is_running(&lookup, &name).await);

        nfn_tx
            .send(Content::new(Name::from_string("/data"), Bytes::from_static(b"4")).into())
            .await
            .unwrap();
        let _ = nfn_to_below_rx.recv().await.unwrap(); // the final Content

        assert!(!lookup_is_running(&lookup, &name).await);
    }

    async fn lookup_is_running(lookup: &ComputationLookup, name: &Name) -> bool {
        lookup.is_running(name).await
    }
}
