//! Entry point for the µDCN NFN forwarder.
//!
//! Wires the layered pipeline together — LinkLayer -> PacketEncodingLayer
//! -> ICNLayer -> ChunkLayer -> TimeoutPreventionLayer -> NFNLayer — and
//! runs the TCP management socket alongside it. Every layer is its own
//! `tokio::task`; this binary only builds the channels that connect them
//! and waits for shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::sync::mpsc;

use udcn_common::{ForwarderConfig, TlvEncoder, UdcnMetrics};
use udcn_core::chunk::ChunkLayer;
use udcn_core::cs::ContentStore;
use udcn_core::fib::ForwardingInformationBase;
use udcn_core::icn::{IcnConfig, IcnLayer};
use udcn_core::management::ManagementLayer;
use udcn_core::packet_encoding::PacketEncodingLayer;
use udcn_core::timeout_prevention::TimeoutPreventionLayer;
use udcn_nfn::executor::{ArithmeticExecutor, ExecutorPool};
use udcn_nfn::layer::{NfnConfig, NfnLayer};
use udcn_nfn::optimizer::ToDataFirstOptimizer;
use udcn_transport::UdpLinkLayer;

/// µDCN Named-Function Networking forwarder
#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Path to a TOML configuration file
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Overrides the configured UDP data port
    #[clap(short, long)]
    port: Option<u16>,

    /// Overrides the configured TCP management port
    #[clap(short, long)]
    management_port: Option<u16>,

    /// Sets the level of verbosity
    #[clap(short, long)]
    verbose: bool,
}

const CHANNEL_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let mut config =
        ForwarderConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(management_port) = cli.management_port {
        config.management_port = management_port;
    }
    config.validate().context("invalid configuration")?;

    info!(
        "Starting µDCN forwarder: data port {}, management port {}",
        config.port, config.management_port
    );

    let metrics = Arc::new(UdcnMetrics::new());

    let link = UdpLinkLayer::bind(config.port)
        .await
        .context("failed to bind LinkLayer UDP socket")?;
    let faces = link.faces();
    let (link_up_rx, link_down_tx, _face_event_tx, mut face_event_rx) = link.spawn(CHANNEL_CAPACITY);
    tokio::spawn(async move { while face_event_rx.recv().await.is_some() {} });

    // PacketEncodingLayer <-> ICNLayer
    let (enc_to_icn_tx, enc_to_icn_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (icn_to_enc_tx, icn_to_enc_rx) = mpsc::channel(CHANNEL_CAPACITY);
    // ICNLayer <-> ChunkLayer
    let (icn_up_tx, icn_up_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (chunk_down_tx, chunk_down_rx) = mpsc::channel(CHANNEL_CAPACITY);
    // ChunkLayer <-> TimeoutPreventionLayer
    let (chunk_up_tx, chunk_up_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (tp_down_tx, tp_down_rx) = mpsc::channel(CHANNEL_CAPACITY);
    // TimeoutPreventionLayer <-> NFNLayer
    let (tp_up_tx, tp_up_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (nfn_down_tx, nfn_down_rx) = mpsc::channel(CHANNEL_CAPACITY);

    let cs = ContentStore::new(config.cs_capacity, Duration::from_millis(config.cs_ttl_ms));
    let fib = ForwardingInformationBase::new();
    let icn_config = IcnConfig {
        pit_timeout: Duration::from_millis(config.pit_timeout_ms),
        ageing_interval: Duration::from_millis(config.ageing_interval_ms),
        interest_to_app: config.interest_to_app,
        cache_unsolicited: config.cache_unsolicited,
    };
    let (icn_layer, icn_handle) = IcnLayer::new(
        cs,
        fib,
        icn_config,
        metrics.clone(),
        enc_to_icn_rx,
        icn_to_enc_tx,
        chunk_down_rx,
        icn_up_tx,
    );

    let chunk_layer = ChunkLayer::new(
        config.chunk_size,
        Duration::from_millis(config.chunk_timeout_ms),
        metrics.clone(),
        icn_up_rx,
        chunk_down_tx,
        tp_down_rx,
        chunk_up_tx,
    );

    let mut executors = ExecutorPool::new(Duration::from_millis(config.pit_timeout_ms));
    executors.register(Arc::new(ArithmeticExecutor));
    if !config.executors.is_empty() {
        log::debug!(
            "configured NFN executor bindings {:?}; only the built-in RUST arithmetic \
             executor has a local backend in this build, unmatched languages forward instead",
            config.executors
        );
    }
    let nfn_config = NfnConfig {
        computation_grace: Duration::from_millis(config.ageing_interval_ms * 10),
        sweep_interval: Duration::from_millis(config.ageing_interval_ms),
    };
    let (nfn_layer, computation_lookup) = NfnLayer::new(
        Box::new(ToDataFirstOptimizer),
        Arc::new(executors),
        icn_handle.clone(),
        nfn_config,
        metrics.clone(),
        tp_up_rx,
        nfn_down_tx,
    );

    let timeout_prevention_layer = TimeoutPreventionLayer::new(
        Duration::from_millis(config.keepalive_timeout_interval_ms),
        Duration::from_millis(config.ageing_interval_ms),
        Some(computation_lookup),
        metrics.clone(),
        chunk_up_rx,
        tp_down_tx,
        nfn_down_rx,
        tp_up_tx,
    );

    let packet_encoding_layer = PacketEncodingLayer::new(
        Arc::new(TlvEncoder),
        metrics,
        link_up_rx,
        link_down_tx,
        icn_to_enc_rx,
        enc_to_icn_tx,
    );

    let management_listener = tokio::net::TcpListener::bind(("0.0.0.0", config.management_port))
        .await
        .context("failed to bind management TCP socket")?;
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let management_layer = ManagementLayer::new(management_listener, icn_handle, faces, shutdown_tx);

    tokio::spawn(icn_layer.run());
    tokio::spawn(chunk_layer.run());
    tokio::spawn(timeout_prevention_layer.run());
    tokio::spawn(nfn_layer.run());
    tokio::spawn(packet_encoding_layer.run());
    tokio::spawn(management_layer.run());

    tokio::select! {
        _ = shutdown_rx.recv() => {
            info!("shutdown requested over the management socket");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("received ctrl-c, shutting down");
        }
    }

    Ok(())
}
