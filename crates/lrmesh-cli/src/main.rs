//! lrmesh command-line interface
//!
//! Thin wrapper around `lrmesh-core` for poking at the mesh without
//! hardware: run a multi-node simulation over the in-memory radio bus,
//! or decode a raw frame from hex.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lrmesh_core::{MeshConfig, MeshEvent, MeshSession, SimBus};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "lrmesh")]
#[command(author, version, about = "Long-range mesh packet router CLI", long_about = None)]
struct Cli {
    /// Enable verbose output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a multi-node mesh simulation on the in-memory radio bus
    Simulate {
        /// Number of nodes
        #[arg(short, long, default_value = "3")]
        nodes: u32,

        /// Broadcasts originated by the first node
        #[arg(short, long, default_value = "5")]
        messages: u32,

        /// Session config file (TOML); defaults apply when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// How long to let the flood settle after the last send (ms)
        #[arg(long, default_value = "500")]
        settle_ms: u64,
    },

    /// Decode a wire frame from hex and dump its fields
    Frame {
        /// Frame bytes as a hex string
        #[arg(short = 'x', long)]
        hex: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();

    match cli.command {
        Commands::Simulate {
            nodes,
            messages,
            config,
            settle_ms,
        } => simulate(nodes, messages, config, settle_ms).await,
        Commands::Frame { hex } => dump_frame(&hex),
    }
}

async fn simulate(
    nodes: u32,
    messages: u32,
    config_path: Option<PathBuf>,
    settle_ms: u64,
) -> Result<()> {
    let base_config = match config_path {
        Some(path) => {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&raw).context("parsing config")?
        }
        None => MeshConfig::default(),
    };

    let bus = SimBus::new();
    let mut sessions = Vec::new();
    let mut delivered = Vec::new();

    for i in 0..nodes.max(2) as usize {
        let config = MeshConfig {
            node_id: Some(0x1000_0000 + i as u32),
            ..base_config.clone()
        };
        let (session, mut events) = MeshSession::spawn(config, bus.endpoint());
        info!(node = %session.node_id(), "node joined");

        let count = Arc::new(AtomicUsize::new(0));
        delivered.push(count.clone());
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if let MeshEvent::MessageReceived { from, payload, .. } = event {
                    count.fetch_add(1, Ordering::Relaxed);
                    info!(%from, payload = %String::from_utf8_lossy(&payload), "message delivered");
                }
            }
        });
        sessions.push(session);
    }

    let sender = sessions[0].handle();
    for n in 0..messages {
        sender
            .send_text(&format!("sim message {n}"))
            .await
            .context("sending broadcast")?;
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    tokio::time::sleep(Duration::from_millis(settle_ms)).await;

    println!("=== Simulation summary ===");
    for (i, session) in sessions.iter().enumerate() {
        let stats = session
            .handle()
            .stats()
            .await
            .context("reading node stats")?;
        let peers = session.handle().nodes().await.context("reading nodes")?;
        println!(
            "node {} ({}): delivered={} peers={}",
            i,
            session.node_id(),
            delivered[i].load(Ordering::Relaxed),
            peers.len(),
        );
        println!("{}", serde_json::to_string_pretty(&stats)?);
    }

    for session in sessions {
        session.shutdown().await;
    }
    Ok(())
}

fn dump_frame(hex: &str) -> Result<()> {
    let bytes = parse_hex(hex).context("parsing hex input")?;
    let packet = lrmesh_core::wire::decode(&bytes).context("decoding frame")?;

    println!("source:       {}", packet.source);
    println!("destination:  {}", packet.destination);
    println!("packet id:    {:#010x}", packet.id);
    println!("hop limit:    {} (started at {})", packet.hop_limit, packet.hop_start);
    println!("want ack:     {}", packet.want_ack);
    println!("channel hash: {:#04x}", packet.channel_hash);
    println!("payload type: {:?}", packet.payload_type);
    println!("payload:      {} bytes", packet.payload.len());
    if let Ok(text) = std::str::from_utf8(&packet.payload) {
        println!("as text:      {text}");
    }
    Ok(())
}

fn parse_hex(input: &str) -> Result<Vec<u8>> {
    let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    anyhow::ensure!(cleaned.len() % 2 == 0, "odd number of hex digits");
    (0..cleaned.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&cleaned[i..i + 2], 16).context("invalid hex digit"))
        .collect()
}
