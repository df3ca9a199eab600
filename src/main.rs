//! Binary entrypoint for the lorachat node.
//!
//! Commands:
//! - `start [--port <path>] [--baud <n>]` - run the local node and its simulated peers
//! - `init` - write a starter `config.toml` and create the data directory
//! - `status` - print the configuration, the command help and counters
//!
//! See the library crate docs for module-level details: `lorachat::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::{mpsc, oneshot};

use lorachat::config::Config;
use lorachat::mesh::sim::SimNetwork;
use lorachat::metrics;
use lorachat::node::{NodeChannels, NodeContext, NodeInputs};
use lorachat::storage::{KvStore, KEY_WIFI_SSID};
use lorachat::transport::console;

#[derive(Parser)]
#[command(name = "lorachat")]
#[command(about = "Chat, telemetry and MQTT bridging for LoRa mesh nodes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node with its simulated peers
    Start {
        /// Serial device for the command console (e.g., /dev/ttyUSB0); stdin when absent
        #[arg(short, long)]
        port: Option<String>,

        /// Serial baud rate
        #[arg(short = 'b', long, default_value_t = 115200)]
        baud: u32,
    },
    /// Write a default configuration file
    Init,
    /// Show configuration, commands and counters
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { port, baud } => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            info!("Starting lorachat v{}", env!("CARGO_PKG_VERSION"));
            run_node(config, port, baud).await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new node configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            let cfg = Config::default();
            KvStore::open(&cfg.storage.data_dir)?;
            info!("Key/value store ready in {}", cfg.storage.data_dir);
        }
        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            show_status(&config)?;
        }
    }

    Ok(())
}

async fn run_node(config: Config, port: Option<String>, baud: u32) -> Result<()> {
    let store = Arc::new(KvStore::open(&config.storage.data_dir)?);
    let network = SimNetwork::new();
    let (mesh, mesh_rx) = network.join(config.node.address, false);
    let (node, channels) = NodeContext::new(&config, mesh, store)?;

    let mut peer_stops = Vec::new();
    for peer in &config.simulation.peers {
        let mut peer_config = config.clone();
        peer_config.node.address = peer.address;
        peer_config.node.name = peer.name.clone();
        peer_config.mqtt.enabled = peer.gateway;
        let (peer_mesh, peer_rx) = network.join(peer.address, peer.gateway);
        let (peer_node, peer_channels) =
            NodeContext::new(&peer_config, peer_mesh, Arc::new(KvStore::in_memory()))?;
        let (stop_tx, stop_rx) = oneshot::channel();
        peer_stops.push(stop_tx);
        let label = format!("{} ({:04X})", peer.name, peer.address);
        tokio::spawn(async move {
            let inputs = log_outputs(label, peer_channels, peer_rx);
            peer_node.start_jobs();
            peer_node.run(inputs, stop_rx).await;
            peer_node.stop_jobs().await;
        });
        info!("Simulated peer {} ({:04X}) joined", peer.name, peer.address);
    }
    network.refresh_routes();

    let NodeChannels {
        internal_rx,
        console_rx,
        mut mqtt_publish_rx,
    } = channels;
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    match port {
        Some(path) => attach_serial(&path, baud, command_tx, console_rx)?,
        None => {
            tokio::spawn(console::pump_stdin(command_tx));
            tokio::spawn(console::drain_to_stdout(console_rx));
        }
    }
    tokio::spawn(async move {
        while let Some(publish) = mqtt_publish_rx.recv().await {
            info!("MQTT publish {}: {}", publish.topic, publish.payload);
        }
    });
    // No broker client is attached; the sender stays alive so the loop keeps the input open.
    let (_mqtt_inbound_tx, mqtt_inbound_rx) = mpsc::unbounded_channel();

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(());
        }
    });

    node.start_jobs();
    info!("Node {:04X} running; type /help for commands", node.local_address());
    node.run(
        NodeInputs {
            mesh_rx,
            internal_rx,
            command_rx,
            mqtt_inbound_rx,
        },
        stop_rx,
    )
    .await;
    node.stop_jobs().await;
    for stop in peer_stops {
        let _ = stop.send(());
    }
    info!("Node stopped");
    Ok(())
}

/// Inputs for a simulated peer: its console and broker output only reach the log.
fn log_outputs(
    label: String,
    channels: NodeChannels,
    mesh_rx: mpsc::UnboundedReceiver<lorachat::mesh::MeshFrame>,
) -> NodeInputs {
    let NodeChannels {
        internal_rx,
        mut console_rx,
        mut mqtt_publish_rx,
    } = channels;
    let console_label = label.clone();
    tokio::spawn(async move {
        while let Some(line) = console_rx.recv().await {
            info!("[{}] {}", console_label, line);
        }
    });
    tokio::spawn(async move {
        while let Some(publish) = mqtt_publish_rx.recv().await {
            info!("[{}] MQTT publish {}: {}", label, publish.topic, publish.payload);
        }
    });
    // Peers have no interactive console; their command channel closes at once.
    let (_, command_rx) = mpsc::unbounded_channel();
    let (_, mqtt_inbound_rx) = mpsc::unbounded_channel();
    NodeInputs {
        mesh_rx,
        internal_rx,
        command_rx,
        mqtt_inbound_rx,
    }
}

#[cfg(feature = "serial")]
fn attach_serial(
    path: &str,
    baud: u32,
    lines: mpsc::UnboundedSender<String>,
    output: mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    console::spawn_serial_console(path, baud, lines, output)?;
    info!("Command console on {} @ {} baud", path, baud);
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn attach_serial(
    path: &str,
    _baud: u32,
    _lines: mpsc::UnboundedSender<String>,
    _output: mpsc::UnboundedReceiver<String>,
) -> Result<()> {
    Err(anyhow::anyhow!(
        "serial console on {} requires the 'serial' feature",
        path
    ))
}

fn show_status(config: &Config) -> Result<()> {
    println!("lorachat v{}", env!("CARGO_PKG_VERSION"));
    println!("Node: {:04X} ({})", config.node.address, config.node.name);
    println!(
        "MQTT: {} (publish {}<addr>, subscribe {})",
        if config.mqtt.enabled { "enabled" } else { "disabled" },
        config.mqtt.topic_prefix,
        config.mqtt.subscribe_topic
    );
    println!(
        "Telemetry: rt every {}s, monitor every {}s ({:?}), metadata every {}s",
        config.telemetry.rt_interval_secs,
        config.telemetry.mon_interval_secs,
        config.telemetry.monitor_strategy,
        config.telemetry.metadata_interval_secs
    );
    println!("Simulated peers: {}", config.simulation.peers.len());

    let store = match KvStore::open(&config.storage.data_dir) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!("Key/value store unavailable: {}", e);
            Arc::new(KvStore::in_memory())
        }
    };
    match store.get(KEY_WIFI_SSID) {
        Some(ssid) => println!("WiFi SSID: {}", ssid),
        None => println!("WiFi SSID: (none)"),
    }

    let mesh = lorachat::mesh::sim::SimulatedMesh::standalone(config.node.address);
    let (node, _channels) = NodeContext::new(config, mesh, store)?;
    println!();
    print!("{}", node.manager().get_available_commands());

    let m = metrics::snapshot();
    println!();
    println!("Messages dispatched: {}", m.messages_dispatched);
    println!("Messages dropped:    {}", m.messages_dropped);
    println!("Messages forwarded:  {}", m.messages_forwarded);
    println!("Decode failures:     {}", m.decode_failures);
    println!("Commands executed:   {}", m.commands_executed);
    println!("Telemetry cycles:    {}", m.telemetry_cycles);
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    let configured = config
        .as_ref()
        .and_then(|cfg| cfg.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    // CLI verbosity overrides config
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| std::fs::OpenOptions::new().create(true).append(true).open(file).ok());
    match log_file {
        Some(f) => {
            let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
            // Foreground runs keep the console for chat; only warnings and errors show there.
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if is_tty && record.level() <= log::Level::Warn {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
