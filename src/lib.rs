//! # lorachat - application core for LoRa mesh nodes
//!
//! lorachat is the application layer of a LoRa mesh node. Every application on
//! the node is a service bound to a numeric port; messages travel as small
//! packed binary frames over the mesh and as JSON when they cross the MQTT
//! bridge.
//!
//! ## Features
//!
//! - **Wire codec**: fixed 11-byte header plus a body whose layout follows the source port, with a stream frame decoder and a JSON envelope.
//! - **Service registry**: port-addressed dispatch of mesh messages and keyword dispatch of console commands, with generated help.
//! - **Chat**: contact discovery, a one-peer chat session with acknowledgements, and a bounded history of received messages.
//! - **Telemetry**: periodic routing-table and monitor reports toward the broker, with a gateway fallback through the mesh.
//! - **Peripherals**: GPS, LED, display and sensor services driven by commands or remote messages.
//! - **Simulation**: an in-process mesh so several nodes can run in one binary or one test.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lorachat::config::Config;
//! use lorachat::mesh::sim::SimNetwork;
//! use lorachat::node::NodeContext;
//! use lorachat::storage::KvStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml").await?;
//!     let network = SimNetwork::new();
//!     let (mesh, _frames) = network.join(config.node.address, false);
//!     let store = Arc::new(KvStore::open(&config.storage.data_dir)?);
//!     let (node, _channels) = NodeContext::new(&config, mesh, store)?;
//!     println!("{}", node.manager().dispatch_command("/help"));
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`message`] - ports, message bodies, binary and JSON codecs
//! - [`manager`] - service registry and dispatch
//! - [`services`] - the node's applications
//! - [`commands`] - command tables and session cursors
//! - [`transport`] - outbound router, MQTT bridge, console
//! - [`mesh`] - mesh facade, routing table and the in-process simulation
//! - [`scheduler`] - periodic jobs behind start/pause handles
//! - [`node`] - wiring of one complete node
//! - [`config`], [`storage`], [`validation`], [`logutil`], [`metrics`] - ambient support
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ MessageManager  │ ← ports and command keywords
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │    Services     │ ← chat, telemetry, peripherals
//! └─────────────────┘
//!          │
//! ┌─────────────────┐
//! │ TransportRouter │ ← mesh, MQTT, console, loopback
//! └─────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod logutil;
pub mod manager;
pub mod mesh;
pub mod message;
pub mod metrics;
pub mod node;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod transport;
pub mod validation;
