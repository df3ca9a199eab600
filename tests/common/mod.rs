//! Shared fixtures for the integration tests: nodes wired to a simulated mesh
//! and a synchronous pump that delivers queued frames until the mesh is idle.
#![allow(dead_code)]

use std::sync::Arc;

use tokio::sync::mpsc;

use lorachat::config::Config;
use lorachat::mesh::sim::{SimNetwork, SimulatedMesh};
use lorachat::mesh::MeshFrame;
use lorachat::message::TransportPort;
use lorachat::node::{NodeChannels, NodeContext};
use lorachat::storage::KvStore;

pub struct TestNode {
    pub node: NodeContext,
    pub mesh: Arc<SimulatedMesh>,
    pub channels: NodeChannels,
    pub frames: mpsc::UnboundedReceiver<MeshFrame>,
}

impl TestNode {
    /// Run a console line through the manager and return its reply.
    pub fn command(&self, line: &str) -> String {
        self.node.manager().dispatch_command(line)
    }

    /// Everything written to the console since the last call.
    pub fn console_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Ok(line) = self.channels.console_rx.try_recv() {
            lines.push(line);
        }
        lines
    }

    /// Deliver queued inbound frames and loopback messages. Returns how many were handled.
    pub fn deliver_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(frame) = self.frames.try_recv() {
            self.node.manager().dispatch_frame(&frame.data);
            handled += 1;
        }
        while let Ok(msg) = self.channels.internal_rx.try_recv() {
            self.node.manager().dispatch_message(TransportPort::Internal, &msg);
            handled += 1;
        }
        handled
    }
}

pub fn config_for(address: u16, name: &str) -> Config {
    let mut config = Config::default();
    config.node.address = address;
    config.node.name = name.to_string();
    config
}

pub fn join(network: &Arc<SimNetwork>, config: &Config, gateway: bool) -> TestNode {
    let (mesh, frames) = network.join(config.node.address, gateway);
    let (node, channels) =
        NodeContext::new(config, mesh.clone(), Arc::new(KvStore::in_memory())).expect("node");
    TestNode {
        node,
        mesh,
        channels,
        frames,
    }
}

/// Node on a mesh of its own; sent frames are only recorded.
pub fn standalone(config: &Config) -> TestNode {
    let mesh = SimulatedMesh::standalone(config.node.address);
    let (node, channels) =
        NodeContext::new(config, mesh.clone(), Arc::new(KvStore::in_memory())).expect("node");
    // Nothing ever arrives on a standalone mesh.
    let (_tx, frames) = mpsc::unbounded_channel();
    TestNode {
        node,
        mesh,
        channels,
        frames,
    }
}

/// Deliver traffic between `nodes` until a full pass handles nothing.
pub fn settle(nodes: &mut [&mut TestNode]) {
    for _ in 0..32 {
        let mut handled = 0;
        for node in nodes.iter_mut() {
            handled += node.deliver_pending();
        }
        if handled == 0 {
            return;
        }
    }
    panic!("mesh did not settle");
}
