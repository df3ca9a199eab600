//! In-process mesh used by the `start` subcommand and by tests.
//!
//! Every node that joins a [`SimNetwork`] can reach every other member in one
//! hop. Frames are handed to the destination's inbound channel immediately, in
//! send order, which matches the FIFO guarantee of a single radio link.
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{MeshError, MeshFacade, MeshFrame, QueueSizes, RouteNode, RoutingTable, BROADCAST_ADDR, ROLE_GATEWAY};

struct Member {
    inbound: mpsc::UnboundedSender<MeshFrame>,
    gateway: bool,
    mesh: Weak<SimulatedMesh>,
}

#[derive(Default)]
pub struct SimNetwork {
    members: Mutex<BTreeMap<u16, Member>>,
}

impl SimNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a node. Call [`SimNetwork::refresh_routes`] once every node has joined.
    pub fn join(
        self: &Arc<Self>,
        address: u16,
        gateway: bool,
    ) -> (Arc<SimulatedMesh>, mpsc::UnboundedReceiver<MeshFrame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let mesh = Arc::new(SimulatedMesh {
            address,
            network: Some(Arc::clone(self)),
            table: RoutingTable::new(),
            sent: Mutex::new(Vec::new()),
            queues: Mutex::new(QueueSizes::default()),
        });
        let mut members = self.lock_members();
        if members.contains_key(&address) {
            log::warn!("sim mesh: address {:04X} joined twice, replacing", address);
        }
        members.insert(
            address,
            Member {
                inbound: tx,
                gateway,
                mesh: Arc::downgrade(&mesh),
            },
        );
        (mesh, rx)
    }

    /// Rebuild every member's table: all other members as direct neighbours.
    pub fn refresh_routes(&self) {
        let members = self.lock_members();
        for (addr, member) in members.iter() {
            let Some(mesh) = member.mesh.upgrade() else {
                continue;
            };
            let rows = members
                .iter()
                .filter(|(other, _)| *other != addr)
                .map(|(other, m)| RouteNode {
                    address: *other,
                    via: *other,
                    metric: 1,
                    received_snr: 8,
                    sent_snr: 7,
                    srtt: 120,
                    rttvar: 30,
                    role: if m.gateway { ROLE_GATEWAY } else { 0 },
                })
                .collect();
            mesh.table.replace(rows);
        }
    }

    fn deliver(&self, frame: MeshFrame) -> Result<(), MeshError> {
        let members = self.lock_members();
        if frame.dst == BROADCAST_ADDR {
            for (addr, m) in members.iter() {
                if *addr != frame.src {
                    let _ = m.inbound.send(frame.clone());
                }
            }
            return Ok(());
        }
        let member = members.get(&frame.dst).ok_or(MeshError::NoRoute(frame.dst))?;
        member.inbound.send(frame).map_err(|_| MeshError::Closed)
    }

    fn lock_members(&self) -> std::sync::MutexGuard<'_, BTreeMap<u16, Member>> {
        match self.members.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Mesh endpoint for one simulated node. Every frame it sends is also kept for
/// inspection.
pub struct SimulatedMesh {
    address: u16,
    network: Option<Arc<SimNetwork>>,
    table: RoutingTable,
    sent: Mutex<Vec<MeshFrame>>,
    queues: Mutex<QueueSizes>,
}

impl SimulatedMesh {
    /// Endpoint attached to no network: sends succeed and are only recorded.
    pub fn standalone(address: u16) -> Arc<Self> {
        Arc::new(Self {
            address,
            network: None,
            table: RoutingTable::new(),
            sent: Mutex::new(Vec::new()),
            queues: Mutex::new(QueueSizes::default()),
        })
    }

    pub fn set_routes(&self, rows: Vec<RouteNode>) {
        self.table.replace(rows);
    }

    pub fn set_queue_sizes(&self, sizes: QueueSizes) {
        let mut q = match self.queues.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *q = sizes;
    }

    pub fn sent_frames(&self) -> Vec<MeshFrame> {
        self.lock_sent().clone()
    }

    /// Drain the record of sent frames.
    pub fn take_sent(&self) -> Vec<MeshFrame> {
        std::mem::take(&mut *self.lock_sent())
    }

    fn lock_sent(&self) -> std::sync::MutexGuard<'_, Vec<MeshFrame>> {
        match self.sent.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl MeshFacade for SimulatedMesh {
    fn local_address(&self) -> u16 {
        self.address
    }

    fn routing_table(&self) -> &RoutingTable {
        &self.table
    }

    fn send_reliable(&self, dst: u16, frame: Bytes) -> Result<(), MeshError> {
        let frame = MeshFrame {
            src: self.address,
            dst,
            data: frame,
        };
        self.lock_sent().push(frame.clone());
        match &self.network {
            Some(net) => net.deliver(frame),
            None => Ok(()),
        }
    }

    fn queue_sizes(&self) -> QueueSizes {
        match self.queues.lock() {
            Ok(g) => *g,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
