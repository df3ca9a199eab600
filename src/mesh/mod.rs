//! # Mesh transport facade
//!
//! Route discovery, retransmission and queueing belong to the radio mesh
//! library. The node only needs a narrow view of it:
//!
//! - its own address
//! - the live routing table, read under the table's lock
//! - reliable unicast send of an encoded frame
//! - transmit/receive queue depths for monitoring
//! - the closest gateway, for traffic that has to leave the mesh
//!
//! [`sim`] provides an in-process implementation used by the binary and tests.

pub mod sim;

use std::ops::Deref;
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

/// Role bit set on routes whose destination bridges to the Internet.
pub const ROLE_GATEWAY: u8 = 0b0000_0001;
/// Destination address reaching every node.
pub const BROADCAST_ADDR: u16 = 0xFFFF;

/// One row of the mesh library's routing table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteNode {
    pub address: u16,
    pub via: u16,
    pub metric: u8,
    pub received_snr: i8,
    pub sent_snr: i8,
    pub srtt: u32,
    pub rttvar: u32,
    pub role: u8,
}

impl RouteNode {
    pub fn is_gateway(&self) -> bool {
        self.role & ROLE_GATEWAY != 0
    }

    /// Directly reachable neighbour, no intermediate hop.
    pub fn is_direct(&self) -> bool {
        self.address == self.via
    }
}

/// Routing table shared with the mesh library. Rows may only be read while a
/// [`RoutingTableGuard`] is held; dropping the guard releases the table on every
/// exit path.
#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: Mutex<Vec<RouteNode>>,
}

pub struct RoutingTableGuard<'a> {
    routes: MutexGuard<'a, Vec<RouteNode>>,
}

impl Deref for RoutingTableGuard<'_> {
    type Target = [RouteNode];

    fn deref(&self) -> &[RouteNode] {
        &self.routes
    }
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock(&self) -> RoutingTableGuard<'_> {
        let routes = match self.routes.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        RoutingTableGuard { routes }
    }

    /// Replace every row. Only the mesh side calls this.
    pub fn replace(&self, rows: Vec<RouteNode>) {
        let mut routes = match self.routes.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        *routes = rows;
    }

    /// Copy of the rows, taken and released under the lock.
    pub fn snapshot(&self) -> Vec<RouteNode> {
        self.lock().to_vec()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MeshError {
    #[error("no route to {0:04X}")]
    NoRoute(u16),

    #[error("mesh transport closed")]
    Closed,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueSizes {
    pub tx: u16,
    pub rx: u16,
}

/// A frame as delivered by the mesh.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MeshFrame {
    pub src: u16,
    pub dst: u16,
    pub data: Bytes,
}

pub trait MeshFacade: Send + Sync {
    fn local_address(&self) -> u16;

    fn routing_table(&self) -> &RoutingTable;

    /// Queue `frame` for reliable delivery to `dst`.
    fn send_reliable(&self, dst: u16, frame: Bytes) -> Result<(), MeshError>;

    fn queue_sizes(&self) -> QueueSizes;

    /// Lowest-metric route flagged as a gateway.
    fn closest_gateway(&self) -> Option<u16> {
        let table = self.routing_table().lock();
        let closest = table
            .iter()
            .filter(|r| r.is_gateway())
            .min_by_key(|r| r.metric)
            .map(|r| r.address);
        closest
    }
}
