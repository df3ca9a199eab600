//! LoRaMesher service: exposes the mesh library's routing table to the console.
use std::sync::Arc;

use crate::commands::CommandTable;
use crate::mesh::MeshFacade;
use crate::message::{AppPort, DataMessage, TransportPort};

use super::{unknown_command, Service};

const CMD_GET_RT: u8 = 1;

pub struct MeshInfoService {
    commands: CommandTable,
    mesh: Arc<dyn MeshFacade>,
}

impl MeshInfoService {
    pub fn new(mesh: Arc<dyn MeshFacade>) -> Self {
        Self {
            commands: CommandTable::new().public("/getRT", CMD_GET_RT, "Get the routing table of the device"),
            mesh,
        }
    }

    pub fn routing_table_text(&self) -> String {
        let mut out = String::from("--- Routing Table ---\n");
        let table = self.mesh.routing_table().lock();
        if table.is_empty() {
            out.push_str("No routes\n");
        }
        for r in table.iter() {
            out.push_str(&format!("{:04X} ({}) - Via: {:04X}\n", r.address, r.metric, r.via));
        }
        out
    }
}

impl Service for MeshInfoService {
    fn port(&self) -> AppPort {
        AppPort::LoRaMesher
    }

    fn commands(&self) -> &CommandTable {
        &self.commands
    }

    fn execute(&self, command_id: u8, _args: &str) -> String {
        match command_id {
            CMD_GET_RT => self.routing_table_text(),
            other => unknown_command(self.name(), other),
        }
    }

    fn process_received_message(&self, _transport: TransportPort, message: &DataMessage) {
        log::debug!("LoRaMesher service ignoring message from {:04X}", message.header.addr_src);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::sim::SimulatedMesh;
    use crate::mesh::RouteNode;

    #[test]
    fn lists_rows_or_no_routes() {
        let mesh = SimulatedMesh::standalone(0x10);
        let svc = MeshInfoService::new(mesh.clone());
        assert_eq!(svc.execute(CMD_GET_RT, ""), "--- Routing Table ---\nNo routes\n");
        mesh.set_routes(vec![RouteNode {
            address: 0x20,
            via: 0x30,
            metric: 2,
            ..Default::default()
        }]);
        assert_eq!(svc.execute(CMD_GET_RT, ""), "--- Routing Table ---\n0020 (2) - Via: 0030\n");
    }
}
