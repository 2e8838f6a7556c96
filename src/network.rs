//! Connection registry for the gas transport network
//!
//! `GasNetwork` owns every [`Connection`]. Pipes and stations stay in the
//! [`Repository`] and are only referenced by id.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::db::Repository;
use crate::error::Result;
use crate::models::{Connection, ConnectionId, Pipe, PipeId, is_valid_diameter};
use crate::records;

#[derive(Debug, Clone)]
pub struct GasNetwork {
    connections: BTreeMap<ConnectionId, Connection>,
    next_id: ConnectionId,
}

impl Default for GasNetwork {
    fn default() -> Self {
        Self::new()
    }
}

impl GasNetwork {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Hands out the next connection id
    pub fn allocate_id(&mut self) -> ConnectionId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Stores `conn` under its own id, replacing any connection with that id
    ///
    /// The id counter is moved past `conn.id` so explicit ids are never
    /// handed out again.
    pub fn insert(&mut self, conn: Connection) -> ConnectionId {
        let id = conn.id;
        if id >= self.next_id {
            self.next_id = id.saturating_add(1);
        }
        self.connections.insert(id, conn);
        id
    }

    pub fn remove(&mut self, id: ConnectionId) -> bool {
        self.connections.remove(&id).is_some()
    }

    pub fn get(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// All connections in id order
    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Active connections in id order
    pub fn active(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values().filter(|c| c.is_active)
    }

    /// Pipes bound to an active connection
    pub fn used_pipe_ids(&self) -> BTreeSet<PipeId> {
        self.active().map(|c| c.pipe_id).collect()
    }

    /// Pipes of `diameter` that are neither in repair nor used by an active connection
    ///
    /// A diameter outside the standard set yields an empty map.
    pub fn find_available_pipes<R: Repository + ?Sized>(
        &self,
        diameter: i64,
        repo: &R,
    ) -> Result<BTreeMap<PipeId, Pipe>> {
        if !is_valid_diameter(diameter) {
            return Ok(BTreeMap::new());
        }
        Ok(self.filter_available(diameter, repo.all_pipes()?))
    }

    fn filter_available(&self, diameter: i64, pipes: BTreeMap<PipeId, Pipe>) -> BTreeMap<PipeId, Pipe> {
        let used = self.used_pipe_ids();
        pipes
            .into_iter()
            .filter(|(id, pipe)| {
                pipe.diameter_mm == diameter && !pipe.in_repair && !used.contains(id)
            })
            .collect()
    }

    /// Replace all connections with `loaded`
    ///
    /// An empty `loaded` is treated as a failed load: nothing changes and
    /// `false` is returned. Otherwise the id counter restarts at the highest
    /// loaded id plus one.
    pub fn replace(&mut self, loaded: BTreeMap<ConnectionId, Connection>) -> bool {
        let Some(&max_id) = loaded.keys().next_back() else {
            return false;
        };
        self.connections = loaded;
        self.next_id = max_id.saturating_add(1);
        true
    }

    pub fn write_records<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        records::write_section(writer, self.connections.values())
    }

    /// Load the `CONNECTIONS` section of `text`; see [`GasNetwork::replace`]
    pub fn read_records(&mut self, text: &str) -> bool {
        self.replace(records::parse_section::<Connection>(text))
    }

    pub fn save_to_path(&self, path: &Path) -> io::Result<()> {
        let mut buf = Vec::new();
        self.write_records(&mut buf)?;
        fs::write(path, buf)
    }

    /// Load connections from `path`
    ///
    /// A missing file is not an error: the network simply stays as it is.
    pub fn load_from_path(&mut self, path: &Path) -> io::Result<bool> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(self.read_records(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
