//! Line-oriented record streams
//!
//! Each entity kind is written as a section:
//!
//! ```text
//! PIPES
//! 1|Main line|12.5|1000|0
//! ENDPIPES
//! ```
//!
//! Fields are `|`-delimited. On read, lines are trimmed, blank lines are
//! ignored and a line that does not parse is dropped without failing the
//! whole section.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use crate::db::{Repository, Storage};
use crate::error::Result;
use crate::models::{Connection, Pipe, Station};
use crate::network::GasNetwork;

/// An entity that can be written to and read from one record line
pub trait Record: Sized {
    /// Section header; the footer is `END` followed by the header
    const SECTION: &'static str;

    fn record_id(&self) -> i64;

    fn to_line(&self) -> String;

    fn from_line(line: &str) -> Option<Self>;
}

impl Record for Pipe {
    const SECTION: &'static str = "PIPES";

    fn record_id(&self) -> i64 {
        self.id
    }

    fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.id,
            self.name,
            self.length_km,
            self.diameter_mm,
            u8::from(self.in_repair)
        )
    }

    fn from_line(line: &str) -> Option<Self> {
        let [id, name, length, diameter, in_repair] = fields::<5>(line)?;
        Pipe::new(
            parse_id(id)?,
            name,
            length.parse().ok()?,
            diameter.parse().ok()?,
            in_repair == "1",
        )
        .ok()
    }
}

impl Record for Station {
    const SECTION: &'static str = "CS";

    fn record_id(&self) -> i64 {
        self.id()
    }

    fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.id(),
            self.name(),
            self.workshops_total(),
            self.workshops_working(),
            self.station_class(),
            self.efficiency()
        )
    }

    // The stored efficiency must be numeric but is recomputed from the counts.
    fn from_line(line: &str) -> Option<Self> {
        let [id, name, total, working, class, efficiency] = fields::<6>(line)?;
        efficiency.parse::<f64>().ok()?;
        Station::new(
            parse_id(id)?,
            name,
            total.parse().ok()?,
            working.parse().ok()?,
            class,
        )
        .ok()
    }
}

impl Record for Connection {
    const SECTION: &'static str = "CONNECTIONS";

    fn record_id(&self) -> i64 {
        self.id
    }

    fn to_line(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.id,
            self.pipe_id,
            self.cs_in_id,
            self.cs_out_id,
            u8::from(self.is_active)
        )
    }

    fn from_line(line: &str) -> Option<Self> {
        let [id, pipe_id, cs_in_id, cs_out_id, is_active] = fields::<5>(line)?;
        Some(Connection {
            id: parse_id(id)?,
            pipe_id: pipe_id.parse().ok()?,
            cs_in_id: cs_in_id.parse().ok()?,
            cs_out_id: cs_out_id.parse().ok()?,
            is_active: is_active == "1",
        })
    }
}

/// A record's own id: positive, with room for the allocator to move past it
fn parse_id(field: &str) -> Option<i64> {
    field.parse().ok().filter(|&id| id > 0 && id < i64::MAX)
}

fn fields<const N: usize>(line: &str) -> Option<[&str; N]> {
    let parts: Vec<&str> = line.split('|').collect();
    parts.try_into().ok()
}

/// Write one section: header, one line per record, footer
pub fn write_section<'a, T, W, I>(writer: &mut W, records: I) -> io::Result<()>
where
    T: Record + 'a,
    W: Write,
    I: IntoIterator<Item = &'a T>,
{
    writeln!(writer, "{}", T::SECTION)?;
    for record in records {
        writeln!(writer, "{}", record.to_line())?;
    }
    writeln!(writer, "END{}", T::SECTION)
}

/// Collect the records of section `T` from `text`, keyed by id
///
/// A later record with the same id replaces an earlier one.
pub fn parse_section<T: Record>(text: &str) -> BTreeMap<i64, T> {
    let footer = format!("END{}", T::SECTION);
    let mut records = BTreeMap::new();
    let mut in_section = false;

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if line == T::SECTION {
            in_section = true;
        } else if line == footer {
            in_section = false;
        } else if in_section {
            if let Some(record) = T::from_line(line) {
                records.insert(record.record_id(), record);
            }
        }
    }

    records
}

/// Which sections of a snapshot replaced in-memory or stored state
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotLoad {
    pub pipes: usize,
    pub stations: usize,
    pub connections: usize,
}

impl SnapshotLoad {
    pub fn is_empty(&self) -> bool {
        self.pipes == 0 && self.stations == 0 && self.connections == 0
    }
}

/// Write pipes, stations and connections to `path`
pub fn save_snapshot(path: &Path, storage: &Storage, network: &GasNetwork) -> Result<()> {
    let mut buf = Vec::new();
    write_section(&mut buf, storage.all_pipes()?.values())?;
    write_section(&mut buf, storage.all_stations()?.values())?;
    network.write_records(&mut buf)?;
    fs::write(path, buf)?;
    Ok(())
}

/// Load a snapshot written by [`save_snapshot`]
///
/// Every section is applied on its own: an empty or missing section leaves
/// the corresponding data untouched.
pub fn load_snapshot(path: &Path, storage: &mut Storage, network: &mut GasNetwork) -> Result<SnapshotLoad> {
    let text = fs::read_to_string(path)?;

    let pipes = parse_section::<Pipe>(&text);
    if !pipes.is_empty() {
        storage.replace_pipes(&pipes)?;
    }

    let stations = parse_section::<Station>(&text);
    if !stations.is_empty() {
        storage.replace_stations(&stations)?;
    }

    let connections = parse_section::<Connection>(&text);
    let loaded = connections.len();
    network.replace(connections);

    Ok(SnapshotLoad {
        pipes: pipes.len(),
        stations: stations.len(),
        connections: loaded,
    })
}
