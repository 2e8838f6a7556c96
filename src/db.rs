//! Database schema and entity repository for pipes and stations

use std::collections::BTreeMap;
use std::path::Path;

use regex::{Regex, RegexBuilder};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::models::{Pipe, PipeId, Station, StationId};

/// What the network core needs from the entity store
///
/// Lookups hand back owned copies; nothing borrows into the store.
pub trait Repository {
    fn find_pipe(&self, id: PipeId) -> Result<Option<Pipe>>;

    fn find_station(&self, id: StationId) -> Result<Option<Station>>;

    /// All pipes ordered by id
    fn all_pipes(&self) -> Result<BTreeMap<PipeId, Pipe>>;

    /// Allocates a fresh pipe id; ids are never handed out twice
    fn next_pipe_id(&mut self) -> Result<PipeId>;

    fn insert_pipe(&mut self, pipe: &Pipe) -> Result<()>;

    fn station_exists(&self, id: StationId) -> Result<bool> {
        Ok(self.find_station(id)?.is_some())
    }
}

const PIPE_SEQUENCE: &str = "pipes";
const STATION_SEQUENCE: &str = "stations";

/// SQLite-backed entity store
pub struct Storage {
    conn: Connection,
}

impl Storage {
    /// Open (or create) the database at `path` and make sure the schema exists
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn remove_pipe(&mut self, id: PipeId) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM pipes WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// Overwrite the stored fields of an existing pipe
    pub fn update_pipe(&mut self, pipe: &Pipe) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE pipes SET name = ?2, length_km = ?3, diameter_mm = ?4, in_repair = ?5 WHERE id = ?1",
            (pipe.id, &pipe.name, pipe.length_km, pipe.diameter_mm, pipe.in_repair),
        )?;
        Ok(updated > 0)
    }

    /// Pipes whose name contains `name` (case-insensitive), optionally filtered by repair state
    pub fn search_pipes(&self, name: &str, in_repair: Option<bool>) -> Result<Vec<Pipe>> {
        let matcher = name_matcher(name)?;
        let pipes = self
            .all_pipes()?
            .into_values()
            .filter(|p| matcher.as_ref().is_none_or(|re| re.is_match(&p.name)))
            .filter(|p| in_repair.is_none_or(|flag| p.in_repair == flag))
            .collect();
        Ok(pipes)
    }

    pub fn next_station_id(&mut self) -> Result<StationId> {
        allocate_id(&self.conn, STATION_SEQUENCE)
    }

    /// Insert or replace a station
    pub fn insert_station(&mut self, station: &Station) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO stations (id, name, workshops_total, workshops_working, station_class)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (
                station.id(),
                station.name(),
                station.workshops_total(),
                station.workshops_working(),
                station.station_class(),
            ),
        )?;
        raise_sequence(&self.conn, STATION_SEQUENCE, station.id())?;
        Ok(())
    }

    pub fn update_station(&mut self, station: &Station) -> Result<bool> {
        let updated = self.conn.execute(
            "UPDATE stations SET name = ?2, workshops_total = ?3, workshops_working = ?4, station_class = ?5
             WHERE id = ?1",
            (
                station.id(),
                station.name(),
                station.workshops_total(),
                station.workshops_working(),
                station.station_class(),
            ),
        )?;
        Ok(updated > 0)
    }

    pub fn remove_station(&mut self, id: StationId) -> Result<bool> {
        let removed = self.conn.execute("DELETE FROM stations WHERE id = ?1", [id])?;
        Ok(removed > 0)
    }

    /// All stations ordered by id
    pub fn all_stations(&self) -> Result<BTreeMap<StationId, Station>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, workshops_total, workshops_working, station_class FROM stations ORDER BY id",
        )?;

        let rows = stmt.query_map([], station_from_row)?;

        let mut results = BTreeMap::new();
        for row in rows {
            let station = row?;
            results.insert(station.id(), station);
        }
        Ok(results)
    }

    /// Stations whose name contains `name` and whose idle share is at least `min_idle_percent`
    pub fn search_stations(&self, name: &str, min_idle_percent: Option<f64>) -> Result<Vec<Station>> {
        let matcher = name_matcher(name)?;
        let stations = self
            .all_stations()?
            .into_values()
            .filter(|s| matcher.as_ref().is_none_or(|re| re.is_match(s.name())))
            .filter(|s| min_idle_percent.is_none_or(|min| s.idle_percent() >= min))
            .collect();
        Ok(stations)
    }

    /// Replace every stored pipe with `pipes`
    pub fn replace_pipes(&mut self, pipes: &BTreeMap<PipeId, Pipe>) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM pipes", [])?;
        for pipe in pipes.values() {
            insert_pipe_row(&tx, pipe)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Replace every stored station with `stations`
    pub fn replace_stations(&mut self, stations: &BTreeMap<StationId, Station>) -> Result<()> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM stations", [])?;
        for station in stations.values() {
            tx.execute(
                "INSERT INTO stations (id, name, workshops_total, workshops_working, station_class)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                (
                    station.id(),
                    station.name(),
                    station.workshops_total(),
                    station.workshops_working(),
                    station.station_class(),
                ),
            )?;
            raise_sequence(&tx, STATION_SEQUENCE, station.id())?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Clear all entity data (id sequences are kept)
    pub fn clear(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            DELETE FROM pipes;
            DELETE FROM stations;
            "#,
        )?;
        Ok(())
    }
}

impl Repository for Storage {
    fn find_pipe(&self, id: PipeId) -> Result<Option<Pipe>> {
        let pipe = self
            .conn
            .query_row(
                "SELECT id, name, length_km, diameter_mm, in_repair FROM pipes WHERE id = ?1",
                [id],
                pipe_from_row,
            )
            .optional()?;
        Ok(pipe)
    }

    fn find_station(&self, id: StationId) -> Result<Option<Station>> {
        let station = self
            .conn
            .query_row(
                "SELECT id, name, workshops_total, workshops_working, station_class FROM stations WHERE id = ?1",
                [id],
                station_from_row,
            )
            .optional()?;
        Ok(station)
    }

    fn all_pipes(&self) -> Result<BTreeMap<PipeId, Pipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, length_km, diameter_mm, in_repair FROM pipes ORDER BY id",
        )?;

        let rows = stmt.query_map([], pipe_from_row)?;

        let mut results = BTreeMap::new();
        for row in rows {
            let pipe = row?;
            results.insert(pipe.id, pipe);
        }
        Ok(results)
    }

    fn next_pipe_id(&mut self) -> Result<PipeId> {
        allocate_id(&self.conn, PIPE_SEQUENCE)
    }

    /// Insert or replace a pipe
    fn insert_pipe(&mut self, pipe: &Pipe) -> Result<()> {
        insert_pipe_row(&self.conn, pipe)
    }
}

/// Initialize the database schema
fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS pipes (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            length_km REAL NOT NULL,
            diameter_mm INTEGER NOT NULL,
            in_repair INTEGER NOT NULL DEFAULT 0
        );

        -- Compressor stations; efficiency is derived, not stored
        CREATE TABLE IF NOT EXISTS stations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            workshops_total INTEGER NOT NULL,
            workshops_working INTEGER NOT NULL,
            station_class TEXT NOT NULL
        );

        -- Monotonic id allocators, one per entity kind
        CREATE TABLE IF NOT EXISTS id_sequences (
            name TEXT PRIMARY KEY,
            next_id INTEGER NOT NULL
        );

        INSERT OR IGNORE INTO id_sequences (name, next_id) VALUES ('pipes', 1), ('stations', 1);
        "#,
    )?;
    Ok(())
}

fn insert_pipe_row(conn: &Connection, pipe: &Pipe) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO pipes (id, name, length_km, diameter_mm, in_repair)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        (pipe.id, &pipe.name, pipe.length_km, pipe.diameter_mm, pipe.in_repair),
    )?;
    raise_sequence(conn, PIPE_SEQUENCE, pipe.id)?;
    Ok(())
}

fn allocate_id(conn: &Connection, sequence: &str) -> Result<i64> {
    let next: i64 = conn.query_row(
        "SELECT next_id FROM id_sequences WHERE name = ?1",
        [sequence],
        |row| row.get(0),
    )?;
    conn.execute(
        "UPDATE id_sequences SET next_id = ?2 WHERE name = ?1",
        (sequence, next + 1),
    )?;
    Ok(next)
}

/// Keep the allocator ahead of an explicitly inserted id
fn raise_sequence(conn: &Connection, sequence: &str, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE id_sequences SET next_id = MAX(next_id, ?2) WHERE name = ?1",
        (sequence, id.saturating_add(1)),
    )?;
    Ok(())
}

fn pipe_from_row(row: &Row<'_>) -> rusqlite::Result<Pipe> {
    Ok(Pipe {
        id: row.get(0)?,
        name: row.get(1)?,
        length_km: row.get(2)?,
        diameter_mm: row.get(3)?,
        in_repair: row.get(4)?,
    })
}

fn station_from_row(row: &Row<'_>) -> rusqlite::Result<Station> {
    let total: i64 = row.get(2)?;
    let working: i64 = row.get(3)?;
    Station::new(row.get(0)?, row.get::<_, String>(1)?, total, working, row.get::<_, String>(4)?)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Integer, Box::new(e)))
}

/// Case-insensitive substring matcher; an empty filter matches everything
fn name_matcher(name: &str) -> Result<Option<Regex>> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(None);
    }
    let re = RegexBuilder::new(&regex::escape(name))
        .case_insensitive(true)
        .build()?;
    Ok(Some(re))
}
