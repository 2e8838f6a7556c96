//! Data models for pipes, compressor stations and the connections between them

use std::fmt;

use crate::error::ModelError;

pub type PipeId = i64;
pub type StationId = i64;
pub type ConnectionId = i64;

/// Pipe diameters (mm) that may be bound into a connection
pub const VALID_DIAMETERS: [i64; 4] = [500, 700, 1000, 1400];

pub fn is_valid_diameter(diameter: i64) -> bool {
    VALID_DIAMETERS.contains(&diameter)
}

pub(crate) fn validate_name(name: &str) -> Result<(), ModelError> {
    if name.trim().is_empty() || name.contains('|') {
        return Err(ModelError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pipe {
    pub id: PipeId,
    pub name: String,
    pub length_km: f64,
    pub diameter_mm: i64, // any positive value until the pipe joins a connection
    pub in_repair: bool,
}

impl Pipe {
    pub fn new(
        id: PipeId,
        name: impl Into<String>,
        length_km: f64,
        diameter_mm: i64,
        in_repair: bool,
    ) -> Result<Self, ModelError> {
        let pipe = Self {
            id,
            name: name.into(),
            length_km,
            diameter_mm,
            in_repair,
        };
        pipe.validate()?;
        Ok(pipe)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        validate_name(&self.name)?;
        if !(self.length_km > 0.0) {
            return Err(ModelError::InvalidLength(self.length_km));
        }
        if self.diameter_mm <= 0 {
            return Err(ModelError::InvalidDiameter(self.diameter_mm));
        }
        Ok(())
    }

    pub fn state_label(&self) -> &'static str {
        if self.in_repair { "in repair" } else { "operational" }
    }
}

impl fmt::Display for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Pipe (ID={}) ---", self.id)?;
        writeln!(f, "  Name:     {}", self.name)?;
        writeln!(f, "  Length:   {} km", self.length_km)?;
        writeln!(f, "  Diameter: {} mm", self.diameter_mm)?;
        write!(f, "  State:    {}", self.state_label())
    }
}

/// Attributes of a pipe that does not exist yet
///
/// The connection builder collects these when no free pipe of the requested
/// diameter exists; the id and diameter are filled in at commit time.
#[derive(Debug, Clone, PartialEq)]
pub struct PipeDraft {
    pub name: String,
    pub length_km: f64,
    pub in_repair: bool,
}

impl PipeDraft {
    pub fn validate(&self) -> Result<(), ModelError> {
        validate_name(&self.name)?;
        if !(self.length_km > 0.0) {
            return Err(ModelError::InvalidLength(self.length_km));
        }
        Ok(())
    }

    pub fn into_pipe(self, id: PipeId, diameter_mm: i64) -> Result<Pipe, ModelError> {
        Pipe::new(id, self.name, self.length_km, diameter_mm, self.in_repair)
    }
}

/// A compressor station
///
/// Efficiency is derived from the workshop counts, so the counts are only
/// reachable through setters that keep both in step.
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    id: StationId,
    name: String,
    workshops_total: i64,
    workshops_working: i64,
    station_class: String,
    efficiency: f64,
}

impl Station {
    pub fn new(
        id: StationId,
        name: impl Into<String>,
        workshops_total: i64,
        workshops_working: i64,
        station_class: impl Into<String>,
    ) -> Result<Self, ModelError> {
        let name = name.into();
        validate_name(&name)?;
        check_workshops(workshops_total, workshops_working)?;

        Ok(Self {
            id,
            name,
            workshops_total,
            workshops_working,
            station_class: station_class.into(),
            efficiency: efficiency(workshops_total, workshops_working),
        })
    }

    pub fn id(&self) -> StationId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn workshops_total(&self) -> i64 {
        self.workshops_total
    }

    pub fn workshops_working(&self) -> i64 {
        self.workshops_working
    }

    pub fn station_class(&self) -> &str {
        &self.station_class
    }

    /// Percentage of workshops in operation
    pub fn efficiency(&self) -> f64 {
        self.efficiency
    }

    /// Percentage of workshops standing idle
    pub fn idle_percent(&self) -> f64 {
        if self.workshops_total > 0 {
            100.0 * (self.workshops_total - self.workshops_working) as f64
                / self.workshops_total as f64
        } else {
            0.0
        }
    }

    pub fn set_name(&mut self, name: impl Into<String>) -> Result<(), ModelError> {
        let name = name.into();
        validate_name(&name)?;
        self.name = name;
        Ok(())
    }

    pub fn set_station_class(&mut self, station_class: impl Into<String>) {
        self.station_class = station_class.into();
    }

    /// Updates both workshop counts at once
    pub fn set_workshops(&mut self, total: i64, working: i64) -> Result<(), ModelError> {
        check_workshops(total, working)?;
        self.workshops_total = total;
        self.workshops_working = working;
        self.efficiency = efficiency(total, working);
        Ok(())
    }
}

fn check_workshops(total: i64, working: i64) -> Result<(), ModelError> {
    if total < 0 || working < 0 || working > total {
        return Err(ModelError::InvalidWorkshops { total, working });
    }
    Ok(())
}

fn efficiency(total: i64, working: i64) -> f64 {
    if total > 0 {
        100.0 * working as f64 / total as f64
    } else {
        0.0
    }
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Station (ID={}) ---", self.id)?;
        writeln!(f, "  Name:       {}", self.name)?;
        writeln!(f, "  Class:      {}", self.station_class)?;
        writeln!(f, "  Workshops:  {} total, {} working", self.workshops_total, self.workshops_working)?;
        writeln!(f, "  Efficiency: {:.2}%", self.efficiency)?;
        write!(f, "  Idle:       {:.2}%", self.idle_percent())
    }
}

/// A directed edge between two stations, backed by one pipe
///
/// `pipe_id` and the station ids are plain references: removing the pipe or
/// a station later leaves the connection in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub pipe_id: PipeId,
    pub cs_in_id: StationId,
    pub cs_out_id: StationId,
    pub is_active: bool,
}

impl Connection {
    pub fn new(id: ConnectionId, pipe_id: PipeId, cs_in_id: StationId, cs_out_id: StationId) -> Self {
        Self {
            id,
            pipe_id,
            cs_in_id,
            cs_out_id,
            is_active: true,
        }
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[ID={}] CS {} -> CS {} via pipe {} ({})",
            self.id,
            self.cs_in_id,
            self.cs_out_id,
            self.pipe_id,
            if self.is_active { "active" } else { "inactive" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_efficiency_follows_workshops() {
        let mut station = Station::new(1, "North", 10, 7, "A").unwrap();
        assert_eq!(station.efficiency(), 70.0);
        assert!((station.idle_percent() - 30.0).abs() < 1e-9);

        station.set_workshops(4, 4).unwrap();
        assert_eq!(station.efficiency(), 100.0);
        assert_eq!(station.idle_percent(), 0.0);
    }

    #[test]
    fn test_station_without_workshops_has_zero_efficiency() {
        let station = Station::new(1, "Empty", 0, 0, "B").unwrap();
        assert_eq!(station.efficiency(), 0.0);
        assert_eq!(station.idle_percent(), 0.0);
    }

    #[test]
    fn test_working_cannot_exceed_total() {
        assert_eq!(
            Station::new(1, "North", 3, 4, "A"),
            Err(ModelError::InvalidWorkshops { total: 3, working: 4 })
        );

        let mut station = Station::new(1, "North", 5, 5, "A").unwrap();
        assert!(station.set_workshops(2, 5).is_err());
        assert_eq!(station.workshops_total(), 5);
        assert_eq!(station.efficiency(), 100.0);
    }

    #[test]
    fn test_pipe_validation() {
        assert!(Pipe::new(1, "P", 1.5, 1234, false).is_ok());
        assert_eq!(
            Pipe::new(1, "P", 0.0, 700, false),
            Err(ModelError::InvalidLength(0.0))
        );
        assert_eq!(
            Pipe::new(1, "P", 2.0, 0, false),
            Err(ModelError::InvalidDiameter(0))
        );
        assert!(Pipe::new(1, "a|b", 2.0, 700, false).is_err());
        assert!(Pipe::new(1, "  ", 2.0, 700, false).is_err());
    }

    #[test]
    fn test_valid_diameters() {
        for d in VALID_DIAMETERS {
            assert!(is_valid_diameter(d));
        }
        assert!(!is_valid_diameter(999));
        assert!(!is_valid_diameter(0));
    }

    #[test]
    fn test_connection_defaults_to_active() {
        let conn = Connection::new(3, 10, 1, 2);
        assert!(conn.is_active);
        assert_eq!(conn.to_string(), "[ID=3] CS 1 -> CS 2 via pipe 10 (active)");
    }
}
