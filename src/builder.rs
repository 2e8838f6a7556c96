//! Connection builder
//!
//! Building a connection runs in two phases. [`plan_connection`] reads every
//! answer from the input source and validates it against the repository and
//! the registry without changing either. [`commit_connection`] then creates
//! the pipe (when no free one exists) and the connection. A refused plan
//! therefore leaves no stray pipe behind.

use std::io;

use thiserror::Error;

use crate::db::Repository;
use crate::error::{ModelError, StorageError};
use crate::events::EventLog;
use crate::models::{Connection, Pipe, PipeDraft, StationId, is_valid_diameter};
use crate::network::GasNetwork;

/// Where the builder gets its answers from
///
/// Methods are called in a fixed order: `diameter`, then `new_pipe` (only
/// when no free pipe of that diameter exists), then `source_station` and
/// `destination_station`.
pub trait ConnectionInput {
    fn diameter(&mut self) -> io::Result<i64>;

    /// Attributes for a new pipe; its diameter will be `diameter`
    fn new_pipe(&mut self, diameter: i64) -> io::Result<PipeDraft>;

    fn source_station(&mut self) -> io::Result<StationId>;

    fn destination_station(&mut self) -> io::Result<StationId>;
}

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid diameter {0} mm (allowed: 500, 700, 1000, 1400)")]
    InvalidDiameter(i64),

    #[error("source station {0} not found")]
    SourceNotFound(StationId),

    #[error("destination station {0} not found")]
    DestinationNotFound(StationId),

    #[error("station {0} cannot be connected to itself")]
    SelfLoop(StationId),

    #[error("invalid pipe attributes: {0}")]
    InvalidPipe(#[from] ModelError),

    #[error("failed to read input")]
    Input(#[from] io::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The pipe a planned connection will use
#[derive(Debug, Clone, PartialEq)]
pub enum PipeChoice {
    /// A free pipe already in the repository
    Existing(Pipe),
    /// A pipe to be created at commit time
    New(PipeDraft),
}

/// A validated connection request, not yet applied
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionPlan {
    pub diameter: i64,
    pub pipe: PipeChoice,
    pub source: StationId,
    pub destination: StationId,
}

/// Read and validate a connection request
///
/// The lowest-id free pipe of the requested diameter is chosen; when there
/// is none the input is asked for new pipe attributes instead.
pub fn plan_connection<R, I>(repo: &R, network: &GasNetwork, input: &mut I) -> Result<ConnectionPlan, BuildError>
where
    R: Repository + ?Sized,
    I: ConnectionInput + ?Sized,
{
    let diameter = input.diameter()?;
    if !is_valid_diameter(diameter) {
        return Err(BuildError::InvalidDiameter(diameter));
    }

    let available = network.find_available_pipes(diameter, repo)?;
    let pipe = match available.into_values().next() {
        Some(pipe) => PipeChoice::Existing(pipe),
        None => {
            let draft = input.new_pipe(diameter)?;
            draft.validate()?;
            PipeChoice::New(draft)
        }
    };

    let source = input.source_station()?;
    if !repo.station_exists(source)? {
        return Err(BuildError::SourceNotFound(source));
    }

    let destination = input.destination_station()?;
    if !repo.station_exists(destination)? {
        return Err(BuildError::DestinationNotFound(destination));
    }

    if source == destination {
        return Err(BuildError::SelfLoop(source));
    }

    Ok(ConnectionPlan {
        diameter,
        pipe,
        source,
        destination,
    })
}

/// Apply a plan: create the pipe if needed, then register the connection
pub fn commit_connection<R>(
    plan: ConnectionPlan,
    repo: &mut R,
    network: &mut GasNetwork,
    log: &dyn EventLog,
) -> Result<Connection, BuildError>
where
    R: Repository + ?Sized,
{
    let pipe_id = match plan.pipe {
        PipeChoice::Existing(pipe) => pipe.id,
        PipeChoice::New(draft) => {
            let id = repo.next_pipe_id()?;
            let pipe = draft.into_pipe(id, plan.diameter)?;
            repo.insert_pipe(&pipe)?;
            log.append(&format!(
                "Created pipe ID={} name=\"{}\" diameter={} for new connection",
                pipe.id, pipe.name, pipe.diameter_mm
            ));
            pipe.id
        }
    };

    let conn = Connection::new(network.allocate_id(), pipe_id, plan.source, plan.destination);
    network.insert(conn.clone());
    log.append(&format!(
        "Created connection: ID={}, pipe={}, CS_in={}, CS_out={}",
        conn.id, conn.pipe_id, conn.cs_in_id, conn.cs_out_id
    ));

    Ok(conn)
}

/// Plan and commit in one go
pub fn create_connection<R, I>(
    repo: &mut R,
    network: &mut GasNetwork,
    input: &mut I,
    log: &dyn EventLog,
) -> Result<Connection, BuildError>
where
    R: Repository + ?Sized,
    I: ConnectionInput + ?Sized,
{
    let plan = match plan_connection(&*repo, &*network, input) {
        Ok(plan) => plan,
        Err(e) => {
            log.append(&format!("Connection not created: {e}"));
            return Err(e);
        }
    };
    commit_connection(plan, repo, network, log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Storage;
    use crate::events::testing::RecordingLog;
    use crate::models::Station;

    /// Canned answers for the builder
    struct ScriptedInput {
        diameter: i64,
        source: StationId,
        destination: StationId,
        new_pipe: Option<PipeDraft>,
        asked_for_pipe: bool,
    }

    impl ScriptedInput {
        fn new(diameter: i64, source: StationId, destination: StationId) -> Self {
            Self {
                diameter,
                source,
                destination,
                new_pipe: None,
                asked_for_pipe: false,
            }
        }

        fn with_new_pipe(mut self, name: &str, length_km: f64) -> Self {
            self.new_pipe = Some(PipeDraft {
                name: name.to_string(),
                length_km,
                in_repair: false,
            });
            self
        }
    }

    impl ConnectionInput for ScriptedInput {
        fn diameter(&mut self) -> io::Result<i64> {
            Ok(self.diameter)
        }

        fn new_pipe(&mut self, _diameter: i64) -> io::Result<PipeDraft> {
            self.asked_for_pipe = true;
            self.new_pipe
                .clone()
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no pipe scripted"))
        }

        fn source_station(&mut self) -> io::Result<StationId> {
            Ok(self.source)
        }

        fn destination_station(&mut self) -> io::Result<StationId> {
            Ok(self.destination)
        }
    }

    fn setup() -> (Storage, GasNetwork) {
        let mut storage = Storage::open_in_memory().unwrap();
        storage.insert_station(&Station::new(1, "A", 2, 2, "I").unwrap()).unwrap();
        storage.insert_station(&Station::new(2, "B", 2, 1, "I").unwrap()).unwrap();
        (storage, GasNetwork::new())
    }

    #[test]
    fn test_uses_lowest_free_pipe() {
        let (mut storage, mut network) = setup();
        storage.insert_pipe(&Pipe::new(12, "P12", 3.0, 700, false).unwrap()).unwrap();
        storage.insert_pipe(&Pipe::new(5, "P5", 3.0, 700, false).unwrap()).unwrap();
        let log = RecordingLog::default();

        let mut input = ScriptedInput::new(700, 1, 2);
        let conn = create_connection(&mut storage, &mut network, &mut input, &log).unwrap();

        assert_eq!(conn, Connection::new(1, 5, 1, 2));
        assert!(!input.asked_for_pipe);
        assert_eq!(network.len(), 1);
        assert_eq!(
            log.events(),
            vec!["Created connection: ID=1, pipe=5, CS_in=1, CS_out=2".to_string()]
        );
    }

    #[test]
    fn test_second_connection_takes_next_pipe() {
        let (mut storage, mut network) = setup();
        storage.insert_pipe(&Pipe::new(1, "P1", 3.0, 500, false).unwrap()).unwrap();
        storage.insert_pipe(&Pipe::new(2, "P2", 3.0, 500, false).unwrap()).unwrap();
        let log = RecordingLog::default();

        create_connection(&mut storage, &mut network, &mut ScriptedInput::new(500, 1, 2), &log).unwrap();
        let second =
            create_connection(&mut storage, &mut network, &mut ScriptedInput::new(500, 2, 1), &log).unwrap();

        assert_eq!(second.id, 2);
        assert_eq!(second.pipe_id, 2);
    }

    #[test]
    fn test_creates_pipe_with_requested_diameter() {
        let (mut storage, mut network) = setup();
        storage.insert_pipe(&Pipe::new(1, "Broken", 3.0, 1400, true).unwrap()).unwrap();
        let log = RecordingLog::default();

        let mut input = ScriptedInput::new(1400, 2, 1).with_new_pipe("Fresh", 8.5);
        let conn = create_connection(&mut storage, &mut network, &mut input, &log).unwrap();

        assert!(input.asked_for_pipe);
        assert_eq!(conn.pipe_id, 2);
        let pipe = storage.find_pipe(2).unwrap().unwrap();
        assert_eq!(pipe.diameter_mm, 1400);
        assert_eq!(pipe.name, "Fresh");
        assert_eq!(log.events().len(), 2);
    }

    #[test]
    fn test_invalid_diameter_changes_nothing() {
        let (mut storage, mut network) = setup();
        let log = RecordingLog::default();

        let mut input = ScriptedInput::new(999, 1, 2).with_new_pipe("Never", 1.0);
        let err = create_connection(&mut storage, &mut network, &mut input, &log).unwrap_err();

        assert!(matches!(err, BuildError::InvalidDiameter(999)));
        assert!(!input.asked_for_pipe);
        assert!(network.is_empty());
        assert!(storage.all_pipes().unwrap().is_empty());
    }

    #[test]
    fn test_self_loop_is_refused() {
        let (mut storage, mut network) = setup();
        storage.insert_pipe(&Pipe::new(1, "P1", 3.0, 700, false).unwrap()).unwrap();
        let log = RecordingLog::default();

        let err = create_connection(&mut storage, &mut network, &mut ScriptedInput::new(700, 1, 1), &log)
            .unwrap_err();

        assert!(matches!(err, BuildError::SelfLoop(1)));
        assert!(network.is_empty());
    }

    #[test]
    fn test_self_loop_without_free_pipe_leaves_no_orphan() {
        let (mut storage, mut network) = setup();
        let log = RecordingLog::default();

        let mut input = ScriptedInput::new(700, 2, 2).with_new_pipe("Orphan", 1.0);
        let err = create_connection(&mut storage, &mut network, &mut input, &log).unwrap_err();

        assert!(matches!(err, BuildError::SelfLoop(2)));
        assert!(input.asked_for_pipe);
        assert!(storage.all_pipes().unwrap().is_empty());
        assert!(network.is_empty());
        assert_eq!(log.events(), vec!["Connection not created: station 2 cannot be connected to itself".to_string()]);
    }

    #[test]
    fn test_missing_stations_are_reported_in_order() {
        let (mut storage, mut network) = setup();
        storage.insert_pipe(&Pipe::new(1, "P1", 3.0, 700, false).unwrap()).unwrap();
        let log = RecordingLog::default();

        let err = create_connection(&mut storage, &mut network, &mut ScriptedInput::new(700, 9, 8), &log)
            .unwrap_err();
        assert!(matches!(err, BuildError::SourceNotFound(9)));

        let err = create_connection(&mut storage, &mut network, &mut ScriptedInput::new(700, 1, 8), &log)
            .unwrap_err();
        assert!(matches!(err, BuildError::DestinationNotFound(8)));
        assert!(network.is_empty());
    }

    #[test]
    fn test_invalid_new_pipe_is_refused_before_commit() {
        let (storage, network) = setup();
        let mut input = ScriptedInput::new(500, 1, 2).with_new_pipe("Bad|name", 1.0);

        let err = plan_connection(&storage, &network, &mut input).unwrap_err();
        assert!(matches!(err, BuildError::InvalidPipe(_)));
    }

    #[test]
    fn test_plan_does_not_mutate() {
        let (mut storage, mut network) = setup();
        let mut input = ScriptedInput::new(1000, 1, 2).with_new_pipe("Planned", 2.0);

        let plan = plan_connection(&storage, &network, &mut input).unwrap();
        assert!(storage.all_pipes().unwrap().is_empty());
        assert!(network.is_empty());

        let conn = commit_connection(plan, &mut storage, &mut network, &RecordingLog::default()).unwrap();
        assert_eq!(storage.find_pipe(conn.pipe_id).unwrap().map(|p| p.diameter_mm), Some(1000));
    }
}
