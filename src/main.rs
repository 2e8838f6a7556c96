//! Gas Network Manager
//!
//! Keeps pipes and compressor stations in SQLite and the directed
//! connections between stations in a record file beside it.

mod builder;
mod db;
mod error;
mod events;
mod graph;
mod input;
mod models;
mod network;
mod records;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result, bail};
use clap::builder::BoolishValueParser;
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::db::{Repository, Storage};
use crate::events::{EventLog, TracingLog};
use crate::input::{ConnectAnswers, PromptedConnection, Prompter};
use crate::models::{Connection, Pipe, Station};
use crate::network::GasNetwork;

#[derive(Parser)]
#[command(name = "gas-network")]
#[command(about = "Manage pipes, compressor stations and the gas network between them")]
struct Cli {
    /// Path to the SQLite database holding pipes and stations
    #[arg(short, long, env = "GAS_NETWORK_DB", default_value = "gas_network.db")]
    database: PathBuf,

    /// Connection record file, loaded at start and rewritten after changes
    #[arg(short, long, env = "GAS_NETWORK_FILE", default_value = "gas_network.txt")]
    network: PathBuf,

    /// Event log (appended to)
    #[arg(long, env = "GAS_NETWORK_LOG", default_value = "gas_network.log")]
    log_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Add a pipe; missing values are asked for
    AddPipe {
        #[arg(long)]
        name: Option<String>,

        /// Length in km
        #[arg(long, value_parser = positive_number)]
        length: Option<f64>,

        /// Diameter in mm
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        diameter: Option<i64>,

        #[arg(long, value_parser = BoolishValueParser::new())]
        in_repair: Option<bool>,
    },

    /// Add a compressor station; missing values are asked for
    AddStation {
        #[arg(long)]
        name: Option<String>,

        /// Total number of workshops
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        workshops: Option<i64>,

        /// Workshops in operation (at most the total)
        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        working: Option<i64>,

        #[arg(long)]
        class: Option<String>,
    },

    /// List all pipes and stations
    List,

    /// Show one pipe
    Pipe {
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,
    },

    /// Show one station
    Station {
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,
    },

    /// Edit a pipe; with no options the repair state is toggled
    EditPipe {
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_parser = positive_number)]
        length: Option<f64>,

        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        diameter: Option<i64>,

        #[arg(long, value_parser = BoolishValueParser::new())]
        in_repair: Option<bool>,
    },

    /// Edit a station; the working count always stays within the total
    EditStation {
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long, value_parser = clap::value_parser!(i64).range(1..))]
        workshops: Option<i64>,

        #[arg(long, value_parser = clap::value_parser!(i64).range(0..))]
        working: Option<i64>,

        #[arg(long)]
        class: Option<String>,
    },

    /// Remove a pipe (connections using it are kept)
    RemovePipe {
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,
    },

    /// Remove a station (connections touching it are kept)
    RemoveStation {
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,
    },

    /// Search pipes by name (case-insensitive substring) and repair state
    SearchPipes {
        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, value_parser = BoolishValueParser::new())]
        in_repair: Option<bool>,
    },

    /// Search stations by name and minimum idle percentage
    SearchStations {
        #[arg(long, default_value = "")]
        name: String,

        /// Minimum share of idle workshops, in percent
        #[arg(long)]
        min_idle: Option<f64>,
    },

    /// Change or remove every pipe matching a search
    #[command(group(ArgGroup::new("action").required(true).args(["set_repair", "remove"])))]
    BatchPipes {
        #[arg(long, default_value = "")]
        name: String,

        #[arg(long, value_parser = BoolishValueParser::new())]
        in_repair: Option<bool>,

        /// Restrict the batch to these ids from the search result
        #[arg(long, value_delimiter = ',', value_parser = clap::value_parser!(i64).range(1..))]
        ids: Vec<i64>,

        /// Set the repair state of every selected pipe
        #[arg(long, value_parser = BoolishValueParser::new())]
        set_repair: Option<bool>,

        /// Remove every selected pipe
        #[arg(long)]
        remove: bool,
    },

    /// Connect two stations with a free pipe (or a new one)
    Connect {
        /// Pipe diameter in mm (500, 700, 1000 or 1400)
        #[arg(long)]
        diameter: Option<i64>,

        /// Source station id
        #[arg(long)]
        from: Option<i64>,

        /// Destination station id
        #[arg(long)]
        to: Option<i64>,

        /// Name for a new pipe, used only when no free pipe exists
        #[arg(long)]
        pipe_name: Option<String>,

        #[arg(long, value_parser = positive_number)]
        pipe_length: Option<f64>,

        #[arg(long, value_parser = BoolishValueParser::new())]
        pipe_in_repair: Option<bool>,
    },

    /// List all connections
    Connections,

    /// Remove a connection
    Disconnect {
        #[arg(value_parser = clap::value_parser!(i64).range(1..))]
        id: i64,
    },

    /// Print the stations in topological order
    Sort,

    /// Print the network as adjacency lists
    Graph,

    /// Save pipes, stations and connections to a snapshot file
    Save { file: PathBuf },

    /// Load a snapshot file written by `save`
    Load { file: PathBuf },

    /// Replace all data with a small demonstration network
    LoadSample,
}

fn positive_number(s: &str) -> std::result::Result<f64, String> {
    match s.parse::<f64>() {
        Ok(v) if v > 0.0 && v.is_finite() => Ok(v),
        _ => Err(format!("`{s}` is not a positive number")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_file)?;

    let mut storage = Storage::open(&cli.database)
        .with_context(|| format!("failed to open database {}", cli.database.display()))?;

    let mut network = GasNetwork::new();
    if network
        .load_from_path(&cli.network)
        .with_context(|| format!("failed to read network file {}", cli.network.display()))?
    {
        tracing::debug!(connections = network.len(), "network loaded");
    }

    let log = TracingLog;

    match cli.command {
        Commands::Init => {
            println!("Database initialized at: {}", cli.database.display());
        }

        Commands::AddPipe {
            name,
            length,
            diameter,
            in_repair,
        } => {
            let mut prompter = Prompter::stdio();
            let draft = prompter.pipe_draft(name, length, in_repair)?;
            draft.validate()?;
            let diameter = match diameter {
                Some(d) => d,
                None => prompter.positive_int("Diameter (mm): ")?,
            };

            let id = storage.next_pipe_id()?;
            let pipe = draft.into_pipe(id, diameter)?;
            storage.insert_pipe(&pipe)?;
            log.append(&format!("Added pipe ID={} name=\"{}\"", pipe.id, pipe.name));
            println!("Pipe added with ID={}", pipe.id);
        }

        Commands::AddStation {
            name,
            workshops,
            working,
            class,
        } => {
            let mut prompter = Prompter::stdio();
            let name = match name {
                Some(name) => name,
                None => prompter.field("Station name: ")?,
            };
            let total = match workshops {
                Some(total) => total,
                None => prompter.positive_int("Total workshops: ")?,
            };
            let working = match working {
                Some(working) => working,
                None => prompter.working_workshops(total)?,
            };
            let class = match class {
                Some(class) => class,
                None => prompter.field("Station class: ")?,
            };

            let id = storage.next_station_id()?;
            let station = Station::new(id, name, total, working, class)?;
            storage.insert_station(&station)?;
            log.append(&format!("Added station ID={} name=\"{}\"", station.id(), station.name()));
            println!("Station added with ID={}", station.id());
        }

        Commands::List => {
            let pipes: Vec<Pipe> = storage.all_pipes()?.into_values().collect();
            let stations: Vec<Station> = storage.all_stations()?.into_values().collect();
            if pipes.is_empty() && stations.is_empty() {
                println!("No pipes or stations. Use 'add-pipe', 'add-station' or 'load-sample' first.");
            } else {
                print_pipes(&pipes);
                println!();
                print_stations(&stations);
            }
        }

        Commands::Pipe { id } => match storage.find_pipe(id)? {
            Some(pipe) => println!("{pipe}"),
            None => println!("Pipe {id} not found"),
        },

        Commands::Station { id } => match storage.find_station(id)? {
            Some(station) => println!("{station}"),
            None => println!("Station {id} not found"),
        },

        Commands::EditPipe {
            id,
            name,
            length,
            diameter,
            in_repair,
        } => {
            let Some(mut pipe) = storage.find_pipe(id)? else {
                bail!("pipe {id} not found");
            };

            let toggle = name.is_none() && length.is_none() && diameter.is_none() && in_repair.is_none();
            if let Some(name) = name {
                pipe.name = name;
            }
            if let Some(length) = length {
                pipe.length_km = length;
            }
            if let Some(diameter) = diameter {
                pipe.diameter_mm = diameter;
            }
            pipe.in_repair = match in_repair {
                Some(flag) => flag,
                None if toggle => !pipe.in_repair,
                None => pipe.in_repair,
            };
            pipe.validate()?;

            storage.update_pipe(&pipe)?;
            log.append(&format!("Edited pipe ID={} ({})", pipe.id, pipe.state_label()));
            println!("{pipe}");
        }

        Commands::EditStation {
            id,
            name,
            workshops,
            working,
            class,
        } => {
            let Some(mut station) = storage.find_station(id)? else {
                bail!("station {id} not found");
            };

            if let Some(name) = name {
                station.set_name(name)?;
            }
            if let Some(class) = class {
                station.set_station_class(class);
            }

            let total = workshops.unwrap_or(station.workshops_total());
            let working = match working {
                Some(working) => working,
                None if station.workshops_working() <= total => station.workshops_working(),
                None => {
                    let mut prompter = Prompter::stdio();
                    prompter.say(&format!("The station now has only {total} workshops."))?;
                    prompter.working_workshops(total)?
                }
            };
            station.set_workshops(total, working)?;

            storage.update_station(&station)?;
            log.append(&format!(
                "Edited station ID={}: {}/{} workshops working",
                station.id(),
                station.workshops_working(),
                station.workshops_total()
            ));
            println!("{station}");
        }

        Commands::RemovePipe { id } => {
            if storage.remove_pipe(id)? {
                log.append(&format!("Removed pipe ID={id}"));
                println!("Pipe {id} removed");
                let users = network.connections().filter(|c| c.pipe_id == id).count();
                if users > 0 {
                    println!("Note: {users} connection(s) still reference pipe {id}");
                }
            } else {
                println!("Pipe {id} not found");
            }
        }

        Commands::RemoveStation { id } => {
            if storage.remove_station(id)? {
                log.append(&format!("Removed station ID={id}"));
                println!("Station {id} removed");
                let touching = network
                    .connections()
                    .filter(|c| c.cs_in_id == id || c.cs_out_id == id)
                    .count();
                if touching > 0 {
                    println!("Note: {touching} connection(s) still reference station {id}");
                }
            } else {
                println!("Station {id} not found");
            }
        }

        Commands::SearchPipes { name, in_repair } => {
            let pipes = storage.search_pipes(&name, in_repair)?;
            if pipes.is_empty() {
                println!("No matching pipes");
            } else {
                print_pipes(&pipes);
            }
        }

        Commands::SearchStations { name, min_idle } => {
            let stations = storage.search_stations(&name, min_idle)?;
            if stations.is_empty() {
                println!("No matching stations");
            } else {
                print_stations(&stations);
            }
        }

        Commands::BatchPipes {
            name,
            in_repair,
            ids,
            set_repair,
            remove,
        } => {
            let mut selected = storage.search_pipes(&name, in_repair)?;
            if !ids.is_empty() {
                selected.retain(|p| ids.contains(&p.id));
            }
            if selected.is_empty() {
                println!("No matching pipes");
                return Ok(());
            }

            if remove {
                for pipe in &selected {
                    storage.remove_pipe(pipe.id)?;
                }
                log.append(&format!("Batch: removed {} pipe(s)", selected.len()));
                println!("Removed {} pipe(s)", selected.len());
            } else if let Some(flag) = set_repair {
                for pipe in &mut selected {
                    pipe.in_repair = flag;
                    storage.update_pipe(pipe)?;
                }
                log.append(&format!("Batch: set in_repair={} on {} pipe(s)", flag, selected.len()));
                println!("Updated {} pipe(s)", selected.len());
            }
        }

        Commands::Connect {
            diameter,
            from,
            to,
            pipe_name,
            pipe_length,
            pipe_in_repair,
        } => {
            let answers = ConnectAnswers {
                diameter,
                from,
                to,
                pipe_name,
                pipe_length_km: pipe_length,
                pipe_in_repair,
            };
            let mut prompter = Prompter::stdio();
            let mut input = PromptedConnection::new(answers, &mut prompter);

            let conn = builder::create_connection(&mut storage, &mut network, &mut input, &log)
                .context("connection not created")?;
            save_network(&network, &cli.network)?;
            println!("Connection created: {conn}");
        }

        Commands::Connections => {
            if network.is_empty() {
                println!("No connections");
            } else {
                for conn in network.connections() {
                    println!("{conn}");
                }
            }
        }

        Commands::Disconnect { id } => {
            let Some(conn) = network.get(id).cloned() else {
                println!("Connection {id} not found");
                return Ok(());
            };
            network.remove(id);
            save_network(&network, &cli.network)?;
            log.append(&format!("Removed connection {conn}"));
            println!("Removed connection {conn}");
        }

        Commands::Sort => {
            let summary = graph::summarize_sort(&network, &storage)?;
            log.append(&format!(
                "Topological sort: {} station(s) ordered{}",
                summary.order.len(),
                if summary.has_cycles { ", cycle detected" } else { "" }
            ));
            print!("{summary}");
        }

        Commands::Graph => {
            print!("{}", graph::format_network_graph(&network, &storage)?);
        }

        Commands::Save { file } => {
            records::save_snapshot(&file, &storage, &network)
                .with_context(|| format!("failed to save {}", file.display()))?;
            log.append(&format!("Data saved to {}", file.display()));
            println!("Saved to {}", file.display());
        }

        Commands::Load { file } => {
            let loaded = records::load_snapshot(&file, &mut storage, &mut network)
                .with_context(|| format!("failed to load {}", file.display()))?;
            if loaded.is_empty() {
                bail!("{} holds no records; nothing was loaded", file.display());
            }
            if loaded.connections > 0 {
                save_network(&network, &cli.network)?;
            }
            log.append(&format!(
                "Data loaded from {}: {} pipe(s), {} station(s), {} connection(s)",
                file.display(),
                loaded.pipes,
                loaded.stations,
                loaded.connections
            ));
            println!(
                "Loaded {} pipe(s), {} station(s), {} connection(s)",
                loaded.pipes, loaded.stations, loaded.connections
            );
        }

        Commands::LoadSample => {
            load_sample_data(&mut storage, &mut network)?;
            save_network(&network, &cli.network)?;
            log.append("Sample data loaded");
            println!("Sample data loaded successfully!");
        }
    }

    Ok(())
}

/// Install the stderr and log-file subscribers
///
/// stderr follows `RUST_LOG` (default `warn`); the log file always records
/// INFO and above, which includes every event from [`TracingLog`].
fn init_tracing(log_file: &Path) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open log file {}", log_file.display()))?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_filter(LevelFilter::INFO);

    tracing_subscriber::registry().with(stderr_layer).with(file_layer).init();
    Ok(())
}

fn save_network(network: &GasNetwork, path: &Path) -> Result<()> {
    network
        .save_to_path(path)
        .with_context(|| format!("failed to write network file {}", path.display()))
}

fn print_pipes(pipes: &[Pipe]) {
    println!("{:<6} {:<24} {:>10} {:>10}  {}", "ID", "Pipe", "Length km", "Diam. mm", "State");
    println!("{}", "-".repeat(66));
    for p in pipes {
        println!(
            "{:<6} {:<24} {:>10.2} {:>10}  {}",
            p.id,
            p.name,
            p.length_km,
            p.diameter_mm,
            p.state_label()
        );
    }
}

fn print_stations(stations: &[Station]) {
    println!(
        "{:<6} {:<24} {:>9} {:>9} {:>8}  {}",
        "ID", "Station", "Workshops", "Working", "Idle %", "Class"
    );
    println!("{}", "-".repeat(70));
    for s in stations {
        println!(
            "{:<6} {:<24} {:>9} {:>9} {:>8.2}  {}",
            s.id(),
            s.name(),
            s.workshops_total(),
            s.workshops_working(),
            s.idle_percent(),
            s.station_class()
        );
    }
}

/// Replace everything with a small network for trying out the commands
fn load_sample_data(storage: &mut Storage, network: &mut GasNetwork) -> Result<()> {
    storage.clear()?;
    *network = GasNetwork::new();

    let stations = [
        Station::new(1, "Urengoy", 12, 10, "Head")?,
        Station::new(2, "Pangody", 8, 6, "Line")?,
        Station::new(3, "Nadym", 10, 4, "Line")?,
        Station::new(4, "Ukhta", 6, 6, "Booster")?,
    ];
    for station in &stations {
        storage.insert_station(station)?;
    }

    let pipes = [
        Pipe::new(1, "Urengoy-Pangody", 120.0, 1400, false)?,
        Pipe::new(2, "Pangody-Nadym", 95.5, 1000, false)?,
        Pipe::new(3, "Urengoy-Nadym bypass", 180.0, 700, false)?,
        Pipe::new(4, "Nadym-Ukhta", 310.0, 1400, false)?,
        Pipe::new(5, "Spare 500", 12.0, 500, true)?,
    ];
    for pipe in &pipes {
        storage.insert_pipe(pipe)?;
    }

    for (pipe_id, from, to) in [(1, 1, 2), (2, 2, 3), (3, 1, 3), (4, 3, 4)] {
        let id = network.allocate_id();
        network.insert(Connection::new(id, pipe_id, from, to));
    }

    println!(
        "Loaded {} stations, {} pipes and {} connections",
        stations.len(),
        pipes.len(),
        network.len()
    );
    Ok(())
}
