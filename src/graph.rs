//! Graph algorithms over the station network
//!
//! Stations are nodes and active connections are edges `cs_in -> cs_out`.
//! Connections that point at a station which no longer exists are left out
//! of the graph.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::fmt;

use crate::db::Repository;
use crate::error::Result;
use crate::models::StationId;
use crate::network::GasNetwork;

/// Order the stations with Kahn's algorithm
///
/// Stations with no incoming edge are visited first, lowest id first. When
/// the graph has a cycle the result is partial: stations on a cycle, or
/// downstream of one, are missing.
pub fn topological_sort<R: Repository + ?Sized>(network: &GasNetwork, repo: &R) -> Result<Vec<StationId>> {
    let (order, _) = sort_with_destinations(network, repo)?;
    Ok(order)
}

/// Whether the active connections form a cycle
pub fn has_cycles<R: Repository + ?Sized>(network: &GasNetwork, repo: &R) -> Result<bool> {
    let (order, destinations) = sort_with_destinations(network, repo)?;
    Ok(cycle_in_order(&order, &destinations))
}

/// Kahn's sort plus the destinations of every edge it considered
///
/// Edges touching a station that no longer exists are left out of both.
fn sort_with_destinations<R: Repository + ?Sized>(
    network: &GasNetwork,
    repo: &R,
) -> Result<(Vec<StationId>, BTreeSet<StationId>)> {
    let mut known: BTreeMap<StationId, bool> = BTreeMap::new();
    let mut exists = |id: StationId| -> Result<bool> {
        if let Some(&found) = known.get(&id) {
            return Ok(found);
        }
        let found = repo.station_exists(id)?;
        known.insert(id, found);
        Ok(found)
    };

    let mut in_degree: BTreeMap<StationId, usize> = BTreeMap::new();
    let mut adjacency: BTreeMap<StationId, Vec<StationId>> = BTreeMap::new();
    let mut destinations = BTreeSet::new();

    for conn in network.active() {
        if !exists(conn.cs_in_id)? || !exists(conn.cs_out_id)? {
            continue;
        }
        adjacency.entry(conn.cs_in_id).or_default().push(conn.cs_out_id);
        *in_degree.entry(conn.cs_out_id).or_insert(0) += 1;
        in_degree.entry(conn.cs_in_id).or_insert(0);
        destinations.insert(conn.cs_out_id);
    }

    let mut queue: VecDeque<StationId> = in_degree
        .iter()
        .filter(|&(_, &degree)| degree == 0)
        .map(|(&id, _)| id)
        .collect();

    let mut order = Vec::with_capacity(in_degree.len());
    while let Some(id) = queue.pop_front() {
        order.push(id);

        let Some(targets) = adjacency.get(&id) else {
            continue;
        };
        for &target in targets {
            if let Some(degree) = in_degree.get_mut(&target) {
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }
    }

    Ok((order, destinations))
}

/// Any destination the sort never reached is taken as evidence of a cycle
fn cycle_in_order(order: &[StationId], destinations: &BTreeSet<StationId>) -> bool {
    let reached = order.iter().filter(|&id| destinations.contains(id)).count();
    reached != destinations.len()
}

/// Format the network as adjacency lines followed by the cycle status
pub fn format_network_graph<R: Repository + ?Sized>(network: &GasNetwork, repo: &R) -> Result<String> {
    let mut output = String::new();

    if network.is_empty() {
        output.push_str("The network is empty: no connections.\n");
        return Ok(output);
    }

    let mut adjacency: BTreeMap<StationId, Vec<StationId>> = BTreeMap::new();
    for conn in network.active() {
        adjacency.entry(conn.cs_in_id).or_default().push(conn.cs_out_id);
    }

    for (source, targets) in &adjacency {
        let Some(station) = repo.find_station(*source)? else {
            continue;
        };

        let mut rendered = Vec::with_capacity(targets.len());
        for &target in targets {
            if let Some(t) = repo.find_station(target)? {
                rendered.push(format!("CS {} \"{}\"", target, t.name()));
            }
        }

        output.push_str(&format!(
            "CS {} \"{}\" -> {}\n",
            source,
            station.name(),
            rendered.join(", ")
        ));
    }

    output.push('\n');
    if has_cycles(network, repo)? {
        output.push_str("WARNING: the network contains cycles\n");
    } else {
        output.push_str("The network is acyclic\n");
    }

    Ok(output)
}

/// Result of a topological sort, ready for display
#[derive(Debug)]
pub struct SortSummary {
    pub order: Vec<(StationId, String)>,
    pub has_cycles: bool,
}

/// Sort the network once and attach station names and the cycle flag
pub fn summarize_sort<R: Repository + ?Sized>(network: &GasNetwork, repo: &R) -> Result<SortSummary> {
    let (order, destinations) = sort_with_destinations(network, repo)?;
    let has_cycles = cycle_in_order(&order, &destinations);

    let mut named = Vec::with_capacity(order.len());
    for id in order {
        let name = repo
            .find_station(id)?
            .map(|s| s.name().to_string())
            .unwrap_or_default();
        named.push((id, name));
    }

    Ok(SortSummary {
        order: named,
        has_cycles,
    })
}

impl fmt::Display for SortSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Topological order ===")?;
        if self.order.is_empty() {
            writeln!(f, "  (no stations to order)")?;
        }
        for (position, (id, name)) in self.order.iter().enumerate() {
            writeln!(f, "  {}. CS {} \"{}\"", position + 1, id, name)?;
        }

        if self.has_cycles {
            writeln!(f)?;
            writeln!(f, "WARNING: the network contains cycles; stations on or after a cycle are not listed")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Storage;
    use crate::models::{Connection, Station};

    fn storage_with_stations(ids: &[StationId]) -> Storage {
        let mut storage = Storage::open_in_memory().unwrap();
        for &id in ids {
            let station = Station::new(id, format!("CS-{id}"), 4, 2, "A").unwrap();
            storage.insert_station(&station).unwrap();
        }
        storage
    }

    fn build_network(edges: &[(StationId, StationId)]) -> GasNetwork {
        let mut network = GasNetwork::new();
        for (i, &(from, to)) in edges.iter().enumerate() {
            let id = network.allocate_id();
            network.insert(Connection::new(id, 10 + i as i64, from, to));
        }
        network
    }

    #[test]
    fn test_single_edge() {
        let storage = storage_with_stations(&[1, 2]);
        let network = build_network(&[(1, 2)]);

        assert_eq!(topological_sort(&network, &storage).unwrap(), vec![1, 2]);
        assert!(!has_cycles(&network, &storage).unwrap());
    }

    #[test]
    fn test_two_station_cycle() {
        let storage = storage_with_stations(&[1, 2]);
        let network = build_network(&[(1, 2), (2, 1)]);

        let order = topological_sort(&network, &storage).unwrap();
        assert!(!order.contains(&1));
        assert!(!order.contains(&2));
        assert!(has_cycles(&network, &storage).unwrap());
    }

    #[test]
    fn test_sources_come_first_in_id_order() {
        let storage = storage_with_stations(&[1, 2, 3, 4]);
        let network = build_network(&[(2, 3), (1, 4)]);

        assert_eq!(topological_sort(&network, &storage).unwrap(), vec![1, 2, 4, 3]);
    }

    #[test]
    fn test_diamond() {
        let storage = storage_with_stations(&[1, 2, 3, 4]);
        let network = build_network(&[(1, 2), (1, 3), (2, 4), (3, 4)]);

        assert_eq!(topological_sort(&network, &storage).unwrap(), vec![1, 2, 3, 4]);
        assert!(!has_cycles(&network, &storage).unwrap());
    }

    #[test]
    fn test_cycle_hides_downstream_stations() {
        let storage = storage_with_stations(&[1, 2, 3, 4]);
        let network = build_network(&[(1, 2), (2, 3), (3, 2), (3, 4)]);

        assert_eq!(topological_sort(&network, &storage).unwrap(), vec![1]);
        assert!(has_cycles(&network, &storage).unwrap());
    }

    #[test]
    fn test_missing_station_edges_are_ignored_by_sort() {
        let storage = storage_with_stations(&[1, 2]);
        let network = build_network(&[(1, 2), (2, 9)]);

        assert_eq!(topological_sort(&network, &storage).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_dangling_destination_is_not_a_cycle() {
        let storage = storage_with_stations(&[1, 2]);
        let network = build_network(&[(1, 2), (2, 9)]);

        assert!(!has_cycles(&network, &storage).unwrap());
    }

    #[test]
    fn test_removing_chain_end_keeps_graph_acyclic() {
        let mut storage = storage_with_stations(&[1, 2, 9]);
        let network = build_network(&[(1, 2), (2, 9)]);
        assert!(!has_cycles(&network, &storage).unwrap());

        storage.remove_station(9).unwrap();

        assert_eq!(topological_sort(&network, &storage).unwrap(), vec![1, 2]);
        assert!(!has_cycles(&network, &storage).unwrap());
        assert!(format_network_graph(&network, &storage).unwrap().ends_with("The network is acyclic\n"));
        assert!(!summarize_sort(&network, &storage).unwrap().has_cycles);
    }

    #[test]
    fn test_inactive_connections_are_ignored() {
        let storage = storage_with_stations(&[1, 2]);
        let mut network = build_network(&[(1, 2)]);
        let mut back = Connection::new(network.allocate_id(), 11, 2, 1);
        back.is_active = false;
        network.insert(back);

        assert_eq!(topological_sort(&network, &storage).unwrap(), vec![1, 2]);
        assert!(!has_cycles(&network, &storage).unwrap());
    }

    #[test]
    fn test_empty_network() {
        let storage = storage_with_stations(&[1]);
        let network = GasNetwork::new();

        assert!(topological_sort(&network, &storage).unwrap().is_empty());
        assert!(!has_cycles(&network, &storage).unwrap());
        assert_eq!(
            format_network_graph(&network, &storage).unwrap(),
            "The network is empty: no connections.\n"
        );
    }

    #[test]
    fn test_format_groups_by_source() {
        let storage = storage_with_stations(&[1, 2, 3]);
        let network = build_network(&[(2, 3), (1, 3), (1, 2)]);

        let rendered = format_network_graph(&network, &storage).unwrap();
        assert_eq!(
            rendered,
            "CS 1 \"CS-1\" -> CS 3 \"CS-3\", CS 2 \"CS-2\"\n\
             CS 2 \"CS-2\" -> CS 3 \"CS-3\"\n\
             \n\
             The network is acyclic\n"
        );
    }

    #[test]
    fn test_format_reports_cycle() {
        let storage = storage_with_stations(&[1, 2]);
        let network = build_network(&[(1, 2), (2, 1)]);

        let rendered = format_network_graph(&network, &storage).unwrap();
        assert!(rendered.ends_with("WARNING: the network contains cycles\n"));
    }

    #[test]
    fn test_sort_summary_display() {
        let storage = storage_with_stations(&[1, 2]);
        let network = build_network(&[(1, 2)]);

        let summary = summarize_sort(&network, &storage).unwrap();
        assert!(!summary.has_cycles);
        assert_eq!(
            summary.to_string(),
            "=== Topological order ===\n  1. CS 1 \"CS-1\"\n  2. CS 2 \"CS-2\"\n"
        );
    }
}
