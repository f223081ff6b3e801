use crate::{
    carto::basin::Basin,
    error::{RavenError, Result},
    vars::{AGG_MIN, AGG_SUM},
};
use geo::MultiPolygon;
use geo_booleanop::boolean::BooleanOp;
use log::trace;
use petgraph::{
    graph::{Graph, NodeIndex},
    visit::{Bfs, Reversed},
};
use std::collections::{BTreeMap, HashMap, VecDeque};

/// basins linked to the basin they drain into
pub struct Drainage {
    pub graph: Graph<u64, ()>,
    pub nodes: HashMap<u64, NodeIndex>,
    /// basins draining outside of the set
    pub outlets: Vec<NodeIndex>,
}

impl From<&[Basin]> for Drainage {
    fn from(basins: &[Basin]) -> Self {
        let mut graph = Graph::<u64, ()>::new();
        let mut nodes = HashMap::<u64, NodeIndex>::new();
        let mut outlets = Vec::<NodeIndex>::new();

        for basin in basins {
            nodes.insert(basin.id, graph.add_node(basin.id));
        }

        for basin in basins {
            match basin.next_down.and_then(|down| nodes.get(&down)) {
                Some(&target) => {
                    let _ = graph.add_edge(nodes[&basin.id], target, ());
                }
                None => outlets.push(nodes[&basin.id]),
            }
        }

        Self {
            graph,
            nodes,
            outlets,
        }
    }
}

impl Drainage {
    /// the basin and everything draining into it, breadth first
    pub fn upstream(&self, id: u64) -> Result<Vec<u64>> {
        let start = *self
            .nodes
            .get(&id)
            .ok_or_else(|| RavenError::NotFound(format!("basin {}", id)))?;
        let reversed = Reversed(&self.graph);
        let mut bfs = Bfs::new(reversed, start);
        let mut ids = Vec::new();
        while let Some(node) = bfs.next(reversed) {
            ids.push(self.graph[node]);
        }
        Ok(ids)
    }
}

/// basins located upstream of `fid`, `fid` itself first
pub fn hydrobasins_upstream_ids(fid: u64, basins: &[Basin]) -> Result<Vec<Basin>> {
    let outlet = basins
        .iter()
        .find(|basin| basin.id == fid)
        .ok_or_else(|| RavenError::NotFound(format!("basin {}", fid)))?;

    // restrict the search to the river system of the outlet
    let system = basins
        .iter()
        .filter(|basin| basin.main_bas == outlet.main_bas)
        .cloned()
        .collect::<Vec<Basin>>();
    trace!("searching {} basins upstream of {}", system.len(), fid);

    let ids = Drainage::from(system.as_slice()).upstream(fid)?;
    let mut by_id = system
        .into_iter()
        .map(|basin| (basin.id, basin))
        .collect::<HashMap<u64, Basin>>();
    Ok(ids
        .into_iter()
        .filter_map(|id| by_id.remove(&id))
        .collect())
}

/// performs a union on a queue of polygons
fn cascade(mut terrace: VecDeque<MultiPolygon<f64>>) -> Option<MultiPolygon<f64>> {
    while terrace.len() > 1 {
        let polya = terrace.pop_front()?;
        let polyb = terrace.pop_front()?;
        terrace.push_back(polya.union(&polyb));
    }
    terrace.pop_front()
}

fn aggregate_attribute(name: &str, values: &[f64]) -> Option<f64> {
    if AGG_MIN.contains(&name) {
        values.iter().copied().reduce(f64::min)
    } else if AGG_SUM.contains(&name) {
        Some(values.iter().sum())
    } else {
        values.first().copied()
    }
}

/// dissolve basins into one geometry per river system
pub fn hydrobasins_aggregate(basins: &[Basin]) -> Result<Vec<Basin>> {
    let mut systems = BTreeMap::<u64, Vec<&Basin>>::new();
    for basin in basins {
        systems
            .entry(basin.main_bas.unwrap_or(basin.id))
            .or_default()
            .push(basin);
    }

    systems
        .into_iter()
        .map(|(main_bas, members)| {
            trace!("dissolving {} basins of {}", members.len(), main_bas);
            let first = members
                .first()
                .ok_or_else(|| RavenError::Geometry("empty river system".into()))?;
            let geometry = cascade(members.iter().map(|b| b.geometry.clone()).collect())
                .ok_or_else(|| RavenError::Geometry("empty river system".into()))?;

            let mut columns = BTreeMap::<&str, Vec<f64>>::new();
            for member in &members {
                for (name, value) in &member.attributes {
                    columns.entry(name.as_str()).or_default().push(*value);
                }
            }

            let mut basin = Basin::new(main_bas, geometry);
            basin.next_down = first.next_down;
            basin.main_bas = Some(main_bas);
            basin.labels = first.labels.clone();
            basin.attributes = columns
                .into_iter()
                .filter_map(|(name, values)| {
                    aggregate_attribute(name, &values).map(|v| (name.to_string(), v))
                })
                .collect();
            Ok(basin)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::carto::basin::test::square;
    use float_eq::assert_float_eq;

    fn hybas(id: u64, next_down: Option<u64>, main_bas: u64, lon: f64) -> Basin {
        let mut basin = Basin::new(id, square(lon, 0., 1.));
        basin.next_down = next_down;
        basin.main_bas = Some(main_bas);
        basin.attributes.insert("SUB_AREA".into(), 10.);
        basin.attributes.insert("DIST_MAIN".into(), lon);
        basin.attributes.insert("UP_AREA".into(), 100. + lon);
        basin
    }

    //  1   2
    //   \ /
    //    3   4
    //     \ /
    //      5      9 (other system, drains into 3 by mistake)
    fn network() -> Vec<Basin> {
        vec![
            hybas(1, Some(3), 5, 0.),
            hybas(2, Some(3), 5, 1.),
            hybas(3, Some(5), 5, 2.),
            hybas(4, Some(5), 5, 3.),
            hybas(5, None, 5, 4.),
            hybas(9, Some(3), 9, 10.),
        ]
    }

    #[test]
    fn drainage_outlets() {
        let basins = network();
        let drainage = Drainage::from(basins.as_slice());
        assert_eq!(drainage.graph.edge_count(), 5);
        assert_eq!(drainage.outlets.len(), 1);
        assert_eq!(drainage.graph[drainage.outlets[0]], 5);
    }

    #[test]
    fn upstream_of_outlet() {
        let ids = hydrobasins_upstream_ids(5, &network())
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect::<Vec<u64>>();
        assert_eq!(ids[0], 5);
        assert_eq!(ids.len(), 5);
        assert!(!ids.contains(&9));
    }

    #[test]
    fn upstream_of_tributary() {
        let mut ids = hydrobasins_upstream_ids(3, &network())
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect::<Vec<u64>>();
        assert_eq!(ids[0], 3);
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn upstream_of_headwater() {
        let basins = hydrobasins_upstream_ids(1, &network()).unwrap();
        assert_eq!(basins.len(), 1);
    }

    #[test]
    fn upstream_of_unknown() {
        assert!(matches!(
            hydrobasins_upstream_ids(42, &network()),
            Err(RavenError::NotFound(_))
        ));
    }

    #[test]
    fn aggregate_system() {
        let upstream = hydrobasins_upstream_ids(3, &network()).unwrap();
        let aggregated = hydrobasins_aggregate(&upstream).unwrap();
        assert_eq!(aggregated.len(), 1);
        let basin = &aggregated[0];
        assert_eq!(basin.id, 5);
        assert_float_eq!(basin.attribute("SUB_AREA").unwrap(), 30., abs <= 1e-12);
        assert_float_eq!(basin.attribute("DIST_MAIN").unwrap(), 0., abs <= 1e-12);
        // first member is the outlet of the selection
        assert_float_eq!(basin.attribute("UP_AREA").unwrap(), 102., abs <= 1e-12);
        assert_float_eq!(basin.area(), 3., abs <= 1e-9);
    }

    #[test]
    fn aggregate_keeps_systems_apart() {
        let aggregated = hydrobasins_aggregate(&network()).unwrap();
        assert_eq!(
            aggregated.iter().map(|b| b.id).collect::<Vec<u64>>(),
            vec![5, 9]
        );
    }
}
