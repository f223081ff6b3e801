use crate::{
    carto::{basin::Basin, datum::Bounds},
    error::{RavenError, Result},
};
use geo::{algorithm::area::Area, MultiPolygon};
use geo_booleanop::boolean::BooleanOp;
use log::{trace, warn};
use rayon::prelude::*;
use std::fmt::Write;

/// rectilinear grid described by its cell centres
#[derive(Clone, Debug)]
pub struct Grid {
    lon_edges: Vec<f64>,
    lat_edges: Vec<f64>,
}

/// cell edges halfway between centres, extended by half a step at both ends
fn edges(name: &str, centres: &[f64]) -> Result<Vec<f64>> {
    if centres.len() < 2 {
        return Err(RavenError::validation(
            name,
            "at least two cell centres are needed to infer cell edges",
        ));
    }
    let n = centres.len();
    let mut edges = Vec::with_capacity(n + 1);
    edges.push(centres[0] - (centres[1] - centres[0]) / 2.);
    for pair in centres.windows(2) {
        edges.push((pair[0] + pair[1]) / 2.);
    }
    edges.push(centres[n - 1] + (centres[n - 1] - centres[n - 2]) / 2.);
    Ok(edges)
}

impl Grid {
    pub fn new(lon_centres: &[f64], lat_centres: &[f64]) -> Result<Self> {
        Ok(Self {
            lon_edges: edges("lon", lon_centres)?,
            lat_edges: edges("lat", lat_centres)?,
        })
    }

    pub fn ncols(&self) -> usize {
        self.lon_edges.len() - 1
    }

    pub fn nrows(&self) -> usize {
        self.lat_edges.len() - 1
    }

    pub fn size(&self) -> usize {
        self.ncols() * self.nrows()
    }

    /// cells are numbered row by row, rows following latitude
    pub fn cell_id(&self, row: usize, col: usize) -> usize {
        row * self.ncols() + col
    }

    pub fn cell(&self, row: usize, col: usize) -> Bounds {
        Bounds::new(
            self.lon_edges[col],
            self.lat_edges[row],
            self.lon_edges[col + 1],
            self.lat_edges[row + 1],
        )
    }

    fn cells(&self) -> impl Iterator<Item = (usize, Bounds)> + '_ {
        (0..self.nrows())
            .flat_map(move |row| (0..self.ncols()).map(move |col| (row, col)))
            .map(move |(row, col)| (self.cell_id(row, col), self.cell(row, col)))
    }
}

/// fraction of each hydrological response unit covered by each grid cell
#[derive(Clone, Debug, PartialEq)]
pub struct GridWeights {
    pub number_hrus: usize,
    pub number_grid_cells: usize,
    /// (hru id, cell id, weight), by hru then by cell
    pub weights: Vec<(u64, usize, f64)>,
}

impl GridWeights {
    /// total weight given to one hru
    pub fn coverage(&self, hru: u64) -> f64 {
        self.weights
            .iter()
            .filter(|(id, _, _)| *id == hru)
            .map(|(_, _, weight)| weight)
            .sum()
    }

    /// the `:GridWeights` block read by Raven
    pub fn to_rvt(&self) -> String {
        let mut block = String::new();
        let _ = writeln!(block, ":GridWeights");
        let _ = writeln!(block, "   :NumberHRUs {}", self.number_hrus);
        let _ = writeln!(block, "   :NumberGridCells {}", self.number_grid_cells);
        let _ = writeln!(block, "   # [HRU ID] [Cell #] [w_kl]");
        for (hru, cell, weight) in &self.weights {
            let _ = writeln!(block, "   {} {} {}", hru, cell, weight);
        }
        let _ = writeln!(block, ":EndGridWeights");
        block
    }
}

fn basin_weights(basin: &Basin, grid: &Grid) -> Result<Vec<(u64, usize, f64)>> {
    let area = basin.area();
    let bounds = basin
        .bounds()
        .filter(|_| area > 0.)
        .ok_or_else(|| RavenError::Geometry(format!("basin {} has no area", basin.id)))?;

    let candidates = grid
        .cells()
        .filter(|(_, cell)| cell.intersects(&bounds))
        .collect::<Vec<(usize, Bounds)>>();
    trace!(
        "intersecting basin {} with {} candidate cells",
        basin.id,
        candidates.len()
    );

    let mut weights = candidates
        .into_par_iter()
        .map(|(cell_id, cell)| {
            let overlap = basin
                .geometry
                .intersection(&MultiPolygon(vec![cell.polygon()]))
                .unsigned_area();
            (basin.id, cell_id, overlap / area)
        })
        .filter(|(_, _, weight)| *weight > f64::EPSILON)
        .collect::<Vec<(u64, usize, f64)>>();
    weights.sort_by_key(|(_, cell_id, _)| *cell_id);

    let coverage = weights.iter().map(|(_, _, w)| w).sum::<f64>();
    if coverage < 1. - 1e-6 {
        warn!(
            "basin {} is only {:.1}% covered by the grid",
            basin.id,
            coverage * 100.
        );
    }
    Ok(weights)
}

/// overlap weights between every basin and every grid cell
pub fn calc_gridweights(basins: &[Basin], grid: &Grid) -> Result<GridWeights> {
    let weights = basins
        .iter()
        .map(|basin| basin_weights(basin, grid))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();

    Ok(GridWeights {
        number_hrus: basins.len(),
        number_grid_cells: grid.size(),
        weights,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::carto::basin::test::square;
    use float_eq::assert_float_eq;
    use geo::{LineString, Polygon};

    // 4x4 unit cells covering [0, 4] x [0, 4]
    fn grid() -> Grid {
        Grid::new(&[0.5, 1.5, 2.5, 3.5], &[0.5, 1.5, 2.5, 3.5]).unwrap()
    }

    #[test]
    fn edges_from_centres() {
        assert_eq!(edges("lon", &[0.5, 1.5, 2.5]).unwrap(), vec![0., 1., 2., 3.]);
        assert!(edges("lon", &[0.5]).is_err());
    }

    #[test]
    fn descending_latitudes() {
        let grid = Grid::new(&[0.5, 1.5], &[1.5, 0.5]).unwrap();
        assert_eq!(grid.cell(0, 0).tuple(), (0., 1., 1., 2.));
    }

    #[test]
    fn cell_numbering() {
        let grid = grid();
        assert_eq!(grid.size(), 16);
        assert_eq!(grid.cell_id(1, 2), 6);
        assert_eq!(grid.cell(1, 2).tuple(), (2., 1., 3., 2.));
    }

    #[test]
    fn basin_over_four_cells() {
        let basin = Basin::new(1, square(0.5, 0.5, 1.));
        let weights = calc_gridweights(&[basin], &grid()).unwrap();
        assert_eq!(weights.weights.len(), 4);
        assert_eq!(
            weights
                .weights
                .iter()
                .map(|(_, cell, _)| *cell)
                .collect::<Vec<usize>>(),
            vec![0, 1, 4, 5]
        );
        for (_, _, weight) in &weights.weights {
            assert_float_eq!(*weight, 0.25, abs <= 1e-9);
        }
        assert_float_eq!(weights.coverage(1), 1.0, abs <= 1e-9);
    }

    #[test]
    fn zero_overlap_is_omitted() {
        // the bounding box covers cell 5, the triangle only touches its corner
        let triangle = MultiPolygon(vec![Polygon::new(
            LineString::from(vec![(0.1, 0.1), (1.9, 0.1), (0.1, 1.9), (0.1, 0.1)]),
            vec![],
        )]);
        let weights = calc_gridweights(&[Basin::new(1, triangle)], &grid()).unwrap();
        assert_eq!(
            weights
                .weights
                .iter()
                .map(|(_, cell, _)| *cell)
                .collect::<Vec<usize>>(),
            vec![0, 1, 4]
        );
        assert_float_eq!(weights.coverage(1), 1.0, abs <= 1e-9);
    }

    #[test]
    fn partial_coverage_at_edge() {
        let basins = vec![
            Basin::new(1, square(3.5, 3.5, 1.)),
            Basin::new(2, square(1., 1., 1.)),
        ];
        let weights = calc_gridweights(&basins, &grid()).unwrap();
        assert_eq!(weights.number_hrus, 2);
        assert_float_eq!(weights.coverage(1), 0.25, abs <= 1e-9);
        assert_float_eq!(weights.coverage(2), 1.0, abs <= 1e-9);
        for basin in [1, 2] {
            assert!(weights.coverage(basin) <= 1. + 1e-9);
        }
    }

    #[test]
    fn degenerate_basin() {
        let basin = Basin::new(1, MultiPolygon(vec![]));
        assert!(matches!(
            calc_gridweights(&[basin], &grid()),
            Err(RavenError::Geometry(_))
        ));
    }

    #[test]
    fn rvt_block() {
        let weights = GridWeights {
            number_hrus: 1,
            number_grid_cells: 4,
            weights: vec![(1, 0, 0.5), (1, 3, 0.5)],
        };
        let block = weights.to_rvt();
        assert!(block.starts_with(":GridWeights\n"));
        assert!(block.contains(":NumberGridCells 4"));
        assert!(block.contains("   1 3 0.5\n"));
        assert!(block.trim_end().ends_with(":EndGridWeights"));
    }
}
