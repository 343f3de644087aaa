//! Flow routing graph built from a D8 flow direction raster.
//!
//! `FlowRouting` turns the raster into a dense node graph: every valid DEM
//! cell becomes a node with exactly one receiver (itself for pits, flats
//! and cells draining off grid). Nodes are ordered topologically once at
//! construction; drainage area, flow distance, basin labels and chi are all
//! single passes over that order.

use crate::flow::direction::{D8_DIST, D8_OFFSETS};
use chimap_core::graph::{ChiParams, FlowGraph, NodeId};
use chimap_core::raster::Raster;
use chimap_core::{Error, GeoTransform, Result};

/// Directed drainage tree over the valid cells of a DEM.
#[derive(Debug, Clone)]
pub struct FlowRouting {
    rows: usize,
    cols: usize,
    transform: GeoTransform,
    cell_size: f64,
    /// Node id per grid cell, usize::MAX for nodata cells
    node_of_cell: Vec<NodeId>,
    row_col: Vec<(usize, usize)>,
    receiver: Vec<NodeId>,
    donors: Vec<Vec<NodeId>>,
    elevation: Vec<f64>,
    drainage_area: Vec<f64>,
    flow_distance: Vec<f64>,
    basin: Vec<NodeId>,
    /// Headwaters-first topological order
    topo_order: Vec<NodeId>,
}

impl FlowRouting {
    /// Build the routing graph from a DEM and its D8 flow direction raster.
    ///
    /// Both rasters must share dimensions. Drainage area is in m²
    /// (cell count × cell area), flow distance in map units.
    pub fn build(dem: &Raster<f64>, flow_dir: &Raster<u8>) -> Result<Self> {
        let (rows, cols) = dem.shape();
        if flow_dir.shape() != (rows, cols) {
            return Err(Error::InvalidDimensions {
                width: cols,
                height: rows,
            });
        }

        // Pass 1: number the valid cells
        let mut node_of_cell = vec![usize::MAX; rows * cols];
        let mut row_col = Vec::new();
        let mut elevation = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                let z = unsafe { dem.get_unchecked(row, col) };
                if dem.is_nodata(z) {
                    continue;
                }
                node_of_cell[row * cols + col] = row_col.len();
                row_col.push((row, col));
                elevation.push(z);
            }
        }
        let n_nodes = row_col.len();

        // Pass 2: receivers. Pits, flats, off-grid and nodata-bound flow
        // all resolve to self (baselevel).
        let mut receiver = vec![0usize; n_nodes];
        for (node, &(row, col)) in row_col.iter().enumerate() {
            let dir = unsafe { flow_dir.get_unchecked(row, col) };
            receiver[node] = node;
            if dir == 0 || dir > 8 {
                continue;
            }
            let (dr, dc) = D8_OFFSETS[(dir - 1) as usize];
            let nr = row as isize + dr;
            let nc = col as isize + dc;
            if nr < 0 || nc < 0 || nr >= rows as isize || nc >= cols as isize {
                continue;
            }
            let target = node_of_cell[nr as usize * cols + nc as usize];
            if target != usize::MAX {
                receiver[node] = target;
            }
        }

        // Donor lists and in-degrees
        let mut donors = vec![Vec::new(); n_nodes];
        let mut in_degree = vec![0u32; n_nodes];
        for node in 0..n_nodes {
            let recv = receiver[node];
            if recv != node {
                donors[recv].push(node);
                in_degree[recv] += 1;
            }
        }

        // Topological sort from the headwaters down
        let mut queue: Vec<NodeId> = (0..n_nodes).filter(|&n| in_degree[n] == 0).collect();
        let mut topo_order = Vec::with_capacity(n_nodes);
        while let Some(node) = queue.pop() {
            topo_order.push(node);
            let recv = receiver[node];
            if recv != node {
                in_degree[recv] -= 1;
                if in_degree[recv] == 0 {
                    queue.push(recv);
                }
            }
        }
        if topo_order.len() != n_nodes {
            return Err(Error::Algorithm(
                "flow direction raster contains a cycle".to_string(),
            ));
        }

        let cell_size = dem.cell_size();
        let cell_area = cell_size * cell_size;

        // Accumulate drainage area headwaters → outlets
        let mut drainage_area = vec![cell_area; n_nodes];
        for &node in &topo_order {
            let recv = receiver[node];
            if recv != node {
                drainage_area[recv] += drainage_area[node];
            }
        }

        // Flow distance and basin labels outlets → headwaters
        let mut flow_distance = vec![0.0; n_nodes];
        let mut basin = vec![0usize; n_nodes];
        for &node in topo_order.iter().rev() {
            let recv = receiver[node];
            if recv == node {
                basin[node] = node;
            } else {
                basin[node] = basin[recv];
                flow_distance[node] =
                    flow_distance[recv] + step_length(row_col[node], row_col[recv], cell_size);
            }
        }

        Ok(Self {
            rows,
            cols,
            transform: *dem.transform(),
            cell_size,
            node_of_cell,
            row_col,
            receiver,
            donors,
            elevation,
            drainage_area,
            flow_distance,
            basin,
            topo_order,
        })
    }

    /// Grid dimensions of the source DEM
    pub fn grid_shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Node at a grid cell, if the cell is valid
    pub fn node_at(&self, row: usize, col: usize) -> Option<NodeId> {
        let idx = self.node_of_cell.get(row * self.cols + col)?;
        (*idx != usize::MAX).then_some(*idx)
    }

    /// Nodes draining directly into `node`
    pub fn donors_of(&self, node: NodeId) -> &[NodeId] {
        &self.donors[node]
    }

    /// All baselevel (outlet) nodes, in node-id order
    pub fn baselevel_nodes(&self) -> Vec<NodeId> {
        (0..self.receiver.len())
            .filter(|&n| self.receiver[n] == n)
            .collect()
    }

    /// Cell size of the source grid
    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }
}

fn step_length((r0, c0): (usize, usize), (r1, c1): (usize, usize), cell_size: f64) -> f64 {
    if r0 != r1 && c0 != c1 {
        D8_DIST[1] * cell_size
    } else {
        cell_size
    }
}

impl FlowGraph for FlowRouting {
    fn node_count(&self) -> usize {
        self.receiver.len()
    }

    fn receiver_of(&self, node: NodeId) -> NodeId {
        self.receiver[node]
    }

    fn row_col_of(&self, node: NodeId) -> (usize, usize) {
        self.row_col[node]
    }

    fn xy_of(&self, node: NodeId) -> (f64, f64) {
        let (row, col) = self.row_col[node];
        self.transform.pixel_to_geo(col, row)
    }

    fn latlon_of(&self, node: NodeId) -> (f64, f64) {
        let (x, y) = self.xy_of(node);
        (y, x)
    }

    fn elevation(&self, node: NodeId) -> f64 {
        self.elevation[node]
    }

    fn drainage_area(&self, node: NodeId) -> f64 {
        self.drainage_area[node]
    }

    fn distance_from_outlet(&self, node: NodeId) -> f64 {
        self.flow_distance[node]
    }

    fn basin_of(&self, node: NodeId) -> NodeId {
        self.basin[node]
    }

    /// Integrate chi upstream from every baselevel node.
    ///
    /// chi(node) = chi(receiver) + (A_0 / A(node))^concavity · step, walked
    /// in reverse topological order so each receiver is resolved first.
    /// Drainage area never decreases downstream, so a below-threshold node
    /// can only sit upstream of above-threshold ones; it gets NaN.
    fn chi(&self, params: &ChiParams) -> Vec<f64> {
        let mut chi = vec![0.0_f64; self.receiver.len()];
        for &node in self.topo_order.iter().rev() {
            if self.drainage_area[node] < params.area_threshold {
                chi[node] = f64::NAN;
                continue;
            }
            let recv = self.receiver[node];
            if recv == node {
                chi[node] = 0.0;
            } else {
                let step = step_length(self.row_col[node], self.row_col[recv], self.cell_size);
                let integrand =
                    (params.reference_area / self.drainage_area[node]).powf(params.concavity);
                chi[node] = chi[recv] + integrand * step;
            }
        }
        chi
    }
}
