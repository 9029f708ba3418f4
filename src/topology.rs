//! Graph topology in the layout engine's edge-list form
//!
//! The edge pass runs once per direction. Each direction keeps the edges
//! sorted by their "source" end and grouped into work items, one per source
//! node, so a parallel unit owns exactly one node's force accumulator and no
//! cross-node writes are needed. The backward list is the same edge set with
//! source and target swapped.

use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, LayoutResult};

/// A directed edge between two node indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub source: u32,
    pub target: u32,
}

impl Edge {
    pub fn new(source: u32, target: u32) -> Self {
        Self { source, target }
    }

    /// The same edge with its ends swapped
    pub fn reversed(self) -> Self {
        Self {
            source: self.target,
            target: self.source,
        }
    }
}

impl From<(u32, u32)> for Edge {
    fn from((source, target): (u32, u32)) -> Self {
        Self::new(source, target)
    }
}

/// A contiguous run of edges sharing one source node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub first_edge: u32,
    pub edge_count: u32,
}

/// Edges of one traversal direction
#[derive(Debug, Clone, PartialEq)]
pub struct DirectedEdges {
    edges: Vec<Edge>,
    weights: Vec<f32>,
    work_items: Vec<WorkItem>,
    degrees: Vec<u32>,
}

impl DirectedEdges {
    fn build(num_points: usize, mut edges: Vec<(Edge, f32)>) -> Self {
        // Stable order makes per-node force sums independent of input order
        edges.sort_by(|(a, wa), (b, wb)| {
            (a.source, a.target)
                .cmp(&(b.source, b.target))
                .then(wa.total_cmp(wb))
        });

        let mut degrees = vec![0u32; num_points];
        let mut work_items: Vec<WorkItem> = Vec::new();
        for (i, (edge, _)) in edges.iter().enumerate() {
            degrees[edge.source as usize] += 1;
            let starts_new = match work_items.last() {
                Some(item) => edges[item.first_edge as usize].0.source != edge.source,
                None => true,
            };
            if starts_new {
                work_items.push(WorkItem {
                    first_edge: i as u32,
                    edge_count: 1,
                });
            } else if let Some(item) = work_items.last_mut() {
                item.edge_count += 1;
            }
        }

        let (edges, weights) = edges.into_iter().unzip();
        Self {
            edges,
            weights,
            work_items,
            degrees,
        }
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn work_items(&self) -> &[WorkItem] {
        &self.work_items
    }

    /// Number of edges leaving each node in this direction
    pub fn degrees(&self) -> &[u32] {
        &self.degrees
    }

    pub fn num_work_items(&self) -> usize {
        self.work_items.len()
    }

    /// Edges as interleaved (source, target) scalars
    pub fn flat_edges(&self) -> Vec<u32> {
        self.edges
            .iter()
            .flat_map(|e| [e.source, e.target])
            .collect()
    }

    /// Work items as interleaved (first edge, edge count) scalars
    pub fn flat_work_items(&self) -> Vec<u32> {
        self.work_items
            .iter()
            .flat_map(|w| [w.first_edge, w.edge_count])
            .collect()
    }
}

/// Immutable topology of one graph
#[derive(Debug, Clone, PartialEq)]
pub struct Topology {
    num_points: usize,
    forwards: DirectedEdges,
    backwards: DirectedEdges,
    degrees: Vec<u32>,
}

impl Topology {
    /// Build a topology with unit edge weights
    pub fn new(num_points: usize, edges: &[Edge]) -> LayoutResult<Self> {
        let weights = vec![1.0; edges.len()];
        Self::with_weights(num_points, edges, &weights)
    }

    /// Build a topology with one weight per edge
    pub fn with_weights(num_points: usize, edges: &[Edge], weights: &[f32]) -> LayoutResult<Self> {
        if weights.len() != edges.len() {
            return Err(LayoutError::Topology(format!(
                "{} weights given for {} edges",
                weights.len(),
                edges.len()
            )));
        }
        if u32::try_from(num_points).is_err() {
            return Err(LayoutError::Topology(format!(
                "{num_points} points exceed the u32 index range"
            )));
        }
        for (i, edge) in edges.iter().enumerate() {
            if edge.source as usize >= num_points || edge.target as usize >= num_points {
                return Err(LayoutError::Topology(format!(
                    "edge {i} ({} -> {}) references a node outside 0..{num_points}",
                    edge.source, edge.target
                )));
            }
            let w = weights[i];
            if !w.is_finite() || w < 0.0 {
                return Err(LayoutError::Topology(format!(
                    "edge {i} has invalid weight {w}"
                )));
            }
        }

        let forwards = DirectedEdges::build(
            num_points,
            edges.iter().copied().zip(weights.iter().copied()).collect(),
        );
        let backwards = DirectedEdges::build(
            num_points,
            edges
                .iter()
                .map(|e| e.reversed())
                .zip(weights.iter().copied())
                .collect(),
        );
        let degrees = forwards
            .degrees()
            .iter()
            .zip(backwards.degrees())
            .map(|(f, b)| f + b)
            .collect();

        Ok(Self {
            num_points,
            forwards,
            backwards,
            degrees,
        })
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn num_edges(&self) -> usize {
        self.forwards.edges.len()
    }

    /// Whether the graph has no edges (edge passes are skipped)
    pub fn is_edgeless(&self) -> bool {
        self.num_edges() == 0
    }

    /// Edges ordered by source
    pub fn forwards(&self) -> &DirectedEdges {
        &self.forwards
    }

    /// Edges with ends swapped, ordered by target
    pub fn backwards(&self) -> &DirectedEdges {
        &self.backwards
    }

    /// Combined (forward + backward) degree per node
    pub fn degrees(&self) -> &[u32] {
        &self.degrees
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges(pairs: &[(u32, u32)]) -> Vec<Edge> {
        pairs.iter().copied().map(Edge::from).collect()
    }

    #[test]
    fn degree_sums_match_edge_count() {
        let topo = Topology::new(5, &edges(&[(0, 1), (0, 2), (3, 0), (2, 4), (4, 4)])).unwrap();
        let fwd: u32 = topo.forwards().degrees().iter().sum();
        let bwd: u32 = topo.backwards().degrees().iter().sum();
        assert_eq!(fwd as usize, topo.num_edges());
        assert_eq!(bwd as usize, topo.num_edges());
        assert_eq!(topo.degrees(), &[3, 1, 2, 1, 3]);
    }

    #[test]
    fn backwards_is_swapped_permutation() {
        let topo = Topology::new(4, &edges(&[(2, 0), (0, 1), (1, 3)])).unwrap();
        let mut fwd: Vec<_> = topo.forwards().edges().to_vec();
        let mut bwd: Vec<_> = topo.backwards().edges().iter().map(|e| e.reversed()).collect();
        fwd.sort_by_key(|e| (e.source, e.target));
        bwd.sort_by_key(|e| (e.source, e.target));
        assert_eq!(fwd, bwd);
        assert_eq!(
            topo.backwards().edges(),
            &edges(&[(0, 2), (1, 0), (3, 1)])[..]
        );
    }

    #[test]
    fn work_items_cover_every_edge_once_and_group_by_source() {
        let topo =
            Topology::new(4, &edges(&[(1, 2), (0, 1), (1, 3), (0, 2), (3, 0), (1, 0)])).unwrap();

        for dir in [topo.forwards(), topo.backwards()] {
            let covered: u32 = dir.work_items().iter().map(|w| w.edge_count).sum();
            assert_eq!(covered as usize, topo.num_edges());

            let mut next = 0;
            for item in dir.work_items() {
                assert_eq!(item.first_edge, next);
                let run = &dir.edges()
                    [item.first_edge as usize..(item.first_edge + item.edge_count) as usize];
                assert!(run.iter().all(|e| e.source == run[0].source));
                next += item.edge_count;
            }
        }
        assert_eq!(topo.forwards().num_work_items(), 3);
        assert_eq!(
            topo.forwards().flat_work_items(),
            vec![0, 2, 2, 3, 5, 1]
        );
    }

    #[test]
    fn edge_order_does_not_change_layout_lists() {
        let a = Topology::new(3, &edges(&[(0, 1), (1, 2), (2, 0)])).unwrap();
        let b = Topology::new(3, &edges(&[(2, 0), (0, 1), (1, 2)])).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn edgeless_topology_is_valid() {
        let topo = Topology::new(3, &[]).unwrap();
        assert!(topo.is_edgeless());
        assert_eq!(topo.degrees(), &[0, 0, 0]);
        assert!(topo.forwards().work_items().is_empty());
    }

    #[test]
    fn out_of_range_edges_are_rejected() {
        let err = Topology::new(2, &edges(&[(0, 2)])).unwrap_err();
        assert!(matches!(err, LayoutError::Topology(_)));
    }

    #[test]
    fn weights_are_validated() {
        let e = edges(&[(0, 1)]);
        assert!(Topology::with_weights(2, &e, &[]).is_err());
        assert!(Topology::with_weights(2, &e, &[f32::NAN]).is_err());
        assert!(Topology::with_weights(2, &e, &[-1.0]).is_err());
        let topo = Topology::with_weights(2, &e, &[2.5]).unwrap();
        assert_eq!(topo.forwards().weights(), &[2.5]);
        assert_eq!(topo.backwards().weights(), &[2.5]);
    }
}
