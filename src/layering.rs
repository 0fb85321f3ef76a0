//! Rank assignment, canonical row order and the structural behaviour matrix.
//!
//! Every trail path contributes exactly one slot per layer. A path with fewer
//! nodes than the longest one is padded at its free end with extension slots
//! that repeat its origin node, so the matrix stays rectangular. Row `r`
//! belongs to layer `r / trail_count` and trail `r % trail_count`.

use std::collections::HashMap;

use log::warn;
use ndarray::Array2;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};

use crate::members::Attribute;
use crate::topology::{Member, MemberKind, Node};

/// Trail path ordered from its origin node to its support.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrailPath {
    /// Nodes from origin to support.
    pub nodes: Vec<NodeIndex>,
    /// Trail members between consecutive nodes.
    pub members: Vec<EdgeIndex>,
}

/// One row of the canonical order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    /// Node occupying the slot; extension slots repeat the origin node.
    pub node: NodeIndex,
    /// Rank of the slot, starting at 1.
    pub rank: usize,
    /// Trail path the slot belongs to.
    pub trail: usize,
    /// `true` for padding slots.
    pub extension: bool,
    /// Trail member leading towards the next rank, if any.
    pub trail_member: Option<EdgeIndex>,
}

/// Canonical layered order of a topological diagram.
#[derive(Clone, Debug, PartialEq)]
pub struct Layering {
    /// Number of layers, equal to the node count of the longest path.
    layer_count: usize,
    /// Number of trail paths.
    trail_count: usize,
    /// Slots in row order.
    slots: Vec<Slot>,
    /// Row of the real slot of every node.
    rows: HashMap<NodeIndex, usize>,
}

impl Layering {
    /// Rank the nodes of `paths` and lay them out in row order.
    ///
    /// With `L` the node count of the longest path, a node `h` hops away from
    /// its support has rank `L - h`.
    #[must_use]
    pub fn new(paths: &[TrailPath]) -> Self {
        let layer_count = paths.iter().map(|path| path.nodes.len()).max().unwrap_or(0);
        let trail_count = paths.len();
        let mut slots = vec![None; layer_count * trail_count];
        let mut rows = HashMap::new();

        for (trail, path) in paths.iter().enumerate() {
            let padding = layer_count - path.nodes.len();
            if let Some(&origin) = path.nodes.first() {
                for rank in 1..=padding {
                    slots[(rank - 1) * trail_count + trail] = Some(Slot {
                        node: origin,
                        rank,
                        trail,
                        extension: true,
                        trail_member: None,
                    });
                }
            }
            for (hop, &node) in path.nodes.iter().enumerate() {
                let rank = padding + hop + 1;
                let row = (rank - 1) * trail_count + trail;
                slots[row] = Some(Slot {
                    node,
                    rank,
                    trail,
                    extension: false,
                    trail_member: path.members.get(hop).copied(),
                });
                rows.insert(node, row);
            }
        }

        Self {
            layer_count,
            trail_count,
            slots: slots.into_iter().flatten().collect(),
            rows,
        }
    }

    /// Number of layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layer_count
    }

    /// Number of trail paths.
    #[must_use]
    pub fn trail_count(&self) -> usize {
        self.trail_count
    }

    /// All slots in row order.
    #[must_use]
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Slots of layer `layer`, one per trail path.
    #[must_use]
    pub fn layer(&self, layer: usize) -> &[Slot] {
        let start = layer * self.trail_count;
        &self.slots[start..start + self.trail_count]
    }

    /// Row of the real slot of `node`.
    #[must_use]
    pub fn row_of(&self, node: NodeIndex) -> Option<usize> {
        self.rows.get(&node).copied()
    }

    /// Rank of `node`.
    #[must_use]
    pub fn rank_of(&self, node: NodeIndex) -> Option<usize> {
        self.row_of(node).map(|row| self.slots[row].rank)
    }

    /// Number of matrix columns: three load components, one deviation column
    /// per trail and the trail target.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.trail_column() + 1
    }

    /// Column holding the deviation towards trail `trail`.
    #[must_use]
    pub const fn deviation_column(trail: usize) -> usize {
        3 + trail
    }

    /// Column holding the trail target.
    #[must_use]
    pub fn trail_column(&self) -> usize {
        3 + self.trail_count
    }
}

/// Indirect deviation between rows of different layers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Bracing {
    /// Deviation member this entry stands for.
    pub member: EdgeIndex,
    /// Row of the first end node.
    pub from_row: usize,
    /// Row of the second end node.
    pub to_row: usize,
    /// Signed target force magnitude.
    pub magnitude: f64,
}

impl Bracing {
    /// Row at the other end of the bracing when `row` is one of its ends.
    #[must_use]
    pub fn other_end(&self, row: usize) -> Option<usize> {
        if self.from_row == row {
            Some(self.to_row)
        } else if self.to_row == row {
            Some(self.from_row)
        } else {
            None
        }
    }
}

/// Fill the structural behaviour matrix and the bracing list.
///
/// Loads go to the real slot of their node, trail targets to the row whose
/// trail member they belong to and every direct deviation to both symmetric
/// cells. Direct deviations joining the same pair of nodes add up. `resolve`
/// turns member attributes into numbers.
pub(crate) fn assemble(
    graph: &UnGraph<Node, Member>,
    layering: &Layering,
    resolve: impl Fn(&Attribute) -> f64,
) -> (Array2<f64>, Vec<Bracing>) {
    let mut matrix = Array2::zeros((layering.slots().len(), layering.column_count()));
    let trail_column = layering.trail_column();

    for (row, slot) in layering.slots().iter().enumerate() {
        if slot.extension {
            continue;
        }
        let load = graph[slot.node].load;
        matrix[[row, 0]] = load.x;
        matrix[[row, 1]] = load.y;
        matrix[[row, 2]] = load.z;
        if let Some(member) = slot.trail_member {
            matrix[[row, trail_column]] = resolve(&graph[member].attribute);
        }
    }

    let mut bracing = Vec::new();
    for edge in graph.edge_indices() {
        let member = &graph[edge];
        let Some((a, b)) = graph.edge_endpoints(edge) else {
            continue;
        };
        let (Some(row_a), Some(row_b)) = (layering.row_of(a), layering.row_of(b)) else {
            continue;
        };
        let magnitude = resolve(&member.attribute);
        match member.kind {
            MemberKind::Trail => {}
            MemberKind::DirectDeviation => {
                let trail_a = layering.slots()[row_a].trail;
                let trail_b = layering.slots()[row_b].trail;
                let cell = [row_a, Layering::deviation_column(trail_b)];
                if matrix[cell] != 0.0 {
                    warn!(
                        "deviation {} repeats a pair of nodes; magnitudes are summed",
                        member.input_index
                    );
                }
                matrix[cell] += magnitude;
                matrix[[row_b, Layering::deviation_column(trail_a)]] += magnitude;
            }
            MemberKind::IndirectDeviation => bracing.push(Bracing {
                member: edge,
                from_row: row_a,
                to_row: row_b,
                magnitude,
            }),
        }
    }

    (matrix, bracing)
}
