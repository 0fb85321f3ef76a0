//! Topological diagrams built from raw trail, deviation and load input.

use std::fmt;

use log::{debug, warn};
use ndarray::Array2;
use petgraph::graph::{EdgeIndex, NodeIndex, UnGraph};

use crate::errors::TopologyError;
use crate::geometry::{Force, Plane, Point};
use crate::layering::{assemble, Bracing, Layering, TrailPath};
use crate::members::{Attribute, Deviations, PointLoads, Supports, Trails};
use crate::settings::BuildSettings;

/// Node of a topological diagram.
#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    /// Position in the topological diagram.
    pub position: Point,
    /// Rank along the trail path; supports carry the highest rank.
    pub rank: usize,
    /// Sum of the point loads attached to the node.
    pub load: Force,
}

/// Kind of member joining two nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MemberKind {
    /// Trail member with a target length.
    Trail,
    /// Deviation between nodes of equal rank.
    DirectDeviation,
    /// Deviation between nodes of different rank.
    IndirectDeviation,
}

/// Member of a topological diagram.
#[derive(Clone, Debug, PartialEq)]
pub struct Member {
    /// Trail or deviation.
    pub kind: MemberKind,
    /// Target length for trails, target force magnitude for deviations.
    pub attribute: Attribute,
    /// Position of the member in the list it was supplied in.
    pub input_index: usize,
}

/// Plane that clips the trail member arriving at `node`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ConstraintPlane {
    /// Node whose position is constrained.
    pub node: NodeIndex,
    /// Plane the node is moved onto.
    pub plane: Plane,
}

/// Topology ready for the equilibrium solver.
#[derive(Clone, Debug)]
pub struct TopologicalDiagram {
    /// Nodes joined by trail and deviation members.
    graph: UnGraph<Node, Member>,
    /// Canonical row order.
    layering: Layering,
    /// Trail paths from origin to support.
    paths: Vec<TrailPath>,
    /// Structural behaviour matrix.
    matrix: Array2<f64>,
    /// Indirect deviations.
    bracing: Vec<Bracing>,
    /// Positions fed into the first layer, one per trail path.
    origin_nodes: Vec<Point>,
    /// Active constraint planes.
    constraint_planes: Vec<ConstraintPlane>,
    /// One plane per trail member through its current geometry.
    suggested_planes: Vec<ConstraintPlane>,
}

impl TopologicalDiagram {
    /// Underlying graph; edge indices number trails first, then direct and
    /// indirect deviations.
    #[must_use]
    pub fn graph(&self) -> &UnGraph<Node, Member> {
        &self.graph
    }

    /// Canonical row order.
    #[must_use]
    pub fn layering(&self) -> &Layering {
        &self.layering
    }

    /// Trail paths from origin to support.
    #[must_use]
    pub fn paths(&self) -> &[TrailPath] {
        &self.paths
    }

    /// Number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of members of all kinds.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Number of layers processed by the solver.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layering.layer_count()
    }

    /// Number of trail paths.
    #[must_use]
    pub fn trail_count(&self) -> usize {
        self.layering.trail_count()
    }

    /// Retrieve a node.
    #[must_use]
    pub fn node(&self, node: NodeIndex) -> Option<&Node> {
        self.graph.node_weight(node)
    }

    /// Retrieve a member.
    #[must_use]
    pub fn member(&self, member: EdgeIndex) -> Option<&Member> {
        self.graph.edge_weight(member)
    }

    /// End nodes of a member.
    #[must_use]
    pub fn endpoints(&self, member: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(member)
    }

    /// Rank of a node.
    #[must_use]
    pub fn rank(&self, node: NodeIndex) -> Option<usize> {
        self.node(node).map(|node| node.rank)
    }

    /// Members of one kind in index order.
    pub fn members(&self, kind: MemberKind) -> impl Iterator<Item = EdgeIndex> + '_ {
        self.graph
            .edge_indices()
            .filter(move |&edge| self.graph[edge].kind == kind)
    }

    /// Structural behaviour matrix.
    #[must_use]
    pub fn matrix(&self) -> &Array2<f64> {
        &self.matrix
    }

    /// Indirect deviations as row pairs with magnitudes.
    #[must_use]
    pub fn bracing(&self) -> &[Bracing] {
        &self.bracing
    }

    /// Origin node positions in trail order.
    #[must_use]
    pub fn origin_nodes(&self) -> &[Point] {
        &self.origin_nodes
    }

    /// Origin node identifiers in trail order.
    #[must_use]
    pub fn origin_node_ids(&self) -> Vec<NodeIndex> {
        if self.layering.trail_count() == 0 {
            return Vec::new();
        }
        self.layering.layer(0).iter().map(|slot| slot.node).collect()
    }

    /// Active constraint planes.
    #[must_use]
    pub fn constraint_planes(&self) -> &[ConstraintPlane] {
        &self.constraint_planes
    }

    /// Constraint plane attached to `node`.
    #[must_use]
    pub fn constraint_plane(&self, node: NodeIndex) -> Option<&Plane> {
        self.constraint_planes
            .iter()
            .find(|constraint| constraint.node == node)
            .map(|constraint| &constraint.plane)
    }

    /// Planes through the support-side end of every trail member, with their
    /// normal pointing back along the member.
    #[must_use]
    pub fn suggested_constraint_planes(&self) -> &[ConstraintPlane] {
        &self.suggested_planes
    }

    /// Label of a node, `"id (rank)"`.
    #[must_use]
    pub fn node_label(&self, node: NodeIndex) -> Option<String> {
        self.rank(node)
            .map(|rank| format!("{} ({rank})", node.index()))
    }

    /// Label of a member, `"id (target)"`.
    #[must_use]
    pub fn member_label(&self, member: EdgeIndex) -> Option<String> {
        self.member(member)
            .map(|weight| format!("{} ({})", member.index(), weight.attribute))
    }

    /// Copy of the diagram with named parameters substituted.
    ///
    /// Members whose attribute is named `names[k]` take `values[k]`; names
    /// without a value evaluate to 1.
    #[must_use]
    pub fn with_parameters(&self, names: &[String], values: &[f64]) -> Self {
        let (matrix, bracing) = assemble(&self.graph, &self.layering, |attribute| {
            attribute.resolve(names, values)
        });
        Self {
            matrix,
            bracing,
            ..self.clone()
        }
    }

    /// Copy of the diagram with `planes[k]` constraining `nodes[k]`.
    ///
    /// Mismatched list lengths clear every constraint.
    #[must_use]
    pub fn with_constraint_planes(&self, planes: &[Plane], nodes: &[NodeIndex]) -> Self {
        let constraint_planes = if planes.len() == nodes.len() {
            nodes
                .iter()
                .zip(planes)
                .map(|(&node, &plane)| ConstraintPlane { node, plane })
                .collect()
        } else {
            warn!(
                "{} constraint planes for {} nodes; constraints cleared",
                planes.len(),
                nodes.len()
            );
            Vec::new()
        };
        Self {
            constraint_planes,
            ..self.clone()
        }
    }

    /// Copy of the diagram with new origin node positions in trail order.
    ///
    /// The positions are ignored unless there is exactly one per trail path.
    #[must_use]
    pub fn with_origin_nodes(&self, points: &[Point]) -> Self {
        if points.len() != self.origin_nodes.len() {
            warn!(
                "{} origin nodes supplied for {} trails; positions kept",
                points.len(),
                self.origin_nodes.len()
            );
            return self.clone();
        }
        Self {
            origin_nodes: points.to_vec(),
            ..self.clone()
        }
    }

    /// Copy of the diagram with origin positions given per node identifier.
    ///
    /// `ids` must list every origin node exactly once; the positions are
    /// reordered into trail order. Anything else leaves the positions unchanged.
    #[must_use]
    pub fn with_origin_nodes_by_id(&self, ids: &[NodeIndex], points: &[Point]) -> Self {
        let origin_ids = self.origin_node_ids();
        let mut sorted_ids = ids.to_vec();
        sorted_ids.sort_unstable();
        let mut sorted_origins = origin_ids.clone();
        sorted_origins.sort_unstable();
        if ids.len() != points.len() || sorted_ids != sorted_origins {
            warn!("origin node identifiers do not match the diagram; positions kept");
            return self.clone();
        }
        let reordered: Vec<Point> = origin_ids
            .iter()
            .filter_map(|origin| {
                ids.iter()
                    .position(|id| id == origin)
                    .map(|idx| points[idx])
            })
            .collect();
        self.with_origin_nodes(&reordered)
    }
}

impl fmt::Display for TopologicalDiagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Topological Diagram")?;
        writeln!(f)?;
        writeln!(f, "nodes: {}", self.node_count())?;
        writeln!(f, "trail members: {}", self.members(MemberKind::Trail).count())?;
        writeln!(
            f,
            "direct deviations: {}",
            self.members(MemberKind::DirectDeviation).count()
        )?;
        writeln!(
            f,
            "indirect deviations: {}",
            self.members(MemberKind::IndirectDeviation).count()
        )?;
        write!(f, "layers: {}", self.layer_count())
    }
}

/// Result of building a topology: a diagram or the reason there is none.
#[derive(Clone, Debug)]
pub enum Topology {
    /// Successfully built diagram.
    Diagram(TopologicalDiagram),
    /// Input could not be turned into a diagram.
    Empty(TopologyError),
}

impl Topology {
    /// The diagram, when there is one.
    #[must_use]
    pub fn diagram(&self) -> Option<&TopologicalDiagram> {
        match self {
            Self::Diagram(diagram) => Some(diagram),
            Self::Empty(_) => None,
        }
    }

    /// Return `true` for the empty sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty(_))
    }

    /// Apply `update` to the diagram, passing the empty sentinel through.
    fn map(&self, update: impl FnOnce(&TopologicalDiagram) -> TopologicalDiagram) -> Self {
        match self {
            Self::Diagram(diagram) => Self::Diagram(update(diagram)),
            Self::Empty(error) => Self::Empty(error.clone()),
        }
    }

    /// See [`TopologicalDiagram::with_parameters`].
    #[must_use]
    pub fn with_parameters(&self, names: &[String], values: &[f64]) -> Self {
        self.map(|diagram| diagram.with_parameters(names, values))
    }

    /// See [`TopologicalDiagram::with_constraint_planes`].
    #[must_use]
    pub fn with_constraint_planes(&self, planes: &[Plane], nodes: &[NodeIndex]) -> Self {
        self.map(|diagram| diagram.with_constraint_planes(planes, nodes))
    }

    /// See [`TopologicalDiagram::with_origin_nodes`].
    #[must_use]
    pub fn with_origin_nodes(&self, points: &[Point]) -> Self {
        self.map(|diagram| diagram.with_origin_nodes(points))
    }

    /// See [`TopologicalDiagram::with_origin_nodes_by_id`].
    #[must_use]
    pub fn with_origin_nodes_by_id(&self, ids: &[NodeIndex], points: &[Point]) -> Self {
        self.map(|diagram| diagram.with_origin_nodes_by_id(ids, points))
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Diagram(diagram) => fmt::Display::fmt(diagram, f),
            Self::Empty(_) => f.write_str("Empty topology"),
        }
    }
}

/// Builder turning raw member input into a [`Topology`].
///
/// # Examples
/// ```
/// use cemx::{line, point, Attribute, Trails, TopologyBuilder};
///
/// let trails = Trails::new(
///     vec![line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 1.0))],
///     vec![Attribute::from(1.0)],
/// );
/// let topology = TopologyBuilder::new(trails).build();
/// let diagram = topology.diagram().expect("diagram built");
/// assert_eq!(diagram.layer_count(), 2);
/// ```
#[derive(Clone, Debug, Default)]
pub struct TopologyBuilder {
    /// Trail members.
    trails: Trails,
    /// Deviation members.
    deviations: Deviations,
    /// Point loads.
    loads: PointLoads,
    /// Support points.
    supports: Supports,
    /// Merge tolerance.
    settings: BuildSettings,
}

impl TopologyBuilder {
    /// Start a builder from the trail members.
    #[must_use]
    pub fn new(trails: Trails) -> Self {
        Self {
            trails,
            ..Self::default()
        }
    }

    /// Set the deviation members.
    #[must_use]
    pub fn deviations(mut self, deviations: Deviations) -> Self {
        self.deviations = deviations;
        self
    }

    /// Set the point loads.
    #[must_use]
    pub fn loads(mut self, loads: PointLoads) -> Self {
        self.loads = loads;
        self
    }

    /// Set the support points.
    #[must_use]
    pub fn supports(mut self, supports: Supports) -> Self {
        self.supports = supports;
        self
    }

    /// Set the build settings.
    #[must_use]
    pub fn settings(mut self, settings: BuildSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Build the topology, returning [`Topology::Empty`] for unusable input.
    #[must_use]
    pub fn build(&self) -> Topology {
        match self.try_build() {
            Ok(diagram) => {
                debug!(
                    "built topology with {} nodes, {} members, {} layers and {} trails",
                    diagram.node_count(),
                    diagram.member_count(),
                    diagram.layer_count(),
                    diagram.trail_count()
                );
                Topology::Diagram(diagram)
            }
            Err(error) => {
                warn!("topology not built: {error}");
                Topology::Empty(error)
            }
        }
    }

    /// Reject empty or mismatched input lists.
    fn validate(&self) -> Result<(), TopologyError> {
        if self.trails.segments.is_empty() || self.trails.lengths.is_empty() {
            return Err(TopologyError::EmptyTrails);
        }
        if self.trails.segments.len() != self.trails.lengths.len() {
            return Err(TopologyError::TrailLengthMismatch {
                segments: self.trails.segments.len(),
                lengths: self.trails.lengths.len(),
            });
        }
        if self.deviations.segments.len() != self.deviations.magnitudes.len() {
            return Err(TopologyError::DeviationMagnitudeMismatch {
                segments: self.deviations.segments.len(),
                magnitudes: self.deviations.magnitudes.len(),
            });
        }
        if self.loads.points.len() != self.loads.vectors.len() {
            return Err(TopologyError::LoadMismatch {
                points: self.loads.points.len(),
                vectors: self.loads.vectors.len(),
            });
        }
        Ok(())
    }

    /// Build the diagram or report why it cannot be built.
    fn try_build(&self) -> Result<TopologicalDiagram, TopologyError> {
        self.validate()?;
        let tolerance = self.settings.tolerance;

        let mut positions = Vec::new();
        let ends: Vec<(usize, usize)> = self
            .trails
            .segments
            .iter()
            .map(|segment| {
                let start = merge_point(&mut positions, segment.start, tolerance);
                let end = merge_point(&mut positions, segment.end, tolerance);
                (start, end)
            })
            .collect();

        let mut graph = UnGraph::with_capacity(positions.len(), ends.len());
        for &position in &positions {
            graph.add_node(Node {
                position,
                rank: 0,
                load: Force::default(),
            });
        }
        for (input_index, (&(start, end), length)) in
            ends.iter().zip(&self.trails.lengths).enumerate()
        {
            graph.add_edge(
                NodeIndex::new(start),
                NodeIndex::new(end),
                Member {
                    kind: MemberKind::Trail,
                    attribute: length.clone(),
                    input_index,
                },
            );
        }

        let paths: Vec<TrailPath> = trace_paths(positions.len(), &ends)?
            .into_iter()
            .map(|path| self.orient(path, &positions))
            .collect();
        let layering = Layering::new(&paths);
        for node in graph.node_indices() {
            graph[node].rank = layering.rank_of(node).unwrap_or(0);
        }

        self.attach_deviations(&mut graph, &positions);
        self.attach_loads(&mut graph, &positions);

        let (matrix, bracing) = assemble(&graph, &layering, Attribute::value);
        let origin_nodes = layering
            .layer(0)
            .iter()
            .map(|slot| graph[slot.node].position)
            .collect();
        let suggested_planes = suggest_planes(&graph, &paths);

        Ok(TopologicalDiagram {
            graph,
            layering,
            paths,
            matrix,
            bracing,
            origin_nodes,
            constraint_planes: Vec::new(),
            suggested_planes,
        })
    }

    /// Put the support at the end of a path.
    ///
    /// Paths keep their traced direction unless their first node is a support.
    fn orient(&self, mut path: TrailPath, positions: &[Point]) -> TrailPath {
        let starts_at_support = path
            .nodes
            .first()
            .is_some_and(|node| self.supports.contains(positions[node.index()], self.settings.tolerance));
        if !self.supports.is_empty() && starts_at_support {
            path.nodes.reverse();
            path.members.reverse();
        }
        path
    }

    /// Add deviation members between existing nodes, direct ones first.
    fn attach_deviations(&self, graph: &mut UnGraph<Node, Member>, positions: &[Point]) {
        let tolerance = self.settings.tolerance;
        let mut direct = Vec::new();
        let mut indirect = Vec::new();
        for (input_index, (segment, magnitude)) in self
            .deviations
            .segments
            .iter()
            .zip(&self.deviations.magnitudes)
            .enumerate()
        {
            let start = find_node(positions, segment.start, tolerance);
            let end = find_node(positions, segment.end, tolerance);
            let (Some(start), Some(end)) = (start, end) else {
                warn!("deviation {input_index} does not join two trail nodes and is ignored");
                continue;
            };
            if start == end {
                warn!("deviation {input_index} has coincident ends and is ignored");
                continue;
            }
            let (start, end) = (NodeIndex::new(start), NodeIndex::new(end));
            let member = (start, end, input_index, magnitude.clone());
            if graph[start].rank == graph[end].rank {
                direct.push(member);
            } else {
                indirect.push(member);
            }
        }
        for (kind, members) in [
            (MemberKind::DirectDeviation, direct),
            (MemberKind::IndirectDeviation, indirect),
        ] {
            for (start, end, input_index, attribute) in members {
                graph.add_edge(
                    start,
                    end,
                    Member {
                        kind,
                        attribute,
                        input_index,
                    },
                );
            }
        }
    }

    /// Sum point loads onto the nodes they sit on.
    fn attach_loads(&self, graph: &mut UnGraph<Node, Member>, positions: &[Point]) {
        for (idx, (point, vector)) in self.loads.points.iter().zip(&self.loads.vectors).enumerate()
        {
            match find_node(positions, *point, self.settings.tolerance) {
                Some(node) => {
                    let node = &mut graph[NodeIndex::new(node)];
                    node.load = (node.load.to_vector() + vector.to_vector()).into();
                }
                None => warn!("load {idx} is not on a trail node and is ignored"),
            }
        }
    }
}

/// Index of the first node within `tolerance` of `point`.
fn find_node(positions: &[Point], point: Point, tolerance: f64) -> Option<usize> {
    positions
        .iter()
        .position(|candidate| candidate.coincides_with(point, tolerance))
}

/// Index of the node at `point`, appending a new node when none matches.
fn merge_point(positions: &mut Vec<Point>, point: Point, tolerance: f64) -> usize {
    find_node(positions, point, tolerance).unwrap_or_else(|| {
        positions.push(point);
        positions.len() - 1
    })
}

/// Join trail segments end to end.
///
/// Each path keeps the direction of its lowest-indexed segment, and paths are
/// returned in the order of that segment.
fn trace_paths(
    node_count: usize,
    ends: &[(usize, usize)],
) -> Result<Vec<TrailPath>, TopologyError> {
    let mut incident = vec![Vec::new(); node_count];
    for (segment, &(start, end)) in ends.iter().enumerate() {
        if start == end {
            return Err(TopologyError::ClosedTrail(NodeIndex::new(start)));
        }
        incident[start].push(segment);
        incident[end].push(segment);
    }
    if let Some(node) = incident.iter().position(|segments| segments.len() > 2) {
        return Err(TopologyError::BranchedTrail(NodeIndex::new(node)));
    }

    let mut visited = vec![false; ends.len()];
    let mut paths = Vec::new();
    for seed in 0..ends.len() {
        if visited[seed] {
            continue;
        }
        visited[seed] = true;
        let (start, end) = ends[seed];
        let backward = walk(start, seed, ends, &incident, &mut visited)?;
        let forward = walk(end, seed, ends, &incident, &mut visited)?;

        let mut nodes = Vec::with_capacity(backward.len() + forward.len() + 2);
        let mut members = Vec::with_capacity(backward.len() + forward.len() + 1);
        for &(segment, node) in backward.iter().rev() {
            nodes.push(NodeIndex::new(node));
            members.push(EdgeIndex::new(segment));
        }
        nodes.push(NodeIndex::new(start));
        members.push(EdgeIndex::new(seed));
        nodes.push(NodeIndex::new(end));
        for &(segment, node) in &forward {
            members.push(EdgeIndex::new(segment));
            nodes.push(NodeIndex::new(node));
        }
        paths.push(TrailPath { nodes, members });
    }
    Ok(paths)
}

/// Follow unvisited segments away from `node`, returning `(segment, node)` steps.
fn walk(
    mut node: usize,
    mut segment: usize,
    ends: &[(usize, usize)],
    incident: &[Vec<usize>],
    visited: &mut [bool],
) -> Result<Vec<(usize, usize)>, TopologyError> {
    let mut steps = Vec::new();
    while let Some(&next) = incident[node].iter().find(|&&candidate| candidate != segment) {
        if visited[next] {
            return Err(TopologyError::ClosedTrail(NodeIndex::new(node)));
        }
        visited[next] = true;
        let (start, end) = ends[next];
        node = if start == node { end } else { start };
        segment = next;
        steps.push((segment, node));
    }
    Ok(steps)
}

/// One plane per trail member at its support-side node, ordered by member.
fn suggest_planes(graph: &UnGraph<Node, Member>, paths: &[TrailPath]) -> Vec<ConstraintPlane> {
    let mut planes: Vec<(EdgeIndex, ConstraintPlane)> = paths
        .iter()
        .flat_map(|path| {
            path.members.iter().enumerate().map(move |(hop, &member)| {
                let free = graph[path.nodes[hop]].position;
                let fixed = path.nodes[hop + 1];
                let origin = graph[fixed].position;
                let normal = Force::from(free.to_vector() - origin.to_vector());
                (
                    member,
                    ConstraintPlane {
                        node: fixed,
                        plane: Plane::new(origin, normal),
                    },
                )
            })
        })
        .collect();
    planes.sort_by_key(|(member, _)| *member);
    planes.into_iter().map(|(_, plane)| plane).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{line, point};
    use approx::assert_relative_eq;

    /// Two vertical trails with a deviation between their free ends.
    fn portal() -> TopologyBuilder {
        let trails = Trails::new(
            vec![
                line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 5.0)),
                line(point(10.0, 0.0, 0.0), point(10.0, 0.0, 5.0)),
            ],
            vec![Attribute::from(5.0), Attribute::from(5.0)],
        );
        let deviations = Deviations::new(
            vec![line(point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0))],
            vec![Attribute::from(3.0)],
        );
        let loads = PointLoads::new(
            vec![point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0)],
            vec![Force::new(0.0, 0.0, -4.0); 2],
        );
        let supports = Supports::new(vec![point(0.0, 0.0, 5.0), point(10.0, 0.0, 5.0)]);
        TopologyBuilder::new(trails)
            .deviations(deviations)
            .loads(loads)
            .supports(supports)
    }

    #[test]
    fn portal_matrix_layout() {
        let topology = portal().build();
        let diagram = topology.diagram().expect("diagram built");
        assert_eq!(diagram.node_count(), 4);
        assert_eq!(diagram.layer_count(), 2);
        assert_eq!(diagram.trail_count(), 2);

        let matrix = diagram.matrix();
        assert_eq!(matrix.dim(), (4, 6));
        let rows: Vec<Vec<f64>> = matrix.rows().into_iter().map(|row| row.to_vec()).collect();
        assert_eq!(rows[0], vec![0.0, 0.0, -4.0, 0.0, 3.0, 5.0]);
        assert_eq!(rows[1], vec![0.0, 0.0, -4.0, 3.0, 0.0, 5.0]);
        assert_eq!(rows[2], vec![0.0; 6]);
        assert_eq!(rows[3], vec![0.0; 6]);

        let deviation = diagram
            .members(MemberKind::DirectDeviation)
            .next()
            .expect("direct deviation present");
        assert_eq!(deviation.index(), 2);
        assert_eq!(diagram.member_label(deviation).as_deref(), Some("2 (3)"));
        assert_eq!(diagram.node_label(NodeIndex::new(1)).as_deref(), Some("1 (2)"));
        assert!(diagram.bracing().is_empty());
        assert_eq!(
            diagram.origin_nodes(),
            &[point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0)]
        );
    }

    #[test]
    fn repeated_deviations_add_up() {
        let deviations = Deviations::new(
            vec![
                line(point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0)),
                line(point(10.0, 0.0, 0.0), point(0.0, 0.0, 0.0)),
            ],
            vec![Attribute::from(1.0), Attribute::from(2.0)],
        );
        let topology = portal().deviations(deviations).build();
        let diagram = topology.diagram().expect("diagram built");
        assert_eq!(diagram.members(MemberKind::DirectDeviation).count(), 2);

        let matrix = diagram.matrix();
        assert_relative_eq!(matrix[[0, Layering::deviation_column(1)]], 3.0);
        assert_relative_eq!(matrix[[1, Layering::deviation_column(0)]], 3.0);
    }

    #[test]
    fn support_first_paths_are_reversed() {
        let trails = Trails::new(
            vec![line(point(0.0, 0.0, 5.0), point(0.0, 0.0, 0.0))],
            vec![Attribute::from(5.0)],
        );
        let topology = TopologyBuilder::new(trails)
            .supports(Supports::new(vec![point(0.0, 0.0, 5.0)]))
            .build();
        let diagram = topology.diagram().expect("diagram built");
        assert_eq!(diagram.origin_nodes(), &[point(0.0, 0.0, 0.0)]);
        assert_eq!(diagram.rank(NodeIndex::new(0)), Some(2));
    }

    #[test]
    fn without_supports_the_last_node_is_the_support() {
        let trails = Trails::new(
            vec![
                line(point(0.0, 0.0, 1.0), point(0.0, 0.0, 2.0)),
                line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 1.0)),
            ],
            vec![Attribute::from(1.0), Attribute::from(1.0)],
        );
        let topology = TopologyBuilder::new(trails).build();
        let diagram = topology.diagram().expect("diagram built");
        assert_eq!(diagram.origin_nodes(), &[point(0.0, 0.0, 0.0)]);
        assert_eq!(diagram.rank(NodeIndex::new(1)), Some(3));
        assert_eq!(diagram.rank(NodeIndex::new(0)), Some(2));
        assert_eq!(diagram.rank(NodeIndex::new(2)), Some(1));
    }

    #[test]
    fn ranks_increase_towards_supports() {
        let diagram = match portal().build() {
            Topology::Diagram(diagram) => diagram,
            Topology::Empty(error) => panic!("unexpected empty topology: {error}"),
        };
        for path in diagram.paths() {
            for pair in path.nodes.windows(2) {
                assert_eq!(diagram.rank(pair[1]), diagram.rank(pair[0]).map(|rank| rank + 1));
            }
        }
    }

    #[test]
    fn coincident_points_merge_within_tolerance() {
        let trails = Trails::new(
            vec![
                line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 1.0)),
                line(point(0.0, 0.0, 1.0005), point(0.0, 0.0, 2.0)),
            ],
            vec![Attribute::from(1.0), Attribute::from(1.0)],
        );
        let strict = TopologyBuilder::new(trails.clone()).build();
        assert_eq!(strict.diagram().map(TopologicalDiagram::node_count), Some(3));
        assert_eq!(strict.diagram().map(TopologicalDiagram::trail_count), Some(1));

        let coarse = TopologyBuilder::new(trails)
            .settings(BuildSettings { tolerance: 0.0001 })
            .build();
        assert_eq!(coarse.diagram().map(TopologicalDiagram::node_count), Some(4));
        assert_eq!(coarse.diagram().map(TopologicalDiagram::trail_count), Some(2));
    }

    #[test]
    fn mismatched_lists_give_empty_topology() {
        let trails = Trails::new(
            vec![line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 1.0))],
            vec![Attribute::from(1.0), Attribute::from(2.0)],
        );
        let topology = TopologyBuilder::new(trails).build();
        assert!(topology.is_empty());
        assert_eq!(topology.to_string(), "Empty topology");

        let empty = TopologyBuilder::new(Trails::default()).build();
        assert!(matches!(empty, Topology::Empty(TopologyError::EmptyTrails)));

        let deviations = Deviations::new(Vec::new(), vec![Attribute::from(1.0)]);
        let topology = portal().deviations(deviations).build();
        assert!(matches!(
            topology,
            Topology::Empty(TopologyError::DeviationMagnitudeMismatch { .. })
        ));
    }

    #[test]
    fn branched_and_closed_trails_are_rejected() {
        let branched = Trails::broadcast(
            vec![
                line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 1.0)),
                line(point(0.0, 0.0, 1.0), point(0.0, 0.0, 2.0)),
                line(point(0.0, 0.0, 1.0), point(1.0, 0.0, 1.0)),
            ],
            &[],
        );
        assert!(matches!(
            TopologyBuilder::new(branched).build(),
            Topology::Empty(TopologyError::BranchedTrail(_))
        ));

        let closed = Trails::broadcast(
            vec![
                line(point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0)),
                line(point(1.0, 0.0, 0.0), point(0.0, 1.0, 0.0)),
                line(point(0.0, 1.0, 0.0), point(0.0, 0.0, 0.0)),
            ],
            &[],
        );
        assert!(matches!(
            TopologyBuilder::new(closed).build(),
            Topology::Empty(TopologyError::ClosedTrail(_))
        ));
    }

    #[test]
    fn stray_deviations_and_loads_are_dropped() {
        let deviations = Deviations::new(
            vec![
                line(point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0)),
                line(point(0.0, 0.0, 0.0), point(3.0, 3.0, 3.0)),
            ],
            vec![Attribute::from(3.0), Attribute::from(1.0)],
        );
        let loads = PointLoads::new(
            vec![point(0.0, 0.0, 0.0), point(0.0, 0.0, 0.0), point(7.0, 7.0, 7.0)],
            vec![Force::new(1.0, 0.0, 0.0), Force::new(0.0, 2.0, 0.0), Force::new(0.0, 0.0, 9.0)],
        );
        let topology = portal().deviations(deviations).loads(loads).build();
        let diagram = topology.diagram().expect("diagram built");
        assert_eq!(diagram.member_count(), 3);
        assert_eq!(
            diagram.node(NodeIndex::new(0)).map(|node| node.load),
            Some(Force::new(1.0, 2.0, 0.0))
        );
    }

    #[test]
    fn cross_rank_deviations_become_bracing() {
        let deviations = Deviations::new(
            vec![line(point(0.0, 0.0, 0.0), point(10.0, 0.0, 5.0))],
            vec![Attribute::from(-2.0)],
        );
        let topology = portal().deviations(deviations).build();
        let diagram = topology.diagram().expect("diagram built");
        assert_eq!(diagram.members(MemberKind::DirectDeviation).count(), 0);
        assert_eq!(
            diagram.bracing(),
            &[Bracing {
                member: EdgeIndex::new(2),
                from_row: 0,
                to_row: 3,
                magnitude: -2.0,
            }]
        );
    }

    #[test]
    fn direct_deviation_cells_are_symmetric() {
        let topology = portal().build();
        let diagram = topology.diagram().expect("diagram built");
        let t = diagram.trail_count();
        let matrix = diagram.matrix();
        for row in 0..matrix.nrows() {
            let layer = row / t;
            for other in 0..t {
                let partner = layer * t + other;
                assert_eq!(
                    matrix[[row, Layering::deviation_column(other)]],
                    matrix[[partner, Layering::deviation_column(row % t)]]
                );
            }
        }
    }

    #[test]
    fn named_parameters_substitute_without_touching_the_source() {
        let trails = Trails::new(
            vec![
                line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 5.0)),
                line(point(10.0, 0.0, 0.0), point(10.0, 0.0, 5.0)),
            ],
            vec![Attribute::from("rise"), Attribute::from(5.0)],
        );
        let deviations = Deviations::new(
            vec![line(point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0))],
            vec![Attribute::from("tie")],
        );
        let topology = TopologyBuilder::new(trails).deviations(deviations).build();
        let diagram = topology.diagram().expect("diagram built");
        assert_eq!(diagram.matrix()[[0, 5]], 1.0);
        assert_eq!(diagram.matrix()[[0, 4]], 1.0);

        let names = vec!["rise".to_string(), "tie".to_string()];
        let varied = diagram.with_parameters(&names, &[7.5, -2.0]);
        assert_eq!(varied.matrix()[[0, 5]], 7.5);
        assert_eq!(varied.matrix()[[0, 4]], -2.0);
        assert_eq!(varied.matrix()[[1, 3]], -2.0);
        assert_eq!(diagram.matrix()[[0, 5]], 1.0);
    }

    #[test]
    fn suggested_planes_sit_on_the_support_side() {
        let topology = portal().build();
        let diagram = topology.diagram().expect("diagram built");
        let planes = diagram.suggested_constraint_planes();
        assert_eq!(planes.len(), 2);
        assert_eq!(planes[0].node, NodeIndex::new(1));
        assert_eq!(planes[0].plane.origin, point(0.0, 0.0, 5.0));
        assert_relative_eq!(planes[0].plane.normal.z, -5.0);
        assert!(diagram.constraint_planes().is_empty());
    }

    #[test]
    fn substitutions_respect_list_lengths() {
        let topology = portal().build();
        let diagram = topology.diagram().expect("diagram built");
        let plane = Plane::new(point(0.0, 0.0, 3.0), Force::new(0.0, 0.0, 1.0));

        let constrained = diagram.with_constraint_planes(&[plane], &[NodeIndex::new(1)]);
        assert_eq!(constrained.constraint_plane(NodeIndex::new(1)), Some(&plane));
        let cleared = constrained.with_constraint_planes(&[plane], &[]);
        assert!(cleared.constraint_planes().is_empty());

        let moved = diagram.with_origin_nodes(&[point(1.0, 0.0, 0.0), point(9.0, 0.0, 0.0)]);
        assert_eq!(moved.origin_nodes()[1], point(9.0, 0.0, 0.0));
        let unchanged = diagram.with_origin_nodes(&[point(1.0, 0.0, 0.0)]);
        assert_eq!(unchanged.origin_nodes(), diagram.origin_nodes());

        let by_id = diagram.with_origin_nodes_by_id(
            &[NodeIndex::new(2), NodeIndex::new(0)],
            &[point(11.0, 0.0, 0.0), point(-1.0, 0.0, 0.0)],
        );
        assert_eq!(
            by_id.origin_nodes(),
            &[point(-1.0, 0.0, 0.0), point(11.0, 0.0, 0.0)]
        );
        let rejected = diagram.with_origin_nodes_by_id(
            &[NodeIndex::new(2), NodeIndex::new(2)],
            &[point(11.0, 0.0, 0.0), point(-1.0, 0.0, 0.0)],
        );
        assert_eq!(rejected.origin_nodes(), diagram.origin_nodes());
    }
}
