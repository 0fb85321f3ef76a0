//! Solved form diagrams and their member, node and load records.

use std::fmt;

use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::errors::ModelError;
use crate::geometry::{Force, Line, Plane, Point};
use crate::layering::Layering;
use crate::settings::Algorithm;
use crate::solver::{ConvergenceStatus, Inputs, SolverState};
use crate::topology::{MemberKind, TopologicalDiagram};

/// Sign of the force carried by a member.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ForceSense {
    /// Positive force, drawn red.
    Tension,
    /// Negative force, drawn blue.
    Compression,
    /// No force, drawn black.
    Neutral,
}

impl ForceSense {
    /// Classify a signed value.
    #[must_use]
    pub fn of(value: f64) -> Self {
        if value > 0.0 {
            Self::Tension
        } else if value < 0.0 {
            Self::Compression
        } else {
            Self::Neutral
        }
    }

    /// Display colour as red, green and blue components.
    #[must_use]
    pub const fn rgb(self) -> (u8, u8, u8) {
        match self {
            Self::Tension => (255, 0, 0),
            Self::Compression => (0, 0, 255),
            Self::Neutral => (0, 0, 0),
        }
    }
}

/// Solved member of a form diagram.
#[derive(Clone, Debug, PartialEq)]
pub struct MemberResult {
    /// Member in the topological diagram.
    pub member: EdgeIndex,
    /// Member geometry.
    pub line: Line,
    /// Tension, compression or neither.
    pub sense: ForceSense,
    /// Signed force, tension positive.
    pub force: f64,
    /// Label `"id (target)"` taken from the topological diagram.
    pub label: String,
}

/// Solved node of a form diagram.
#[derive(Clone, Debug, PartialEq)]
pub struct NodeResult {
    /// Node in the topological diagram.
    pub node: NodeIndex,
    /// Position in the form diagram.
    pub position: Point,
    /// Label `"id (rank)"`.
    pub label: String,
}

/// Origin of a drawn force vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoadKind {
    /// Applied point load.
    External,
    /// Self-weight feedback.
    SelfWeight,
    /// Support reaction.
    Reaction,
}

impl LoadKind {
    /// Display colour; every force vector is drawn dark green.
    #[must_use]
    pub const fn rgb(self) -> (u8, u8, u8) {
        (0, 100, 0)
    }
}

/// Force vector drawn at a node.
#[derive(Clone, Debug, PartialEq)]
pub struct LoadResult {
    /// Node the force acts on.
    pub node: NodeIndex,
    /// What the force represents.
    pub kind: LoadKind,
    /// Line from tail to head, or head to tail for compressed reactions.
    pub line: Line,
    /// Force vector.
    pub force: Force,
}

/// Geometry and forces of a structure in equilibrium.
#[derive(Clone, Debug, PartialEq)]
pub struct FormDiagram {
    /// Nodes in canonical order.
    nodes: Vec<NodeResult>,
    /// Origin node identifiers in trail order.
    origin_nodes: Vec<NodeIndex>,
    /// Trail members in canonical order.
    trails: Vec<MemberResult>,
    /// Direct deviations by member index.
    direct_deviations: Vec<MemberResult>,
    /// Indirect deviations by member index.
    indirect_deviations: Vec<MemberResult>,
    /// Loads, self-weights and reactions.
    loads: Vec<LoadResult>,
    /// Constraint planes that were active.
    constraint_planes: Vec<Plane>,
    /// Number of layers.
    layer_count: usize,
    /// Number of trail paths.
    trail_count: usize,
    /// Outer loop result.
    status: ConvergenceStatus,
    /// Sweeps run.
    sweeps: usize,
    /// Final divergence.
    divergence: f64,
    /// Optimisation algorithm, when the model was optimised.
    solver: Option<Algorithm>,
    /// Best objective value, when the model was optimised.
    objective: Option<f64>,
}

impl FormDiagram {
    /// Collect the results of a finished solver run.
    pub(crate) fn new(
        diagram: &TopologicalDiagram,
        inputs: &Inputs,
        state: &SolverState,
        solver: Option<Algorithm>,
        objective: Option<f64>,
    ) -> Self {
        let layering = diagram.layering();
        let trails = layering.trail_count();
        let layers = layering.layer_count();
        let position = |row: usize| state.position(row).unwrap_or_default();

        let mut nodes = Vec::new();
        let mut trail_members = Vec::new();
        let mut loads = Vec::new();
        for (row, slot) in layering.slots().iter().enumerate() {
            if slot.extension {
                continue;
            }
            let here = position(row);
            nodes.push(NodeResult {
                node: slot.node,
                position: here,
                label: diagram.node_label(slot.node).unwrap_or_default(),
            });

            if let Some(member) = slot.trail_member {
                let length = state.trail_length(row).unwrap_or_default();
                let magnitude = state
                    .trail_force(row)
                    .map_or(0.0, Force::magnitude);
                let sense = ForceSense::of(length);
                let force = match sense {
                    ForceSense::Tension => magnitude,
                    ForceSense::Compression => -magnitude,
                    ForceSense::Neutral => 0.0,
                };
                trail_members.push(MemberResult {
                    member,
                    line: Line::new(here, position(row + trails)),
                    sense,
                    force,
                    label: diagram.member_label(member).unwrap_or_default(),
                });
            }

            let external = Force::new(
                inputs.matrix[[row, 0]],
                inputs.matrix[[row, 1]],
                inputs.matrix[[row, 2]],
            );
            if !external.is_zero() {
                loads.push(load_line(slot.node, LoadKind::External, here, external));
            }
            if let Some(weight) = state.self_weight(row).filter(|weight| !weight.is_zero()) {
                loads.push(load_line(slot.node, LoadKind::SelfWeight, here, weight));
            }
        }

        if layers > 0 {
            for slot in layering.layer(layers - 1) {
                let Some(row) = layering.row_of(slot.node) else {
                    continue;
                };
                let reaction = state.trail_force(row).unwrap_or_default();
                let here = position(row);
                let compressed = row >= trails
                    && state
                        .trail_length(row - trails)
                        .is_some_and(|length| length < 0.0);
                let line = if compressed {
                    Line::new(
                        (here.to_vector() - reaction.to_vector()).into(),
                        here,
                    )
                } else {
                    Line::new(here, (here.to_vector() + reaction.to_vector()).into())
                };
                loads.push(LoadResult {
                    node: slot.node,
                    kind: LoadKind::Reaction,
                    line,
                    force: reaction,
                });
            }
        }

        let mut direct_deviations = Vec::new();
        for member in diagram.members(MemberKind::DirectDeviation) {
            let Some((a, b)) = diagram.endpoints(member) else {
                continue;
            };
            let (Some(row_a), Some(row_b)) = (layering.row_of(a), layering.row_of(b)) else {
                continue;
            };
            let other_trail = layering.slots()[row_b].trail;
            let force = inputs.matrix[[row_a, Layering::deviation_column(other_trail)]];
            if force == 0.0 {
                continue;
            }
            let sense = if force > 0.0 {
                ForceSense::Tension
            } else {
                ForceSense::Compression
            };
            direct_deviations.push(MemberResult {
                member,
                line: Line::new(position(row_a), position(row_b)),
                sense,
                force,
                label: diagram.member_label(member).unwrap_or_default(),
            });
        }

        let indirect_deviations = inputs
            .bracing
            .iter()
            .map(|brace| MemberResult {
                member: brace.member,
                line: Line::new(position(brace.from_row), position(brace.to_row)),
                sense: ForceSense::of(brace.magnitude),
                force: brace.magnitude,
                label: diagram.member_label(brace.member).unwrap_or_default(),
            })
            .collect();

        Self {
            nodes,
            origin_nodes: diagram.origin_node_ids(),
            trails: trail_members,
            direct_deviations,
            indirect_deviations,
            loads,
            constraint_planes: diagram
                .constraint_planes()
                .iter()
                .map(|constraint| constraint.plane)
                .collect(),
            layer_count: layers,
            trail_count: trails,
            status: state
                .status()
                .unwrap_or(ConvergenceStatus::MaxIterationsExceeded),
            sweeps: state.sweeps(),
            divergence: state.divergence(),
            solver,
            objective,
        }
    }

    /// Nodes in canonical order.
    #[must_use]
    pub fn nodes(&self) -> &[NodeResult] {
        &self.nodes
    }

    /// Origin node identifiers in trail order.
    #[must_use]
    pub fn origin_nodes(&self) -> &[NodeIndex] {
        &self.origin_nodes
    }

    /// Trail members in canonical order.
    #[must_use]
    pub fn trails(&self) -> &[MemberResult] {
        &self.trails
    }

    /// Direct deviations with a non-zero force.
    #[must_use]
    pub fn direct_deviations(&self) -> &[MemberResult] {
        &self.direct_deviations
    }

    /// Indirect deviations.
    #[must_use]
    pub fn indirect_deviations(&self) -> &[MemberResult] {
        &self.indirect_deviations
    }

    /// Point loads, self-weights and reactions.
    #[must_use]
    pub fn loads(&self) -> &[LoadResult] {
        &self.loads
    }

    /// Constraint planes that were active.
    #[must_use]
    pub fn constraint_planes(&self) -> &[Plane] {
        &self.constraint_planes
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

    /// How the outer loop ended.
    #[must_use]
    pub fn status(&self) -> ConvergenceStatus {
        self.status
    }

    /// Sweeps run.
    #[must_use]
    pub fn sweeps(&self) -> usize {
        self.sweeps
    }

    /// Summed node movement over the final sweep.
    #[must_use]
    pub fn divergence(&self) -> f64 {
        self.divergence
    }

    /// Optimisation algorithm used, if any.
    #[must_use]
    pub fn solver(&self) -> Option<Algorithm> {
        self.solver
    }

    /// Best objective value found by the optimiser, if any.
    #[must_use]
    pub fn objective(&self) -> Option<f64> {
        self.objective
    }

    /// Solved position of a node.
    #[must_use]
    pub fn node_position(&self, node: NodeIndex) -> Option<Point> {
        self.nodes
            .iter()
            .find(|result| result.node == node)
            .map(|result| result.position)
    }

    /// Solved member of any kind.
    #[must_use]
    pub fn member(&self, member: EdgeIndex) -> Option<&MemberResult> {
        self.trails
            .iter()
            .chain(&self.direct_deviations)
            .chain(&self.indirect_deviations)
            .find(|result| result.member == member)
    }
}

impl fmt::Display for FormDiagram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Structural Model")?;
        writeln!(f)?;
        writeln!(f, "layers: {}", self.layer_count)?;
        writeln!(f, "trails: {}", self.trail_count)?;
        if let Some(solver) = self.solver {
            writeln!(f, "solver: {solver}")?;
        }
        if let Some(objective) = self.objective {
            writeln!(f, "objective: {objective}")?;
        }
        writeln!(f, "status: {}", self.status)?;
        write!(f, "divergence: {}", self.divergence)
    }
}

/// Line drawn from `at` along `force`.
fn load_line(node: NodeIndex, kind: LoadKind, at: Point, force: Force) -> LoadResult {
    LoadResult {
        node,
        kind,
        line: Line::new(at, (at.to_vector() + force.to_vector()).into()),
        force,
    }
}

/// Result of solving: a form diagram or the reason there is none.
#[derive(Clone, Debug, PartialEq)]
pub enum Model {
    /// Solved form diagram.
    Form(FormDiagram),
    /// Nothing could be solved.
    Empty(ModelError),
}

impl Model {
    /// The form diagram, when there is one.
    #[must_use]
    pub fn form(&self) -> Option<&FormDiagram> {
        match self {
            Self::Form(form) => Some(form),
            Self::Empty(_) => None,
        }
    }

    /// Return `true` for the empty sentinel.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty(_))
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Form(form) => fmt::Display::fmt(form, f),
            Self::Empty(_) => f.write_str("Empty Structural Model"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{line, point};
    use crate::members::{Attribute, Deviations, PointLoads, Trails};
    use crate::settings::SolverSettings;
    use crate::solver::solve;
    use crate::topology::TopologyBuilder;
    use approx::assert_relative_eq;

    fn portal_model(trail_length: f64) -> FormDiagram {
        let trails = Trails::broadcast(
            vec![
                line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 5.0)),
                line(point(10.0, 0.0, 0.0), point(10.0, 0.0, 5.0)),
            ],
            &[Attribute::from(trail_length)],
        );
        let deviations = Deviations::new(
            vec![line(point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0))],
            vec![Attribute::from(3.0)],
        );
        let loads = PointLoads::broadcast(
            vec![point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0)],
            &[0.0],
            &[0.0],
            &[-4.0],
        );
        let topology = TopologyBuilder::new(trails)
            .deviations(deviations)
            .loads(loads)
            .build();
        match solve(&topology, None, &SolverSettings::default()) {
            Ok(Model::Form(form)) => form,
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn force_sense_colours() {
        assert_eq!(ForceSense::of(2.0).rgb(), (255, 0, 0));
        assert_eq!(ForceSense::of(-2.0).rgb(), (0, 0, 255));
        assert_eq!(ForceSense::of(0.0).rgb(), (0, 0, 0));
        assert_eq!(LoadKind::Reaction.rgb(), (0, 100, 0));
    }

    #[test]
    fn tension_trails_are_red() {
        let form = portal_model(5.0);
        assert_eq!(form.trails().len(), 2);
        for trail in form.trails() {
            assert_eq!(trail.sense, ForceSense::Tension);
            assert_relative_eq!(trail.force, 5.0);
        }
        assert_eq!(form.direct_deviations().len(), 1);
        assert_relative_eq!(form.direct_deviations()[0].force, 3.0);
        assert_eq!(form.nodes().len(), 4);
        assert_eq!(form.status(), ConvergenceStatus::Converged);
    }

    #[test]
    fn compression_trails_are_blue_and_flip_reactions() {
        let form = portal_model(-5.0);
        for trail in form.trails() {
            assert_eq!(trail.sense, ForceSense::Compression);
            assert_relative_eq!(trail.force, -5.0);
        }
        let reactions: Vec<&LoadResult> = form
            .loads()
            .iter()
            .filter(|load| load.kind == LoadKind::Reaction)
            .collect();
        assert_eq!(reactions.len(), 2);
        for reaction in reactions {
            let support = form.node_position(reaction.node).expect("support solved");
            assert_eq!(reaction.line.end, support);
        }
    }

    #[test]
    fn external_loads_are_drawn_from_their_node() {
        let form = portal_model(5.0);
        let external: Vec<&LoadResult> = form
            .loads()
            .iter()
            .filter(|load| load.kind == LoadKind::External)
            .collect();
        assert_eq!(external.len(), 2);
        assert_eq!(external[0].line.start, point(0.0, 0.0, 0.0));
        assert_eq!(external[0].line.end, point(0.0, 0.0, -4.0));
    }

    #[test]
    fn display_lists_diagnostics() {
        let text = portal_model(5.0).to_string();
        assert!(text.starts_with("Structural Model\n\nlayers: 2\ntrails: 2"));
        assert!(text.contains("divergence: 0"));
    }
}
