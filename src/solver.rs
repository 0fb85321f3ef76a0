//! Layer-by-layer equilibrium solver with bracing feedback.
//!
//! A sweep walks the layers in row order. At every slot the outgoing trail
//! force balances the external load, the direct deviations to the other
//! slots of the layer, the trail force arriving from the previous layer, the
//! bracing forces of the previous sweep and, optionally, self-weight. The next
//! node sits along that force at the target trail length. Sweeps repeat while
//! bracing keeps moving the nodes.

use std::fmt;

use log::{debug, info, warn};
use nalgebra::Vector3;
use ndarray::Array2;

use crate::errors::{ConfigError, ModelError};
use crate::geometry::{unit, Force, Point};
use crate::layering::{Bracing, Layering};
use crate::model::{FormDiagram, Model};
use crate::settings::{SelfWeight, SolverSettings};
use crate::topology::{TopologicalDiagram, Topology};

/// Progress of a solver invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepPhase {
    /// No sweep has started.
    Uninitialized,
    /// The given layer is being processed.
    LayerSweepInProgress(usize),
    /// All layers of the current sweep are done.
    SweepComplete,
    /// Node positions settled below the threshold.
    Converged,
    /// The sweep cap was reached first.
    MaxIterationsExceeded,
}

/// How the outer loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergenceStatus {
    /// Node positions settled below the threshold.
    Converged,
    /// The sweep cap was reached; the last geometry is still reported.
    MaxIterationsExceeded,
}

impl fmt::Display for ConvergenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Converged => f.write_str("converged"),
            Self::MaxIterationsExceeded => f.write_str("maximum iterations exceeded"),
        }
    }
}

/// Values the solver reads; the optimiser perturbs copies of them.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Inputs {
    /// Structural behaviour matrix.
    pub(crate) matrix: Array2<f64>,
    /// Indirect deviations.
    pub(crate) bracing: Vec<Bracing>,
    /// Origin node positions in trail order.
    pub(crate) origins: Vec<Point>,
}

impl Inputs {
    /// Copy the solver inputs out of a diagram.
    pub(crate) fn from_diagram(diagram: &TopologicalDiagram) -> Self {
        Self {
            matrix: diagram.matrix().clone(),
            bracing: diagram.bracing().to_vec(),
            origins: diagram.origin_nodes().to_vec(),
        }
    }
}

/// Working state of one solver invocation.
///
/// Per-slot arrays are indexed by matrix row. `positions` holds one extra
/// layer: the copy of the supports produced by the last layer.
#[derive(Clone, Debug)]
pub struct SolverState {
    /// Current phase.
    phase: SweepPhase,
    /// Completed or running sweeps.
    sweep: usize,
    /// Summed node movement between the last two sweeps.
    divergence: f64,
    /// Number of trail paths.
    trail_count: usize,
    /// Node positions of the current sweep.
    positions: Vec<Vector3<f64>>,
    /// Node positions of the previous sweep; empty during the first one.
    previous: Vec<Vector3<f64>>,
    /// Outgoing trail force of every slot.
    forces: Vec<Vector3<f64>>,
    /// Effective trail length of every slot.
    lengths: Vec<f64>,
    /// Self-weight applied at every slot.
    self_weights: Vec<Vector3<f64>>,
}

impl SolverState {
    /// Fresh state sized for `layers` layers of `trail_count` slots.
    fn new(layers: usize, trail_count: usize) -> Self {
        let slots = layers * trail_count;
        Self {
            phase: SweepPhase::Uninitialized,
            sweep: 0,
            divergence: f64::INFINITY,
            trail_count,
            positions: vec![Vector3::zeros(); slots + trail_count],
            previous: Vec::new(),
            forces: vec![Vector3::zeros(); slots],
            lengths: vec![0.0; slots],
            self_weights: vec![Vector3::zeros(); slots],
        }
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> SweepPhase {
        self.phase
    }

    /// Number of sweeps run.
    #[must_use]
    pub fn sweeps(&self) -> usize {
        self.sweep
    }

    /// Summed node movement between the last two sweeps.
    #[must_use]
    pub fn divergence(&self) -> f64 {
        self.divergence
    }

    /// Final status, once the outer loop has stopped.
    #[must_use]
    pub fn status(&self) -> Option<ConvergenceStatus> {
        match self.phase {
            SweepPhase::Converged => Some(ConvergenceStatus::Converged),
            SweepPhase::MaxIterationsExceeded => Some(ConvergenceStatus::MaxIterationsExceeded),
            _ => None,
        }
    }

    /// Position of the node in `row`.
    #[must_use]
    pub fn position(&self, row: usize) -> Option<Point> {
        self.positions.get(row).map(|&position| position.into())
    }

    /// Trail force leaving the node in `row`.
    #[must_use]
    pub fn trail_force(&self, row: usize) -> Option<Force> {
        self.forces.get(row).map(|&force| force.into())
    }

    /// Effective trail length leaving the node in `row`.
    #[must_use]
    pub fn trail_length(&self, row: usize) -> Option<f64> {
        self.lengths.get(row).copied()
    }

    /// Self-weight applied at the node in `row`.
    #[must_use]
    pub fn self_weight(&self, row: usize) -> Option<Force> {
        self.self_weights.get(row).map(|&weight| weight.into())
    }

    /// Summed movement of every non-origin node since the previous sweep.
    fn displacement(&self) -> f64 {
        self.positions
            .iter()
            .zip(&self.previous)
            .skip(self.trail_count)
            .map(|(current, previous)| (current - previous).norm())
            .sum()
    }

    /// Deviation forces on `row` from the other slots of `layer`, with their
    /// static action.
    fn deviation_force(
        &self,
        matrix: &Array2<f64>,
        row: usize,
        layer: usize,
        threshold: f64,
    ) -> (Vector3<f64>, f64) {
        let position = self.positions[row];
        let mut force = Vector3::zeros();
        let mut action = 0.0;
        for other in 0..self.trail_count {
            let magnitude = matrix[[row, Layering::deviation_column(other)]];
            let other_row = layer * self.trail_count + other;
            if other_row == row || magnitude.abs() <= threshold {
                continue;
            }
            let delta = self.positions[other_row] - position;
            force += unit(delta) * magnitude;
            action += (delta.norm() * magnitude).abs();
        }
        (force, action)
    }

    /// Bracing forces on `row` from the previous sweep, with their static action.
    fn bracing_force(&self, bracing: &[Bracing], row: usize) -> (Vector3<f64>, f64) {
        let mut force = Vector3::zeros();
        let mut action = 0.0;
        if self.previous.is_empty() {
            return (force, action);
        }
        for brace in bracing {
            if let Some(other) = brace.other_end(row) {
                let delta = self.previous[other] - self.previous[row];
                force += unit(delta) * brace.magnitude;
                action += (brace.magnitude * delta.norm()).abs();
            }
        }
        (force, action)
    }

    /// Run one sweep over every layer.
    fn run_sweep(
        &mut self,
        diagram: &TopologicalDiagram,
        inputs: &Inputs,
        self_weight: Option<&SelfWeight>,
        settings: &SolverSettings,
    ) {
        let layering = diagram.layering();
        let layers = layering.layer_count();
        let trails = self.trail_count;
        let trail_column = layering.trail_column();
        let matrix = &inputs.matrix;

        self.sweep += 1;
        for (slot, origin) in self.positions.iter_mut().zip(&inputs.origins) {
            *slot = origin.to_vector();
        }

        for layer in 0..layers {
            self.phase = SweepPhase::LayerSweepInProgress(layer);
            for trail in 0..trails {
                let row = layer * trails + trail;
                let position = self.positions[row];
                let external = Vector3::new(matrix[[row, 0]], matrix[[row, 1]], matrix[[row, 2]]);
                let (deviation, deviation_action) =
                    self.deviation_force(matrix, row, layer, settings.threshold);
                let (incoming, trail_action) = if layer == 0 {
                    (Vector3::zeros(), 0.0)
                } else {
                    let arriving = self.forces[row - trails];
                    (-arriving, (self.lengths[row - trails] * arriving.norm()).abs())
                };
                let (bracing, bracing_action) = self.bracing_force(&inputs.bracing, row);
                let weight = self_weight.map_or_else(Vector3::zeros, |material| {
                    let action = trail_action + deviation_action / 2.0 + bracing_action / 2.0;
                    Vector3::new(0.0, 0.0, -action * material.factor())
                });

                let force = -(external + bracing + deviation + incoming + weight);
                let direction = unit(force);
                let mut length = matrix[[row, trail_column]];
                let mut next = position + direction * length;

                if layer + 1 < layers {
                    let target = layering.slots()[row + trails];
                    let plane = (!target.extension)
                        .then(|| diagram.constraint_plane(target.node))
                        .flatten();
                    if let Some(t) = plane.and_then(|plane| plane.ray_parameter(position, direction)) {
                        if t.abs() < settings.threshold {
                            length = 0.0;
                            next = position;
                        } else {
                            length = t;
                            next = position + direction * t;
                        }
                    }
                }

                self.positions[row + trails] = next;
                self.forces[row] = force;
                self.lengths[row] = length;
                self.self_weights[row] = weight;
            }
        }
        self.phase = SweepPhase::SweepComplete;
    }
}

/// Run sweeps until the nodes settle or the cap is reached.
///
/// Without bracing a single sweep is exact and reports zero divergence.
pub(crate) fn run(
    diagram: &TopologicalDiagram,
    inputs: &Inputs,
    self_weight: Option<&SelfWeight>,
    settings: &SolverSettings,
) -> SolverState {
    let mut state = SolverState::new(diagram.layer_count(), diagram.trail_count());
    let braced = !inputs.bracing.is_empty();
    let cap = if braced { settings.max_iterations } else { 1 };

    loop {
        state.run_sweep(diagram, inputs, self_weight, settings);
        if !braced {
            state.divergence = 0.0;
            state.phase = SweepPhase::Converged;
            break;
        }
        if state.sweep >= 2 {
            state.divergence = state.displacement();
            debug!("sweep {} divergence {}", state.sweep, state.divergence);
            if state.divergence <= settings.threshold {
                info!(
                    "equilibrium converged after {} sweeps (divergence {})",
                    state.sweep, state.divergence
                );
                state.phase = SweepPhase::Converged;
                break;
            }
        }
        if state.sweep >= cap {
            warn!(
                "equilibrium did not converge within {cap} sweeps (divergence {})",
                state.divergence
            );
            state.phase = SweepPhase::MaxIterationsExceeded;
            break;
        }
        state.previous.clone_from(&state.positions);
    }
    state
}

/// Reject diagrams the solver cannot process.
pub(crate) fn check_diagram(
    diagram: &TopologicalDiagram,
    inputs: &Inputs,
) -> Result<(), ModelError> {
    let trails = diagram.trail_count();
    if inputs.origins.is_empty() || inputs.origins.len() != trails {
        return Err(ModelError::MissingOriginNodes);
    }
    let (rows, columns) = inputs.matrix.dim();
    if rows != diagram.layer_count() * trails || columns != diagram.layering().column_count() {
        return Err(ModelError::MatrixShape {
            rows,
            columns,
            trails,
        });
    }
    Ok(())
}

/// Compute the form diagram of a topology.
///
/// An empty topology yields [`Model::Empty`]. The topology is never modified.
///
/// # Errors
///
/// Returns [`ConfigError`] when `settings` are invalid.
///
/// # Examples
/// ```
/// use cemx::{line, point, solve, Attribute, SolverSettings, Trails, TopologyBuilder};
///
/// let trails = Trails::new(
///     vec![line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 2.0))],
///     vec![Attribute::from(2.0)],
/// );
/// let topology = TopologyBuilder::new(trails).build();
/// let model = solve(&topology, None, &SolverSettings::default()).unwrap();
/// assert!(model.form().is_some());
/// ```
pub fn solve(
    topology: &Topology,
    self_weight: Option<&SelfWeight>,
    settings: &SolverSettings,
) -> Result<Model, ConfigError> {
    match topology {
        Topology::Diagram(diagram) => solve_diagram(diagram, self_weight, settings),
        Topology::Empty(error) => Ok(Model::Empty(ModelError::EmptyTopology(error.clone()))),
    }
}

/// Compute the form diagram of a built diagram.
///
/// # Errors
///
/// Returns [`ConfigError`] when `settings` are invalid.
pub fn solve_diagram(
    diagram: &TopologicalDiagram,
    self_weight: Option<&SelfWeight>,
    settings: &SolverSettings,
) -> Result<Model, ConfigError> {
    settings.validate()?;
    let inputs = Inputs::from_diagram(diagram);
    if let Err(error) = check_diagram(diagram, &inputs) {
        warn!("structural model not computed: {error}");
        return Ok(Model::Empty(error));
    }
    let state = run(diagram, &inputs, self_weight, settings);
    Ok(Model::Form(FormDiagram::new(diagram, &inputs, &state, None, None)))
}
