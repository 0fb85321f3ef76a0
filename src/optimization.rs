//! Bound-constrained optimisation of deviation magnitudes, trail lengths,
//! bracing magnitudes and origin node positions.
//!
//! Every objective evaluation runs the equilibrium solver from scratch.
//! Gradients are forward differences, taken backwards for variables sitting
//! at their upper bound. The best vector seen over all
//! evaluations, including gradient probes, is re-solved for the returned
//! model, whatever the algorithm reports at the end.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{CostFunction, Error, Executor, Gradient, Hessian, State, KV};
use argmin::solver::gradientdescent::SteepestDescent;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::newton::NewtonCG;
use argmin::solver::particleswarm::ParticleSwarm;
use argmin::solver::quasinewton::LBFGS;
use log::{debug, info, trace, warn};

use crate::bounds::OptimizationBounds;
use crate::errors::{ModelError, OptimizationError};
use crate::layering::Layering;
use crate::model::{FormDiagram, Model};
use crate::settings::{Algorithm, OptimizationSettings, SelfWeight, SolverSettings};
use crate::solver::{check_diagram, run, solve_diagram, Inputs, SolverState};
use crate::targets::Targets;
use crate::topology::{MemberKind, TopologicalDiagram, Topology};

/// History kept by L-BFGS.
const LBFGS_MEMORY: usize = 7;

/// Particles in the swarm used by the global algorithms.
const SWARM_SIZE: usize = 40;

/// `argmin` solver family running an [`Algorithm`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Backend {
    /// Derivative-free simplex search.
    NelderMead,
    /// Limited-memory BFGS.
    Lbfgs,
    /// Newton-CG on a finite-difference Hessian.
    NewtonCg,
    /// Steepest descent.
    SteepestDescent,
    /// Bounded particle swarm.
    ParticleSwarm,
}

impl From<Algorithm> for Backend {
    fn from(algorithm: Algorithm) -> Self {
        match algorithm {
            Algorithm::Bobyqa | Algorithm::Cobyla | Algorithm::Subplex => Self::NelderMead,
            Algorithm::Slsqp | Algorithm::Lbfgs => Self::Lbfgs,
            Algorithm::TruncatedNewton => Self::NewtonCg,
            Algorithm::AugmentedLagrangian => Self::SteepestDescent,
            Algorithm::Isres | Algorithm::Mlsl | Algorithm::MlslGradient => Self::ParticleSwarm,
        }
    }
}

/// Quantity an optimisation variable stands for.
#[derive(Clone, Copy, Debug, PartialEq)]
enum Quantity {
    /// Direct deviation written into both symmetric cells.
    Deviation {
        /// Row of the first end.
        row: usize,
        /// Row of the second end.
        other_row: usize,
        /// Trail of the first end.
        trail: usize,
        /// Trail of the second end.
        other_trail: usize,
    },
    /// Trail target of a row.
    Trail {
        /// Row holding the target.
        row: usize,
    },
    /// Bracing magnitude.
    Bracing {
        /// Position in the bracing list.
        index: usize,
    },
    /// One coordinate of an origin node.
    Origin {
        /// Trail of the origin node.
        trail: usize,
        /// 0, 1 or 2 for X, Y or Z.
        axis: usize,
    },
}

/// Optimisation variable with its nominal value and range.
#[derive(Clone, Copy, Debug, PartialEq)]
struct Variable {
    /// What the variable controls.
    quantity: Quantity,
    /// Nominal value.
    value: f64,
    /// Lowest admissible value.
    lower: f64,
    /// Highest admissible value.
    upper: f64,
}

impl Variable {
    /// Return `true` when the range is not a single value.
    fn is_free(&self) -> bool {
        self.lower < self.upper
    }

    /// Write `value` into a copy of the solver inputs.
    fn write(&self, inputs: &mut Inputs, value: f64) {
        match self.quantity {
            Quantity::Deviation {
                row,
                other_row,
                trail,
                other_trail,
            } => {
                inputs.matrix[[row, Layering::deviation_column(other_trail)]] = value;
                inputs.matrix[[other_row, Layering::deviation_column(trail)]] = value;
            }
            Quantity::Trail { row } => {
                let column = inputs.matrix.ncols() - 1;
                inputs.matrix[[row, column]] = value;
            }
            Quantity::Bracing { index } => inputs.bracing[index].magnitude = value,
            Quantity::Origin { trail, axis } => {
                let origin = &mut inputs.origins[trail];
                match axis {
                    0 => origin.x = value,
                    1 => origin.y = value,
                    _ => origin.z = value,
                }
            }
        }
    }
}

/// List every variable in a fixed order: direct deviations by row, trail
/// targets of all but the support layer, bracing magnitudes, then origin X,
/// Y and Z coordinates.
fn collect_variables(
    diagram: &TopologicalDiagram,
    inputs: &Inputs,
    bounds: &OptimizationBounds,
) -> Vec<Variable> {
    let layering = diagram.layering();
    let trails = layering.trail_count();
    let layers = layering.layer_count();
    let mut variables = Vec::new();

    let mut deviation_members = HashMap::new();
    for member in diagram.members(MemberKind::DirectDeviation) {
        if let Some((a, b)) = diagram.endpoints(member) {
            if let (Some(row_a), Some(row_b)) = (layering.row_of(a), layering.row_of(b)) {
                deviation_members.insert((row_a.min(row_b), row_a.max(row_b)), member);
            }
        }
    }
    for row in 0..layers * trails {
        let (layer, trail) = (row / trails, row % trails);
        for other_trail in trail + 1..trails {
            let other_row = layer * trails + other_trail;
            let Some(&member) = deviation_members.get(&(row, other_row)) else {
                continue;
            };
            let value = inputs.matrix[[row, Layering::deviation_column(other_trail)]];
            let (lower, upper) = bounds.deviations.range(Some(member), value);
            variables.push(Variable {
                quantity: Quantity::Deviation {
                    row,
                    other_row,
                    trail,
                    other_trail,
                },
                value,
                lower,
                upper,
            });
        }
    }

    let trail_column = layering.trail_column();
    for row in 0..layers.saturating_sub(1) * trails {
        let value = inputs.matrix[[row, trail_column]];
        let member = layering.slots()[row].trail_member;
        let (lower, upper) = bounds.trails.range(member, value);
        variables.push(Variable {
            quantity: Quantity::Trail { row },
            value,
            lower,
            upper,
        });
    }

    for (index, brace) in inputs.bracing.iter().enumerate() {
        let (lower, upper) = bounds.deviations.range(Some(brace.member), brace.magnitude);
        variables.push(Variable {
            quantity: Quantity::Bracing { index },
            value: brace.magnitude,
            lower,
            upper,
        });
    }

    let origin_ids = diagram.origin_node_ids();
    for (axis, axis_bounds) in [&bounds.origins.x, &bounds.origins.y, &bounds.origins.z]
        .into_iter()
        .enumerate()
    {
        for (trail, (origin, &id)) in inputs.origins.iter().zip(&origin_ids).enumerate() {
            let value = [origin.x, origin.y, origin.z][axis];
            let (lower, upper) = axis_bounds.range(Some(id), value);
            variables.push(Variable {
                quantity: Quantity::Origin { trail, axis },
                value,
                lower,
                upper,
            });
        }
    }

    variables
}

/// Weighted mismatch between a solver run and the targets.
fn objective(diagram: &TopologicalDiagram, state: &SolverState, targets: &Targets) -> f64 {
    let layering = diagram.layering();
    let nodes: f64 = targets
        .nodes
        .iter()
        .filter_map(|target| {
            let row = layering.row_of(target.node)?;
            Some(target.error(state.position(row)?))
        })
        .sum();
    let vectors: f64 = targets
        .vectors
        .iter()
        .filter_map(|target| {
            let row = layering.row_of(target.node)?;
            Some(target.error(state.trail_force(row)?))
        })
        .sum();
    nodes + vectors
}

/// Best evaluation seen so far.
#[derive(Clone, Debug)]
struct Best {
    /// Objective value.
    objective: f64,
    /// Free variable values.
    params: Vec<f64>,
    /// Number of evaluations so far.
    evaluations: usize,
}

/// Form-finding problem handed to the optimisation backend.
#[derive(Clone)]
struct FormFinding {
    /// Diagram being optimised.
    diagram: TopologicalDiagram,
    /// Nominal solver inputs.
    base: Inputs,
    /// All variables.
    variables: Vec<Variable>,
    /// Indices of the free variables, in parameter order.
    free: Vec<usize>,
    /// Targets to match.
    targets: Targets,
    /// Optional self-weight.
    self_weight: Option<SelfWeight>,
    /// Equilibrium solver settings.
    solver: SolverSettings,
    /// Finite-difference step.
    gradient_delta: f64,
    /// Best evaluation, shared with the caller.
    best: Rc<RefCell<Best>>,
}

impl FormFinding {
    /// Solver inputs for a parameter vector, clamped into the bounds.
    fn inputs(&self, params: &[f64]) -> Inputs {
        let mut inputs = self.base.clone();
        for (&idx, &value) in self.free.iter().zip(params) {
            let variable = &self.variables[idx];
            variable.write(&mut inputs, value.clamp(variable.lower, variable.upper));
        }
        inputs
    }

    /// Clamp a parameter vector into the bounds.
    fn clamped(&self, params: &[f64]) -> Vec<f64> {
        self.free
            .iter()
            .zip(params)
            .map(|(&idx, &value)| {
                let variable = &self.variables[idx];
                value.clamp(variable.lower, variable.upper)
            })
            .collect()
    }

    /// Signed finite-difference steps for the free parameters.
    ///
    /// Each steps forward unless that leaves the upper bound, then backward.
    /// A step is zero when the range is narrower than it.
    fn steps(&self, params: &[f64]) -> Vec<f64> {
        self.free
            .iter()
            .zip(params)
            .map(|(&idx, &value)| {
                let variable = &self.variables[idx];
                if value + self.gradient_delta <= variable.upper {
                    self.gradient_delta
                } else if value - self.gradient_delta >= variable.lower {
                    -self.gradient_delta
                } else {
                    0.0
                }
            })
            .collect()
    }

    /// One-sided differences of the objective around `params`.
    fn differences(&self, params: &[f64], steps: &[f64]) -> Vec<f64> {
        let base = self.evaluate(params);
        steps
            .iter()
            .enumerate()
            .map(|(position, &step)| {
                if step == 0.0 {
                    return 0.0;
                }
                let mut shifted = params.to_vec();
                shifted[position] += step;
                (self.evaluate(&shifted) - base) / step
            })
            .collect()
    }

    /// Lower and upper limits of the free parameters.
    fn limits(&self) -> (Vec<f64>, Vec<f64>) {
        self.free
            .iter()
            .map(|&idx| (self.variables[idx].lower, self.variables[idx].upper))
            .unzip()
    }

    /// Solve for `params` and record the evaluation.
    fn evaluate(&self, params: &[f64]) -> f64 {
        let inputs = self.inputs(params);
        let state = run(&self.diagram, &inputs, self.self_weight.as_ref(), &self.solver);
        let value = objective(&self.diagram, &state, &self.targets);

        let mut best = self.best.borrow_mut();
        best.evaluations += 1;
        trace!("evaluation {}: objective {value}", best.evaluations);
        if value < best.objective || best.objective.is_nan() {
            best.objective = value;
            best.params = self.clamped(params);
        }
        value
    }

    /// Initial simplex: the nominal point plus, for every free variable, a
    /// vertex halfway towards its farther bound.
    fn simplex(&self, initial: &[f64]) -> Vec<Vec<f64>> {
        let mut vertices = vec![initial.to_vec()];
        for (position, &idx) in self.free.iter().enumerate() {
            let variable = &self.variables[idx];
            let value = initial[position];
            let farther = if variable.upper - value >= value - variable.lower {
                variable.upper
            } else {
                variable.lower
            };
            let mut vertex = initial.to_vec();
            vertex[position] = value + (farther - value) / 2.0;
            vertices.push(vertex);
        }
        vertices
    }
}

impl CostFunction for FormFinding {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.evaluate(param))
    }
}

impl Gradient for FormFinding {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, param: &Self::Param) -> Result<Self::Gradient, Error> {
        let param = self.clamped(param);
        Ok(self.differences(&param, &self.steps(&param)))
    }
}

impl Hessian for FormFinding {
    type Param = Vec<f64>;
    type Hessian = Vec<Vec<f64>>;

    /// Differences of the gradient, reusing the steps of `param` throughout.
    fn hessian(&self, param: &Self::Param) -> Result<Self::Hessian, Error> {
        let param = self.clamped(param);
        let steps = self.steps(&param);
        let gradient = self.differences(&param, &steps);
        let mut rows: Vec<Vec<f64>> = steps
            .iter()
            .enumerate()
            .map(|(position, &step)| {
                if step == 0.0 {
                    return vec![0.0; steps.len()];
                }
                let mut shifted = param.clone();
                shifted[position] += step;
                self.differences(&shifted, &steps)
                    .iter()
                    .zip(&gradient)
                    .map(|(after, before)| (after - before) / step)
                    .collect()
            })
            .collect();
        for i in 0..rows.len() {
            for j in i + 1..rows.len() {
                let mean = (rows[i][j] + rows[j][i]) / 2.0;
                rows[i][j] = mean;
                rows[j][i] = mean;
            }
        }
        Ok(rows)
    }
}

/// Marks a run stopped because the objective no longer improves.
#[derive(Debug, thiserror::Error)]
#[error("objective changed by less than the relative tolerance {tolerance}")]
struct Stalled {
    /// Tolerance that was reached.
    tolerance: f64,
}

/// Observer ending a run once the objective changes by less than a relative
/// tolerance between two iterations.
#[derive(Clone, Debug)]
struct RelativeTolerance {
    /// Relative change below which the run ends.
    tolerance: f64,
    /// Objective of the previous iteration.
    previous: Option<f64>,
}

impl RelativeTolerance {
    /// Observer with no iteration recorded yet.
    fn new(tolerance: f64) -> Self {
        Self {
            tolerance,
            previous: None,
        }
    }

    /// Record the objective of an iteration and fail with [`Stalled`] when it
    /// barely moved.
    fn check(&mut self, cost: f64) -> Result<(), Error> {
        match self.previous.replace(cost) {
            Some(previous)
                if (previous - cost).abs() <= self.tolerance * previous.abs().max(cost.abs()) =>
            {
                Err(Stalled {
                    tolerance: self.tolerance,
                }
                .into())
            }
            _ => Ok(()),
        }
    }
}

impl<I: State<Float = f64>> Observe<I> for RelativeTolerance {
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> Result<(), Error> {
        self.check(state.get_cost())
    }
}

/// Treat a stalled run as finished.
fn settle(outcome: Result<(), Error>) -> Result<(), Error> {
    match outcome {
        Err(error) if error.downcast_ref::<Stalled>().is_some() => {
            debug!("{error}");
            Ok(())
        }
        other => other,
    }
}

/// Run the configured algorithm; results are read from the shared best record.
fn run_backend(
    problem: FormFinding,
    initial: Vec<f64>,
    settings: &OptimizationSettings,
) -> Result<(), Error> {
    let iterations = settings.max_iterations;
    let tolerance = settings.relative_tolerance;
    let linesearch: MoreThuenteLineSearch<Vec<f64>, Vec<f64>, f64> = MoreThuenteLineSearch::new();
    match Backend::from(settings.algorithm) {
        Backend::NelderMead => {
            let solver = NelderMead::<Vec<f64>, f64>::new(problem.simplex(&initial))
                .with_sd_tolerance(tolerance)?;
            Executor::new(problem, solver)
                .configure(|state| state.max_iters(iterations))
                .run()?;
        }
        Backend::Lbfgs => {
            let solver = LBFGS::new(linesearch, LBFGS_MEMORY).with_tolerance_cost(tolerance)?;
            Executor::new(problem, solver)
                .configure(|state| state.param(initial).max_iters(iterations))
                .run()?;
        }
        Backend::NewtonCg => {
            let solver = NewtonCG::new(linesearch).with_tolerance(tolerance)?;
            Executor::new(problem, solver)
                .configure(|state| state.param(initial).max_iters(iterations))
                .run()?;
        }
        Backend::SteepestDescent => {
            let solver = SteepestDescent::new(linesearch);
            settle(
                Executor::new(problem, solver)
                    .configure(|state| state.param(initial).max_iters(iterations))
                    .add_observer(RelativeTolerance::new(tolerance), ObserverMode::Always)
                    .run()
                    .map(|_| ()),
            )?;
        }
        Backend::ParticleSwarm => {
            let solver: ParticleSwarm<Vec<f64>, f64, _> =
                ParticleSwarm::new(problem.limits(), SWARM_SIZE);
            settle(
                Executor::new(problem, solver)
                    .configure(|state| state.max_iters(iterations))
                    .add_observer(RelativeTolerance::new(tolerance), ObserverMode::Always)
                    .run()
                    .map(|_| ()),
            )?;
        }
    }
    Ok(())
}

/// Find the free variables that bring the form diagram closest to the targets.
///
/// Without targets the topology is solved once with its nominal values.
/// Variables are free only when their bounds span a range; the returned model
/// is solved from the best vector evaluated and records the algorithm and the
/// best objective value.
///
/// # Errors
///
/// Returns [`OptimizationError::Config`] when the optimisation or solver
/// settings are invalid. Failures inside the optimisation algorithm are logged
/// and do not abort the run.
pub fn optimize(
    topology: &Topology,
    targets: &Targets,
    bounds: &OptimizationBounds,
    self_weight: Option<&SelfWeight>,
    solver: &SolverSettings,
    settings: &OptimizationSettings,
) -> Result<Model, OptimizationError> {
    settings.validate()?;
    solver.validate()?;
    let diagram = match topology {
        Topology::Diagram(diagram) => diagram,
        Topology::Empty(error) => {
            return Ok(Model::Empty(ModelError::EmptyTopology(error.clone())));
        }
    };
    if targets.is_empty() {
        debug!("no optimisation targets; solving nominal inputs");
        return Ok(solve_diagram(diagram, self_weight, solver)?);
    }

    let base = Inputs::from_diagram(diagram);
    if let Err(error) = check_diagram(diagram, &base) {
        warn!("structural model not computed: {error}");
        return Ok(Model::Empty(error));
    }
    let variables = collect_variables(diagram, &base, bounds);
    let free: Vec<usize> = variables
        .iter()
        .enumerate()
        .filter(|(_, variable)| variable.is_free())
        .map(|(idx, _)| idx)
        .collect();
    let initial: Vec<f64> = free.iter().map(|&idx| variables[idx].value).collect();
    debug!(
        "optimising {} of {} variables with {}",
        free.len(),
        variables.len(),
        settings.algorithm
    );

    let best = Rc::new(RefCell::new(Best {
        objective: f64::NAN,
        params: initial.clone(),
        evaluations: 0,
    }));
    let problem = FormFinding {
        diagram: diagram.clone(),
        base,
        variables,
        free,
        targets: targets.clone(),
        self_weight: self_weight.copied(),
        solver: *solver,
        gradient_delta: settings.gradient_delta,
        best: Rc::clone(&best),
    };

    problem.evaluate(&initial);
    if !initial.is_empty() {
        if let Err(error) = run_backend(problem.clone(), initial, settings) {
            warn!("optimisation stopped early: {error}");
        }
    }

    let best = best.borrow().clone();
    info!(
        "optimisation finished after {} evaluations with objective {}",
        best.evaluations, best.objective
    );
    let inputs = problem.inputs(&best.params);
    let state = run(diagram, &inputs, self_weight, solver);
    Ok(Model::Form(FormDiagram::new(
        diagram,
        &inputs,
        &state,
        Some(settings.algorithm),
        Some(best.objective),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::Bounds;
    use crate::geometry::{line, point, Force, TargetGeometry};
    use crate::members::{Attribute, Deviations, PointLoads, Trails};
    use crate::topology::TopologyBuilder;
    use approx::assert_relative_eq;
    use petgraph::graph::{EdgeIndex, NodeIndex};

    fn portal() -> Topology {
        let trails = Trails::broadcast(
            vec![
                line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 5.0)),
                line(point(10.0, 0.0, 0.0), point(10.0, 0.0, 5.0)),
            ],
            &[Attribute::from(5.0)],
        );
        let deviations = Deviations::new(
            vec![line(point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0))],
            vec![Attribute::from(3.0)],
        );
        let loads = PointLoads::broadcast(
            vec![point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0)],
            &[],
            &[],
            &[-4.0],
        );
        TopologyBuilder::new(trails)
            .deviations(deviations)
            .loads(loads)
            .build()
    }

    fn apex_target() -> Targets {
        Targets::new().with_nodes(
            vec![TargetGeometry::Point(point(-6.0, 0.0, 8.0))],
            &[NodeIndex::new(1)],
            &[1.0],
        )
    }

    /// Target reached by shortening trail 0 from 5 to 3, with 5 as its
    /// upper limit. The objective is `(L - 3)^2`.
    fn shortening() -> (Targets, OptimizationBounds) {
        let targets = Targets::new().with_nodes(
            vec![TargetGeometry::Point(point(-1.8, 0.0, 2.4))],
            &[NodeIndex::new(1)],
            &[1.0],
        );
        let bounds = OptimizationBounds {
            trails: Bounds::new(vec![EdgeIndex::new(0)], &[0.0], &[5.0]),
            ..OptimizationBounds::default()
        };
        (targets, bounds)
    }

    fn problem(topology: &Topology, targets: Targets, bounds: &OptimizationBounds) -> FormFinding {
        let diagram = topology.diagram().expect("diagram built");
        let base = Inputs::from_diagram(diagram);
        let variables = collect_variables(diagram, &base, bounds);
        let free = (0..variables.len()).filter(|&idx| variables[idx].is_free()).collect();
        FormFinding {
            diagram: diagram.clone(),
            base,
            variables,
            free,
            targets,
            self_weight: None,
            solver: SolverSettings::default(),
            gradient_delta: 0.001,
            best: Rc::new(RefCell::new(Best {
                objective: f64::NAN,
                params: Vec::new(),
                evaluations: 0,
            })),
        }
    }

    #[test]
    fn variables_follow_the_fixed_order() {
        let topology = portal();
        let diagram = topology.diagram().expect("diagram built");
        let inputs = Inputs::from_diagram(diagram);
        let bounds = OptimizationBounds {
            trails: Bounds::new(vec![EdgeIndex::new(1)], &[1.0], &[1.0]),
            ..OptimizationBounds::default()
        };
        let variables = collect_variables(diagram, &inputs, &bounds);
        // one deviation, two trail targets, six origin coordinates
        assert_eq!(variables.len(), 9);
        assert!(matches!(variables[0].quantity, Quantity::Deviation { row: 0, other_row: 1, .. }));
        assert_eq!(variables[0].value, 3.0);
        assert!(matches!(variables[1].quantity, Quantity::Trail { row: 0 }));
        assert!(!variables[1].is_free());
        assert_eq!((variables[2].lower, variables[2].upper), (4.0, 6.0));
        assert!(matches!(variables[3].quantity, Quantity::Origin { trail: 0, axis: 0 }));
        assert!(matches!(variables[8].quantity, Quantity::Origin { trail: 1, axis: 2 }));
    }

    #[test]
    fn deviation_variables_stay_symmetric() {
        let topology = portal();
        let diagram = topology.diagram().expect("diagram built");
        let mut inputs = Inputs::from_diagram(diagram);
        let variables = collect_variables(diagram, &inputs, &OptimizationBounds::default());
        variables[0].write(&mut inputs, -7.0);
        assert_eq!(inputs.matrix[[0, 4]], -7.0);
        assert_eq!(inputs.matrix[[1, 3]], -7.0);
    }

    #[test]
    fn nelder_mead_reaches_the_target() {
        let bounds = OptimizationBounds {
            trails: Bounds::new(vec![EdgeIndex::new(0)], &[10.0], &[0.0]),
            ..OptimizationBounds::default()
        };
        let model = optimize(
            &portal(),
            &apex_target(),
            &bounds,
            None,
            &SolverSettings::default(),
            &OptimizationSettings::default(),
        )
        .expect("valid settings");
        let form = model.form().expect("model solved");
        assert_eq!(form.solver(), Some(Algorithm::Bobyqa));
        assert_relative_eq!(form.objective().unwrap_or(f64::NAN), 0.0, epsilon = 1e-9);
        let apex = form.node_position(NodeIndex::new(1)).expect("apex solved");
        assert_relative_eq!(apex.x, -6.0, epsilon = 1e-6);
        assert_relative_eq!(apex.z, 8.0, epsilon = 1e-6);
    }

    #[test]
    fn best_objective_never_exceeds_the_nominal_one() {
        let bounds = OptimizationBounds {
            deviations: Bounds::new(vec![EdgeIndex::new(2)], &[5.0], &[5.0]),
            ..OptimizationBounds::default()
        };
        for algorithm in [
            Algorithm::Lbfgs,
            Algorithm::TruncatedNewton,
            Algorithm::AugmentedLagrangian,
            Algorithm::Isres,
        ] {
            let settings = OptimizationSettings {
                algorithm,
                max_iterations: 3,
                ..OptimizationSettings::default()
            };
            let model = optimize(
                &portal(),
                &apex_target(),
                &bounds,
                None,
                &SolverSettings::default(),
                &settings,
            )
            .expect("valid settings");
            let form = model.form().expect("model solved");
            // nominal apex (-3, 0, 4) is 5 away from the target
            assert!(form.objective().unwrap_or(f64::INFINITY) <= 25.0 + 1e-9);
            assert_eq!(form.solver(), Some(algorithm));
        }
    }

    #[test]
    fn differences_at_the_upper_bound_look_backwards() {
        let (targets, bounds) = shortening();
        let topology = portal();
        let problem = problem(&topology, targets, &bounds);
        let initial = vec![5.0];
        assert_eq!(problem.free.len(), 1);
        assert_eq!(problem.steps(&initial), vec![-0.001]);

        let gradient = problem.gradient(&initial).expect("finite differences");
        assert_relative_eq!(gradient[0], 4.0, epsilon = 1e-2);
        let hessian = problem.hessian(&initial).expect("finite differences");
        assert_relative_eq!(hessian[0][0], 2.0, epsilon = 1e-2);
        assert_relative_eq!(problem.best.borrow().params[0], 4.998, epsilon = 1e-9);
    }

    #[test]
    fn gradient_algorithms_move_off_the_upper_bound() {
        let (targets, bounds) = shortening();
        for algorithm in [Algorithm::Lbfgs, Algorithm::AugmentedLagrangian] {
            let settings = OptimizationSettings {
                algorithm,
                ..OptimizationSettings::default()
            };
            let model = optimize(
                &portal(),
                &targets,
                &bounds,
                None,
                &SolverSettings::default(),
                &settings,
            )
            .expect("valid settings");
            let form = model.form().expect("model solved");
            // nominal objective is 4
            assert!(form.objective().unwrap_or(f64::INFINITY) < 1e-3);
            let apex = form.node_position(NodeIndex::new(1)).expect("apex solved");
            assert_relative_eq!(apex.x, -1.8, epsilon = 0.05);
            assert_relative_eq!(apex.z, 2.4, epsilon = 0.05);
        }
    }

    #[test]
    fn stalled_objectives_end_the_run() {
        let mut stop = RelativeTolerance::new(0.01);
        assert!(stop.check(10.0).is_ok());
        assert!(stop.check(5.0).is_ok());
        let error = stop.check(4.99).expect_err("change below one percent");
        assert!(error.downcast_ref::<Stalled>().is_some());
        assert!(settle(Err(error)).is_ok());
        assert!(settle(Err(Error::msg("line search failed"))).is_err());
    }

    #[test]
    fn every_key_runs_on_an_argmin_solver() {
        assert_eq!(Backend::from(Algorithm::default()), Backend::NelderMead);
        assert_eq!(Backend::from(Algorithm::Slsqp), Backend::Lbfgs);
        assert_eq!(Backend::from(Algorithm::TruncatedNewton), Backend::NewtonCg);
        assert_eq!(Backend::from(Algorithm::AugmentedLagrangian), Backend::SteepestDescent);
        assert_eq!(Backend::from(Algorithm::MlslGradient), Backend::ParticleSwarm);
    }

    #[test]
    fn trail_vector_targets_count_towards_the_objective() {
        let topology = portal();
        let diagram = topology.diagram().expect("diagram built");
        let inputs = Inputs::from_diagram(diagram);
        let state = run(diagram, &inputs, None, &SolverSettings::default());
        let targets = Targets::new().with_vectors(
            &[Force::new(0.0, 0.0, 3.0)],
            &[NodeIndex::new(0)],
            &[1.0],
            &[0.0],
        );
        // trail force leaving node 0 is (-3, 0, 4)
        assert_relative_eq!(objective(diagram, &state, &targets), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn without_targets_the_topology_is_solved_directly() {
        let topology = portal();
        let direct = crate::solver::solve(&topology, None, &SolverSettings::default())
            .expect("valid settings");
        let optimised = optimize(
            &topology,
            &Targets::new(),
            &OptimizationBounds::default(),
            None,
            &SolverSettings::default(),
            &OptimizationSettings::default(),
        )
        .expect("valid settings");
        assert_eq!(direct, optimised);
    }

    #[test]
    fn fixed_variables_skip_the_backend() {
        let model = optimize(
            &portal(),
            &apex_target(),
            &OptimizationBounds::default(),
            None,
            &SolverSettings::default(),
            &OptimizationSettings::default(),
        )
        .expect("valid settings");
        let form = model.form().expect("model solved");
        assert_relative_eq!(form.objective().unwrap_or(f64::NAN), 25.0, epsilon = 1e-9);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let settings = OptimizationSettings {
            gradient_delta: 0.0,
            ..OptimizationSettings::default()
        };
        let result = optimize(
            &portal(),
            &apex_target(),
            &OptimizationBounds::default(),
            None,
            &SolverSettings::default(),
            &settings,
        );
        assert!(matches!(result, Err(OptimizationError::Config(_))));
    }
}
