#![warn(clippy::all)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_doc_code_examples)]
#![warn(clippy::missing_docs_in_private_items)]

//! Combinatorial equilibrium modelling of trail-deviation structures.
//!
//! A structure is described by its trail members, which carry force from
//! origin nodes down to supports, and by deviation members between trails.
//! [`TopologyBuilder`] turns raw segments into a ranked [`TopologicalDiagram`],
//! [`solve`] walks it layer by layer to a [`FormDiagram`] in static
//! equilibrium, and [`optimize`] searches trail lengths, deviation magnitudes
//! and origin positions so that the form meets geometric targets.
//!
//! ```
//! use cemx::{line, point, solve, Attribute, Deviations, PointLoads, SolverSettings,
//!     Trails, TopologyBuilder};
//!
//! let trails = Trails::broadcast(
//!     vec![
//!         line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 5.0)),
//!         line(point(10.0, 0.0, 0.0), point(10.0, 0.0, 5.0)),
//!     ],
//!     &[Attribute::from(5.0)],
//! );
//! let tie = Deviations::new(
//!     vec![line(point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0))],
//!     vec![Attribute::from(3.0)],
//! );
//! let loads = PointLoads::broadcast(
//!     vec![point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0)],
//!     &[],
//!     &[],
//!     &[-4.0],
//! );
//! let topology = TopologyBuilder::new(trails).deviations(tie).loads(loads).build();
//! let model = solve(&topology, None, &SolverSettings::default()).unwrap();
//! let form = model.form().unwrap();
//! assert_eq!(form.trails().len(), 2);
//! ```
//!
//! Invalid input never panics: builders return [`Topology::Empty`] and the
//! solver returns [`Model::Empty`], both carrying the reason.

mod bounds;
mod errors;
mod geometry;
mod layering;
mod members;
mod model;
mod optimization;
mod settings;
mod solver;
mod targets;
mod topology;

pub use bounds::{Bounds, OptimizationBounds, OriginBounds};
pub use errors::{ConfigError, ModelError, OptimizationError, TopologyError};
pub use geometry::{force, line, point, Force, Line, Plane, Point, TargetGeometry};
pub use layering::{Bracing, Layering, Slot, TrailPath};
pub use members::{Attribute, Deviations, PointLoads, Supports, Trails};
pub use model::{
    FormDiagram, ForceSense, LoadKind, LoadResult, MemberResult, Model, NodeResult,
};
pub use optimization::optimize;
pub use settings::{Algorithm, BuildSettings, OptimizationSettings, SelfWeight, SolverSettings};
pub use solver::{solve, solve_diagram, ConvergenceStatus, SolverState, SweepPhase};
pub use targets::{TargetNode, TargetVector, Targets};
pub use topology::{
    ConstraintPlane, Member, MemberKind, Node, TopologicalDiagram, Topology, TopologyBuilder,
};
