//! Error types produced while building topologies, solving and optimising models.

use petgraph::graph::NodeIndex;
use thiserror::Error;

/// Reason a topological diagram could not be built.
///
/// Builders never return this as an `Err`; it is carried by
/// [`Topology::Empty`](crate::Topology::Empty) so callers can branch on the
/// presence of a diagram and still report what went wrong.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum TopologyError {
    /// Returned when no trail segments or no trail lengths were supplied.
    #[error("no trail members were supplied")]
    EmptyTrails,
    /// Returned when the trail segment and trail length lists differ in size.
    #[error("{segments} trail segments but {lengths} trail lengths")]
    TrailLengthMismatch {
        /// Number of trail segments.
        segments: usize,
        /// Number of trail lengths.
        lengths: usize,
    },
    /// Returned when the deviation segment and magnitude lists differ in size.
    #[error("{segments} deviation segments but {magnitudes} deviation magnitudes")]
    DeviationMagnitudeMismatch {
        /// Number of deviation segments.
        segments: usize,
        /// Number of deviation magnitudes.
        magnitudes: usize,
    },
    /// Returned when the load point and load vector lists differ in size.
    #[error("{points} load points but {vectors} load vectors")]
    LoadMismatch {
        /// Number of application points.
        points: usize,
        /// Number of load vectors.
        vectors: usize,
    },
    /// Returned when more than two trail members meet at a node.
    #[error("node {0:?} joins more than two trail members")]
    BranchedTrail(NodeIndex),
    /// Returned when a chain of trail members closes on itself.
    #[error("trail through node {0:?} forms a closed loop")]
    ClosedTrail(NodeIndex),
}

/// Reason a structural model could not be computed.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ModelError {
    /// Returned when the topology handed to the solver is itself empty.
    #[error("empty topology: {0}")]
    EmptyTopology(TopologyError),
    /// Returned when the diagram provides no origin nodes.
    #[error("no origin nodes were supplied")]
    MissingOriginNodes,
    /// Returned when the structural behaviour matrix does not match the trail count.
    #[error("structural matrix of {rows}x{columns} does not fit {trails} trails")]
    MatrixShape {
        /// Rows in the matrix.
        rows: usize,
        /// Columns in the matrix.
        columns: usize,
        /// Number of trails (origin nodes).
        trails: usize,
    },
}

/// Error returned when settings are not usable.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Returned when an optimisation algorithm key is not recognised.
    #[error("unknown optimisation algorithm `{0}` (expected one of LN_BOBYQA, LN_COBYLA, LN_SBPLX, LD_SLSQP, LD_LBFGS, LD_TNEWTON, LD_AUGLAG, GN_ISRES, GN_MLSL, GD_MLSL)")]
    UnknownAlgorithm(String),
    /// Returned when a setting must be strictly positive.
    #[error("{name} must be positive (received {value})")]
    NonPositive {
        /// Name of the offending setting.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },
    /// Returned when settings cannot be parsed from JSON.
    #[error("invalid settings document: {0}")]
    Json(String),
}

impl From<serde_json::Error> for ConfigError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error.to_string())
    }
}

/// Error returned by [`optimize`](crate::optimize).
///
/// Failures inside the optimisation backend are not reported here: they are
/// logged and the best vector seen so far is still used for the final solve.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum OptimizationError {
    /// Returned when the optimisation settings are invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),
}
