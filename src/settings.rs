//! Tunable settings for building, solving and optimising.
//!
//! Every settings struct has a [`Default`] and can be read from a JSON
//! document; missing fields fall back to their defaults.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

/// Parse any settings struct from JSON.
fn parse_json<T: DeserializeOwned>(json: &str) -> Result<T, ConfigError> {
    Ok(serde_json::from_str(json)?)
}

/// Settings for the topology builder.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    /// Per-axis distance below which two input points are the same node.
    pub tolerance: f64,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self { tolerance: 0.001 }
    }
}

impl BuildSettings {
    /// Coarser merge tolerance used by older topology definitions.
    #[must_use]
    pub const fn legacy() -> Self {
        Self { tolerance: 0.1 }
    }

    /// Read settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed input and
    /// [`ConfigError::NonPositive`] for a tolerance that is not positive.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = parse_json(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that the tolerance is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositive`] when the tolerance is not positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("tolerance", self.tolerance)
    }
}

/// Settings for the equilibrium solver.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Divergence below which the outer loop stops; also the magnitude under
    /// which deviation forces and constraint intersections are ignored.
    pub threshold: f64,
    /// Cap on outer sweeps when bracing is present.
    pub max_iterations: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            threshold: 1e-3,
            max_iterations: 50,
        }
    }
}

impl SolverSettings {
    /// Tight threshold and larger cap used by older models.
    #[must_use]
    pub const fn legacy() -> Self {
        Self {
            threshold: 1e-10,
            max_iterations: 100,
        }
    }

    /// Read settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed input or invalid values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = parse_json(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the threshold and iteration cap.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositive`] for a non-positive threshold or a zero cap.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("threshold", self.threshold)?;
        positive("max_iterations", self.max_iterations as f64)
    }
}

/// Optimisation algorithm identifiers.
///
/// Each key names a bound-constrained algorithm family. The run itself is
/// carried out by the closest `argmin` solver: derivative-free local keys
/// use Nelder-Mead, gradient keys use L-BFGS, Newton-CG or steepest descent
/// on finite differences, and global keys use a particle swarm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Algorithm {
    /// Bound optimisation by quadratic approximation (`LN_BOBYQA`).
    #[default]
    Bobyqa,
    /// Constrained optimisation by linear approximation (`LN_COBYLA`).
    Cobyla,
    /// Subspace simplex search (`LN_SBPLX`).
    Subplex,
    /// Sequential least-squares quadratic programming (`LD_SLSQP`).
    Slsqp,
    /// Limited-memory BFGS (`LD_LBFGS`).
    Lbfgs,
    /// Truncated Newton (`LD_TNEWTON`).
    TruncatedNewton,
    /// Augmented Lagrangian (`LD_AUGLAG`).
    AugmentedLagrangian,
    /// Improved stochastic ranking evolution strategy (`GN_ISRES`).
    Isres,
    /// Multi-level single-linkage (`GN_MLSL`).
    Mlsl,
    /// Multi-level single-linkage with gradient-based local searches (`GD_MLSL`).
    MlslGradient,
}

impl Algorithm {
    /// Every supported algorithm.
    pub const ALL: [Self; 10] = [
        Self::Bobyqa,
        Self::Cobyla,
        Self::Subplex,
        Self::Slsqp,
        Self::Lbfgs,
        Self::TruncatedNewton,
        Self::AugmentedLagrangian,
        Self::Isres,
        Self::Mlsl,
        Self::MlslGradient,
    ];

    /// Identifier string of the algorithm.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Bobyqa => "LN_BOBYQA",
            Self::Cobyla => "LN_COBYLA",
            Self::Subplex => "LN_SBPLX",
            Self::Slsqp => "LD_SLSQP",
            Self::Lbfgs => "LD_LBFGS",
            Self::TruncatedNewton => "LD_TNEWTON",
            Self::AugmentedLagrangian => "LD_AUGLAG",
            Self::Isres => "GN_ISRES",
            Self::Mlsl => "GN_MLSL",
            Self::MlslGradient => "GD_MLSL",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Algorithm {
    type Err = ConfigError;

    fn from_str(key: &str) -> Result<Self, Self::Err> {
        let key = key.trim();
        Self::ALL
            .into_iter()
            .find(|algorithm| algorithm.key() == key)
            .ok_or_else(|| ConfigError::UnknownAlgorithm(key.to_string()))
    }
}

impl TryFrom<String> for Algorithm {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Algorithm> for String {
    fn from(value: Algorithm) -> Self {
        value.key().to_string()
    }
}

/// Settings for the optimisation wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationSettings {
    /// Forward finite-difference step.
    pub gradient_delta: f64,
    /// Relative tolerance handed to the optimisation algorithm.
    pub relative_tolerance: f64,
    /// Maximum optimiser iterations.
    pub max_iterations: u64,
    /// Algorithm to run.
    pub algorithm: Algorithm,
}

impl Default for OptimizationSettings {
    fn default() -> Self {
        Self {
            gradient_delta: 0.001,
            relative_tolerance: 0.001,
            max_iterations: 20,
            algorithm: Algorithm::default(),
        }
    }
}

impl OptimizationSettings {
    /// Default settings running the algorithm named by `key`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownAlgorithm`] when `key` is not recognised.
    ///
    /// # Examples
    /// ```
    /// use cemx::{Algorithm, ConfigError, OptimizationSettings};
    ///
    /// let settings = OptimizationSettings::with_algorithm_key("LD_LBFGS").unwrap();
    /// assert_eq!(settings.algorithm, Algorithm::Lbfgs);
    ///
    /// let error = OptimizationSettings::with_algorithm_key("GN_DIRECT").unwrap_err();
    /// assert_eq!(error, ConfigError::UnknownAlgorithm("GN_DIRECT".to_string()));
    /// ```
    pub fn with_algorithm_key(key: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            algorithm: key.parse()?,
            ..Self::default()
        })
    }

    /// Read settings from a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for malformed input, unknown algorithm keys or
    /// invalid values.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = parse_json(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check the finite-difference step, tolerance and iteration cap.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NonPositive`] naming the first offending value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("gradient_delta", self.gradient_delta)?;
        positive("relative_tolerance", self.relative_tolerance)?;
        positive("max_iterations", self.max_iterations as f64)
    }
}

/// Material data enabling the self-weight feedback.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SelfWeight {
    /// Yield stress of the members.
    pub yield_stress: f64,
    /// Specific weight of the members.
    pub specific_weight: f64,
}

impl SelfWeight {
    /// Create self-weight data, or `None` when either value is zero or not finite.
    ///
    /// # Examples
    /// ```
    /// use cemx::SelfWeight;
    ///
    /// assert!(SelfWeight::new(355.0, 78.5).is_some());
    /// assert!(SelfWeight::new(0.0, 78.5).is_none());
    /// ```
    #[must_use]
    pub fn new(yield_stress: f64, specific_weight: f64) -> Option<Self> {
        let usable = |value: f64| value.is_finite() && value != 0.0;
        (usable(yield_stress) && usable(specific_weight)).then_some(Self {
            yield_stress,
            specific_weight,
        })
    }

    /// Weight per unit of static action.
    #[must_use]
    pub fn factor(&self) -> f64 {
        self.specific_weight / self.yield_stress
    }
}

/// Reject values that are not strictly positive.
fn positive(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NonPositive { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_current_variant() {
        assert_eq!(BuildSettings::default().tolerance, 0.001);
        assert_eq!(BuildSettings::legacy().tolerance, 0.1);
        let solver = SolverSettings::default();
        assert_eq!(solver.threshold, 1e-3);
        assert_eq!(solver.max_iterations, 50);
        let optimization = OptimizationSettings::default();
        assert_eq!(optimization.max_iterations, 20);
        assert_eq!(optimization.algorithm, Algorithm::Bobyqa);
        assert_eq!(optimization.algorithm.key(), "LN_BOBYQA");
    }

    #[test]
    fn algorithm_keys_roundtrip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(algorithm.key().parse::<Algorithm>(), Ok(algorithm));
        }
        assert_eq!(" GN_ISRES ".parse::<Algorithm>(), Ok(Algorithm::Isres));
        assert_eq!(
            "LN_NELDERMEAD".parse::<Algorithm>(),
            Err(ConfigError::UnknownAlgorithm("LN_NELDERMEAD".to_string()))
        );
    }

    #[test]
    fn json_fills_missing_fields() {
        let settings =
            OptimizationSettings::from_json(r#"{ "algorithm": "LD_AUGLAG", "max_iterations": 5 }"#)
                .expect("valid settings");
        assert_eq!(settings.algorithm, Algorithm::AugmentedLagrangian);
        assert_eq!(settings.max_iterations, 5);
        assert_eq!(settings.gradient_delta, 0.001);
    }

    #[test]
    fn json_rejects_unknown_algorithm() {
        let error = OptimizationSettings::from_json(r#"{ "algorithm": "GN_CRS2_LM" }"#)
            .expect_err("unknown key rejected");
        match error {
            ConfigError::Json(message) => assert!(message.contains("GN_CRS2_LM")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn non_positive_values_rejected() {
        let error = SolverSettings::from_json(r#"{ "max_iterations": 0 }"#)
            .expect_err("zero cap rejected");
        assert_eq!(
            error,
            ConfigError::NonPositive {
                name: "max_iterations",
                value: 0.0
            }
        );
        assert!(BuildSettings { tolerance: -1.0 }.validate().is_err());
    }

    #[test]
    fn self_weight_requires_both_values() {
        assert!(SelfWeight::new(1.0, f64::NAN).is_none());
        let weight = SelfWeight::new(2.0, 4.0).expect("usable material");
        assert_eq!(weight.factor(), 2.0);
    }
}
