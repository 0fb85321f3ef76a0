//! Raw inputs describing trails, deviations, point loads and supports.
//!
//! Each wrapper offers `new`, which keeps the lists exactly as given so the
//! builder can reject mismatched input, and `broadcast`, which reconciles
//! list lengths the way interactive input panels do.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::{Force, Line, Point};

/// Target value of a trail length or deviation magnitude.
///
/// A value is either a plain number or a named parameter that is substituted
/// later through
/// [`TopologicalDiagram::with_parameters`](crate::TopologicalDiagram::with_parameters).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Attribute {
    /// Numeric target.
    Value(f64),
    /// Named parameter.
    Parameter(String),
}

impl Attribute {
    /// Value used when nothing is substituted; named parameters evaluate to 1.
    ///
    /// # Examples
    /// ```
    /// use cemx::Attribute;
    ///
    /// assert_eq!(Attribute::from(-2.5).value(), -2.5);
    /// assert_eq!(Attribute::from("rise").value(), 1.0);
    /// ```
    #[must_use]
    pub fn value(&self) -> f64 {
        match self {
            Self::Value(value) => *value,
            Self::Parameter(_) => 1.0,
        }
    }

    /// Name of the parameter, if any.
    #[must_use]
    pub fn parameter(&self) -> Option<&str> {
        match self {
            Self::Value(_) => None,
            Self::Parameter(name) => Some(name),
        }
    }

    /// Resolve against parallel `names` and `values` lists.
    ///
    /// A name without a matching value evaluates to 1.
    #[must_use]
    pub fn resolve(&self, names: &[String], values: &[f64]) -> f64 {
        match self {
            Self::Value(value) => *value,
            Self::Parameter(name) => names
                .iter()
                .position(|candidate| candidate == name)
                .and_then(|idx| values.get(idx).copied())
                .unwrap_or(1.0),
        }
    }
}

impl Default for Attribute {
    fn default() -> Self {
        Self::Value(1.0)
    }
}

impl From<f64> for Attribute {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for Attribute {
    fn from(name: &str) -> Self {
        Self::Parameter(name.to_string())
    }
}

impl From<String> for Attribute {
    fn from(name: String) -> Self {
        Self::Parameter(name)
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => write!(f, "{value}"),
            Self::Parameter(name) => f.write_str(name),
        }
    }
}

/// Reconcile `values` with `count` items: one value per item, a single value
/// shared by all, or `fallback` for every item otherwise.
pub(crate) fn broadcast<T: Clone>(count: usize, values: &[T], fallback: T) -> Vec<T> {
    match values.len() {
        len if len == count => values.to_vec(),
        1 => vec![values[0].clone(); count],
        _ => vec![fallback; count],
    }
}

/// Trail members of a topological diagram.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Trails {
    /// Segments joined end to end into trail paths.
    pub segments: Vec<Line>,
    /// Signed target lengths, tension positive.
    pub lengths: Vec<Attribute>,
}

impl Trails {
    /// Keep the lists as given.
    #[must_use]
    pub fn new(segments: Vec<Line>, lengths: Vec<Attribute>) -> Self {
        Self { segments, lengths }
    }

    /// Pair each segment with a length; unmatched lengths default to 1.
    ///
    /// # Examples
    /// ```
    /// use cemx::{line, point, Attribute, Trails};
    ///
    /// let segments = vec![
    ///     line(point(0.0, 0.0, 0.0), point(0.0, 0.0, 1.0)),
    ///     line(point(1.0, 0.0, 0.0), point(1.0, 0.0, 1.0)),
    /// ];
    /// let trails = Trails::broadcast(segments, &[Attribute::from(-3.0)]);
    /// assert_eq!(trails.lengths, vec![Attribute::from(-3.0), Attribute::from(-3.0)]);
    /// ```
    #[must_use]
    pub fn broadcast(segments: Vec<Line>, lengths: &[Attribute]) -> Self {
        let lengths = broadcast(segments.len(), lengths, Attribute::default());
        Self { segments, lengths }
    }

    /// Number of trail segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Return `true` when there are no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// Deviation members of a topological diagram.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Deviations {
    /// Segments between nodes of the trail paths.
    pub segments: Vec<Line>,
    /// Signed target force magnitudes, tension positive.
    pub magnitudes: Vec<Attribute>,
}

impl Deviations {
    /// Keep the lists as given.
    #[must_use]
    pub fn new(segments: Vec<Line>, magnitudes: Vec<Attribute>) -> Self {
        Self {
            segments,
            magnitudes,
        }
    }

    /// Pair each segment with a magnitude; unmatched magnitudes default to 1.
    #[must_use]
    pub fn broadcast(segments: Vec<Line>, magnitudes: &[Attribute]) -> Self {
        let magnitudes = broadcast(segments.len(), magnitudes, Attribute::default());
        Self {
            segments,
            magnitudes,
        }
    }

    /// Number of deviation segments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// Return `true` when there are no segments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}

/// External point loads.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PointLoads {
    /// Application points.
    pub points: Vec<Point>,
    /// Load vectors.
    pub vectors: Vec<Force>,
}

impl PointLoads {
    /// Keep the lists as given.
    #[must_use]
    pub fn new(points: Vec<Point>, vectors: Vec<Force>) -> Self {
        Self { points, vectors }
    }

    /// Assemble load vectors from per-axis component lists.
    ///
    /// An empty component list counts as a single zero. The component lists
    /// must have equal length and either match the points or hold a single
    /// value, otherwise every load is zero.
    #[must_use]
    pub fn broadcast(points: Vec<Point>, x: &[f64], y: &[f64], z: &[f64]) -> Self {
        let or_zero = |values: &[f64]| {
            if values.is_empty() {
                vec![0.0]
            } else {
                values.to_vec()
            }
        };
        let (x, y, z) = (or_zero(x), or_zero(y), or_zero(z));
        let vectors = if x.len() == y.len() && x.len() == z.len() {
            let components: Vec<Force> = x
                .iter()
                .zip(&y)
                .zip(&z)
                .map(|((&x, &y), &z)| Force::new(x, y, z))
                .collect();
            broadcast(points.len(), &components, Force::default())
        } else {
            vec![Force::default(); points.len()]
        };
        Self { points, vectors }
    }

    /// Number of application points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Return `true` when there are no loads.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Support positions marking the fixed end of trail paths.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Supports {
    /// Support points.
    pub points: Vec<Point>,
}

impl Supports {
    /// Wrap a list of support points.
    #[must_use]
    pub fn new(points: Vec<Point>) -> Self {
        Self { points }
    }

    /// Return `true` when `candidate` coincides with any support.
    #[must_use]
    pub fn contains(&self, candidate: Point, tolerance: f64) -> bool {
        self.points
            .iter()
            .any(|support| candidate.coincides_with(*support, tolerance))
    }

    /// Return `true` when no supports are given.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{line, point};

    fn segments(count: usize) -> Vec<Line> {
        (0..count)
            .map(|idx| {
                let x = idx as f64;
                line(point(x, 0.0, 0.0), point(x, 0.0, 1.0))
            })
            .collect()
    }

    #[test]
    fn broadcast_rule() {
        assert_eq!(broadcast(3, &[5.0], 0.0), vec![5.0, 5.0, 5.0]);
        assert_eq!(broadcast(3, &[5.0, 6.0], 0.0), vec![0.0, 0.0, 0.0]);
        assert_eq!(broadcast(2, &[5.0, 6.0], 0.0), vec![5.0, 6.0]);
    }

    #[test]
    fn trail_lengths_default_to_one() {
        let trails = Trails::broadcast(segments(2), &[]);
        assert_eq!(trails.lengths, vec![Attribute::Value(1.0); 2]);
        let raw = Trails::new(segments(2), vec![Attribute::Value(2.0)]);
        assert_eq!(raw.lengths.len(), 1);
    }

    #[test]
    fn deviation_magnitudes_fall_back_on_mismatch() {
        let deviations = Deviations::broadcast(
            segments(3),
            &[Attribute::from(2.0), Attribute::from(4.0)],
        );
        assert_eq!(deviations.magnitudes, vec![Attribute::Value(1.0); 3]);
    }

    #[test]
    fn loads_broadcast_components() {
        let points = vec![point(0.0, 0.0, 0.0), point(1.0, 0.0, 0.0)];
        let loads = PointLoads::broadcast(points.clone(), &[], &[], &[-2.0]);
        assert_eq!(loads.vectors, vec![Force::new(0.0, 0.0, -2.0); 2]);
        let uneven = PointLoads::broadcast(points, &[1.0, 2.0], &[0.0], &[0.0]);
        assert_eq!(uneven.vectors, vec![Force::default(); 2]);
    }

    #[test]
    fn parameters_resolve_by_name() {
        let names = vec!["rise".to_string(), "span".to_string()];
        assert_eq!(Attribute::from("span").resolve(&names, &[2.0, 7.0]), 7.0);
        assert_eq!(Attribute::from("span").resolve(&names, &[2.0]), 1.0);
        assert_eq!(Attribute::from("depth").resolve(&names, &[2.0, 7.0]), 1.0);
        assert_eq!(Attribute::from(4.0).resolve(&names, &[2.0, 7.0]), 4.0);
        assert_eq!(Attribute::from("rise").to_string(), "rise");
        assert_eq!(Attribute::from(2.5).to_string(), "2.5");
    }
}
