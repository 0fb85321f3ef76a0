//! Optimisation bounds on trail lengths, deviation magnitudes and origin nodes.
//!
//! Bounds are offsets around the current value of a variable. Upper offsets
//! are stored as absolute values and lower offsets as negated absolute values,
//! so the nominal value always lies inside its range.

use petgraph::graph::{EdgeIndex, NodeIndex};

/// Offsets for a set of identifiers.
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds<I> {
    /// Identifiers the offsets apply to.
    pub ids: Vec<I>,
    /// Upper offsets, one per identifier, never negative.
    pub upper: Vec<f64>,
    /// Lower offsets, one per identifier, never positive.
    pub lower: Vec<f64>,
}

impl<I> Default for Bounds<I> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            upper: Vec::new(),
            lower: Vec::new(),
        }
    }
}

impl<I: Copy + PartialEq> Bounds<I> {
    /// Create bounds for `ids`.
    ///
    /// The two offset lists are taken as given when both match `ids`, shared
    /// by every identifier when both hold a single value, and collapse to zero
    /// for every identifier otherwise.
    ///
    /// # Examples
    /// ```
    /// use cemx::Bounds;
    ///
    /// let shared = Bounds::new(vec![1, 2, 3], &[5.0], &[2.0]);
    /// assert_eq!(shared.upper, vec![5.0, 5.0, 5.0]);
    /// assert_eq!(shared.lower, vec![-2.0, -2.0, -2.0]);
    ///
    /// let mixed = Bounds::new(vec![1, 2, 3], &[5.0], &[]);
    /// assert_eq!(mixed.upper, vec![0.0, 0.0, 0.0]);
    /// ```
    #[must_use]
    pub fn new(ids: Vec<I>, upper: &[f64], lower: &[f64]) -> Self {
        let count = ids.len();
        let (upper, lower) = if upper.len() == count && lower.len() == count {
            (upper.to_vec(), lower.to_vec())
        } else if upper.len() == 1 && lower.len() == 1 {
            (vec![upper[0]; count], vec![lower[0]; count])
        } else {
            (vec![0.0; count], vec![0.0; count])
        };
        Self {
            ids,
            upper: upper.into_iter().map(f64::abs).collect(),
            lower: lower.into_iter().map(|offset| -offset.abs()).collect(),
        }
    }

    /// Lower and upper offsets for `id`, using the first matching entry.
    #[must_use]
    pub fn offsets(&self, id: I) -> Option<(f64, f64)> {
        let idx = self.ids.iter().position(|candidate| *candidate == id)?;
        Some((self.lower[idx], self.upper[idx]))
    }

    /// Absolute range for a variable currently at `value`.
    ///
    /// Identifiers without bounds are pinned to `value`.
    #[must_use]
    pub fn range(&self, id: Option<I>, value: f64) -> (f64, f64) {
        match id.and_then(|id| self.offsets(id)) {
            Some((lower, upper)) => (value + lower, value + upper),
            None => (value, value),
        }
    }
}

/// Per-axis bounds on origin node coordinates.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OriginBounds {
    /// Bounds on X coordinates.
    pub x: Bounds<NodeIndex>,
    /// Bounds on Y coordinates.
    pub y: Bounds<NodeIndex>,
    /// Bounds on Z coordinates.
    pub z: Bounds<NodeIndex>,
}

impl OriginBounds {
    /// Bounds for the origin nodes `ids` with every offset zero.
    #[must_use]
    pub fn new(ids: Vec<NodeIndex>) -> Self {
        Self {
            x: Bounds::new(ids.clone(), &[], &[]),
            y: Bounds::new(ids.clone(), &[], &[]),
            z: Bounds::new(ids, &[], &[]),
        }
    }

    /// Replace the X offsets.
    #[must_use]
    pub fn x(mut self, upper: &[f64], lower: &[f64]) -> Self {
        self.x = Bounds::new(self.x.ids, upper, lower);
        self
    }

    /// Replace the Y offsets.
    #[must_use]
    pub fn y(mut self, upper: &[f64], lower: &[f64]) -> Self {
        self.y = Bounds::new(self.y.ids, upper, lower);
        self
    }

    /// Replace the Z offsets.
    #[must_use]
    pub fn z(mut self, upper: &[f64], lower: &[f64]) -> Self {
        self.z = Bounds::new(self.z.ids, upper, lower);
        self
    }
}

/// All bounds consumed by [`optimize`](crate::optimize).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OptimizationBounds {
    /// Bounds on trail lengths keyed by trail member.
    pub trails: Bounds<EdgeIndex>,
    /// Bounds on deviation magnitudes keyed by deviation member, direct or indirect.
    pub deviations: Bounds<EdgeIndex>,
    /// Bounds on origin node coordinates.
    pub origins: OriginBounds,
}
