//! Target node positions and target trail vectors for optimisation.

use petgraph::graph::NodeIndex;

use crate::geometry::{Force, Point, TargetGeometry};
use crate::members::broadcast;

/// Attracts a node towards a point, curve or surface.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetNode {
    /// Node to move.
    pub node: NodeIndex,
    /// Geometry the node should reach.
    pub geometry: TargetGeometry,
    /// Weight of the squared distance.
    pub weight: f64,
}

impl TargetNode {
    /// Weighted squared distance from `position` to the target.
    #[must_use]
    pub fn error(&self, position: Point) -> f64 {
        let closest = self.geometry.closest_point(position);
        self.weight * (position.to_vector() - closest.to_vector()).norm_squared()
    }
}

/// Desired trail force leaving a node.
#[derive(Clone, Debug, PartialEq)]
pub struct TargetVector {
    /// Node whose outgoing trail force is compared.
    pub node: NodeIndex,
    /// Desired force.
    pub vector: Force,
    /// Weight of the magnitude mismatch.
    pub magnitude_weight: f64,
    /// Weight of the direction mismatch.
    pub direction_weight: f64,
}

impl TargetVector {
    /// Weighted magnitude and direction mismatch of `force`.
    ///
    /// The direction term ignores orientation and vanishes when either vector
    /// has no length.
    #[must_use]
    pub fn error(&self, force: Force) -> f64 {
        let solved = force.to_vector();
        let target = self.vector.to_vector();
        let magnitude = solved.norm() - target.norm();
        let direction = if solved.norm() > f64::EPSILON && target.norm() > f64::EPSILON {
            1.0 - (solved.normalize().dot(&target.normalize())).abs()
        } else {
            0.0
        };
        self.magnitude_weight * magnitude.powi(2) + self.direction_weight * direction.powi(2)
    }
}

/// Everything the optimiser tries to match.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Targets {
    /// Node targets.
    pub nodes: Vec<TargetNode>,
    /// Trail vector targets.
    pub vectors: Vec<TargetVector>,
}

impl Targets {
    /// No targets.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add node targets.
    ///
    /// Geometries and identifiers must pair up, otherwise they are ignored.
    /// Weights follow the usual broadcast rule and default to 0.
    ///
    /// # Examples
    /// ```
    /// use cemx::{point, TargetGeometry, Targets};
    /// use petgraph::graph::NodeIndex;
    ///
    /// let targets = Targets::new().with_nodes(
    ///     vec![TargetGeometry::Point(point(0.0, 0.0, 3.0))],
    ///     &[NodeIndex::new(1)],
    ///     &[],
    /// );
    /// assert_eq!(targets.nodes[0].weight, 0.0);
    /// ```
    #[must_use]
    pub fn with_nodes(
        mut self,
        geometries: Vec<TargetGeometry>,
        ids: &[NodeIndex],
        weights: &[f64],
    ) -> Self {
        if geometries.len() != ids.len() {
            return self;
        }
        let weights = broadcast(ids.len(), weights, 0.0);
        self.nodes.extend(
            geometries
                .into_iter()
                .zip(ids)
                .zip(weights)
                .map(|((geometry, &node), weight)| TargetNode {
                    node,
                    geometry,
                    weight,
                }),
        );
        self
    }

    /// Add trail vector targets.
    ///
    /// Vectors and identifiers must pair up, otherwise they are ignored.
    /// Weights follow the usual broadcast rule and default to 0.
    #[must_use]
    pub fn with_vectors(
        mut self,
        vectors: &[Force],
        ids: &[NodeIndex],
        magnitude_weights: &[f64],
        direction_weights: &[f64],
    ) -> Self {
        if vectors.len() != ids.len() {
            return self;
        }
        let magnitude_weights = broadcast(ids.len(), magnitude_weights, 0.0);
        let direction_weights = broadcast(ids.len(), direction_weights, 0.0);
        for (idx, (&vector, &node)) in vectors.iter().zip(ids).enumerate() {
            self.vectors.push(TargetVector {
                node,
                vector,
                magnitude_weight: magnitude_weights[idx],
                direction_weight: direction_weights[idx],
            });
        }
        self
    }

    /// Return `true` when there is nothing to optimise for.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.vectors.is_empty()
    }
}
