//! Fundamental geometric types for topological and form diagrams.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Position in three dimensional space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Distance along the global X axis.
    pub x: f64,
    /// Distance along the global Y axis.
    pub y: f64,
    /// Distance along the global Z axis.
    pub z: f64,
}

impl Point {
    /// Create a [`Point`] with explicit coordinates.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Convert the point into an algebraic vector.
    #[must_use]
    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Euclidean distance between two points.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        (other.to_vector() - self.to_vector()).norm()
    }

    /// Return `true` when every coordinate differs from `other` by strictly less
    /// than `tolerance`.
    ///
    /// # Examples
    /// ```
    /// use cemx::point;
    ///
    /// let a = point(0.0, 0.0, 0.0);
    /// assert!(a.coincides_with(point(0.0005, 0.0, 0.0), 0.001));
    /// assert!(!a.coincides_with(point(0.001, 0.0, 0.0), 0.001));
    /// ```
    #[must_use]
    pub fn coincides_with(self, other: Self, tolerance: f64) -> bool {
        (self.x - other.x).abs() < tolerance
            && (self.y - other.y).abs() < tolerance
            && (self.z - other.z).abs() < tolerance
    }
}

impl From<Vector3<f64>> for Point {
    fn from(value: Vector3<f64>) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}

impl From<Point> for Vector3<f64> {
    fn from(value: Point) -> Self {
        value.to_vector()
    }
}

/// Cartesian vector representing a three dimensional force.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Force {
    /// Force component acting along the global X axis.
    pub x: f64,
    /// Force component acting along the global Y axis.
    pub y: f64,
    /// Force component acting along the global Z axis.
    pub z: f64,
}

impl Force {
    /// Create a [`Force`] with explicit components.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Convert the force into an algebraic vector.
    #[must_use]
    pub fn to_vector(self) -> Vector3<f64> {
        Vector3::new(self.x, self.y, self.z)
    }

    /// Magnitude of the force.
    #[must_use]
    pub fn magnitude(self) -> f64 {
        self.to_vector().norm()
    }

    /// Return `true` when every component is exactly zero.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0 && self.z == 0.0
    }
}

impl Default for Force {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }
}

impl From<Vector3<f64>> for Force {
    fn from(value: Vector3<f64>) -> Self {
        Self::new(value.x, value.y, value.z)
    }
}

impl From<Force> for Vector3<f64> {
    fn from(value: Force) -> Self {
        value.to_vector()
    }
}

/// Straight segment between two points.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Line {
    /// First end point.
    pub start: Point,
    /// Second end point.
    pub end: Point,
}

impl Line {
    /// Create a [`Line`] from its end points.
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Length of the segment.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.start.distance_to(self.end)
    }

    /// Closest point on the segment to `query`.
    #[must_use]
    pub fn closest_point(&self, query: Point) -> Point {
        closest_point_on_segment(query.to_vector(), self.start.to_vector(), self.end.to_vector())
            .into()
    }
}

/// Plane described by a point on it and a normal direction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Plane {
    /// Point lying on the plane.
    pub origin: Point,
    /// Normal direction; it does not need to be unit length.
    pub normal: Force,
}

impl Plane {
    /// Create a [`Plane`] from a point and a normal direction.
    #[must_use]
    pub const fn new(origin: Point, normal: Force) -> Self {
        Self { origin, normal }
    }

    /// Parameter `t` at which the ray `start + t * direction` meets the plane.
    ///
    /// Returns `None` when the ray is parallel to the plane or the normal is zero.
    #[must_use]
    pub fn ray_parameter(&self, start: Vector3<f64>, direction: Vector3<f64>) -> Option<f64> {
        let normal = self.normal.to_vector();
        let denominator = direction.dot(&normal);
        if denominator.abs() <= f64::EPSILON {
            return None;
        }
        Some((self.origin.to_vector() - start).dot(&normal) / denominator)
    }
}

/// Geometry a node is attracted to during optimisation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum TargetGeometry {
    /// A single point.
    Point(Point),
    /// A polyline through the listed vertices.
    Curve(Vec<Point>),
    /// A triangulated surface.
    Surface(Vec<[Point; 3]>),
}

impl TargetGeometry {
    /// Closest point on the target to `query`.
    ///
    /// Empty curves and surfaces return `query` itself.
    ///
    /// # Examples
    /// ```
    /// use cemx::{point, TargetGeometry};
    ///
    /// let curve = TargetGeometry::Curve(vec![point(0.0, 0.0, 0.0), point(10.0, 0.0, 0.0)]);
    /// assert_eq!(curve.closest_point(point(4.0, 3.0, 0.0)), point(4.0, 0.0, 0.0));
    /// ```
    #[must_use]
    pub fn closest_point(&self, query: Point) -> Point {
        let q = query.to_vector();
        match self {
            Self::Point(target) => *target,
            Self::Curve(vertices) => match vertices.as_slice() {
                [] => query,
                [single] => *single,
                _ => nearest(
                    vertices
                        .windows(2)
                        .map(|pair| closest_point_on_segment(q, pair[0].into(), pair[1].into())),
                    q,
                )
                .map_or(query, Point::from),
            },
            Self::Surface(triangles) => nearest(
                triangles.iter().map(|[a, b, c]| {
                    closest_point_on_triangle(q, (*a).into(), (*b).into(), (*c).into())
                }),
                q,
            )
            .map_or(query, Point::from),
        }
    }
}

/// Pick the candidate nearest to `query`.
fn nearest(
    candidates: impl Iterator<Item = Vector3<f64>>,
    query: Vector3<f64>,
) -> Option<Vector3<f64>> {
    candidates.min_by(|a, b| {
        (a - query)
            .norm_squared()
            .total_cmp(&(b - query).norm_squared())
    })
}

/// Closest point to `p` on the segment `a`-`b`.
fn closest_point_on_segment(p: Vector3<f64>, a: Vector3<f64>, b: Vector3<f64>) -> Vector3<f64> {
    let ab = b - a;
    let length_squared = ab.norm_squared();
    if length_squared <= f64::EPSILON {
        return a;
    }
    let t = ((p - a).dot(&ab) / length_squared).clamp(0.0, 1.0);
    a + ab * t
}

/// Closest point to `p` on the triangle `a`-`b`-`c`, found by Voronoi region tests.
fn closest_point_on_triangle(
    p: Vector3<f64>,
    a: Vector3<f64>,
    b: Vector3<f64>,
    c: Vector3<f64>,
) -> Vector3<f64> {
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(&ap);
    let d2 = ac.dot(&ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(&bp);
    let d4 = ac.dot(&bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        return a + ab * (d1 / (d1 - d3));
    }

    let cp = p - c;
    let d5 = ab.dot(&cp);
    let d6 = ac.dot(&cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        return a + ac * (d2 / (d2 - d6));
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        return b + (c - b) * ((d4 - d3) / ((d4 - d3) + (d5 - d6)));
    }

    let total = va + vb + vc;
    if total.abs() <= f64::EPSILON {
        // degenerate triangle
        return closest_point_on_segment(p, a, b);
    }
    a + ab * (vb / total) + ac * (vc / total)
}

/// Unit vector along `vector`, or zero when `vector` has no length.
pub(crate) fn unit(vector: Vector3<f64>) -> Vector3<f64> {
    let length = vector.norm();
    if length > f64::EPSILON {
        vector / length
    } else {
        Vector3::zeros()
    }
}

/// Convenience helper for creating [`Point`] instances.
///
/// # Examples
/// ```
/// use cemx::point;
///
/// let origin = point(0.0, 0.0, 0.0);
/// assert_eq!(origin.x, 0.0);
/// ```
#[must_use]
pub const fn point(x: f64, y: f64, z: f64) -> Point {
    Point::new(x, y, z)
}

/// Convenience helper for creating [`Force`] instances.
///
/// # Examples
/// ```
/// use cemx::force;
///
/// let load = force(1.0, 0.0, -5.0);
/// assert_eq!(load.z, -5.0);
/// ```
#[must_use]
pub const fn force(x: f64, y: f64, z: f64) -> Force {
    Force::new(x, y, z)
}

/// Convenience helper for creating [`Line`] instances.
#[must_use]
pub const fn line(start: Point, end: Point) -> Line {
    Line::new(start, end)
}
