use nalgebra::{Matrix4, Point3, Vector4};

/// Axis-aligned bounding box in world space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point3<f64>,
    pub max: Point3<f64>,
}

impl Aabb {
    pub fn new(min: Point3<f64>, max: Point3<f64>) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all `points`
    pub fn from_points(points: &[Point3<f64>]) -> Self {
        let mut min = Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY);
        let mut max = Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY);
        for p in points {
            min = min.inf(p);
            max = max.sup(p);
        }
        Self { min, max }
    }

    /// Copy shifted along the x axis, used for horizontal wrap-around
    pub fn shifted_x(&self, dx: f64) -> Self {
        Self {
            min: Point3::new(self.min.x + dx, self.min.y, self.min.z),
            max: Point3::new(self.max.x + dx, self.max.y, self.max.z),
        }
    }

    pub fn center(&self) -> Point3<f64> {
        nalgebra::center(&self.min, &self.max)
    }
}

/// View frustum as six inward-facing planes `(a, b, c, d)`; a point is
/// inside when `a*x + b*y + c*z + d >= 0` holds for every plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Frustum {
    planes: [Vector4<f64>; 6],
}

impl Frustum {
    /// Extract the planes from a combined view-projection matrix
    /// (OpenGL clip conventions, Gribb & Hartmann).
    pub fn from_view_projection(m: &Matrix4<f64>) -> Self {
        let row = |r: usize| Vector4::new(m[(r, 0)], m[(r, 1)], m[(r, 2)], m[(r, 3)]);
        let (r0, r1, r2, r3) = (row(0), row(1), row(2), row(3));

        let planes = [
            r3 + r0, // left
            r3 - r0, // right
            r3 + r1, // bottom
            r3 - r1, // top
            r3 + r2, // near
            r3 - r2, // far
        ]
        .map(|p| {
            let len = (p.x * p.x + p.y * p.y + p.z * p.z).sqrt();
            if len > f64::EPSILON {
                p / len
            } else {
                p
            }
        });

        Self { planes }
    }

    /// Conservative box test: `false` only when the box lies fully outside
    /// one of the planes.
    pub fn intersects_aabb(&self, aabb: &Aabb) -> bool {
        self.planes.iter().all(|p| {
            // Corner furthest along the plane normal
            let x = if p.x >= 0.0 { aabb.max.x } else { aabb.min.x };
            let y = if p.y >= 0.0 { aabb.max.y } else { aabb.min.y };
            let z = if p.z >= 0.0 { aabb.max.z } else { aabb.min.z };
            p.x * x + p.y * y + p.z * z + p.w >= 0.0
        })
    }

    pub fn contains_point(&self, point: &Point3<f64>) -> bool {
        self.planes
            .iter()
            .all(|p| p.x * point.x + p.y * point.y + p.z * point.z + p.w >= 0.0)
    }
}
