//! Camera capabilities the selector relies on.
//!
//! The map surface lies on the `y = 0` plane with `x` growing east and `z`
//! growing south; `y` is altitude. Hosts normally implement [`CameraView`]
//! on top of their own camera. [`TopDownCamera`] and [`PerspectiveCamera`]
//! cover headless use.

use super::culling::{Aabb, Frustum};
use crate::core::{bounds::Bounds, geo::Point};
use nalgebra::{Matrix4, Perspective3, Point3, Vector3};

/// What the selector needs to know about the current view
pub trait CameraView {
    /// Camera position in world space
    fn position(&self) -> Point3<f64>;

    /// Viewport size in pixels
    fn screen_size(&self) -> (f64, f64);

    /// Project a world point to pixel coordinates (origin top-left).
    /// `None` when the point is behind the camera.
    fn world_to_screen(&self, point: &Point3<f64>) -> Option<Point>;

    /// Frustum-plane test for a world-space box
    fn intersects_frustum(&self, aabb: &Aabb) -> bool;

    fn screen_bounds(&self) -> Bounds {
        let (w, h) = self.screen_size();
        Bounds::from_coords(0.0, 0.0, w, h)
    }

    fn distance_to(&self, point: &Point3<f64>) -> f64 {
        nalgebra::distance(&self.position(), point)
    }
}

/// Orthographic camera looking straight down at the map
#[derive(Debug, Clone, PartialEq)]
pub struct TopDownCamera {
    /// World x/z the screen center looks at
    pub center: Point,
    pub altitude: f64,
    pub pixels_per_unit: f64,
    pub width: f64,
    pub height: f64,
}

impl TopDownCamera {
    pub fn new(center: Point, pixels_per_unit: f64, width: f64, height: f64) -> Self {
        Self {
            center,
            altitude: 1000.0,
            pixels_per_unit,
            width,
            height,
        }
    }

    /// Visible world rectangle on the x/z plane
    pub fn world_view(&self) -> Bounds {
        let half_w = self.width / 2.0 / self.pixels_per_unit;
        let half_h = self.height / 2.0 / self.pixels_per_unit;
        Bounds::from_coords(
            self.center.x - half_w,
            self.center.y - half_h,
            self.center.x + half_w,
            self.center.y + half_h,
        )
    }
}

impl CameraView for TopDownCamera {
    fn position(&self) -> Point3<f64> {
        Point3::new(self.center.x, self.altitude, self.center.y)
    }

    fn screen_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn world_to_screen(&self, point: &Point3<f64>) -> Option<Point> {
        Some(Point::new(
            (point.x - self.center.x) * self.pixels_per_unit + self.width / 2.0,
            (point.z - self.center.y) * self.pixels_per_unit + self.height / 2.0,
        ))
    }

    fn intersects_frustum(&self, aabb: &Aabb) -> bool {
        let footprint = Bounds::from_coords(aabb.min.x, aabb.min.z, aabb.max.x, aabb.max.z);
        self.world_view().overlaps(&footprint)
    }
}

/// Perspective camera with a cached view-projection matrix and frustum
#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    eye: Point3<f64>,
    width: f64,
    height: f64,
    view_projection: Matrix4<f64>,
    frustum: Frustum,
}

impl PerspectiveCamera {
    /// `fovy_degrees` is the vertical field of view
    pub fn look_at(
        eye: Point3<f64>,
        target: Point3<f64>,
        width: f64,
        height: f64,
        fovy_degrees: f64,
    ) -> Self {
        let forward = (target - eye).normalize();
        // Looking straight down makes +y degenerate as an up vector; use north
        let up = if forward.dot(&Vector3::y()).abs() > 0.999 {
            -Vector3::z()
        } else {
            Vector3::y()
        };

        let view = Matrix4::look_at_rh(&eye, &target, &up);
        let distance = nalgebra::distance(&eye, &target).max(1.0);
        let proj = Perspective3::new(
            width / height,
            fovy_degrees.to_radians(),
            distance * 0.001,
            distance * 100.0,
        )
        .to_homogeneous();
        let view_projection = proj * view;

        Self {
            eye,
            width,
            height,
            view_projection,
            frustum: Frustum::from_view_projection(&view_projection),
        }
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }
}

impl CameraView for PerspectiveCamera {
    fn position(&self) -> Point3<f64> {
        self.eye
    }

    fn screen_size(&self) -> (f64, f64) {
        (self.width, self.height)
    }

    fn world_to_screen(&self, point: &Point3<f64>) -> Option<Point> {
        let clip = self.view_projection * point.to_homogeneous();
        if clip.w <= f64::EPSILON {
            return None;
        }
        let ndc_x = clip.x / clip.w;
        let ndc_y = clip.y / clip.w;
        Some(Point::new(
            (ndc_x + 1.0) * 0.5 * self.width,
            (1.0 - ndc_y) * 0.5 * self.height,
        ))
    }

    fn intersects_frustum(&self, aabb: &Aabb) -> bool {
        self.frustum.intersects_aabb(aabb)
    }
}
