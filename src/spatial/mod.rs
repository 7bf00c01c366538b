pub mod camera;
pub mod culling;

pub use camera::{CameraView, PerspectiveCamera, TopDownCamera};
pub use culling::{Aabb, Frustum};
