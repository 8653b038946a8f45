pub mod camera;
pub mod lights;
pub mod model;
pub mod shadow;
pub mod state;

pub use camera::{Camera, OrbitController, OrbitInput};
pub use lights::{LightRig, LightSettings};
pub use model::{import_model, sphere_model, Bounds, MeshData, ModelData, ModelSource};
pub use shadow::{ShadowPlane, SunShadow};
pub use state::{MeshSlot, SceneState};
