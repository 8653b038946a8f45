pub mod backend;
mod context;
pub mod depth;
pub mod headless;
pub mod pipeline_builder;
pub mod shadow_map;
pub mod texture;
pub mod uniforms;
pub mod vertex;
pub mod wgpu_backend;

pub use backend::{FrameStatus, GpuMeshId, RenderBackend};
pub use depth::Depth;
pub use headless::{BackendCall, HeadlessBackend};
pub use vertex::Vertex;
pub use wgpu_backend::WgpuBackend;
