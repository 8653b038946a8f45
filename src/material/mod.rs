pub mod definition;
pub mod parser;
pub mod u3m;

pub use definition::{
    Channel, Color, MaterialDefinition, MaterialId, MaterialScalars, MaterialSource,
    TextureImage, TextureSlot, UvTransform, WrapMode,
};
pub use parser::{parse_archive, parse_archive_bytes, BundleIssue, MaterialArchiveBundle};
