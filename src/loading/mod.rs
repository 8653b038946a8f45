pub mod pipeline;
pub mod tracker;

pub use pipeline::{AssetLoader, Completion, LoadJob, LoadOutput, LoadRequest};
pub use tracker::{Generation, GenerationCounter, LoadKind, LoadTicket, LoadingTracker};
