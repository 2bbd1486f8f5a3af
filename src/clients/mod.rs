pub mod local;
pub mod traits;

pub use local::LocalClient;
pub use traits::{ChatRequest, InferenceBackend};
