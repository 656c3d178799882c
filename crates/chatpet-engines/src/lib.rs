//! chatpet-engines: inference engine adapters behind `chatpet_core::InferenceEngine`.

mod local_runtime;
mod model_router;

pub use local_runtime::LocalRuntime;
pub use model_router::{LlmMode, ModelRouter};
