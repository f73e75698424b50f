pub mod api_types;
pub mod llm;
pub mod retry;

pub mod providers {
    pub mod gemini;
    pub mod mock;
}

pub use llm::{CompletionClient, CompletionParams};
pub use providers::gemini::GeminiClient;
pub use providers::mock::MockProvider;
