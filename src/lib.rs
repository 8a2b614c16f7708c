pub mod arxiv;
pub mod cli;
pub mod config;
pub mod generator;
pub mod i18n;
pub mod llm;
pub mod memory;
pub mod utils;

// Re-export commonly used types
pub use arxiv::{ArxivClient, PaperRecord, PaperRepository};
pub use config::Config;
pub use generator::context::PipelineContext;
pub use generator::pipeline::{PipelineEngine, PipelineRun};
pub use generator::types::{ExplanationLevel, PipelineError, RunOptions, StageResult, TaskKind};
pub use generator::workflow::{launch, process_query};
pub use llm::{CompletionBackend, LLMClient};
pub use memory::{JsonlMemory, ResearchMemory};
