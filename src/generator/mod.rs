pub mod assembler;
pub mod context;
pub mod extractor;
pub mod outlet;
pub mod pipeline;
pub mod prompts;
pub mod roles;
pub mod types;
pub mod workflow;
