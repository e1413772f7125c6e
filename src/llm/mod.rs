pub mod backend;
pub mod client;
pub mod conversation;
pub mod orchestrator;
pub mod prompt;
