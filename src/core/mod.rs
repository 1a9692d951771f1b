pub mod assistant;
pub mod chat_stream;
pub mod config;
pub mod prompts;
