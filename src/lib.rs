//! nso-chat is a command-line chat front end for Cisco NSO.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`nso`] wraps the NSO RESTCONF API and exposes device lookups.
//! - [`mcp`] serves those lookups as Model Context Protocol tools over stdio
//!   ([`mcp::server`]) and talks to such a server from the chat side
//!   ([`mcp::client`]).
//! - [`core`] holds configuration, the system prompt, streaming of
//!   `chat/completions` responses, and the tool-calling [`core::assistant`].
//! - [`api`] defines the chat payloads sent to and received from the LLM.
//!
//! Runtime entrypoints live in the binary crate (`src/main.rs`) and route
//! through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod mcp;
pub mod nso;
pub mod utils;
