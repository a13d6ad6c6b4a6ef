//! Kilometers - transparent JSON-RPC interception for wrapped MCP servers.

pub mod config;
pub mod dispatch;
pub mod event;
pub mod interceptor;
pub mod pipeline;
pub mod process;
pub mod protocol;
pub mod relay;
