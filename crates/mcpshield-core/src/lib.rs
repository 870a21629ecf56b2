//! Core library for the mcpshield MCP security gateway.
//!
//! mcpshield sits between MCP clients and MCP servers, inspects every
//! JSON-RPC request and response, and decides whether to allow, redact, or
//! block it based on a remotely-managed policy set. This crate contains the
//! whole validation engine: the policy store client, the MCP payload
//! extractor, the validator bank (audit, rate-limit, PII, regex, remote
//! scanner), the orchestrator that composes them, the detached threat
//! reporter, the LLM-backed metadata auditor for `tools/list` responses, and
//! the ingestion batch processor.
//!
//! The HTTP ingress lives in the companion `mcpshield-server` crate.

pub mod batch;
pub mod config;
pub mod error;
pub mod mcp;
pub mod metadata;
pub mod policy;
pub mod scanner;
pub mod storage;
pub mod threat;
pub mod validate;

pub use config::EngineConfig;
pub use validate::{PolicyValidator, ValidationContext, ValidationResult};
