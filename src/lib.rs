//! kasmos: an interactive terminal orchestrator for multiple long-running AI
//! coding agents, each attached to a dedicated multiplexer session over an
//! isolated git-worktree working copy of a repository.
//!
//! The TUI, markdown/diff rendering, MCP/JSON-RPC import client, OAuth flow,
//! telemetry, and persisted UI configuration are external collaborators and
//! live outside this crate; this crate is the core they attach to.

pub mod application;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;
