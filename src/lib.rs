//! Git worktree lifecycle and synchronization services.
//!
//! Spawns the system `git` binary for every operation, parses its
//! porcelain output into typed results, and serializes mutating
//! operations per worktree so concurrent agents cannot interleave
//! multi-command sequences against the same checkout.

pub mod config;
pub mod git;
pub mod registry;
pub mod util;
