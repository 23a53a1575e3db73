//! Side-effecting operations: filesystem, git, network, logs.

pub mod apply;
pub mod archive;
pub mod config;
pub mod gateway;
pub mod git;
pub mod openai;
pub mod run_log;
pub mod tasks;
