//! CLI 命令处理模块
//!
//! Argument parsing plus one module per subcommand.

pub mod hub;
pub mod manager;
pub mod parser;
pub mod score;

pub use parser::*;
