//! Vista CLI library
//!
//! Drives the repository views from fixture files:
//! - `tree`: print the view tree
//! - `find`: locate and reveal a repository or commit
//! - `replay`: apply scripted events and watch the tree react
//! - `config`: manage the system configuration

pub mod cmd;
pub mod fixture;
pub mod render;
pub mod system_config;
