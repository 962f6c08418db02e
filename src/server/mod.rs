//! Server module for Novacron
//!
//! - `config`: configuration sections
//! - `loader`: layered loading from files and environment
//! - `init`: engine assembly and the serve loop

pub mod config;
mod init;
pub(crate) mod loader;

pub use init::{build_engine, run};
pub use loader::load_config;
