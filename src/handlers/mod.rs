pub mod config;
pub mod launch;

pub use config::*;
pub use launch::*;
