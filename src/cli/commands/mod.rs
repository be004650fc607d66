//! CLI command implementations

pub mod cache;
pub mod check;
pub mod config;

pub use cache::execute as cache;
pub use check::execute as check;
pub use config::execute as config;
