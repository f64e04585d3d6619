//! External process execution with time limits and scoped temp directories.

pub mod runner;
pub mod workspace;
