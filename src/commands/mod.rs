//! CLI command implementations.

pub mod check;
pub mod convert;
pub mod init;
pub mod run;
pub mod sync;
