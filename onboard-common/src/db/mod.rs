//! Database bootstrap: pool creation, pragmas and schema

pub mod init;

pub use init::*;
