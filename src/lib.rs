//! cfbuild: snipet composition and worker dispatch for ComputeFarm builds.
//!
//! Snipets are small templated build fragments. They compose into concrete
//! task descriptors with expanded environments, then each task runs on a
//! capable remote worker or, failing that, in a local shell.

pub mod cli;
pub mod core;
pub mod snipets;
pub mod transport;
pub mod workers;
