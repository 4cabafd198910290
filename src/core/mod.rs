//! Core composition logic: types, expansion, merging, composition, freshness.

pub mod composer;
pub mod expander;
pub mod freshness;
pub mod generator;
pub mod hasher;
pub mod merge;
pub mod parser;
pub mod registry;
pub mod types;
pub mod values;
