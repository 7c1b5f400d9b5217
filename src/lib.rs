//! Fish aggregating device (FAD) lifecycle and attraction simulation.
//!
//! FADs are deployed onto a gridded ocean, drift with the currents, pull fish
//! out of the tile under them and release it again when they beach, leave the
//! map or are set on.

pub mod attraction;
pub mod biology;
pub mod config;
pub mod currents;
pub mod engine;
pub mod exogenous;
pub mod fad;
pub mod fad_manager;
pub mod fad_map;
pub mod filters;
pub mod gear;
pub mod manager;
pub mod ocean;
pub mod stats;
