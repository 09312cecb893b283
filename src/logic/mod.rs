//! Logic modules: translate attribute choices into concrete names.
//!
//! # Modules
//!
//! - `resolver`: package and service name resolution

pub mod resolver;
