//! Records and wire types.

pub mod models;
