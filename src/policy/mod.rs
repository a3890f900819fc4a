//! Access policy.

pub mod access;
