//! IP security: client IP derivation and suspicious-activity blocking.

pub mod client_ip;
pub mod evaluator;

pub use client_ip::extract_client_ip;
pub use evaluator::{IpSecurityEvaluator, IpVerdict};
