//! Free-view metering.

pub mod views;

pub use views::ViewMeter;
