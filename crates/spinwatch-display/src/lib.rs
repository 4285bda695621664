pub mod client;

pub use client::{DisplayConfig, DisplayError, LaMetricClient, Priority};
