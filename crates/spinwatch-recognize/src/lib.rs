pub mod client;
pub mod signature;
pub mod types;

pub use client::{AcrCloudClient, AcrCloudConfig};
pub use signature::sign_request;
pub use types::{RecognizeError, TrackMatch};
