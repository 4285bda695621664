pub mod capture;
pub mod device;
pub mod level;

pub use capture::{encode_wav_mono16, CaptureConfig, CaptureSession};
pub use device::{DeviceInfo, DeviceManager};
pub use level::LevelMeter;
