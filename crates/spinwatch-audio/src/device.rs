use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};
use spinwatch_foundation::AudioError;

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub channels: u16,
    pub default_sample_rate: u32,
}

pub struct DeviceManager {
    host: Host,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    pub fn host_id(&self) -> cpal::HostId {
        self.host.id()
    }

    pub fn enumerate_inputs(&self) -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        if let Ok(inputs) = self.host.input_devices() {
            for device in inputs {
                let Ok(name) = device.name() else { continue };
                let Ok(config) = device.default_input_config() else {
                    continue;
                };
                devices.push(DeviceInfo {
                    name,
                    is_default: false,
                    channels: config.channels(),
                    default_sample_rate: config.sample_rate().0,
                });
            }
        }

        if let Some(default) = self.host.default_input_device() {
            if let Ok(default_name) = default.name() {
                for device in &mut devices {
                    if device.name == default_name {
                        device.is_default = true;
                    }
                }
            }
        }

        devices
    }

    pub fn input_names(&self) -> Vec<String> {
        self.enumerate_inputs().into_iter().map(|d| d.name).collect()
    }

    /// Resolve the configured input device, or the host default when none is
    /// configured. A missing device is fatal at startup; the error carries
    /// the available inputs so the operator can fix the config.
    pub fn resolve_input(&self, requested: Option<&str>) -> Result<Device, AudioError> {
        match requested {
            Some(name) => {
                let inputs = self.host.input_devices()?;
                for device in inputs {
                    if device.name().map(|n| n == name).unwrap_or(false) {
                        return Ok(device);
                    }
                }
                Err(AudioError::DeviceNotFound {
                    name: Some(name.to_string()),
                    available: self.input_names(),
                })
            }
            None => self
                .host
                .default_input_device()
                .ok_or_else(|| AudioError::DeviceNotFound {
                    name: None,
                    available: self.input_names(),
                }),
        }
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
