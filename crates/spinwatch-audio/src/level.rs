/// RMS level metering over 16-bit mono samples.
///
/// Levels are reported in dBFS relative to full scale. Near-zero RMS is
/// clamped to a -100 dB floor so metering a dead-quiet room never hits the
/// log-of-zero singularity.
pub struct LevelMeter {
    epsilon: f32,
}

impl LevelMeter {
    pub fn new() -> Self {
        Self { epsilon: 1e-10 }
    }

    pub fn rms(&self, samples: &[i16]) -> f32 {
        if samples.is_empty() {
            return 0.0;
        }

        let sum_squares: i64 = samples
            .iter()
            .map(|&sample| {
                let s = sample as i64;
                s * s
            })
            .sum();

        let mean_square = sum_squares as f64 / samples.len() as f64;
        (mean_square.sqrt() / 32768.0) as f32
    }

    pub fn rms_to_dbfs(&self, rms: f32) -> f32 {
        if rms <= self.epsilon {
            return -100.0;
        }
        20.0 * rms.log10()
    }

    pub fn level_dbfs(&self, samples: &[i16]) -> f32 {
        self.rms_to_dbfs(self.rms(samples))
    }
}

impl Default for LevelMeter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: usize = 4410;

    #[test]
    fn test_silence_clamps_to_floor() {
        let meter = LevelMeter::new();
        let silence = vec![0i16; WINDOW];
        assert!(meter.level_dbfs(&silence) <= -100.0);
    }

    #[test]
    fn test_empty_window_clamps_to_floor() {
        let meter = LevelMeter::new();
        assert!(meter.level_dbfs(&[]) <= -100.0);
    }

    #[test]
    fn test_full_scale_is_zero_dbfs() {
        let meter = LevelMeter::new();
        let full_scale = vec![32767i16; WINDOW];
        let db = meter.level_dbfs(&full_scale);
        assert!((db - 0.0).abs() < 0.1);
    }

    #[test]
    fn test_sine_rms() {
        let meter = LevelMeter::new();
        let sine: Vec<i16> = (0..WINDOW)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / WINDOW as f32;
                (phase.sin() * 16384.0) as i16
            })
            .collect();

        // Half-scale sine has RMS 0.5 / sqrt(2) ~= 0.354
        let rms = meter.rms(&sine);
        assert!((rms - 0.354).abs() < 0.01);
    }

    #[test]
    fn test_half_scale_sine_level() {
        let meter = LevelMeter::new();
        let sine: Vec<i16> = (0..WINDOW)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / WINDOW as f32;
                (phase.sin() * 16384.0) as i16
            })
            .collect();

        // 20*log10(0.354) ~= -9.0 dBFS
        let db = meter.level_dbfs(&sine);
        assert!((db + 9.0).abs() < 0.3);
    }
}
