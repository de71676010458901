// Polled 8-channel ADC used as a volt meter
//
// The converter itself is an external device; anything that yields eight
// digital codes per poll can back the volt meter.

use std::fs;
use std::path::PathBuf;

use crate::error::{Result, RobotError};

/// Reference voltage and full-scale code of the 10-bit converter
pub const VREF: f32 = 3.3;
pub const FULL_SCALE: f32 = 1024.0;

/// Source of raw ADC codes
pub trait AnalogSource {
    fn read_codes(&mut self) -> Result<[u32; 8]>;
}

/// ADC exposed by a Linux IIO driver as `in_voltage<N>_raw` files
pub struct IioAdc {
    dir: PathBuf,
}

impl IioAdc {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(RobotError::Initialization {
                op: "ADC",
                detail: format!("{} is not a directory", dir.display()),
            });
        }
        Ok(Self { dir })
    }
}

impl AnalogSource for IioAdc {
    fn read_codes(&mut self) -> Result<[u32; 8]> {
        let mut codes = [0u32; 8];
        for (channel, code) in codes.iter_mut().enumerate() {
            let path = self.dir.join(format!("in_voltage{}_raw", channel));
            let text = fs::read_to_string(&path).map_err(|e| RobotError::Read {
                op: "ADC",
                detail: format!("{}: {}", path.display(), e),
            })?;
            *code = text.trim().parse().map_err(|_| {
                RobotError::response("ADC", format!("bad code '{}' in {}", text.trim(), path.display()))
            })?;
        }
        Ok(codes)
    }
}

pub struct VoltMeter {
    source: Box<dyn AnalogSource>,
    codes: [u32; 8],
}

impl VoltMeter {
    pub fn new(source: Box<dyn AnalogSource>) -> Self {
        Self {
            source,
            codes: [0; 8],
        }
    }

    /// Sample all channels
    pub fn poll(&mut self) -> Result<()> {
        self.codes = self.source.read_codes()?;
        Ok(())
    }

    pub fn voltage(&self, channel: usize) -> f32 {
        self.codes[channel] as f32 * VREF / FULL_SCALE
    }
}
