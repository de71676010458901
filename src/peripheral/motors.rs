// Dual DC motor controller (dc2), channel 0 drives the left wheel, channel 1 the right

use super::channel::CommandLink;
use crate::config::MOTORS_ID;
use crate::error::Result;

/// Wheel side, doubling as the motor channel index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left = 0,
    Right = 1,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::Left, Side::Right];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// H-bridge mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Brake,
    Forward,
    Reverse,
    Coast,
}

impl Mode {
    fn wire(self) -> char {
        match self {
            Mode::Brake => 'b',
            Mode::Forward => 'f',
            Mode::Reverse => 'r',
            Mode::Coast => 'c',
        }
    }
}

/// Write-only actuator, no data stream
pub struct MotorPair {
    link: CommandLink,
}

impl MotorPair {
    pub fn new(link: CommandLink) -> Self {
        Self { link }
    }

    pub fn set_mode(&mut self, side: Side, mode: Mode) -> Result<()> {
        let resource = format!("mode{}", side.index());
        self.link.set(MOTORS_ID, &resource, &mode.wire().to_string())
    }

    /// Duty cycle in percent
    pub fn set_power(&mut self, side: Side, power: f32) -> Result<()> {
        let resource = format!("power{}", side.index());
        self.link.set(MOTORS_ID, &resource, &power.to_string())
    }

    pub fn set_pwm_frequency(&mut self, hz: u32) -> Result<()> {
        self.link.set(MOTORS_ID, "pwm_frequency", &hz.to_string())
    }

    /// Stop the motors if no command arrives within `timeout_ms` (0 disables)
    pub fn set_watchdog(&mut self, timeout_ms: u32) -> Result<()> {
        self.link.set(MOTORS_ID, "watchdog", &timeout_ms.to_string())
    }
}
