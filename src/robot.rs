// The robot: every peripheral handle the process owns
//
// The scheduler runs with `Robot` as its context; behaviors and process
// routines borrow it for the duration of one handler call.

use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::{BATTERY_CHANNEL, BATTERY_DIVIDER, Options};
use crate::error::{Result, RobotError};
use crate::locomotion::LocomotionController;
use crate::peripheral::channel::connect;
use crate::peripheral::{
    ButtonPanel, CommandLink, DataStream, EdgeSensors, IioAdc, MotorPair, RangeFinder,
    TickCounter, VoltMeter,
};

pub struct Robot {
    pub panel: ButtonPanel,
    pub edges: EdgeSensors,
    pub range: RangeFinder,
    pub locomotion: LocomotionController,
    /// Present only when a battery ADC is configured
    pub volt_meter: Option<VoltMeter>,
}

impl Robot {
    pub fn new(
        panel: ButtonPanel,
        edges: EdgeSensors,
        range: RangeFinder,
        locomotion: LocomotionController,
        volt_meter: Option<VoltMeter>,
    ) -> Self {
        Self {
            panel,
            edges,
            range,
            locomotion,
            volt_meter,
        }
    }

    /// Connect to the peripheral server and configure every peripheral
    ///
    /// One command connection is shared by all peripherals; each streaming
    /// peripheral gets its own data connection.
    pub fn connect(options: &Options) -> Result<Self> {
        let addr = options.server.as_str();
        let command = connect(addr)?;
        info!("Connected to peripheral server at {}", addr);

        let panel = ButtonPanel::new(CommandLink::tcp(&command)?, DataStream::tcp(addr)?)?;
        let edges = EdgeSensors::new(
            CommandLink::tcp(&command)?,
            DataStream::tcp(addr)?,
            options.edge_limit,
        )?;
        let range = RangeFinder::new(
            CommandLink::tcp(&command)?,
            DataStream::tcp(addr)?,
            options.inner_limit,
            options.outer_limit,
        )?;
        let volt_meter = match &options.adc {
            Some(dir) => {
                info!("Battery ADC at {}", dir.display());
                Some(VoltMeter::new(Box::new(IioAdc::new(dir)?)))
            }
            None => None,
        };
        let counter = TickCounter::new(CommandLink::tcp(&command)?, DataStream::tcp(addr)?)?;
        let motors = MotorPair::new(CommandLink::tcp(&command)?);
        let locomotion = LocomotionController::new(motors, counter, options.speed)?;

        Ok(Self::new(panel, edges, range, locomotion, volt_meter))
    }

    /// Battery voltage from the last volt meter poll
    pub fn battery_voltage(&self) -> Result<f32> {
        let meter = self.volt_meter.as_ref().ok_or_else(|| RobotError::Initialization {
            op: "VoltMeter",
            detail: "no battery ADC configured (--adc)".to_string(),
        })?;
        Ok(BATTERY_DIVIDER * meter.voltage(BATTERY_CHANNEL))
    }

    /// Stop moving, clear the LEDs and give the server `grace` to drain
    ///
    /// Failures are logged, never returned: shutdown runs on the error path
    /// too and must not replace the error that caused it.
    pub fn shutdown(&mut self, grace: Duration) {
        info!("Shutting down");
        if let Err(e) = self.locomotion.stop() {
            warn!("Failed to stop locomotion: {}", e);
        }
        if let Err(e) = self.panel.set_leds(0) {
            warn!("Failed to clear LEDs: {}", e);
        }
        thread::sleep(grace);
    }
}
