// Periods, peripheral ids, defaults and command-line options
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;

use crate::error::RobotError;

// Peripheral server (one TCP connection for commands, one per streaming peripheral)
pub const SERVER_ADDR: &str = "127.0.0.1:8880";

// Peripheral ids as listed by the server
pub const BUTTONS_ID: &str = "bb4io";
pub const MOTORS_ID: &str = "dc2";
pub const COUNTER_ID: &str = "count4";
pub const EDGE_ADC_ID: &str = "adc812";
pub const RANGE_ID: &str = "ping4";

// Longest record accepted on a data stream, terminator included
pub const RECORD_LEN: usize = 80;

// Periodic task rates
pub const CONTROLLER_PERIOD: Duration = Duration::from_millis(50);
pub const ODOMETRY_PERIOD: Duration = Duration::from_millis(50);
pub const INPUT_PERIOD: Duration = Duration::from_millis(100);
pub const DISPLAY_PERIOD: Duration = Duration::from_millis(100);
pub const LED_ANIMATION_PERIOD: Duration = Duration::from_millis(300);
pub const VOLT_METER_PERIOD: Duration = Duration::from_millis(50);
pub const VOLTAGE_WATCHDOG_PERIOD: Duration = Duration::from_secs(10);

// Counter update rate and edge ADC sample period, in ms
pub const COUNTER_UPDATE_MS: u32 = 50;
pub const EDGE_SAMPLE_MS: u32 = 50;

// Battery sits behind a 1:4 divider on ADC channel 7
pub const BATTERY_CHANNEL: usize = 7;
pub const BATTERY_DIVIDER: f32 = 4.0;
pub const BATTERY_CUTOFF_VOLTS: f32 = 10.0;

// Time given to the peripheral server to drain commands before closing
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

// Command line defaults
pub const DEFAULT_SPEED: f32 = 35.0;
pub const DEFAULT_EDGE_LIMIT: u32 = 1000;
pub const DEFAULT_INNER_LIMIT: u32 = 40;
pub const DEFAULT_OUTER_LIMIT: u32 = 1000;

/// Behavior selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerMode {
    Roam,
    GotoObject,
}

impl FromStr for ControllerMode {
    type Err = RobotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "r" | "roam" => Ok(ControllerMode::Roam),
            "o" | "goto-object" => Ok(ControllerMode::GotoObject),
            other => Err(RobotError::ControllerMode(other.to_string())),
        }
    }
}

/// What to print in the print test mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PrintTarget {
    /// Battery voltage, once
    #[value(name = "v")]
    Voltage,
    /// Range and edge sensor readings, continuously
    #[value(name = "s")]
    Sensors,
}

/// Command-line options
#[derive(Debug, Clone, Parser)]
#[command(name = "tabletop-runtime", about = "Table-top robot controller")]
pub struct Options {
    /// Controller mode: 'r' = roam, 'o' = goto-object
    #[arg(short = 'm', long = "mode", default_value = "r")]
    pub mode: String,

    /// Edge sensor reading (mV) below which an edge is detected
    #[arg(short = 'e', long = "edge-limit", default_value_t = DEFAULT_EDGE_LIMIT)]
    pub edge_limit: u32,

    /// Range within which to look for an object
    #[arg(short = 'o', long = "outer-limit", default_value_t = DEFAULT_OUTER_LIMIT)]
    pub outer_limit: u32,

    /// How close to get to the object
    #[arg(short = 'i', long = "inner-limit", default_value_t = DEFAULT_INNER_LIMIT)]
    pub inner_limit: u32,

    /// Default motor power
    #[arg(short = 's', long = "speed", default_value_t = DEFAULT_SPEED)]
    pub speed: f32,

    /// Print sensor values and exit: 'v' = battery voltage, 's' = range and edge sensors
    #[arg(short = 'p', long = "print", value_enum)]
    pub print: Option<PrintTarget>,

    /// Move forward this many centimeters and exit
    #[arg(short = 'd', long = "distance")]
    pub distance: Option<u32>,

    /// Spin clockwise this many radians and exit
    #[arg(short = 'a', long = "angle")]
    pub angle: Option<f32>,

    /// Log state transitions and control-loop values
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Peripheral server address
    #[arg(long = "server", default_value = SERVER_ADDR)]
    pub server: String,

    /// IIO sysfs directory of the battery ADC
    #[arg(long = "adc")]
    pub adc: Option<PathBuf>,
}

impl Options {
    pub fn controller_mode(&self) -> Result<ControllerMode, RobotError> {
        self.mode.parse()
    }

    /// Any of the single-purpose test modes selected
    pub fn is_test_mode(&self) -> bool {
        self.print.is_some() || self.distance.is_some() || self.angle.is_some()
    }
}
