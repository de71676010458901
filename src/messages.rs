// Reports printed by the test modes, one JSON object per line

use serde::{Deserialize, Serialize};

use crate::peripheral::Edge;
use crate::robot::Robot;

// Range and edge sensor snapshot -> stdout (print-sensors mode)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SensorReport {
    pub range: u32,
    pub left: u32,
    pub front: u32,
    pub right: u32,
}

impl From<&Robot> for SensorReport {
    fn from(robot: &Robot) -> Self {
        Self {
            range: robot.range.distance(),
            left: robot.edges.reading(Edge::Left),
            front: robot.edges.reading(Edge::Front),
            right: robot.edges.reading(Edge::Right),
        }
    }
}

/// Battery voltage, printed once
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BatteryReport {
    pub volts: f32,
}
