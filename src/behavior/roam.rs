// Roam: drive around the table without falling off
//
// Drive forward until an edge or an object shows up, back off, turn away
// from it and carry on. Runs until the process is told to stop.

use serde::Serialize;
use tracing::debug;

use super::{Behavior, log_transition};
use crate::error::Result;
use crate::peripheral::Edge;
use crate::robot::Robot;
use crate::scheduler::Flow;

const LED_PATTERN: u8 = 0x01;
const BACKUP_CM: u32 = 3;
const TURN_RAD: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoamState {
    Roam,
    Backup,
    AvoidEdge,
    Turn,
}

/// What stopped the forward run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    Edge(Edge),
    Object,
}

pub struct Roam {
    state: RoamState,
    trigger: Trigger,
    turn_rad: f32,
}

impl Roam {
    pub fn new() -> Self {
        Self {
            state: RoamState::Roam,
            trigger: Trigger::Object,
            turn_rad: 0.0,
        }
    }

    pub fn state(&self) -> RoamState {
        self.state
    }

    fn transition(&mut self, to: RoamState) {
        log_transition("roam", &self.state, &to);
        self.state = to;
    }
}

impl Default for Roam {
    fn default() -> Self {
        Self::new()
    }
}

impl Behavior for Roam {
    fn name(&self) -> &'static str {
        "roam"
    }

    fn start(&mut self, robot: &mut Robot) -> Result<()> {
        robot.panel.set_leds(LED_PATTERN)?;
        robot.locomotion.move_forward()
    }

    fn step(&mut self, robot: &mut Robot) -> Result<Flow> {
        let loco = &mut robot.locomotion;
        match self.state {
            RoamState::Roam => {
                let trigger = if let Some(edge) = robot.edges.at_any_edge() {
                    debug!(
                        "Edge {:?}: left={} front={} right={}",
                        edge,
                        robot.edges.reading(Edge::Left),
                        robot.edges.reading(Edge::Front),
                        robot.edges.reading(Edge::Right)
                    );
                    Trigger::Edge(edge)
                } else if robot.range.at_object() {
                    Trigger::Object
                } else {
                    return Ok(Flow::Continue);
                };
                self.trigger = trigger;
                loco.stop()?;
                loco.move_reverse()?;
                self.transition(RoamState::Backup);
            }
            RoamState::Backup => {
                if loco.has_moved_distance(BACKUP_CM)? {
                    self.transition(RoamState::AvoidEdge);
                }
            }
            RoamState::AvoidEdge => {
                loco.stop()?;
                match self.trigger {
                    Trigger::Edge(Edge::Left) => {
                        self.turn_rad = TURN_RAD;
                        loco.spin_cw()?;
                    }
                    Trigger::Edge(Edge::Right) => {
                        self.turn_rad = TURN_RAD;
                        loco.spin_ccw()?;
                    }
                    Trigger::Edge(Edge::Front) | Trigger::Object => {
                        self.turn_rad = 2.0 * TURN_RAD;
                        loco.spin_ccw()?;
                    }
                }
                self.transition(RoamState::Turn);
            }
            RoamState::Turn => {
                if loco.has_turned_angle(self.turn_rad)? {
                    loco.stop()?;
                    loco.move_forward()?;
                    self.transition(RoamState::Roam);
                }
            }
        }
        Ok(Flow::Continue)
    }
}
