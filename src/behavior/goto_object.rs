// GotoObject: find the nearest object on the table and push it off
//
// 1. Spin one revolution clockwise, noting the closest object in range.
// 2. Keep spinning until that object shows up again; note the tick count.
// 3. Keep spinning until it is lost; aim at the midpoint of the two counts.
// 4. Spin back to the midpoint, then drive at the object.
// 5. Push until the front edge sensor looks over the table edge, then back
//    off a few centimeters so the robot doesn't follow it.
//
// Any other edge ends the run.

use std::f32::consts::TAU;

use serde::Serialize;
use tracing::{debug, warn};

use super::{Behavior, log_transition};
use crate::error::Result;
use crate::peripheral::{Edge, Side};
use crate::robot::Robot;
use crate::scheduler::Flow;

const LED_PATTERN: u8 = 0x02;

/// Added to the closest sweep distance to form the detection threshold
const RANGE_MARGIN: u32 = 10;

/// Ticks subtracted from the computed object center to correct overshoot
const TRIM: i32 = 1;

/// Backup after the object goes over the edge
const PREVENT_FALLING_CM: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GotoState {
    EstablishRange,
    FindObject,
    MeasureObject,
    AdjustPosition,
    GotoObject,
    PushObject,
    AvoidEdge,
    PreventFalling,
    Complete,
}

pub struct GotoObject {
    state: GotoState,
    /// Closest object seen during the sweep
    min_distance: Option<u32>,
    threshold: u32,
    /// Left wheel ticks at the object's leading side, then at its center
    target: i32,
}

impl GotoObject {
    pub fn new() -> Self {
        Self {
            state: GotoState::EstablishRange,
            min_distance: None,
            threshold: 0,
            target: 0,
        }
    }

    pub fn state(&self) -> GotoState {
        self.state
    }

    /// Detection threshold fixed by the initial sweep
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn target(&self) -> i32 {
        self.target
    }

    fn transition(&mut self, to: GotoState) {
        log_transition("goto_object", &self.state, &to);
        self.state = to;
    }
}

impl Default for GotoObject {
    fn default() -> Self {
        Self::new()
    }
}

impl Behavior for GotoObject {
    fn name(&self) -> &'static str {
        "goto_object"
    }

    fn start(&mut self, robot: &mut Robot) -> Result<()> {
        robot.panel.set_leds(LED_PATTERN)?;
        robot.locomotion.spin_cw()
    }

    fn step(&mut self, robot: &mut Robot) -> Result<Flow> {
        let loco = &mut robot.locomotion;
        let range = &robot.range;
        match self.state {
            GotoState::EstablishRange => {
                if !loco.has_turned_angle(TAU)? {
                    if let Some(distance) = range.detect_object(None) {
                        self.min_distance = Some(self.min_distance.map_or(distance, |d| d.min(distance)));
                    }
                    return Ok(Flow::Continue);
                }
                self.threshold = match self.min_distance {
                    Some(distance) => {
                        debug!("Closest object at {}", distance);
                        distance + RANGE_MARGIN
                    }
                    None => {
                        warn!("No object within {} during sweep", range.outer_limit());
                        range.outer_limit()
                    }
                };
                loco.stop()?;
                loco.clear_ticks();
                loco.spin_cw()?;
                self.transition(GotoState::FindObject);
            }
            GotoState::FindObject => {
                if let Some(distance) = range.detect_object(Some(self.threshold)) {
                    self.target = loco.ticks(Side::Left);
                    debug!("Object found at {}, ticks={}", distance, self.target);
                    self.transition(GotoState::MeasureObject);
                }
            }
            GotoState::MeasureObject => {
                if range.detect_object(Some(self.threshold)).is_none() {
                    loco.stop()?;
                    let ticks = loco.ticks(Side::Left);
                    let delta = (ticks - self.target) / 2;
                    self.target += delta - TRIM;
                    debug!("Object lost at ticks={}, center target={}", ticks, self.target);
                    loco.spin_ccw()?;
                    self.transition(GotoState::AdjustPosition);
                }
            }
            GotoState::AdjustPosition => {
                if loco.ticks(Side::Left) <= self.target {
                    loco.stop()?;
                    loco.move_forward()?;
                    self.transition(GotoState::GotoObject);
                }
            }
            GotoState::GotoObject => {
                if range.at_object() {
                    debug!("Object reached at {}", range.distance());
                    self.transition(GotoState::PushObject);
                } else if range.detect_object(Some(self.threshold)).is_none() {
                    loco.spin_cw()?;
                    self.transition(GotoState::FindObject);
                } else if robot.edges.at_any_edge().is_some() {
                    loco.stop()?;
                    self.transition(GotoState::AvoidEdge);
                }
            }
            GotoState::PushObject => match robot.edges.at_any_edge() {
                Some(Edge::Front) => {
                    loco.stop()?;
                    loco.move_reverse()?;
                    self.transition(GotoState::PreventFalling);
                }
                Some(_) => self.transition(GotoState::AvoidEdge),
                None => {}
            },
            GotoState::PreventFalling => {
                if loco.has_moved_distance(PREVENT_FALLING_CM)? {
                    loco.stop()?;
                    self.transition(GotoState::Complete);
                }
            }
            GotoState::AvoidEdge => {
                loco.stop()?;
                return Ok(Flow::Exit("edge detected"));
            }
            GotoState::Complete => return Ok(Flow::Exit("objective achieved")),
        }
        Ok(Flow::Continue)
    }
}
