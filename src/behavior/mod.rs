// Table-top behaviors
//
// A behavior is a state machine stepped by one periodic task. Each step
// reads the sensor caches, makes at most one transition and issues at most
// one locomotion command sequence.

mod goto_object;
mod roam;

pub use goto_object::{GotoObject, GotoState};
pub use roam::{Roam, RoamState, Trigger};

use serde::Serialize;
use tracing::debug;

use crate::config::ControllerMode;
use crate::error::Result;
use crate::robot::Robot;
use crate::scheduler::Flow;

pub trait Behavior {
    fn name(&self) -> &'static str;

    /// Indicate the behavior on the LEDs and issue the first motion
    fn start(&mut self, robot: &mut Robot) -> Result<()>;

    /// One decision step; `Flow::Exit` ends the process
    fn step(&mut self, robot: &mut Robot) -> Result<Flow>;
}

pub fn for_mode(mode: ControllerMode) -> Box<dyn Behavior> {
    match mode {
        ControllerMode::Roam => Box::new(Roam::new()),
        ControllerMode::GotoObject => Box::new(GotoObject::new()),
    }
}

/// Log a state change using the states' serialized names
pub(crate) fn log_transition<S: Serialize>(behavior: &str, from: &S, to: &S) {
    let name = |state: &S| {
        serde_json::to_value(state)
            .ok()
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    };
    debug!("{}: {} -> {}", behavior, name(from), name(to));
}
