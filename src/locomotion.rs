// Differential drive: wheel odometry, speed balancing and move/turn goals
//
// Odometry comes from the encoder counter's stream; `update()` runs as a
// periodic task, folds the newest counts into signed per-side tick totals
// and, while driving straight, nudges the motor powers toward equal wheel
// velocities.

use tracing::debug;

use crate::config::COUNTER_UPDATE_MS;
use crate::error::{Result, RobotError};
use crate::peripheral::{EdgeConfig, Mode, MotorPair, Side, TickCounter};

/// Motor power limits, percent duty cycle
pub const MIN_SPEED: f32 = 20.0;
pub const MAX_SPEED: f32 = 100.0;

/// Velocity errors beyond this (ticks/s) come from bad interval samples
pub const MAX_VELOCITY_ERR: f32 = 5.0;

/// Proportional gain of the speed balance loop
pub const KP: f32 = 0.02;

/// Encoder calibration
pub const TICKS_PER_CM: i32 = 2;
pub const TICKS_PER_RADIAN: f32 = 14.0;

/// Commanded motion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Stop,
    Forward,
    Reverse,
    SpinCw,
    SpinCcw,
}

/// Progress toward a distance or angle on one axis
///
/// The baseline is latched by the first check after the goal is (re)armed,
/// not when the motion command is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MotionGoal {
    pub baseline_ticks: i32,
    pub target_ticks: i32,
    pub side: Side,
    pub active: bool,
}

impl Default for MotionGoal {
    fn default() -> Self {
        Self {
            baseline_ticks: 0,
            target_ticks: 0,
            side: Side::Left,
            active: false,
        }
    }
}

impl MotionGoal {
    /// Check progress, arming the goal on first use
    ///
    /// Asking for a different target while a goal is active on the same axis
    /// is an error rather than a silent re-target.
    fn reached(&mut self, axis: &'static str, ticks: &[i32; 2], side: Side, target: i32) -> Result<bool> {
        if !self.active {
            *self = MotionGoal {
                baseline_ticks: ticks[side.index()],
                target_ticks: target,
                side,
                active: true,
            };
            debug!("{} goal armed: {} ticks from {}", axis, target, self.baseline_ticks);
        } else if self.target_ticks != target {
            return Err(RobotError::GoalConflict {
                axis,
                active: self.target_ticks,
                requested: target,
            });
        }

        let moved = ticks[self.side.index()].abs_diff(self.baseline_ticks);
        if moved >= self.target_ticks.unsigned_abs() {
            debug!("{} goal reached after {} ticks", axis, moved);
            self.active = false;
            return Ok(true);
        }
        Ok(false)
    }
}

pub struct LocomotionController {
    motors: MotorPair,
    counter: TickCounter,
    default_speed: f32,
    direction: Direction,
    modes: [Mode; 2],
    powers: [f32; 2],
    ticks: [i32; 2],
    linear: MotionGoal,
    angular: MotionGoal,
}

impl LocomotionController {
    /// Configure the encoder counter and bring the motors to a braked stop
    pub fn new(motors: MotorPair, mut counter: TickCounter, default_speed: f32) -> Result<Self> {
        if !(MIN_SPEED..=MAX_SPEED).contains(&default_speed) {
            return Err(RobotError::params(
                "Locomotive speed",
                format!("{} outside [{}, {}]", default_speed, MIN_SPEED, MAX_SPEED),
            ));
        }

        counter.set_update_rate(COUNTER_UPDATE_MS)?;
        counter.set_edges([
            EdgeConfig::Both,
            EdgeConfig::Both,
            EdgeConfig::Disable,
            EdgeConfig::Disable,
        ])?;

        let mut locomotion = Self {
            motors,
            counter,
            default_speed,
            direction: Direction::Stop,
            modes: [Mode::Brake; 2],
            powers: [0.0; 2],
            ticks: [0; 2],
            linear: MotionGoal::default(),
            angular: MotionGoal::default(),
        };
        locomotion.stop()?;
        Ok(locomotion)
    }

    /// Periodic odometry and speed balance step
    pub fn update(&mut self) -> Result<()> {
        let Some(sample) = self.counter.take_sample() else {
            return Ok(());
        };

        let mut ticks = self.ticks;
        for side in Side::BOTH {
            let i = side.index();
            let count = i32::try_from(sample.counts[i]).map_err(|_| {
                RobotError::response("DP_Count4", format!("count {} out of range", sample.counts[i]))
            })?;
            let delta = if self.modes[i] == Mode::Forward { count } else { -count };
            ticks[i] = ticks[i].checked_add(delta).ok_or_else(|| {
                RobotError::response(
                    "Locomotive odometry",
                    format!("{:?} ticks overflow: {} + {}", side, ticks[i], delta),
                )
            })?;
        }
        self.ticks = ticks;

        let [interval_l, interval_r] = [sample.intervals[0], sample.intervals[1]];
        if self.direction != Direction::Forward || interval_l == 0.0 || interval_r == 0.0 {
            return Ok(());
        }

        let velocity_l = sample.counts[0] as f32 / interval_l;
        let velocity_r = sample.counts[1] as f32 / interval_r;
        let err = velocity_l - velocity_r;
        if err.abs() > MAX_VELOCITY_ERR {
            debug!("Discarding velocity sample: err={:.3}", err);
            return Ok(());
        }

        let p = KP * err;
        let [power_l, power_r] = self.powers;
        let new_l = power_l - (p / 2.0) * power_l;
        let new_r = power_r + (p / 2.0) * power_r;
        debug!(
            "Velocity L={:.2} R={:.2} err={:.3} P={:.4}; power L {:.2}->{:.2} R {:.2}->{:.2}",
            velocity_l, velocity_r, err, p, power_l, new_l, power_r, new_r
        );
        self.set_power(new_l, new_r)
    }

    pub fn set_mode(&mut self, left: Mode, right: Mode) -> Result<()> {
        self.modes = [left, right];
        self.motors.set_mode(Side::Left, left)?;
        self.motors.set_mode(Side::Right, right)
    }

    /// Set both powers, clamped to the motor limits; unchanged sides are not resent
    pub fn set_power(&mut self, left: f32, right: f32) -> Result<()> {
        for (side, power) in [(Side::Left, left), (Side::Right, right)] {
            let power = power.clamp(MIN_SPEED, MAX_SPEED);
            if power != self.powers[side.index()] {
                self.powers[side.index()] = power;
                self.motors.set_power(side, power)?;
            }
        }
        Ok(())
    }

    /// Brake both wheels and restore the default power
    pub fn stop(&mut self) -> Result<()> {
        self.direction = Direction::Stop;
        self.set_mode(Mode::Brake, Mode::Brake)?;
        self.set_power(self.default_speed, self.default_speed)
    }

    pub fn move_forward(&mut self) -> Result<()> {
        self.direction = Direction::Forward;
        self.set_mode(Mode::Forward, Mode::Forward)
    }

    pub fn move_reverse(&mut self) -> Result<()> {
        self.direction = Direction::Reverse;
        self.set_mode(Mode::Reverse, Mode::Reverse)
    }

    pub fn spin_cw(&mut self) -> Result<()> {
        self.direction = Direction::SpinCw;
        self.set_mode(Mode::Forward, Mode::Reverse)
    }

    pub fn spin_ccw(&mut self) -> Result<()> {
        self.direction = Direction::SpinCcw;
        self.set_mode(Mode::Reverse, Mode::Forward)
    }

    /// Zero odometry; any goal in progress is dropped with it
    pub fn clear_ticks(&mut self) {
        self.ticks = [0; 2];
        self.linear.active = false;
        self.angular.active = false;
    }

    /// True once the wheels have covered `distance_cm` since the first call
    pub fn has_moved_distance(&mut self, distance_cm: u32) -> Result<bool> {
        let target = i32::try_from(distance_cm)
            .ok()
            .and_then(|cm| cm.checked_mul(TICKS_PER_CM))
            .ok_or_else(|| {
                RobotError::params("Locomotive distance", format!("{} cm is out of range", distance_cm))
            })?;
        self.linear.reached("linear", &self.ticks, Side::Left, target)
    }

    /// True once the robot has turned `angle_rad` since the first call
    ///
    /// Tracks the wheel driven forward by the current spin. The angle is a
    /// magnitude; the spin command sets the direction.
    pub fn has_turned_angle(&mut self, angle_rad: f32) -> Result<bool> {
        let ticks = (angle_rad * TICKS_PER_RADIAN).round();
        if !(0.0..=i32::MAX as f32).contains(&ticks) {
            return Err(RobotError::params(
                "Locomotive angle",
                format!("{} rad is out of range", angle_rad),
            ));
        }
        let target = ticks as i32;
        let side = match self.direction {
            Direction::SpinCcw => Side::Right,
            _ => Side::Left,
        };
        self.angular.reached("angular", &self.ticks, side, target)
    }

    pub fn ticks(&self, side: Side) -> i32 {
        self.ticks[side.index()]
    }

    pub fn mode(&self, side: Side) -> Mode {
        self.modes[side.index()]
    }

    pub fn power(&self, side: Side) -> f32 {
        self.powers[side.index()]
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Encoder counter, for dispatching its data stream
    pub fn counter_mut(&mut self) -> &mut TickCounter {
        &mut self.counter
    }
}
