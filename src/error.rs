// Error taxonomy for the runtime
//
// Every failure is fatal: errors propagate with `?` up to `runtime::run`,
// which performs the shutdown sequence once and hands the error to `main`
// for the diagnostic and the exit code.

use std::io;

/// Error types for the robot runtime
#[derive(Debug, thiserror::Error)]
pub enum RobotError {
    #[error("{op}: initialization error ({detail})")]
    Initialization { op: &'static str, detail: String },

    #[error("{op}: connect error ({source})")]
    Connect {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("{op}: read error ({detail})")]
    Read { op: &'static str, detail: String },

    #[error("{op}: write error ({detail})")]
    Write { op: &'static str, detail: String },

    #[error("{op}: wait error ({source})")]
    Wait {
        op: &'static str,
        #[source]
        source: nix::Error,
    },

    #[error("{op}: invalid parameters ({detail})")]
    Params { op: &'static str, detail: String },

    #[error("{op}: response error ({detail})")]
    Response { op: &'static str, detail: String },

    #[error("{op}: callback registration error ({detail})")]
    Registration { op: &'static str, detail: String },

    #[error("battery: !!LOW BATTERY VOLTAGE!! ({volts:.1} V)")]
    LowVoltage { volts: f32 },

    #[error("mode: invalid mode '{0}'")]
    ControllerMode(String),

    #[error("{axis}: overlapping motion goal (active target {active} ticks, requested {requested})")]
    GoalConflict {
        axis: &'static str,
        active: i32,
        requested: i32,
    },
}

pub type Result<T> = std::result::Result<T, RobotError>;

impl RobotError {
    /// Process exit code for this error
    pub fn code(&self) -> i32 {
        match self {
            RobotError::Initialization { .. } => -1001,
            RobotError::Connect { .. } => -1002,
            RobotError::Read { .. } => -1003,
            RobotError::Write { .. } => -1004,
            RobotError::Wait { .. } => -1005,
            RobotError::Params { .. } => -1006,
            RobotError::Response { .. } => -1007,
            RobotError::Registration { .. } => -1008,
            RobotError::ControllerMode(_) => -2001,
            RobotError::LowVoltage { .. } => -2002,
            RobotError::GoalConflict { .. } => -2003,
        }
    }

    /// Human-readable category used in the exit diagnostic
    pub fn category(&self) -> &'static str {
        match self {
            RobotError::Initialization { .. } => "initialization error",
            RobotError::Connect { .. } => "connect error",
            RobotError::Read { .. } => "read error",
            RobotError::Write { .. } => "write error",
            RobotError::Wait { .. } => "wait error",
            RobotError::Params { .. } => "invalid parameters",
            RobotError::Response { .. } => "response error",
            RobotError::Registration { .. } => "callback registration error",
            RobotError::ControllerMode(_) => "invalid mode",
            RobotError::LowVoltage { .. } => "!!LOW BATTERY VOLTAGE!!",
            RobotError::GoalConflict { .. } => "overlapping motion goal",
        }
    }

    pub(crate) fn params(op: &'static str, detail: impl Into<String>) -> Self {
        RobotError::Params {
            op,
            detail: detail.into(),
        }
    }

    pub(crate) fn response(op: &'static str, detail: impl Into<String>) -> Self {
        RobotError::Response {
            op,
            detail: detail.into(),
        }
    }
}
