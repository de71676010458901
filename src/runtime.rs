// Process wiring: connect the robot, register streams and periodic tasks, run
//
// Streams: buttons, edge ADC, range finder, wheel counter.
// Periodic: volt meter poll, odometry, input check, voltage watchdog, then
// either the test-mode tasks or the selected behavior.

use std::io::{self, Write};

use serde::Serialize;
use tracing::{info, warn};

use crate::behavior;
use crate::config::{
    BATTERY_CUTOFF_VOLTS, CONTROLLER_PERIOD, ControllerMode, DISPLAY_PERIOD, INPUT_PERIOD,
    LED_ANIMATION_PERIOD, ODOMETRY_PERIOD, Options, PrintTarget, SHUTDOWN_GRACE,
    VOLT_METER_PERIOD, VOLTAGE_WATCHDOG_PERIOD,
};
use crate::error::{Result, RobotError};
use crate::messages::{BatteryReport, SensorReport};
use crate::peripheral::{Button, StreamingPeripheral};
use crate::robot::Robot;
use crate::scheduler::{Flow, Scheduler, Waiter};

/// LED pattern alternated with its complement in test mode
const TEST_LED_PATTERN: u8 = 0x55;

/// Run until a task asks to exit or anything fails
///
/// The shutdown sequence runs exactly once on either path; the returned
/// message (or error) is for `main` to report.
pub fn run(options: &Options) -> Result<&'static str> {
    let mode = options.controller_mode()?;

    info!("Connecting to peripheral server at {}...", options.server);
    let mut robot = Robot::connect(options)?;

    let mut scheduler = Scheduler::new();
    let result = wire(&mut scheduler, &mut robot, options, mode)
        .and_then(|()| scheduler.run_forever(&mut robot));

    robot.shutdown(SHUTDOWN_GRACE);
    result
}

/// Register every stream and periodic task for the selected mode
pub fn wire<W: Waiter>(
    scheduler: &mut Scheduler<Robot, W>,
    robot: &mut Robot,
    options: &Options,
    mode: ControllerMode,
) -> Result<()> {
    watch(scheduler, robot, |r| &mut r.panel)?;
    watch(scheduler, robot, |r| &mut r.edges)?;
    watch(scheduler, robot, |r| &mut r.range)?;
    watch(scheduler, robot, |r| r.locomotion.counter_mut())?;

    if robot.volt_meter.is_some() {
        scheduler.register_periodic("volt_meter", VOLT_METER_PERIOD, |robot: &mut Robot| {
            if let Some(meter) = robot.volt_meter.as_mut() {
                meter.poll()?;
            }
            Ok(Flow::Continue)
        })?;
    }

    scheduler.register_periodic("odometry", ODOMETRY_PERIOD, |robot: &mut Robot| {
        robot.locomotion.update()?;
        Ok(Flow::Continue)
    })?;

    scheduler.register_periodic("check_input", INPUT_PERIOD, |robot: &mut Robot| {
        if robot.panel.is_pressed(Button::S3) {
            return Ok(Flow::Exit("button S3 pressed"));
        }
        Ok(Flow::Continue)
    })?;

    if robot.volt_meter.is_some() {
        scheduler.register_periodic("voltage_watchdog", VOLTAGE_WATCHDOG_PERIOD, |robot: &mut Robot| {
            let volts = robot.battery_voltage()?;
            if volts < BATTERY_CUTOFF_VOLTS {
                return Err(RobotError::LowVoltage { volts });
            }
            Ok(Flow::Continue)
        })?;
    }

    if options.is_test_mode() {
        wire_test_mode(scheduler, robot, options)
    } else {
        let mut behavior = behavior::for_mode(mode);
        info!("Starting {} behavior", behavior.name());
        behavior.start(robot)?;
        scheduler.register_periodic("controller", CONTROLLER_PERIOD, move |robot: &mut Robot| {
            behavior.step(robot)
        })
    }
}

/// Watch a streaming peripheral's data connection
fn watch<P, W>(
    scheduler: &mut Scheduler<Robot, W>,
    robot: &mut Robot,
    access: fn(&mut Robot) -> &mut P,
) -> Result<()>
where
    P: StreamingPeripheral + 'static,
    W: Waiter,
{
    let peripheral = access(robot);
    let name = peripheral.name();
    let fd = peripheral
        .stream()
        .raw_fd()
        .ok_or_else(|| RobotError::Registration {
            op: name,
            detail: "data stream has no descriptor".to_string(),
        })?;
    scheduler.register_stream(name, fd, move |robot: &mut Robot| {
        access(robot).on_readable()?;
        Ok(Flow::Continue)
    })
}

fn wire_test_mode<W: Waiter>(
    scheduler: &mut Scheduler<Robot, W>,
    robot: &mut Robot,
    options: &Options,
) -> Result<()> {
    let mut pattern = TEST_LED_PATTERN;
    scheduler.register_periodic("test_mode_leds", LED_ANIMATION_PERIOD, move |robot: &mut Robot| {
        robot.panel.set_leds(pattern)?;
        pattern = !pattern;
        Ok(Flow::Continue)
    })?;

    match (options.print, options.distance, options.angle) {
        (Some(PrintTarget::Voltage), _, _) => {
            if robot.volt_meter.is_none() {
                return Err(RobotError::Initialization {
                    op: "VoltMeter",
                    detail: "printing the battery voltage needs --adc".to_string(),
                });
            }
            scheduler.register_periodic("print_voltage", DISPLAY_PERIOD, |robot: &mut Robot| {
                let volts = robot.battery_voltage()?;
                if volts == 0.0 {
                    warn!("Battery voltage reads 0, is it connected?");
                    return Err(RobotError::LowVoltage { volts });
                }
                print_json(&BatteryReport { volts })?;
                Ok(Flow::Exit("battery voltage printed"))
            })
        }
        (Some(PrintTarget::Sensors), _, _) => {
            scheduler.register_periodic("print_sensors", DISPLAY_PERIOD, |robot: &mut Robot| {
                print_json(&SensorReport::from(&*robot))?;
                Ok(Flow::Continue)
            })
        }
        (None, Some(distance), _) => {
            info!("Moving {} cm...", distance);
            robot.locomotion.move_forward()?;
            scheduler.register_periodic("move_distance", DISPLAY_PERIOD, move |robot: &mut Robot| {
                if robot.locomotion.has_moved_distance(distance)? {
                    return Ok(Flow::Exit("distance reached"));
                }
                Ok(Flow::Continue)
            })
        }
        (None, None, Some(angle)) => {
            info!("Spinning {} radians...", angle);
            robot.locomotion.spin_cw()?;
            scheduler.register_periodic("spin_angle", DISPLAY_PERIOD, move |robot: &mut Robot| {
                if robot.locomotion.has_turned_angle(angle)? {
                    return Ok(Flow::Exit("angle reached"));
                }
                Ok(Flow::Continue)
            })
        }
        (None, None, None) => Ok(()),
    }
}

/// One JSON object per line on stdout
fn print_json<T: Serialize>(report: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer(&mut out, report)
        .map_err(io::Error::from)
        .and_then(|()| writeln!(out))
        .map_err(|e| RobotError::Write {
            op: "stdout",
            detail: e.to_string(),
        })
}
