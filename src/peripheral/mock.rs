// In-memory stand-ins for peripheral server connections (tests only)

use std::cell::{Cell, RefCell};
use std::io::{self, Cursor, Write};
use std::rc::Rc;

use super::channel::{CommandLink, DataStream};
use super::{AnalogSource, ButtonPanel, EdgeSensors, MotorPair, RangeFinder, TickCounter};
use crate::config::{
    BATTERY_CHANNEL, DEFAULT_EDGE_LIMIT, DEFAULT_INNER_LIMIT, DEFAULT_OUTER_LIMIT, DEFAULT_SPEED,
};
use crate::error::Result;
use crate::locomotion::LocomotionController;
use crate::robot::Robot;

/// Write sink whose contents stay inspectable after it is boxed
#[derive(Clone, Default)]
pub struct SharedSink(Rc<RefCell<Vec<u8>>>);

impl SharedSink {
    /// Everything written so far, split into lines
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.borrow())
            .lines()
            .map(str::to_string)
            .collect()
    }

    pub fn clear(&self) {
        self.0.borrow_mut().clear();
    }
}

impl Write for SharedSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn command_link() -> (CommandLink, SharedSink) {
    let sink = SharedSink::default();
    (CommandLink::new(Box::new(sink.clone())), sink)
}

/// Data stream that yields `input` and records what is written to it
pub fn data_stream(input: &[u8]) -> (DataStream, SharedSink) {
    let sink = SharedSink::default();
    let stream = DataStream::new(
        Box::new(Cursor::new(input.to_vec())),
        Box::new(sink.clone()),
        None,
    );
    (stream, sink)
}

/// Robot on in-memory connections, all commands recorded in one sink
///
/// Default limits: edge 1000, inner 40, outer 1000, speed 35. Each data
/// stream carries a distinct placeholder descriptor so it can be watched by
/// a scheduler on a virtual clock; nothing ever polls them.
pub fn robot() -> (Robot, SharedSink) {
    let sink = SharedSink::default();
    let link = || CommandLink::new(Box::new(sink.clone()));
    let next_fd = Cell::new(1000);
    let stream = || {
        let fd = next_fd.get();
        next_fd.set(fd + 1);
        DataStream::new(Box::new(io::empty()), Box::new(io::sink()), Some(fd))
    };

    let panel = ButtonPanel::new(link(), stream()).unwrap();
    let edges = EdgeSensors::new(link(), stream(), DEFAULT_EDGE_LIMIT).unwrap();
    let range = RangeFinder::new(link(), stream(), DEFAULT_INNER_LIMIT, DEFAULT_OUTER_LIMIT).unwrap();
    let counter = TickCounter::new(link(), stream()).unwrap();
    let locomotion = LocomotionController::new(MotorPair::new(link()), counter, DEFAULT_SPEED).unwrap();

    let robot = Robot::new(panel, edges, range, locomotion, None);
    sink.clear();
    (robot, sink)
}

/// Volt meter source with a fixed battery code on its channel, zero elsewhere
pub struct Battery(pub u32);

impl AnalogSource for Battery {
    fn read_codes(&mut self) -> Result<[u32; 8]> {
        let mut codes = [0; 8];
        codes[BATTERY_CHANNEL] = self.0;
        Ok(codes)
    }
}

/// Edge ADC record with the given left, front and right readings
pub fn edge_record(left: u32, front: u32, right: u32) -> String {
    format!("{:x} {:x} {:x} 0 0 0 0 0", left, front, right)
}

/// Range record with sensor 0 at `distance`
pub fn range_record(distance: u32) -> String {
    format!("{} 0 0 0", distance)
}

/// Counter record with the same count on both wheels over 50 ms
pub fn count_record(ticks: u32) -> String {
    format!("{0} 0.05 {0} 0.05 0 0 0 0", ticks)
}
