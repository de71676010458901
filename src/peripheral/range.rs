// Ultrasonic range finder (ping4), only sensor 0 is fitted

use super::channel::{CommandLink, DataStream};
use super::{StreamingPeripheral, fields, parse_field};
use crate::config::RANGE_ID;
use crate::error::{Result, RobotError};

const DISTANCE_RESOURCE: &str = "distance";

/// Accepted range for the configured limits
pub const MIN_RANGE: u32 = 0;
pub const MAX_RANGE: u32 = 5000;

/// Enable pattern bit for sensor 0
const SENSOR_0: u32 = 1;

pub struct RangeFinder {
    _link: CommandLink,
    stream: DataStream,
    distances: [u32; 4],
    received: bool,
    inner_limit: u32,
    outer_limit: u32,
}

impl RangeFinder {
    /// Create the range finder
    ///
    /// `inner_limit` is the "at object" distance; `outer_limit` bounds object
    /// detection when no explicit limit is given.
    pub fn new(
        mut link: CommandLink,
        mut stream: DataStream,
        inner_limit: u32,
        outer_limit: u32,
    ) -> Result<Self> {
        for limit in [inner_limit, outer_limit] {
            if !(MIN_RANGE..=MAX_RANGE).contains(&limit) {
                return Err(RobotError::params(
                    "SinglePingRangeSensor",
                    format!("limit {} outside [{}, {}]", limit, MIN_RANGE, MAX_RANGE),
                ));
            }
        }
        link.set(RANGE_ID, "enable", &SENSOR_0.to_string())?;
        stream.start_stream(RANGE_ID, DISTANCE_RESOURCE)?;

        Ok(Self {
            _link: link,
            stream,
            distances: [0; 4],
            received: false,
            inner_limit,
            outer_limit,
        })
    }

    /// Last distance reported by sensor 0
    pub fn distance(&self) -> u32 {
        self.distances[0]
    }

    /// Close enough to the object to stop; false until the first reading
    pub fn at_object(&self) -> bool {
        self.received && self.distance() < self.inner_limit
    }

    /// Distance to an object closer than `limit`, or the outer limit if `None`
    pub fn detect_object(&self, limit: Option<u32>) -> Option<u32> {
        let limit = limit.unwrap_or(self.outer_limit);
        let distance = self.distance();
        (self.received && distance < limit).then_some(distance)
    }

    pub fn outer_limit(&self) -> u32 {
        self.outer_limit
    }
}

impl StreamingPeripheral for RangeFinder {
    fn name(&self) -> &'static str {
        RANGE_ID
    }

    fn stream(&mut self) -> &mut DataStream {
        &mut self.stream
    }

    fn apply_record(&mut self, record: &str) -> Result<()> {
        let values = fields::<4>("DP_Ping4", record)?;
        let mut distances = [0u32; 4];
        for (slot, value) in distances.iter_mut().zip(values) {
            *slot = parse_field("DP_Ping4", value)?;
        }
        self.distances = distances;
        self.received = true;
        Ok(())
    }
}
