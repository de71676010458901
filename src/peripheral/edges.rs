// Edge detector: three downward-facing IR distance sensors on the octal ADC (adc812)
//
// A sensor looking over a drop-off sees nothing close, so its output voltage
// falls below the limit.

use serde::Serialize;

use super::channel::{CommandLink, DataStream};
use super::{StreamingPeripheral, fields};
use crate::config::{EDGE_ADC_ID, EDGE_SAMPLE_MS};
use crate::error::{Result, RobotError};

const SAMPLES_RESOURCE: &str = "samples";

/// Accepted range for the edge limit, in mV
pub const MIN_EDGE_LIMIT: u32 = 0;
pub const MAX_EDGE_LIMIT: u32 = 5000;

/// No differential pairs, all eight inputs single-ended
const NO_PAIRS: u8 = 0;

/// Edge sensors in detection priority order, numbered by ADC channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Edge {
    Left = 0,
    Front = 1,
    Right = 2,
}

impl Edge {
    pub const ALL: [Edge; 3] = [Edge::Left, Edge::Front, Edge::Right];
}

pub struct EdgeSensors {
    _link: CommandLink,
    stream: DataStream,
    samples: [u32; 8],
    received: bool,
    limits: [u32; 3],
}

impl EdgeSensors {
    pub fn new(mut link: CommandLink, mut stream: DataStream, edge_limit: u32) -> Result<Self> {
        if !(MIN_EDGE_LIMIT..=MAX_EDGE_LIMIT).contains(&edge_limit) {
            return Err(RobotError::params(
                "EdgeDetector",
                format!(
                    "edge limit {} outside [{}, {}]",
                    edge_limit, MIN_EDGE_LIMIT, MAX_EDGE_LIMIT
                ),
            ));
        }
        link.set(
            EDGE_ADC_ID,
            "enable",
            &format!("{}, 0x{:02x}", EDGE_SAMPLE_MS, NO_PAIRS),
        )?;
        stream.start_stream(EDGE_ADC_ID, SAMPLES_RESOURCE)?;

        Ok(Self {
            _link: link,
            stream,
            samples: [0; 8],
            received: false,
            limits: [edge_limit; 3],
        })
    }

    /// Last reading of an edge sensor, in mV
    pub fn reading(&self, edge: Edge) -> u32 {
        self.samples[edge as usize]
    }

    /// Reading below the limit; no edge is reported before the first sample
    pub fn at_edge(&self, edge: Edge) -> bool {
        self.received && self.reading(edge) < self.limits[edge as usize]
    }

    /// First tripped sensor in priority order left, front, right
    pub fn at_any_edge(&self) -> Option<Edge> {
        Edge::ALL.into_iter().find(|&edge| self.at_edge(edge))
    }
}

impl StreamingPeripheral for EdgeSensors {
    fn name(&self) -> &'static str {
        EDGE_ADC_ID
    }

    fn stream(&mut self) -> &mut DataStream {
        &mut self.stream
    }

    fn apply_record(&mut self, record: &str) -> Result<()> {
        let values = fields::<8>("DP_Adc812", record)?;
        let mut samples = [0u32; 8];
        for (slot, value) in samples.iter_mut().zip(values) {
            let digits = value.trim_start_matches("0x").trim_start_matches("0X");
            *slot = u32::from_str_radix(digits, 16).map_err(|_| {
                RobotError::response("DP_Adc812", format!("bad sample '{}'", value))
            })?;
        }
        self.samples = samples;
        self.received = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripheral::mock::{command_link, data_stream};

    fn sensors() -> EdgeSensors {
        let (link, _) = command_link();
        let (stream, _) = data_stream(b"");
        EdgeSensors::new(link, stream, 1000).unwrap()
    }

    #[test]
    fn test_configuration_commands() {
        let (link, sent) = command_link();
        let (stream, stream_sent) = data_stream(b"");
        EdgeSensors::new(link, stream, 1000).unwrap();
        assert_eq!(sent.lines(), vec!["dpset adc812 enable 50, 0x00"]);
        assert_eq!(stream_sent.lines(), vec!["dpcat adc812 samples"]);
    }

    #[test]
    fn test_edge_limit_out_of_range() {
        let (link, _) = command_link();
        let (stream, _) = data_stream(b"");
        assert!(EdgeSensors::new(link, stream, 5001).is_err());
    }

    #[test]
    fn test_hex_samples() {
        let mut edges = sensors();
        edges.apply_record("7d0 3e8 3e7 0 0 0 0 fff").unwrap();
        assert_eq!(edges.reading(Edge::Left), 2000);
        assert_eq!(edges.reading(Edge::Front), 1000);
        assert_eq!(edges.reading(Edge::Right), 999);
        assert!(!edges.at_edge(Edge::Left));
        assert!(!edges.at_edge(Edge::Front));
        assert!(edges.at_edge(Edge::Right));
    }

    #[test]
    fn test_priority_left_front_right() {
        let mut edges = sensors();
        assert_eq!(edges.at_any_edge(), None);
        edges.apply_record("7d0 7d0 7d0 0 0 0 0 0").unwrap();
        assert_eq!(edges.at_any_edge(), None);
        edges.apply_record("7d0 10 10 0 0 0 0 0").unwrap();
        assert_eq!(edges.at_any_edge(), Some(Edge::Front));
        edges.apply_record("10 10 10 0 0 0 0 0").unwrap();
        assert_eq!(edges.at_any_edge(), Some(Edge::Left));
    }

    #[test]
    fn test_short_record_is_response_error() {
        let mut edges = sensors();
        assert_eq!(edges.apply_record("1 2 3").unwrap_err().code(), -1007);
        assert!(edges.apply_record("1 2 3 4 5 6 7 zz").is_err());
    }
}
