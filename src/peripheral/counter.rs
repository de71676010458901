// Quad event counter (count4), channels 0 and 1 wired to the wheel encoders

use super::channel::{CommandLink, DataStream};
use super::{StreamingPeripheral, fields, parse_field};
use crate::config::COUNTER_ID;
use crate::error::{Result, RobotError};

const COUNTS_RESOURCE: &str = "counts";

/// Edge configuration per channel
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeConfig {
    Disable = 0,
    Leading = 1,
    Trailing = 2,
    Both = 3,
}

/// Tick counts and the interval (seconds) they were counted over
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CountSample {
    pub counts: [u32; 4],
    pub intervals: [f32; 4],
}

impl CountSample {
    /// Fold a later sample into this one; on overflow nothing changes
    fn merge(&mut self, later: &CountSample) -> Result<()> {
        let mut merged = *self;
        for i in 0..4 {
            merged.counts[i] = merged.counts[i].checked_add(later.counts[i]).ok_or_else(|| {
                RobotError::response(
                    "DP_Count4",
                    format!("channel {} count overflows: {} + {}", i, self.counts[i], later.counts[i]),
                )
            })?;
            merged.intervals[i] += later.intervals[i];
        }
        *self = merged;
        Ok(())
    }
}

pub struct TickCounter {
    link: CommandLink,
    stream: DataStream,
    latest: CountSample,
    unconsumed: Option<CountSample>,
}

impl TickCounter {
    pub fn new(link: CommandLink, mut stream: DataStream) -> Result<Self> {
        stream.start_stream(COUNTER_ID, COUNTS_RESOURCE)?;
        Ok(Self {
            link,
            stream,
            latest: CountSample::default(),
            unconsumed: None,
        })
    }

    /// Reporting period; the counter only supports 10..=60 ms in 10 ms steps
    pub fn set_update_rate(&mut self, rate_ms: u32) -> Result<()> {
        if !(10..=60).contains(&rate_ms) || rate_ms % 10 != 0 {
            return Err(RobotError::params(
                "DP_Count4",
                format!("update rate {} ms not in 10..=60 step 10", rate_ms),
            ));
        }
        self.link.set(COUNTER_ID, "update_rate", &rate_ms.to_string())
    }

    pub fn set_edges(&mut self, edges: [EdgeConfig; 4]) -> Result<()> {
        let args = edges
            .iter()
            .map(|&e| (e as u8).to_string())
            .collect::<Vec<_>>()
            .join(" ");
        self.link.set(COUNTER_ID, "edges", &args)
    }

    /// Most recent sample as reported
    pub fn latest(&self) -> &CountSample {
        &self.latest
    }

    /// Take everything counted since the previous call
    ///
    /// Samples that arrived in between are merged so no ticks are lost; a
    /// sample is handed out only once.
    pub fn take_sample(&mut self) -> Option<CountSample> {
        self.unconsumed.take()
    }
}

impl StreamingPeripheral for TickCounter {
    fn name(&self) -> &'static str {
        COUNTER_ID
    }

    fn stream(&mut self) -> &mut DataStream {
        &mut self.stream
    }

    fn apply_record(&mut self, record: &str) -> Result<()> {
        let values = fields::<8>("DP_Count4", record)?;
        let mut sample = CountSample::default();
        for (i, pair) in values.chunks_exact(2).enumerate() {
            sample.counts[i] = parse_field("DP_Count4", pair[0])?;
            sample.intervals[i] = parse_field("DP_Count4", pair[1])?;
        }
        match self.unconsumed.as_mut() {
            Some(pending) => pending.merge(&sample)?,
            None => self.unconsumed = Some(sample),
        }
        self.latest = sample;
        Ok(())
    }
}
