// Peripherals hosted by the peripheral server
//
// Each peripheral is a capability handle: a clone of the shared command
// connection, an optional data connection, and the state decoded from the
// last records received on it. Cached state is written only by the
// peripheral's own record handler.

pub mod adc;
mod buttons;
pub mod channel;
mod counter;
mod edges;
mod motors;
mod range;

#[cfg(test)]
pub(crate) mod mock;

pub use adc::{AnalogSource, IioAdc, VoltMeter};
pub use buttons::{Button, ButtonPanel};
pub use channel::{CommandLink, DataStream, Record};
pub use counter::{CountSample, EdgeConfig, TickCounter};
pub use edges::{Edge, EdgeSensors};
pub use motors::{Mode, MotorPair, Side};
pub use range::RangeFinder;

use tracing::trace;

use crate::config::RECORD_LEN;
use crate::error::{Result, RobotError};

/// A peripheral that pushes records over its own data connection
pub trait StreamingPeripheral {
    /// Name used in logs and diagnostics
    fn name(&self) -> &'static str;

    fn stream(&mut self) -> &mut DataStream;

    /// Decode one data record into the cache
    fn apply_record(&mut self, record: &str) -> Result<()>;

    /// Handle readability of the data connection
    ///
    /// Frames and applies records until nothing received remains buffered,
    /// so records that arrived together are not left waiting for the next
    /// readiness event.
    fn on_readable(&mut self) -> Result<()> {
        loop {
            match self.stream().read_record(RECORD_LEN)? {
                Record::Data(line) => self.apply_record(&line)?,
                Record::Ack(text) => trace!("{} ack: {}", self.name(), text),
            }
            if !self.stream().has_buffered() {
                return Ok(());
            }
        }
    }
}

/// Split a record into exactly `N` whitespace-separated fields
pub(crate) fn fields<'a, const N: usize>(op: &'static str, record: &'a str) -> Result<[&'a str; N]> {
    let mut out = [""; N];
    let mut parts = record.split_whitespace();
    for slot in out.iter_mut() {
        *slot = parts.next().ok_or_else(|| {
            RobotError::response(op, format!("expected {} fields in '{}'", N, record))
        })?;
    }
    if parts.next().is_some() {
        return Err(RobotError::response(
            op,
            format!("expected {} fields in '{}'", N, record),
        ));
    }
    Ok(out)
}

/// Parse one numeric field, mapping failure to a response error
pub(crate) fn parse_field<T: std::str::FromStr>(op: &'static str, field: &str) -> Result<T> {
    field
        .parse()
        .map_err(|_| RobotError::response(op, format!("bad field '{}'", field)))
}
