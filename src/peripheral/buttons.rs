// Baseboard buttons and LEDs (bb4io)

use super::channel::{CommandLink, DataStream};
use super::{StreamingPeripheral, fields, parse_field};
use crate::config::BUTTONS_ID;
use crate::error::Result;

const BUTTONS_RESOURCE: &str = "buttons";

/// Button bits as reported in the button mask
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    S1 = 1,
    S2 = 2,
    S3 = 4,
}

pub struct ButtonPanel {
    link: CommandLink,
    stream: DataStream,
    buttons: u32,
}

impl ButtonPanel {
    pub fn new(link: CommandLink, mut stream: DataStream) -> Result<Self> {
        stream.start_stream(BUTTONS_ID, BUTTONS_RESOURCE)?;
        Ok(Self {
            link,
            stream,
            buttons: 0,
        })
    }

    /// Light the LEDs in `pattern`
    pub fn set_leds(&mut self, pattern: u8) -> Result<()> {
        self.link.set(BUTTONS_ID, "leds", &format!("{:x}", pattern))
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons & button as u32 != 0
    }

    pub fn mask(&self) -> u32 {
        self.buttons
    }
}

impl StreamingPeripheral for ButtonPanel {
    fn name(&self) -> &'static str {
        BUTTONS_ID
    }

    fn stream(&mut self) -> &mut DataStream {
        &mut self.stream
    }

    fn apply_record(&mut self, record: &str) -> Result<()> {
        let [mask] = fields::<1>("DP_BB4IO", record)?;
        self.buttons = parse_field("DP_BB4IO", mask)?;
        Ok(())
    }
}
