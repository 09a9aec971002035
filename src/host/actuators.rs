//! Buzzer and indicator rendered as log lines

use crate::services::feedback::{Buzzer, Indicator, Rgb};
use log::info;

#[derive(Default)]
pub struct LogBuzzer {
    sounding: Option<u32>,
}

impl Buzzer for LogBuzzer {
    fn tone(&mut self, frequency_hz: u32) {
        if self.sounding != Some(frequency_hz) {
            info!("buzzer: on ({frequency_hz} Hz)");
            self.sounding = Some(frequency_hz);
        }
    }

    fn no_tone(&mut self) {
        if self.sounding.take().is_some() {
            info!("buzzer: off");
        }
    }
}

#[derive(Default)]
pub struct LogIndicator {
    current: Option<Rgb>,
}

impl Indicator for LogIndicator {
    fn set_color(&mut self, rgb: Rgb) {
        if self.current != Some(rgb) {
            let Rgb(r, g, b) = rgb;
            info!("indicator: rgb({r}, {g}, {b})");
            self.current = Some(rgb);
        }
    }
}
