//! Peripheral seams driven by the main loop
//!
//! All calls are non-blocking: they return immediately whether or not data
//! is available.

#[cfg(any(test, feature = "mock"))]
use mockall::automock;

/// RFID/NFC reader
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait CardReader {
    /// The uid of a newly presented and fully read card
    ///
    /// The driver halts the card after reading so one presentation yields
    /// one event.
    fn poll_card(&mut self) -> Option<[u8; 4]>;
}

/// Local console channel
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait Console {
    /// Copy pending input into `buf`, returning the number of bytes copied
    fn read_available(&mut self, buf: &mut [u8]) -> usize;
    fn write_line(&mut self, line: &str);
}
