//! stdin/stdout console

use crate::peripherals::Console;
use log::{debug, warn};
use std::collections::VecDeque;
use tokio::{
    io::{AsyncReadExt, stdin},
    sync::mpsc::{self, UnboundedReceiver, error::TryRecvError},
};

pub struct HostConsole {
    input: UnboundedReceiver<Vec<u8>>,
    pending: VecDeque<u8>,
    closed: bool,
}

impl HostConsole {
    /// Start forwarding stdin; must be called from within a tokio runtime
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut stdin = stdin();
            let mut buf = [0u8; 256];
            loop {
                match stdin.read(&mut buf).await {
                    Ok(0) => {
                        debug!("console input closed");
                        break;
                    }
                    Ok(read) => {
                        if tx.send(buf[..read].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("console read failed: {e}");
                        break;
                    }
                }
            }
        });

        Self::from_receiver(rx)
    }

    pub fn from_receiver(input: UnboundedReceiver<Vec<u8>>) -> Self {
        Self {
            input,
            pending: VecDeque::new(),
            closed: false,
        }
    }
}

impl Console for HostConsole {
    fn read_available(&mut self, buf: &mut [u8]) -> usize {
        while !self.closed && self.pending.len() < buf.len() {
            match self.input.try_recv() {
                Ok(chunk) => self.pending.extend(chunk),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.closed = true,
            }
        }

        let count = self.pending.len().min(buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..count)) {
            *slot = byte;
        }
        count
    }

    fn write_line(&mut self, line: &str) {
        println!("{line}");
    }
}
