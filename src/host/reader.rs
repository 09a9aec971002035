//! Card reader fed over UDP
//!
//! Each datagram is one card presentation: either the 4 raw uid bytes or
//! the uid as 8 hex characters.

use crate::peripherals::CardReader;
use anyhow::{Context, Result};
use log::{info, warn};
use std::{io::ErrorKind, net::SocketAddr};
use tokio::net::UdpSocket;

pub struct HostCardReader {
    socket: UdpSocket,
}

impl HostCardReader {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .context(format!("failed to bind card reader socket to {addr}"))?;

        info!("card reader listening on {}", socket.local_addr()?);

        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .context("failed to get card reader address")
    }
}

/// Decode one datagram into a uid
pub fn decode_uid(datagram: &[u8]) -> Option<[u8; 4]> {
    if let Ok(uid) = <[u8; 4]>::try_from(datagram) {
        return Some(uid);
    }

    let text = std::str::from_utf8(datagram).ok()?.trim();
    if text.len() != 8 || !text.is_ascii() {
        return None;
    }

    let mut uid = [0u8; 4];
    for (i, byte) in uid.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&text[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(uid)
}

impl CardReader for HostCardReader {
    fn poll_card(&mut self) -> Option<[u8; 4]> {
        let mut buf = [0u8; 64];

        match self.socket.try_recv(&mut buf) {
            Ok(len) => {
                let uid = decode_uid(&buf[..len]);
                if uid.is_none() {
                    warn!("ignoring malformed card datagram of {len} bytes");
                }
                uid
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => None,
            Err(e) => {
                warn!("card reader receive failed: {e}");
                None
            }
        }
    }
}
