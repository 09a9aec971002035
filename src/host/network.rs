//! Network stack on top of host sockets
//!
//! The operating system owns addressing, so provisioning only records what
//! the record asked for. Outbound connections are plain tokio TCP streams.

use crate::services::{
    address::format_hardware_address,
    network::{Connection, NetworkStack, StaticAddressing},
};
use anyhow::{Context, Result};
use log::{debug, info};
use std::{
    io::ErrorKind,
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};
use tokio::{io::AsyncWriteExt, net::TcpStream, time::timeout};

pub struct HostNetwork {
    connect_timeout: Duration,
}

impl HostNetwork {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl NetworkStack for HostNetwork {
    type Connection = HostConnection;

    async fn begin_dhcp(&mut self, hardware_address: [u8; 6]) -> Result<Ipv4Addr> {
        info!(
            "host network: dhcp requested for {}, using system addressing",
            format_hardware_address(&hardware_address)
        );
        Ok(Ipv4Addr::UNSPECIFIED)
    }

    async fn begin_static(
        &mut self,
        hardware_address: [u8; 6],
        addressing: &StaticAddressing,
    ) -> Result<Ipv4Addr> {
        info!(
            "host network: static addressing requested for {}, dns {} gateway {} subnet {}",
            format_hardware_address(&hardware_address),
            addressing.dns,
            addressing.gateway,
            addressing.subnet
        );
        Ok(addressing.local)
    }

    async fn connect(&mut self, server: SocketAddrV4) -> Result<HostConnection> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(server))
            .await
            .context("failed to connect: timed out")?
            .context("failed to connect")?;

        debug!("connected to {server}");

        Ok(HostConnection {
            stream: Some(stream),
        })
    }
}

pub struct HostConnection {
    stream: Option<TcpStream>,
}

impl Connection for HostConnection {
    async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().context("failed to write: connection closed")?;
        stream.write_all(data).await.context("failed to write")?;
        stream.flush().await.context("failed to flush")
    }

    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let Some(stream) = self.stream.as_ref() else {
            return Ok(0);
        };

        match stream.try_read(buf) {
            Ok(0) => {
                debug!("peer closed connection");
                self.stream = None;
                Ok(0)
            }
            Ok(read) => Ok(read),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => {
                self.stream = None;
                Err(e).context("failed to read")
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        self.stream = None;
    }
}
