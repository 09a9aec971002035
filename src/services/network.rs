//! Network provisioning and the outbound connection seam
//!
//! Provisioning is selected at runtime from the configuration record: DHCP or
//! static addressing. An unprovisioned (invalid) record yields no provisioner
//! at all, so it can never be used to bring networking up.

use crate::services::config_store::ConfigurationRecord;
use anyhow::{Context, Result};
use log::info;
use std::net::{Ipv4Addr, SocketAddrV4};
use trait_variant::make;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StaticAddressing {
    pub local: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub subnet: Ipv4Addr,
}

/// Network stack driver (Ethernet controller or host sockets)
#[make(Send)]
pub trait NetworkStack {
    type Connection: Connection;

    async fn begin_dhcp(&mut self, hardware_address: [u8; 6]) -> Result<Ipv4Addr>;
    async fn begin_static(
        &mut self,
        hardware_address: [u8; 6],
        addressing: &StaticAddressing,
    ) -> Result<Ipv4Addr>;
    async fn connect(&mut self, server: SocketAddrV4) -> Result<Self::Connection>;
}

/// One open outbound connection
#[make(Send)]
pub trait Connection {
    async fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Non-blocking read; `Ok(0)` when nothing is available
    fn try_read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// False once the peer closed the connection or it failed
    fn is_connected(&self) -> bool;

    fn close(&mut self);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkProvisioner {
    Dhcp,
    Static(StaticAddressing),
}

impl NetworkProvisioner {
    /// `None` for an unprovisioned record
    pub fn for_record(record: &ConfigurationRecord) -> Option<Self> {
        if !record.is_valid() {
            return None;
        }

        if record.use_dhcp {
            Some(Self::Dhcp)
        } else {
            Some(Self::Static(StaticAddressing {
                local: Ipv4Addr::from(record.local_address),
                dns: Ipv4Addr::from(record.dns_address),
                gateway: Ipv4Addr::from(record.gateway_address),
                subnet: Ipv4Addr::from(record.subnet_mask),
            }))
        }
    }

    pub async fn provision<N: NetworkStack>(
        &self,
        stack: &mut N,
        hardware_address: [u8; 6],
    ) -> Result<Ipv4Addr> {
        let local = match self {
            Self::Dhcp => {
                info!("configure network using dhcp");
                stack
                    .begin_dhcp(hardware_address)
                    .await
                    .context("failed to configure network using dhcp")?
            }
            Self::Static(addressing) => {
                info!("configure network using fixed ip: {addressing:?}");
                stack
                    .begin_static(hardware_address, addressing)
                    .await
                    .context("failed to configure network using fixed ip")?
            }
        };

        info!("reader ip: {local}");
        Ok(local)
    }
}
