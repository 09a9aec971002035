//! Card event to network request pipeline
//!
//! Each credential read by the reader turns into exactly one HTTP GET. Only
//! one request may be in flight: scans arriving while a connection is still
//! open are ignored.

use crate::services::{
    address::format_hardware_address,
    config_store::ConfigurationRecord,
    network::{Connection, NetworkStack},
};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::net::{Ipv4Addr, SocketAddrV4};

pub const READER_ID_PLACEHOLDER: &str = "%RID%";
pub const CARD_ID_PLACEHOLDER: &str = "%CID%";

/// Render a 4 byte uid as 8 uppercase hex characters
pub fn card_id(uid: &[u8; 4]) -> String {
    uid.iter().map(|b| format!("{b:02X}")).collect()
}

/// Substitute reader and card ids into the request template
pub fn build_request_path(template: &str, reader_id: &str, card_id: &str) -> String {
    template
        .replace(READER_ID_PLACEHOLDER, reader_id)
        .replace(CARD_ID_PLACEHOLDER, card_id)
}

pub fn http_get(path: &str, host: &Ipv4Addr) -> String {
    format!("GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatch {
    /// Request written, connection now pending
    Sent,
    /// A request is already in flight; the scan was ignored
    Busy,
    /// No connection could be opened or the request could not be written
    ConnectFailed,
}

/// Owns the single pending request connection
pub struct CardEventPipeline<C> {
    pending: Option<C>,
}

impl<C> Default for CardEventPipeline<C> {
    fn default() -> Self {
        Self { pending: None }
    }
}

impl<C: Connection> CardEventPipeline<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending_mut(&mut self) -> Option<&mut C> {
        self.pending.as_mut()
    }

    /// Handle one card scan
    ///
    /// `network` is `None` while networking is not provisioned, which counts
    /// as a failed connect.
    pub async fn on_card<N>(
        &mut self,
        uid: &[u8; 4],
        record: &ConfigurationRecord,
        network: Option<&mut N>,
    ) -> Dispatch
    where
        N: NetworkStack<Connection = C>,
    {
        let card_id = card_id(uid);
        info!("cardid: {card_id}");

        if self.is_pending() {
            warn!("request still pending, ignoring card {card_id}");
            return Dispatch::Busy;
        }

        let Some(network) = network else {
            warn!("network not configured, cannot log card {card_id}");
            return Dispatch::ConnectFailed;
        };

        let path = build_request_path(
            record.effective_request_template(),
            &format_hardware_address(&record.hardware_address),
            &card_id,
        );
        debug!("request: {path}");

        match Self::send(network, record, &path).await {
            Ok(connection) => {
                self.pending = Some(connection);
                Dispatch::Sent
            }
            Err(e) => {
                warn!("{e:#}");
                Dispatch::ConnectFailed
            }
        }
    }

    async fn send<N>(network: &mut N, record: &ConfigurationRecord, path: &str) -> Result<C>
    where
        N: NetworkStack<Connection = C>,
    {
        let host = Ipv4Addr::from(record.server_address);
        let server = SocketAddrV4::new(host, record.effective_server_port());

        let mut connection = network
            .connect(server)
            .await
            .context(format!("failed to connect to {server}"))?;

        if let Err(e) = connection.write_all(http_get(path, &host).as_bytes()).await {
            connection.close();
            return Err(e).context(format!("failed to send request to {server}"));
        }

        Ok(connection)
    }

    /// Close and forget the pending connection once the peer has closed it
    ///
    /// Returns true when a connection was torn down.
    pub fn teardown_closed(&mut self) -> bool {
        match self.pending.as_mut() {
            Some(connection) if !connection.is_connected() => {
                connection.close();
                self.pending = None;
                debug!("pending request closed");
                true
            }
            _ => false,
        }
    }
}
