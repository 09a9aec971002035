//! Console command protocol
//!
//! Console bytes are accumulated until the buffer ends in `}`; the buffer is
//! then decoded as one JSON command and cleared, whether or not decoding
//! succeeded. There is no opening brace detection: leading noise stays in the
//! buffer and is left to the JSON decoder.
//!
//! ```text
//! {"action":"configure","state":"CONFIGURED","usedhcp":0,"ip":"192.168.1.50","serverip":"192.168.1.10","subnet":"255.255.255.0","gateway":"192.168.1.1","dnsserver":"192.168.1.1","mac":"DE-AD-BE-EF-00-01"}
//! {"action":"readconfig"}
//! ```

use crate::services::{
    address::{format_dotted_quad, format_hardware_address, parse_dotted_quad, parse_hardware_address},
    config_store::{ConfigStorage, ConfigStore, ConfigurationRecord},
};
use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Deserialize;
use serde_json::Value;

/// Buffers growing past this without a closing brace are discarded
pub const MAX_COMMAND_LEN: usize = 1024;

/// Configuration fields of a `configure` command; absent fields keep their value
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ConfigureFields {
    pub state: Option<String>,
    pub usedhcp: Option<Value>,
    pub ip: Option<String>,
    pub serverip: Option<String>,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
    pub dnsserver: Option<String>,
    pub mac: Option<String>,
    pub serverport: Option<u16>,
    pub request: Option<String>,
}

impl ConfigureFields {
    pub fn apply(&self, record: &mut ConfigurationRecord) {
        if let Some(state) = &self.state {
            record.marker = state.clone();
        }
        if let Some(usedhcp) = &self.usedhcp {
            record.use_dhcp = match usedhcp {
                Value::Bool(b) => *b,
                other => other.as_i64() == Some(1),
            };
        }
        if let Some(ip) = &self.ip {
            record.local_address = parse_dotted_quad(ip);
        }
        if let Some(serverip) = &self.serverip {
            record.server_address = parse_dotted_quad(serverip);
        }
        if let Some(subnet) = &self.subnet {
            record.subnet_mask = parse_dotted_quad(subnet);
        }
        if let Some(gateway) = &self.gateway {
            record.gateway_address = parse_dotted_quad(gateway);
        }
        if let Some(dnsserver) = &self.dnsserver {
            record.dns_address = parse_dotted_quad(dnsserver);
        }
        if let Some(mac) = &self.mac {
            record.hardware_address = parse_hardware_address(mac);
        }
        if let Some(serverport) = self.serverport {
            record.server_port = serverport;
        }
        if let Some(request) = &self.request {
            record.request_template = request.clone();
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Configure(Box<ConfigureFields>),
    ReadConfig,
}

#[derive(Deserialize)]
struct RawCommand {
    action: String,
    #[serde(flatten)]
    fields: ConfigureFields,
}

impl Command {
    /// `None` for undecodable input or an unknown action
    pub fn decode(text: &str) -> Option<Self> {
        let raw: RawCommand = match serde_json::from_str(text) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to decode command: {e}");
                return None;
            }
        };

        match raw.action.as_str() {
            "configure" => Some(Command::Configure(Box::new(raw.fields))),
            "readconfig" => Some(Command::ReadConfig),
            other => {
                debug!("ignoring unknown action {other:?}");
                None
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reply {
    /// Record updated and persisted
    Configured,
    /// Single line dump of the stored record
    Config(String),
}

/// Render the record as the one-line `readconfig` reply
///
/// The first two keys are unquoted; console tooling depends on this format.
pub fn render_config(record: &ConfigurationRecord) -> String {
    format!(
        "{{state:{},usedhcp:{},\"ip\":\"{}\",\"serverip\":\"{}\",\"gateway\":\"{}\",\"dnsserver\":\"{}\",\"subnet\":\"{}\",\"mac\":\"{}\",\"serverport\":{},\"request\":{}}}",
        Value::from(record.marker.as_str()),
        u8::from(record.use_dhcp),
        format_dotted_quad(&record.local_address),
        format_dotted_quad(&record.server_address),
        format_dotted_quad(&record.gateway_address),
        format_dotted_quad(&record.dns_address),
        format_dotted_quad(&record.subnet_mask),
        format_hardware_address(&record.hardware_address),
        record.effective_server_port(),
        Value::from(record.effective_request_template()),
    )
}

#[derive(Debug, Default)]
pub struct CommandProtocol {
    buffer: Vec<u8>,
}

impl CommandProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one byte; returns the decoded command once the buffer ends in `}`
    pub fn feed(&mut self, byte: u8) -> Option<Command> {
        self.buffer.push(byte);

        if byte == b'}' {
            let text = String::from_utf8_lossy(&self.buffer).into_owned();
            self.buffer.clear();
            return Command::decode(&text);
        }

        if self.buffer.len() >= MAX_COMMAND_LEN {
            warn!("command exceeds {MAX_COMMAND_LEN} bytes, discarding");
            self.buffer.clear();
        }

        None
    }

    /// Execute a command against the in-memory record and its store
    ///
    /// `configure` only touches the in-memory record once the save succeeded,
    /// and adopts the record as stored, with over-long fields truncated.
    /// `readconfig` reloads from storage and adopts the stored record.
    pub fn dispatch<S: ConfigStorage>(
        command: Command,
        record: &mut ConfigurationRecord,
        store: &mut ConfigStore<S>,
    ) -> Result<Reply> {
        match command {
            Command::Configure(fields) => {
                let mut updated = record.clone();
                fields.apply(&mut updated);
                // keep exactly what fits the stored layout
                let updated = ConfigurationRecord::decode(&updated.encode());

                store
                    .save(&updated)
                    .context("failed to save configuration")?;

                info!("configuration saved (valid: {})", updated.is_valid());
                *record = updated;
                Ok(Reply::Configured)
            }
            Command::ReadConfig => {
                *record = store.load().context("failed to load configuration")?;
                Ok(Reply::Config(render_config(record)))
            }
        }
    }

    /// Feed a chunk of console input and dispatch every completed command
    pub fn handle<S: ConfigStorage>(
        &mut self,
        input: &[u8],
        record: &mut ConfigurationRecord,
        store: &mut ConfigStore<S>,
    ) -> Vec<Result<Reply>> {
        input
            .iter()
            .filter_map(|b| self.feed(*b))
            .map(|command| Self::dispatch(command, record, store))
            .collect()
    }
}
