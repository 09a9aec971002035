//! Persisted configuration record
//!
//! The record is written as one fixed-size block at a fixed storage offset.
//! It is either fully valid (marker carries the provisioning prefix) or it is
//! ignored entirely; callers must check [`ConfigurationRecord::is_valid`]
//! before using it to bring up networking.

#[cfg(any(test, feature = "mock"))]
use mockall::automock;
use std::{fmt, io};

/// Storage offset of the record
pub const RECORD_OFFSET: usize = 1;

/// Marker prefix written by the configuration flow
pub const PROVISIONING_PREFIX: &str = "CONFIG";

/// Port used when the record does not carry one
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Template used when the record does not carry one
pub const DEFAULT_REQUEST_TEMPLATE: &str =
    "/forras-admin/rest/createNFCLog?readerid=%RID%&rfid=%CID%&type=RF1";

const MARKER_LEN: usize = 10;
const TEMPLATE_LEN: usize = 128;

/// Value of an erased storage cell
const ERASED: u8 = 0xFF;

/// Size of the encoded record in bytes
pub const RECORD_LEN: usize = MARKER_LEN + 6 + 1 + 4 * 5 + 2 + TEMPLATE_LEN;

#[derive(Debug)]
pub enum StorageError {
    Io(io::Error),
    OutOfBounds {
        offset: usize,
        len: usize,
        capacity: usize,
    },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "storage i/o failed: {e}"),
            StorageError::OutOfBounds {
                offset,
                len,
                capacity,
            } => write!(
                f,
                "storage access out of bounds: {len} bytes at offset {offset} (capacity {capacity})"
            ),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::OutOfBounds { .. } => None,
        }
    }
}

impl From<io::Error> for StorageError {
    fn from(e: io::Error) -> Self {
        StorageError::Io(e)
    }
}

/// Raw byte storage holding the record (EEPROM or an image of it)
#[cfg_attr(any(test, feature = "mock"), automock)]
pub trait ConfigStorage {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError>;
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError>;
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigurationRecord {
    pub marker: String,
    pub hardware_address: [u8; 6],
    pub use_dhcp: bool,
    pub server_address: [u8; 4],
    pub server_port: u16,
    pub local_address: [u8; 4],
    pub subnet_mask: [u8; 4],
    pub gateway_address: [u8; 4],
    pub dns_address: [u8; 4],
    pub request_template: String,
}

impl ConfigurationRecord {
    /// True iff the marker carries the provisioning prefix
    pub fn is_valid(&self) -> bool {
        self.marker.starts_with(PROVISIONING_PREFIX)
    }

    pub fn effective_server_port(&self) -> u16 {
        if self.server_port == 0 {
            DEFAULT_SERVER_PORT
        } else {
            self.server_port
        }
    }

    pub fn effective_request_template(&self) -> &str {
        if self.request_template.is_empty() {
            DEFAULT_REQUEST_TEMPLATE
        } else {
            &self.request_template
        }
    }

    pub fn encode(&self) -> [u8; RECORD_LEN] {
        let mut out = [0u8; RECORD_LEN];
        let mut writer = FieldWriter::new(&mut out);

        writer.put_str(&self.marker, MARKER_LEN);
        writer.put(&self.hardware_address);
        writer.put(&[u8::from(self.use_dhcp)]);
        writer.put(&self.server_address);
        writer.put(&self.local_address);
        writer.put(&self.subnet_mask);
        writer.put(&self.gateway_address);
        writer.put(&self.dns_address);
        writer.put(&self.server_port.to_le_bytes());
        writer.put_str(&self.request_template, TEMPLATE_LEN);

        out
    }

    pub fn decode(raw: &[u8; RECORD_LEN]) -> Self {
        let mut reader = FieldReader::new(raw);

        Self {
            marker: reader.take_str(MARKER_LEN),
            hardware_address: reader.take(),
            use_dhcp: reader.take::<1>()[0] == 1,
            server_address: reader.take(),
            local_address: reader.take(),
            subnet_mask: reader.take(),
            gateway_address: reader.take(),
            dns_address: reader.take(),
            server_port: match u16::from_le_bytes(reader.take()) {
                u16::MAX => 0,
                port => port,
            },
            request_template: reader.take_str(TEMPLATE_LEN),
        }
    }
}

struct FieldWriter<'a> {
    out: &'a mut [u8],
    pos: usize,
}

impl<'a> FieldWriter<'a> {
    fn new(out: &'a mut [u8]) -> Self {
        Self { out, pos: 0 }
    }

    fn put(&mut self, bytes: &[u8]) {
        self.out[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
    }

    /// NUL padded, truncated on a char boundary
    fn put_str(&mut self, s: &str, field_len: usize) {
        let mut end = s.len().min(field_len);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let bytes = &s.as_bytes()[..end];
        self.out[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += field_len;
    }
}

struct FieldReader<'a> {
    raw: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(raw: &'a [u8]) -> Self {
        Self { raw, pos: 0 }
    }

    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut field = [0u8; N];
        field.copy_from_slice(&self.raw[self.pos..self.pos + N]);
        self.pos += N;
        field
    }

    /// Ends at the first NUL or erased byte
    fn take_str(&mut self, field_len: usize) -> String {
        let field = &self.raw[self.pos..self.pos + field_len];
        self.pos += field_len;
        let end = field
            .iter()
            .position(|b| *b == 0 || *b == ERASED)
            .unwrap_or(field_len);
        String::from_utf8_lossy(&field[..end]).into_owned()
    }
}

/// Loads and saves the configuration record on top of raw storage
pub struct ConfigStore<S> {
    storage: S,
}

impl<S: ConfigStorage> ConfigStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Read the record; the result may still be semantically invalid
    pub fn load(&mut self) -> Result<ConfigurationRecord, StorageError> {
        let mut raw = [0u8; RECORD_LEN];
        self.storage.read(RECORD_OFFSET, &mut raw)?;
        Ok(ConfigurationRecord::decode(&raw))
    }

    /// Overwrite the whole record
    pub fn save(&mut self, record: &ConfigurationRecord) -> Result<(), StorageError> {
        self.storage.write(RECORD_OFFSET, &record.encode())
    }
}
