//! Byte storage backends standing in for the EEPROM

use crate::services::config_store::{ConfigStorage, StorageError};
use log::debug;
use std::{
    fs::{self, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::PathBuf,
};

/// Capacity of the emulated EEPROM in bytes
pub const EEPROM_SIZE: usize = 1024;

/// Value of an erased EEPROM cell
const ERASED: u8 = 0xFF;

fn check_bounds(offset: usize, len: usize) -> Result<(), StorageError> {
    if offset.checked_add(len).is_none_or(|end| end > EEPROM_SIZE) {
        return Err(StorageError::OutOfBounds {
            offset,
            len,
            capacity: EEPROM_SIZE,
        });
    }
    Ok(())
}

/// Volatile storage, mainly for tests
#[derive(Clone, Debug)]
pub struct MemoryStorage {
    cells: Vec<u8>,
}

impl MemoryStorage {
    /// Storage in the factory erased state
    pub fn erased() -> Self {
        Self {
            cells: vec![ERASED; EEPROM_SIZE],
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self {
            cells: vec![0; EEPROM_SIZE],
        }
    }
}

impl ConfigStorage for MemoryStorage {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len())?;
        buf.copy_from_slice(&self.cells[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len())?;
        self.cells[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }
}

/// EEPROM image kept in a file; a missing file reads as erased storage
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn create_erased(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        debug!("creating erased eeprom image at {:?}", self.path);
        fs::write(&self.path, vec![ERASED; EEPROM_SIZE])?;
        Ok(())
    }
}

impl ConfigStorage for FileStorage {
    fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), StorageError> {
        check_bounds(offset, buf.len())?;

        let mut file = match OpenOptions::new().read(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                buf.fill(ERASED);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        file.seek(SeekFrom::Start(offset as u64))?;
        file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), StorageError> {
        check_bounds(offset, data.len())?;

        if !self.path.try_exists()? {
            self.create_erased()?;
        }

        let mut file = OpenOptions::new().write(true).open(&self.path)?;
        file.seek(SeekFrom::Start(offset as u64))?;
        file.write_all(data)?;
        file.sync_all()?;
        Ok(())
    }
}
