//! Key-value store adapter.
//!
//! Implements both [`StoragePort`] and [`ConfigPort`].
//!
//! - **`target_os = "espidf"`**: ESP-IDF NVS through `esp_idf_svc::nvs`,
//!   one NVS namespace per storage namespace.
//! - **`not(target_os = "espidf")`**: in-memory map keyed by
//!   `namespace::key`, for host tests and simulation.
//!
//! [`NodeConfig`] is stored as a single postcard blob and validated on
//! both load and save.

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort, StorageError, StoragePort};
use crate::config::NodeConfig;

#[cfg(not(target_os = "espidf"))]
use std::collections::HashMap;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const CONFIG_NAMESPACE: &str = "sensornode";
const CONFIG_KEY: &str = "nodecfg";

/// Largest blob [`KvStore`] reads back for the config record.
const MAX_CONFIG_BLOB: usize = 256;

pub struct KvStore {
    #[cfg(not(target_os = "espidf"))]
    map: HashMap<String, Vec<u8>>,
    #[cfg(target_os = "espidf")]
    partition: EspDefaultNvsPartition,
}

#[cfg(not(target_os = "espidf"))]
impl Default for KvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl KvStore {
    pub fn new() -> Self {
        info!("KvStore: in-memory backend");
        Self {
            map: HashMap::new(),
        }
    }

    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{namespace}::{key}")
    }
}

#[cfg(target_os = "espidf")]
impl KvStore {
    /// Wrap the default NVS partition.
    pub fn new(partition: EspDefaultNvsPartition) -> Self {
        info!("KvStore: ESP-IDF NVS backend");
        Self { partition }
    }

    fn open(&self, namespace: &str, write: bool) -> Result<EspNvs<NvsDefault>, StorageError> {
        EspNvs::new(self.partition.clone(), namespace, write).map_err(|e| {
            warn!("KvStore: cannot open namespace '{namespace}': {e}");
            StorageError::IoError
        })
    }
}

impl StoragePort for KvStore {
    #[cfg(not(target_os = "espidf"))]
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let data = self
            .map
            .get(&Self::composite_key(namespace, key))
            .ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    #[cfg(target_os = "espidf")]
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let nvs = self.open(namespace, false)?;
        match nvs.get_blob(key, buf) {
            Ok(Some(data)) => Ok(data.len()),
            Ok(None) => Err(StorageError::NotFound),
            Err(_) => Err(StorageError::IoError),
        }
    }

    #[cfg(not(target_os = "espidf"))]
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.map
            .insert(Self::composite_key(namespace, key), data.to_vec());
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let mut nvs = self.open(namespace, true)?;
        nvs.set_blob(key, data).map_err(|e| {
            warn!("KvStore: write {namespace}::{key} failed: {e}");
            StorageError::IoError
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.map.remove(&Self::composite_key(namespace, key));
        Ok(())
    }

    #[cfg(target_os = "espidf")]
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let mut nvs = self.open(namespace, true)?;
        nvs.remove(key).map(|_| ()).map_err(|_| StorageError::IoError)
    }

    #[cfg(not(target_os = "espidf"))]
    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.map
            .contains_key(&Self::composite_key(namespace, key))
    }

    #[cfg(target_os = "espidf")]
    fn exists(&self, namespace: &str, key: &str) -> bool {
        self.open(namespace, false)
            .and_then(|nvs| nvs.contains(key).map_err(|_| StorageError::IoError))
            .unwrap_or(false)
    }
}

impl ConfigPort for KvStore {
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        let mut buf = [0u8; MAX_CONFIG_BLOB];
        let len = self.read(CONFIG_NAMESPACE, CONFIG_KEY, &mut buf)?;
        let config: NodeConfig =
            postcard::from_bytes(&buf[..len]).map_err(|_| ConfigError::Corrupted)?;
        config.validate()?;
        info!("KvStore: loaded config ({len} bytes)");
        Ok(config)
    }

    fn save(&mut self, config: &NodeConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let mut buf = [0u8; MAX_CONFIG_BLOB];
        let bytes = postcard::to_slice(config, &mut buf)
            .map_err(|_| ConfigError::Storage(StorageError::Full))?;
        let len = bytes.len();
        self.write(CONFIG_NAMESPACE, CONFIG_KEY, bytes)?;
        info!("KvStore: config saved ({len} bytes)");
        Ok(())
    }
}
