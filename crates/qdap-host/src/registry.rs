// SPDX-License-Identifier: Apache-2.0
//! Process-wide registry of loaded backends.
//!
//! The registry is the only shared mutable state the host keeps: a map from
//! backend prefix to loaded [`Device`], behind an `RwLock` so that lookups
//! stay concurrent once the registry is populated. Nothing here is truly
//! global; embedders create as many registries as they need.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use crate::error::{QdapError, Result};
use crate::loader::Device;

/// A registry mapping backend prefixes to loaded devices.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Arc<Device>>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a backend library and register it under its prefix.
    ///
    /// Fails if the prefix is already registered; the name-shifted symbol
    /// scheme exists precisely so one process can host many backends
    /// without collisions, and silently replacing a live device would
    /// invalidate its consumers.
    pub fn load(&self, path: &Path, prefix: &str) -> Result<Arc<Device>> {
        let device = Arc::new(Device::load(path, prefix)?);
        let mut devices = self.devices.write().expect("registry lock poisoned");
        if devices.contains_key(prefix) {
            return Err(QdapError::InvalidArgument(format!(
                "backend prefix '{prefix}' is already registered"
            )));
        }
        devices.insert(prefix.to_string(), Arc::clone(&device));
        Ok(device)
    }

    /// Look up a loaded device by prefix.
    pub fn get(&self, prefix: &str) -> Option<Arc<Device>> {
        self.devices
            .read()
            .expect("registry lock poisoned")
            .get(prefix)
            .cloned()
    }

    /// Remove a device from the registry. Consumers holding an `Arc` keep
    /// the library mapped until they drop it.
    pub fn remove(&self, prefix: &str) -> Option<Arc<Device>> {
        self.devices
            .write()
            .expect("registry lock poisoned")
            .remove(prefix)
    }

    /// Registered prefixes, in no particular order.
    pub fn prefixes(&self) -> Vec<String> {
        self.devices
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.devices.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Scan a directory for backend shared libraries.
    ///
    /// Iterates over `.so` / `.dylib` files and loads those whose filename
    /// stem (minus a conventional `lib` prefix) appears in `prefix_map`.
    /// Individual load failures are logged at debug level and skipped;
    /// only the `read_dir` itself propagates an error. Returns the number
    /// of devices discovered.
    pub fn scan_directory(
        &self,
        dir: &Path,
        prefix_map: &HashMap<String, String>,
    ) -> Result<usize> {
        let mut discovered = 0;

        for entry in std::fs::read_dir(dir).map_err(QdapError::Io)? {
            let path = entry.map_err(QdapError::Io)?.path();

            let is_shared_lib = path
                .extension()
                .is_some_and(|ext| ext == "so" || ext == "dylib");
            if !is_shared_lib {
                continue;
            }

            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("")
                .to_string();
            let lookup_key = stem.strip_prefix("lib").unwrap_or(&stem);

            let Some(prefix) = prefix_map.get(lookup_key) else {
                tracing::debug!(
                    "no prefix mapping for '{lookup_key}'; skipping {}",
                    path.display()
                );
                continue;
            };

            match self.load(&path, prefix) {
                Ok(_) => {
                    tracing::info!("discovered QDAP backend '{prefix}' at {}", path.display());
                    discovered += 1;
                }
                Err(e) => {
                    tracing::debug!("skipping {}: {e}", path.display());
                }
            }
        }

        Ok(discovered)
    }
}

impl std::fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("prefixes", &self.prefixes())
            .finish()
    }
}
