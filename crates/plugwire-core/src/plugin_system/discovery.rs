//! Discovery of plugin folders on disk.
//!
//! A folder is a plugin when it contains a descriptor named after the folder
//! itself (`greeter/greeter.json`, or `greeter/greeter.yaml` when YAML
//! descriptors are enabled). Plugin folders are not searched any further.
use std::collections::{BTreeMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::event::{EventDispatcher, PluginEvent};
use crate::kernel::constants::{JSON_DESCRIPTOR_EXTENSION, YAML_DESCRIPTOR_EXTENSIONS};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::manifest::{PluginDescriptor, PluginKey, RawDescriptor};
use crate::storage::config::ConfigFormat;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanOptions {
    /// Also accept `.yml`/`.yaml` descriptors
    pub enable_yaml: bool,
}

pub struct PluginScanner<'a> {
    options: ScanOptions,
    events: &'a EventDispatcher,
}

impl<'a> PluginScanner<'a> {
    pub fn new(options: ScanOptions, events: &'a EventDispatcher) -> Self {
        Self { options, events }
    }

    /// Breadth-first search of `path` for plugin folders.
    ///
    /// A file path names a single plugin: its parent folder must hold a
    /// descriptor, and sibling folders are never searched.
    pub fn search(&self, path: &Path) -> Result<BTreeMap<PluginKey, PluginDescriptor>, PluginSystemError> {
        let mut found = BTreeMap::new();
        if path.is_file() {
            let folder = path.parent().map(Path::to_path_buf).unwrap_or_default();
            let Some(descriptor_path) = self.descriptor_file(&folder) else {
                return Err(PluginSystemError::ManifestError {
                    path: folder,
                    message: "no plugin descriptor in folder".to_string(),
                    source: None,
                });
            };
            let descriptor = self.read_descriptor(&folder, &descriptor_path)?;
            self.record(&mut found, descriptor)?;
            return Ok(found);
        }

        let root = path.to_path_buf();
        if !root.is_dir() {
            return Err(PluginSystemError::ManifestError {
                path: root,
                message: "plugin search path is not a directory".to_string(),
                source: None,
            });
        }

        let mut queue = VecDeque::from([root]);
        while let Some(folder) = queue.pop_front() {
            if let Some(descriptor_path) = self.descriptor_file(&folder) {
                let descriptor = self.read_descriptor(&folder, &descriptor_path)?;
                self.record(&mut found, descriptor)?;
                continue;
            }
            for child in Self::child_folders(&folder)? {
                queue.push_back(child);
            }
        }
        log::info!("Found {} plugin(s) under {}", found.len(), path.display());
        Ok(found)
    }

    fn record(
        &self,
        found: &mut BTreeMap<PluginKey, PluginDescriptor>,
        descriptor: PluginDescriptor,
    ) -> Result<(), PluginSystemError> {
        let key = descriptor.key();
        if found.contains_key(&key) {
            return Err(PluginSystemError::DuplicatePlugin {
                plugin: key.name,
                version: key.version,
            });
        }
        log::debug!("Found plugin {}", key);
        self.events.dispatch(&PluginEvent::PluginFound {
            path: descriptor.path().map(Path::to_path_buf).unwrap_or_default(),
            plugin: descriptor.version_string(),
        });
        found.insert(key, descriptor);
        Ok(())
    }

    fn descriptor_file(&self, folder: &Path) -> Option<PathBuf> {
        let stem = folder.file_name()?.to_str()?;
        let yaml = YAML_DESCRIPTOR_EXTENSIONS
            .iter()
            .filter(|_| self.options.enable_yaml);
        std::iter::once(&JSON_DESCRIPTOR_EXTENSION)
            .chain(yaml)
            .map(|extension| folder.join(format!("{}.{}", stem, extension)))
            .find(|candidate| candidate.is_file())
    }

    fn read_descriptor(&self, folder: &Path, descriptor_path: &Path) -> Result<PluginDescriptor, PluginSystemError> {
        let raw: RawDescriptor = ConfigFormat::read_file(descriptor_path).map_err(|e| {
            PluginSystemError::ManifestError {
                path: descriptor_path.to_path_buf(),
                message: "could not read plugin descriptor".to_string(),
                source: Some(Box::new(e)),
            }
        })?;
        PluginDescriptor::from_raw(raw, Some(folder.to_path_buf()))
    }

    fn child_folders(folder: &Path) -> Result<Vec<PathBuf>, PluginSystemError> {
        let entries = fs::read_dir(folder).map_err(|e| PluginSystemError::ManifestError {
            path: folder.to_path_buf(),
            message: "could not list directory".to_string(),
            source: Some(Box::new(e)),
        })?;
        let mut children: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        children.sort();
        Ok(children)
    }
}
