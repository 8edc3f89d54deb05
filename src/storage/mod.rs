//! # Storage Module - Configuration Tree
//!
//! All mutable state of the engine lives in a storage tree of JSON
//! documents with optimistic concurrency:
//!
//! ```text
//! <storage>/
//! ├── settings/       ← one `<name>-settings.json` per settings family
//! ├── plugins/<id>/   ← per-plugin settings.json and state.json
//! ├── datasources/<id>/ ← per-data-source settings.json
//! ├── schedules/      ← master / timed / playlist / task documents
//! └── schemas/        ← read-only JSON-schema templates with defaults
//! ```
//!
//! The [`ConfigurationManager`] is the single factory for document access:
//! it keeps a moniker → [`ConfigurationObject`] registry so every caller
//! shares one optimistic-concurrency view per document, produces the
//! sub-managers scoped to each folder, and owns provisioning
//! (`ensure_folders`, `hard_reset`) from the read-only NVE template tree.

pub mod document;
pub mod wire;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde_json::Value;

use crate::errors::CoreError;
use crate::plugins::PluginRegistry;
use crate::schedule::manager::ScheduleManager;
use crate::sources::SourceRegistry;
use crate::validation::validate_identifier;

pub use document::{canonical_hash, ConfigurationObject, Document, DocumentStore, FileStore, ID_KEY, REV_KEY};

/// Font variants the static manager can resolve for renderers.
#[derive(Debug, Clone)]
pub struct FontInfo {
    pub family: &'static str,
    pub weight: &'static str,
    pub file: &'static str,
}

const FONT_TABLE: &[FontInfo] = &[
    FontInfo {
        family: "Dogica",
        weight: "normal",
        file: "dogicapixel.ttf",
    },
    FontInfo {
        family: "Dogica",
        weight: "bold",
        file: "dogicapixelbold.ttf",
    },
    FontInfo {
        family: "Jost",
        weight: "normal",
        file: "Jost.ttf",
    },
    FontInfo {
        family: "Jost",
        weight: "bold",
        file: "Jost-SemiBold.ttf",
    },
];

/// Manages the paths used for configuration and working storage and acts
/// as a factory for the scoped sub-managers.
pub struct ConfigurationManager {
    base_path: PathBuf,
    storage_path: PathBuf,
    nve_path: PathBuf,
    store: Arc<dyn DocumentStore>,
    registry: Mutex<HashMap<String, Arc<ConfigurationObject>>>,
    plugins: PluginRegistry,
    sources: SourceRegistry,
}

impl ConfigurationManager {
    /// Build a manager over `base_path` (source tree holding the template)
    /// and `storage_path` (working tree; defaults to a `.storage` sibling
    /// of base). The NVE template defaults to `<base>/storage`.
    pub fn new(
        base_path: &Path,
        storage_path: Option<&Path>,
        plugins: PluginRegistry,
        sources: SourceRegistry,
    ) -> Arc<Self> {
        let base_path = base_path.to_path_buf();
        let storage_path = storage_path.map(Path::to_path_buf).unwrap_or_else(|| {
            match base_path.parent() {
                Some(parent) => parent.join(".storage"),
                None => base_path.join(".storage"),
            }
        });
        let nve_path = base_path.join("storage");
        Arc::new(Self {
            base_path,
            storage_path,
            nve_path,
            store: Arc::new(FileStore),
            registry: Mutex::new(HashMap::new()),
            plugins,
            sources,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }

    pub fn settings_dir(&self) -> PathBuf {
        self.storage_path.join("settings")
    }

    pub fn plugins_dir(&self) -> PathBuf {
        self.storage_path.join("plugins")
    }

    pub fn datasources_dir(&self) -> PathBuf {
        self.storage_path.join("datasources")
    }

    pub fn schedules_dir(&self) -> PathBuf {
        self.storage_path.join("schedules")
    }

    pub fn schemas_dir(&self) -> PathBuf {
        self.storage_path.join("schemas")
    }

    /// Path of the JSON schema template for `schema_name`.
    pub fn schema_path(&self, schema_name: &str) -> Result<PathBuf, CoreError> {
        validate_identifier(schema_name)?;
        Ok(self.schemas_dir().join(format!("{schema_name}.json")))
    }

    /// Obtain the shared [`ConfigurationObject`] for a moniker, creating it
    /// on first use. All callers of the same moniker get the same object.
    pub fn obtain(&self, moniker: &Path) -> Arc<ConfigurationObject> {
        let key = moniker.to_string_lossy().into_owned();
        let mut registry = self.registry.lock().expect("configuration registry poisoned");
        registry
            .entry(key.clone())
            .or_insert_with(|| Arc::new(ConfigurationObject::new(&key, self.store.clone())))
            .clone()
    }

    /// Look up an already-materialized object without creating one.
    pub fn find(&self, moniker: &Path) -> Option<Arc<ConfigurationObject>> {
        let key = moniker.to_string_lossy();
        let registry = self.registry.lock().expect("configuration registry poisoned");
        registry.get(key.as_ref()).cloned()
    }

    /// Eviction entry point for external change notifications: drops the
    /// cached content of the moniker so the next read reloads.
    pub fn watch(&self, moniker: &Path) {
        if let Some(object) = self.find(moniker) {
            info!("watch: evicting '{}'", object.moniker());
            object.evict();
        }
    }

    /// Ensure the working folders exist. The NVE template tree must be
    /// present; the storage tree is created as needed.
    pub fn ensure_folders(&self) -> Result<(), CoreError> {
        if !self.nve_path.is_dir() {
            return Err(CoreError::Unavailable(format!(
                "template tree {} does not exist",
                self.nve_path.display()
            )));
        }
        for dir in [
            self.storage_path.clone(),
            self.settings_dir(),
            self.plugins_dir(),
            self.datasources_dir(),
        ] {
            if !dir.is_dir() {
                std::fs::create_dir_all(&dir)?;
                debug!("created {}", dir.display());
            }
        }
        Ok(())
    }

    /// Wipe the storage tree and provision it again: re-copy the NVE
    /// template, materialize each schema's `default` block into its
    /// settings family, and write default settings for every registered
    /// plugin and data source. Cached documents are evicted afterwards.
    pub fn hard_reset(&self) -> Result<(), CoreError> {
        if self.storage_path.is_dir() {
            for entry in std::fs::read_dir(&self.storage_path)? {
                let entry = entry?;
                let path = entry.path();
                if path.is_dir() {
                    std::fs::remove_dir_all(&path)?;
                } else {
                    std::fs::remove_file(&path)?;
                }
            }
            info!("hard_reset: cleared {}", self.storage_path.display());
        }
        self.ensure_folders()?;
        copy_tree(&self.nve_path, &self.storage_path)?;
        self.materialize_settings()?;
        self.provision_plugins()?;
        self.provision_datasources()?;

        let registry = self.registry.lock().expect("configuration registry poisoned");
        for object in registry.values() {
            object.evict();
        }
        info!("hard_reset: provisioned {}", self.storage_path.display());
        Ok(())
    }

    fn materialize_settings(&self) -> Result<(), CoreError> {
        let schemas = self.schemas_dir();
        if !schemas.is_dir() {
            warn!("no schema templates under {}", schemas.display());
            return Ok(());
        }
        for entry in std::fs::read_dir(&schemas)? {
            let path = entry?.path();
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let schema = match self.store.load(&path.to_string_lossy())? {
                Some(doc) => doc,
                None => continue,
            };
            let defaults = match schema.get("default") {
                Some(Value::Object(map)) => map.clone(),
                _ => Document::new(),
            };
            let settings_path = self.settings_dir().join(format!("{stem}-settings.json"));
            self.store
                .save(&settings_path.to_string_lossy(), &defaults)?;
            debug!("materialized settings for '{stem}'");
        }
        Ok(())
    }

    fn provision_plugins(&self) -> Result<(), CoreError> {
        for info in self.plugins.infos() {
            let dir = self.plugins_dir().join(&info.id);
            std::fs::create_dir_all(&dir)?;
            if let Some(Value::Object(defaults)) = &info.default_settings {
                let path = dir.join("settings.json");
                self.store.save(&path.to_string_lossy(), defaults)?;
            }
        }
        Ok(())
    }

    fn provision_datasources(&self) -> Result<(), CoreError> {
        for entry in self.sources.entries() {
            let dir = self.datasources_dir().join(&entry.info.id);
            std::fs::create_dir_all(&dir)?;
            if let Some(Value::Object(defaults)) = &entry.info.default_settings {
                let path = dir.join("settings.json");
                self.store.save(&path.to_string_lossy(), defaults)?;
            }
        }
        Ok(())
    }

    /// The compile-time plugin registry backing this configuration.
    pub fn plugin_registry(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// The data-source registry backing this configuration.
    pub fn source_registry(&self) -> &SourceRegistry {
        &self.sources
    }

    /// Sub-manager for the system-level settings families.
    pub fn settings_manager(self: &Arc<Self>) -> SettingsManager {
        SettingsManager { cm: self.clone() }
    }

    /// Sub-manager rooted at `plugins/<plugin_id>`.
    pub fn plugin_manager(self: &Arc<Self>, plugin_id: &str) -> Result<PluginConfigManager, CoreError> {
        validate_identifier(plugin_id)?;
        std::fs::create_dir_all(self.plugins_dir().join(plugin_id))?;
        Ok(PluginConfigManager {
            cm: self.clone(),
            plugin_id: plugin_id.to_string(),
        })
    }

    /// Sub-manager rooted at `datasources/<source_id>`.
    pub fn datasource_manager(
        self: &Arc<Self>,
        source_id: &str,
    ) -> Result<DataSourceConfigManager, CoreError> {
        validate_identifier(source_id)?;
        std::fs::create_dir_all(self.datasources_dir().join(source_id))?;
        Ok(DataSourceConfigManager {
            cm: self.clone(),
            source_id: source_id.to_string(),
        })
    }

    /// Schedule loader bound to the schedule storage folder.
    pub fn schedule_manager(&self) -> ScheduleManager {
        ScheduleManager::new(self.schedules_dir())
    }

    /// Static-resource manager bound to `<base>/static`.
    pub fn static_manager(&self) -> StaticManager {
        StaticManager {
            root: self.base_path.join("static"),
        }
    }
}

/// Recursively copy `src` into `dst`, creating folders as needed.
fn copy_tree(src: &Path, dst: &Path) -> Result<(), CoreError> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// Manage system-level settings families (system, display, theme).
#[derive(Clone)]
pub struct SettingsManager {
    cm: Arc<ConfigurationManager>,
}

impl SettingsManager {
    /// Path of the JSON file backing the family.
    pub fn settings_path(&self, family: &str) -> Result<PathBuf, CoreError> {
        validate_identifier(family)?;
        Ok(self.cm.settings_dir().join(format!("{family}-settings.json")))
    }

    /// Shared document object for a settings family.
    pub fn open(&self, family: &str) -> Result<Arc<ConfigurationObject>, CoreError> {
        Ok(self.cm.obtain(&self.settings_path(family)?))
    }
}

/// Manage settings and state for one plugin.
#[derive(Clone)]
pub struct PluginConfigManager {
    cm: Arc<ConfigurationManager>,
    plugin_id: String,
}

impl PluginConfigManager {
    pub fn settings_path(&self) -> PathBuf {
        self.cm.plugins_dir().join(&self.plugin_id).join("settings.json")
    }

    pub fn open(&self) -> Arc<ConfigurationObject> {
        self.cm.obtain(&self.settings_path())
    }

    pub fn state_path(&self) -> PathBuf {
        self.cm.plugins_dir().join(&self.plugin_id).join("state.json")
    }

    pub fn open_state(&self) -> Arc<ConfigurationObject> {
        self.cm.obtain(&self.state_path())
    }

    /// Remove the persisted plugin state, if any.
    pub fn delete_state(&self) -> Result<(), CoreError> {
        self.cm.obtain(&self.state_path()).delete()
    }
}

/// Manage settings for one data source.
#[derive(Clone)]
pub struct DataSourceConfigManager {
    cm: Arc<ConfigurationManager>,
    source_id: String,
}

impl DataSourceConfigManager {
    pub fn settings_path(&self) -> PathBuf {
        self.cm
            .datasources_dir()
            .join(&self.source_id)
            .join("settings.json")
    }

    pub fn open(&self) -> Arc<ConfigurationObject> {
        self.cm.obtain(&self.settings_path())
    }
}

/// Read-only static resources (fonts) under the source tree.
#[derive(Clone)]
pub struct StaticManager {
    root: PathBuf,
}

impl StaticManager {
    /// Every known font variant with its resolved path.
    pub fn enum_fonts(&self) -> Vec<(FontInfo, PathBuf)> {
        FONT_TABLE
            .iter()
            .map(|info| (info.clone(), self.root.join("fonts").join(info.file)))
            .collect()
    }

    /// Resolve a font family and weight to a file path. Falls back to the
    /// family's first variant when the weight is not available.
    pub fn font_path(&self, family: &str, weight: &str) -> Result<PathBuf, CoreError> {
        let variants: Vec<&FontInfo> =
            FONT_TABLE.iter().filter(|f| f.family == family).collect();
        if variants.is_empty() {
            return Err(CoreError::Unavailable(format!("font family '{family}'")));
        }
        let chosen = variants
            .iter()
            .find(|f| f.weight == weight)
            .unwrap_or(&variants[0]);
        Ok(self.root.join("fonts").join(chosen.file))
    }
}
