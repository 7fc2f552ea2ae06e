//! VM catalog
//!
//! Holds the normalized snapshot of the published VM list. A snapshot is
//! replaced wholesale on every successful refresh and never patched in place.

use parking_lot::RwLock;
use rand::seq::SliceRandom;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use vmdesk_common::{Error, Result, VmDescriptor, VmRecord};

use crate::config::ViewerConfig;

/// Catalog shared between the controller and the refresh loop
pub type SharedCatalog = Arc<RwLock<CatalogStore>>;

/// Normalized VM catalog
#[derive(Debug, Default)]
pub struct CatalogStore {
    viewer: ViewerConfig,
    /// Moderator-sourced records keyed by code
    overlay: HashMap<String, VmRecord>,
    entries: Vec<VmDescriptor>,
    index: HashMap<String, usize>,
    loaded: bool,
}

impl CatalogStore {
    pub fn new(viewer: ViewerConfig) -> Self {
        Self {
            viewer,
            ..Default::default()
        }
    }

    pub fn shared(viewer: ViewerConfig) -> SharedCatalog {
        Arc::new(RwLock::new(Self::new(viewer)))
    }

    /// Install the moderator overlay applied on the next [`replace`](Self::replace).
    ///
    /// The overlay is a mapping of code (or path) to a partial record.
    pub fn set_overlay(&mut self, raw: &Value) -> Result<()> {
        let map = raw
            .as_object()
            .ok_or_else(|| Error::CatalogInvalid("overlay is not an object".to_string()))?;

        let mut overlay = HashMap::new();
        for (key, value) in map {
            match serde_json::from_value::<VmRecord>(value.clone()) {
                Ok(record) => {
                    if let Some(code) = record.resolve_code(key) {
                        overlay.insert(code, record);
                    }
                }
                Err(e) => warn!("Skipping overlay entry {}: {}", key, e),
            }
        }

        debug!("Installed moderator overlay with {} entries", overlay.len());
        self.overlay = overlay;
        Ok(())
    }

    pub fn clear_overlay(&mut self) {
        self.overlay.clear();
    }

    /// Replace the catalog from a raw `path -> record` payload.
    ///
    /// On error the previous snapshot is kept untouched.
    pub fn replace(&mut self, raw: &Value) -> Result<usize> {
        let map = match raw {
            Value::Object(map) if !map.is_empty() => map,
            Value::Object(_) => return Err(Error::CatalogInvalid("catalog is empty".to_string())),
            Value::Null => return Err(Error::CatalogInvalid("catalog is null".to_string())),
            _ => return Err(Error::CatalogInvalid("catalog is not an object".to_string())),
        };

        if let Some((path, _)) = map.iter().find(|(_, v)| !v.is_object()) {
            return Err(Error::CatalogInvalid(format!("entry {} is not an object", path)));
        }

        let mut entries: Vec<VmDescriptor> = Vec::with_capacity(map.len());
        let mut index = HashMap::with_capacity(map.len());
        let mut normalized = 0usize;

        for (path, value) in map {
            let public: VmRecord = match serde_json::from_value(value.clone()) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping catalog entry {}: {}", path, e);
                    continue;
                }
            };

            let merged = match public
                .resolve_code(path)
                .and_then(|code| self.overlay.get(&code))
            {
                Some(over) => public.overlay(over),
                None => public,
            };

            match merged.normalize(path) {
                Ok(vm) => {
                    normalized += 1;
                    self.push_visible(vm, &mut entries, &mut index);
                }
                Err(e) => warn!("Skipping catalog entry {}: {}", path, e),
            }
        }

        // Overlay entries the public list does not know about
        for (code, record) in &self.overlay {
            if index.contains_key(code) {
                continue;
            }
            match record.normalize(code) {
                Ok(vm) => {
                    normalized += 1;
                    self.push_visible(vm, &mut entries, &mut index);
                }
                Err(e) => debug!("Overlay entry {} not injectable: {}", code, e),
            }
        }

        if normalized == 0 {
            return Err(Error::CatalogInvalid("no usable entries".to_string()));
        }

        let count = entries.len();
        self.entries = entries;
        self.index = index;
        self.loaded = true;

        info!("Catalog replaced: {} VMs", count);
        Ok(count)
    }

    fn push_visible(
        &self,
        vm: VmDescriptor,
        entries: &mut Vec<VmDescriptor>,
        index: &mut HashMap<String, usize>,
    ) {
        if vm.access.is_hidden && !self.can_see_hidden(&vm) {
            debug!("Hiding VM {}", vm.code);
            return;
        }
        if index.contains_key(&vm.code) {
            warn!("Duplicate VM code {} ignored", vm.code);
            return;
        }
        index.insert(vm.code.clone(), entries.len());
        entries.push(vm);
    }

    fn can_see_hidden(&self, vm: &VmDescriptor) -> bool {
        if self.viewer.is_moderator {
            return true;
        }
        match (&self.viewer.identity, &vm.owner) {
            (Some(me), Some(owner)) => me == owner,
            _ => false,
        }
    }

    /// Whether at least one replace has succeeded
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, code: &str) -> Option<&VmDescriptor> {
        self.index.get(code).map(|&i| &self.entries[i])
    }

    /// VMs in catalog order
    pub fn iter(&self) -> impl Iterator<Item = &VmDescriptor> {
        self.entries.iter()
    }

    pub fn first(&self) -> Option<&VmDescriptor> {
        self.entries.first()
    }

    /// Uniform sample among spawnable VMs, falling back to the first entry.
    pub fn auto_spawn_candidate(&self) -> Option<String> {
        let pool: Vec<&VmDescriptor> = self.entries.iter().filter(|vm| vm.is_spawnable()).collect();
        pool.choose(&mut rand::thread_rng())
            .map(|vm| vm.code.clone())
            .or_else(|| self.first().map(|vm| vm.code.clone()))
    }

    /// Pick a VM to route to after rules for `declined` were refused.
    ///
    /// VMs that will not prompt again are preferred: no agreement
    /// requirement, or rules already accepted (as judged by `accepted`).
    /// Any other spawnable VM is the fallback.
    pub fn alternative_for<F>(&self, declined: &str, accepted: F) -> Option<String>
    where
        F: Fn(&VmDescriptor) -> bool,
    {
        let (preferred, others): (Vec<&VmDescriptor>, Vec<&VmDescriptor>) = self
            .entries
            .iter()
            .filter(|vm| vm.code != declined && vm.is_spawnable())
            .partition(|vm| !vm.requires_agreement() || (!vm.always_read_rules && accepted(vm)));

        let mut rng = rand::thread_rng();
        preferred
            .choose(&mut rng)
            .or_else(|| others.choose(&mut rng))
            .map(|vm| vm.code.clone())
    }

    /// Match a navigation path against the catalog for deep links.
    pub fn resolve_from_path(&self, path: &str) -> Option<String> {
        let path = path
            .split(['?', '#'])
            .next()
            .unwrap_or("")
            .trim_end_matches('/');
        if path.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .find(|vm| {
                path == vm.code
                    || path
                        .strip_suffix(vm.code.as_str())
                        .map_or(false, |rest| rest.ends_with('/'))
            })
            .map(|vm| vm.code.clone())
    }
}
