// Path: crates/services/src/registry/mod.rs

//! The cartridge registry: semver-guarded registration and action-type
//! routing.
//!
//! The registry is read-mostly. Writes synchronize on a single lock and
//! emit a change event so layered services can rebuild their caches.

use semver::Version;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use switchboard_api::cartridge::Cartridge;
use switchboard_api::interceptor::ExecutionInterceptor;
use switchboard_types::domain::CartridgeManifest;
use switchboard_types::error::RegistryError;
use tokio::sync::broadcast;

/// A change announced to registry listeners.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// A cartridge was registered or upgraded.
    Registered {
        /// The cartridge id.
        id: String,
        /// The version now active.
        version: String,
    },
}

/// One registered cartridge with its interceptor chain.
#[derive(Clone)]
pub struct RegisteredCartridge {
    /// The plugin itself.
    pub cartridge: Arc<dyn Cartridge>,
    /// Manifest snapshot taken at registration.
    pub manifest: CartridgeManifest,
    /// Interceptors wrapped around this cartridge's executions, in order.
    pub interceptors: Vec<Arc<dyn ExecutionInterceptor>>,
    /// Registration sequence, used to break routing ties.
    seq: u64,
}

#[derive(Default)]
struct RegistryInner {
    cartridges: HashMap<String, RegisteredCartridge>,
    next_seq: u64,
}

/// Action-type to cartridge routing with semver-guarded registration.
pub struct CartridgeRegistry {
    inner: RwLock<RegistryInner>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for CartridgeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CartridgeRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            inner: RwLock::new(RegistryInner::default()),
            events,
        }
    }

    /// Subscribes to registry change events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Registers a cartridge under its manifest id.
    ///
    /// Semver discipline: re-registering the same version is rejected,
    /// downgrades are rejected, upgrades replace atomically. Action-type
    /// collisions with other cartridges are warned but not fatal.
    pub fn register(
        &self,
        cartridge: Arc<dyn Cartridge>,
        interceptors: Vec<Arc<dyn ExecutionInterceptor>>,
    ) -> Result<(), RegistryError> {
        let manifest = cartridge.manifest();
        let id = manifest.id.clone();
        let offered = Version::parse(&manifest.version).map_err(|e| {
            RegistryError::InvalidVersion {
                id: id.clone(),
                version: manifest.version.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = inner.cartridges.get(&id) {
            // The stored version parsed at its own registration time.
            let current = Version::parse(&existing.manifest.version).map_err(|e| {
                RegistryError::InvalidVersion {
                    id: id.clone(),
                    version: existing.manifest.version.clone(),
                    reason: e.to_string(),
                }
            })?;
            if offered == current {
                return Err(RegistryError::DuplicateVersion {
                    id,
                    version: manifest.version,
                });
            }
            if offered < current {
                return Err(RegistryError::Downgrade {
                    id,
                    existing: existing.manifest.version.clone(),
                    offered: manifest.version,
                });
            }
        }

        // Warn on action types already declared by other cartridges.
        for action in &manifest.actions {
            for (other_id, other) in inner.cartridges.iter() {
                if other_id != &id && other.manifest.declares(&action.action_type) {
                    tracing::warn!(
                        action_type = %action.action_type,
                        cartridge = %id,
                        collides_with = %other_id,
                        "action type declared by more than one cartridge"
                    );
                }
            }
        }

        let seq = inner.next_seq;
        inner.next_seq += 1;
        let version = manifest.version.clone();
        inner.cartridges.insert(
            id.clone(),
            RegisteredCartridge {
                cartridge,
                manifest,
                interceptors,
                seq,
            },
        );
        drop(inner);

        tracing::info!(cartridge = %id, %version, "cartridge registered");
        let _ = self.events.send(RegistryEvent::Registered { id, version });
        Ok(())
    }

    /// The registered cartridge with the given id.
    pub fn get(&self, id: &str) -> Option<RegisteredCartridge> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cartridges
            .get(id)
            .cloned()
    }

    /// Every registered manifest.
    pub fn manifests(&self) -> Vec<CartridgeManifest> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .cartridges
            .values()
            .map(|c| c.manifest.clone())
            .collect()
    }

    /// Routes an action type to the cartridge handling it.
    ///
    /// Declared actions win; among multiple declarers the most recent
    /// registration wins. With no declarer, falls back to
    /// [`infer_cartridge_id`](Self::infer_cartridge_id).
    pub fn route(&self, action_type: &str) -> Option<RegisteredCartridge> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let declared = inner
            .cartridges
            .values()
            .filter(|c| c.manifest.declares(action_type))
            .max_by_key(|c| c.seq);
        if let Some(found) = declared {
            return Some(found.clone());
        }
        drop(inner);
        let id = self.infer_cartridge_id(action_type)?;
        self.get(&id)
    }

    /// Infers the owning cartridge for an undeclared action type: first by
    /// declared actions, then by longest-prefix match on the manifest id.
    pub fn infer_cartridge_id(&self, action_type: &str) -> Option<String> {
        let inner = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(declared) = inner
            .cartridges
            .values()
            .filter(|c| c.manifest.declares(action_type))
            .max_by_key(|c| c.seq)
        {
            return Some(declared.manifest.id.clone());
        }
        inner
            .cartridges
            .values()
            .filter(|c| {
                action_type.starts_with(&c.manifest.id)
                    && action_type[c.manifest.id.len()..].starts_with('.')
            })
            .max_by_key(|c| c.manifest.id.len())
            .map(|c| c.manifest.id.clone())
    }
}
