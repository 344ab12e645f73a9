//! In-memory identity indexes.
//!
//! # Concurrency
//!
//! Readers and writers may run concurrently. Every index sits behind its own
//! `RwLock`, taken for the duration of one method call and never across an
//! `.await`. Writers are the resolver's refresh paths; two refreshes of the
//! same key may race, in which case the later write wins. Both writes carry
//! the same upstream data, so the maps converge.
//!
//! Entries are overwritten on refresh and never pruned.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use termbridge_core::{OntologyId, OntologyVersionId, ResourceKind, ResourceName, VersionName};

use crate::naming::NamedVersion;

// A poisoned lock only means a writer panicked between two map updates.
// Every write here is a self-contained overwrite, so the data stays usable.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

/// Bijection between ontology ids and resource names for one kind.
#[derive(Debug, Default)]
struct ResourceIndex {
    id_to_name: HashMap<OntologyId, ResourceName>,
    name_to_id: HashMap<ResourceName, OntologyId>,
}

impl ResourceIndex {
    fn insert(&mut self, id: OntologyId, name: ResourceName) {
        if let Some(old_name) = self.id_to_name.insert(id.clone(), name.clone()) {
            if old_name != name && self.name_to_id.get(&old_name) == Some(&id) {
                self.name_to_id.remove(&old_name);
            }
        }
        if let Some(old_id) = self.name_to_id.insert(name.clone(), id.clone()) {
            if old_id != id && self.id_to_name.get(&old_id) == Some(&name) {
                self.id_to_name.remove(&old_id);
            }
        }
    }
}

#[derive(Debug, Default)]
struct VersionIndex {
    name_to_id: HashMap<VersionName, OntologyVersionId>,
    id_to_name: HashMap<OntologyVersionId, VersionName>,
    name_to_resource: HashMap<VersionName, ResourceName>,
    name_to_official: HashMap<VersionName, String>,
    by_disambiguator: HashMap<(ResourceName, String), VersionName>,
    // Several submissions may declare the same official version.
    by_official: HashMap<(ResourceName, String), HashMap<OntologyVersionId, VersionName>>,
}

impl VersionIndex {
    fn insert(&mut self, named: &NamedVersion) {
        let name = &named.version_name;
        let id = &named.version_id;

        if let Some(old_name) = self.id_to_name.insert(id.clone(), name.clone()) {
            if &old_name != name && self.name_to_id.get(&old_name) == Some(id) {
                self.name_to_id.remove(&old_name);
            }
        }
        if let Some(old_id) = self.name_to_id.insert(name.clone(), id.clone()) {
            if &old_id != id && self.id_to_name.get(&old_id) == Some(name) {
                self.id_to_name.remove(&old_id);
            }
        }

        self.name_to_resource
            .insert(name.clone(), named.resource_name.clone());
        if let Some(disambiguator) = &named.disambiguator {
            self.by_disambiguator.insert(
                (named.resource_name.clone(), disambiguator.clone()),
                name.clone(),
            );
        }
        if let Some(official) = &named.official_version {
            self.name_to_official.insert(name.clone(), official.clone());
            self.by_official
                .entry((named.resource_name.clone(), official.clone()))
                .or_default()
                .insert(id.clone(), name.clone());
        }
    }
}

/// Entry counts, for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityStoreStats {
    pub code_systems: usize,
    pub value_sets: usize,
    pub versions: usize,
}

/// Bidirectional name <-> id maps shared by every resolver call.
///
/// Construct one per process and share it through an `Arc`.
#[derive(Debug, Default)]
pub struct IdentityStore {
    code_systems: RwLock<ResourceIndex>,
    value_sets: RwLock<ResourceIndex>,
    versions: RwLock<VersionIndex>,
    backfilled: AtomicBool,
}

impl IdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn resources(&self, kind: ResourceKind) -> &RwLock<ResourceIndex> {
        match kind {
            ResourceKind::CodeSystem => &self.code_systems,
            ResourceKind::ValueSet => &self.value_sets,
        }
    }

    // ------------------------------------------------------------------
    // Resources
    // ------------------------------------------------------------------

    pub fn insert_resource(&self, kind: ResourceKind, id: OntologyId, name: ResourceName) {
        write(self.resources(kind)).insert(id, name);
    }

    pub fn resource_name(&self, kind: ResourceKind, id: &OntologyId) -> Option<ResourceName> {
        read(self.resources(kind)).id_to_name.get(id).cloned()
    }

    pub fn ontology_id(&self, kind: ResourceKind, name: &ResourceName) -> Option<OntologyId> {
        read(self.resources(kind)).name_to_id.get(name).cloned()
    }

    /// The kind under which `id` is known, code systems first.
    pub fn kind_of(&self, id: &OntologyId) -> Option<ResourceKind> {
        ResourceKind::ALL
            .into_iter()
            .find(|kind| read(self.resources(*kind)).id_to_name.contains_key(id))
    }

    /// The resource name of `id` under any kind, code systems first.
    pub fn any_resource_name(&self, id: &OntologyId) -> Option<ResourceName> {
        ResourceKind::ALL
            .into_iter()
            .find_map(|kind| self.resource_name(kind, id))
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Record a named batch and mark that a backfill has happened.
    pub fn insert_versions(&self, batch: &[NamedVersion]) {
        {
            let mut versions = write(&self.versions);
            for named in batch {
                versions.insert(named);
            }
        }
        self.backfilled.store(true, Ordering::Release);
    }

    pub fn version_name(&self, id: &OntologyVersionId) -> Option<VersionName> {
        read(&self.versions).id_to_name.get(id).cloned()
    }

    pub fn version_id(&self, name: &VersionName) -> Option<OntologyVersionId> {
        read(&self.versions).name_to_id.get(name).cloned()
    }

    pub fn resource_of_version(&self, name: &VersionName) -> Option<ResourceName> {
        read(&self.versions).name_to_resource.get(name).cloned()
    }

    pub fn official_version(&self, name: &VersionName) -> Option<String> {
        read(&self.versions).name_to_official.get(name).cloned()
    }

    pub fn version_by_disambiguator(
        &self,
        resource: &ResourceName,
        disambiguator: &str,
    ) -> Option<VersionName> {
        read(&self.versions)
            .by_disambiguator
            .get(&(resource.clone(), disambiguator.to_string()))
            .cloned()
    }

    /// The one version of `resource` declaring `official`, if exactly one does.
    pub fn version_by_official(
        &self,
        resource: &ResourceName,
        official: &str,
    ) -> Option<VersionName> {
        let versions = read(&self.versions);
        let matches = versions
            .by_official
            .get(&(resource.clone(), official.to_string()))?;
        match matches.len() {
            1 => matches.values().next().cloned(),
            _ => None,
        }
    }

    /// Every version of `resource` declaring `official`, sorted.
    pub fn versions_by_official(&self, resource: &ResourceName, official: &str) -> Vec<VersionName> {
        let mut names: Vec<VersionName> = read(&self.versions)
            .by_official
            .get(&(resource.clone(), official.to_string()))
            .map(|matches| matches.values().cloned().collect())
            .unwrap_or_default();
        names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        names
    }

    /// Highest numeric version id known, ignoring non-numeric ids.
    pub fn max_numeric_version_id(&self) -> Option<u64> {
        read(&self.versions)
            .id_to_name
            .keys()
            .filter_map(OntologyVersionId::numeric)
            .max()
    }

    /// Whether any version batch has ever been recorded.
    pub fn has_backfilled(&self) -> bool {
        self.backfilled.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> IdentityStoreStats {
        IdentityStoreStats {
            code_systems: read(&self.code_systems).id_to_name.len(),
            value_sets: read(&self.value_sets).id_to_name.len(),
            versions: read(&self.versions).id_to_name.len(),
        }
    }
}
