//! Process-lifetime registry of persistent containers.

use super::Container;
use crate::types::Fingerprint;
use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

type Bucket = HashMap<Fingerprint, Arc<Container>>;

/// Deduplicates freshly discovered containers against the ones already seen.
///
/// Entries are bucketed by concrete resource type, then by fingerprint. At
/// most one container exists per (type, fingerprint) pair, so state recorded
/// against a container survives roster refreshes.
#[derive(Default)]
pub struct ContainerRegistry {
    buckets: RwLock<HashMap<TypeId, Bucket>>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the persistent container equal to `container`, inserting it
    /// if none exists yet.
    pub fn get_or_create(&self, container: Arc<Container>) -> Arc<Container> {
        let mut buckets = self.buckets.write();
        Self::insert_if_absent(&mut buckets, container)
    }

    fn insert_if_absent(
        buckets: &mut HashMap<TypeId, Bucket>,
        container: Arc<Container>,
    ) -> Arc<Container> {
        let bucket = buckets.entry(container.resource_type()).or_default();
        match bucket.get(&container.fingerprint()) {
            Some(existing) => Arc::clone(existing),
            None => {
                debug!(
                    container = %container.simple_name(),
                    fingerprint = %container.fingerprint(),
                    platform = container.platform_name(),
                    "Registered new container"
                );
                bucket.insert(container.fingerprint(), Arc::clone(&container));
                container
            }
        }
    }

    /// Resolve a fresh roster for one platform.
    ///
    /// Every entry is replaced by its persistent counterpart. Containers of
    /// that platform whose fingerprint no longer appears under their type are
    /// removed. Containers owned by other platforms are left alone.
    pub fn reconcile(&self, platform: &str, roster: Vec<Arc<Container>>) -> Vec<Arc<Container>> {
        let mut live: HashMap<TypeId, HashSet<Fingerprint>> = HashMap::new();
        for container in &roster {
            live.entry(container.resource_type())
                .or_default()
                .insert(container.fingerprint());
        }

        let mut buckets = self.buckets.write();
        let resolved: Vec<Arc<Container>> = roster
            .into_iter()
            .map(|c| Self::insert_if_absent(&mut buckets, c))
            .collect();

        let mut removed = 0usize;
        for (type_id, bucket) in buckets.iter_mut() {
            let seen = live.get(type_id);
            bucket.retain(|fingerprint, container| {
                let keep = container.platform_name() != platform
                    || seen.map_or(false, |s| s.contains(fingerprint));
                if !keep {
                    removed += 1;
                }
                keep
            });
        }
        buckets.retain(|_, bucket| !bucket.is_empty());

        if removed > 0 {
            info!(platform, removed, "Removed decommissioned containers");
        }

        resolved
    }

    /// Remove containers of one type owned by `platform` that are not in
    /// `live`.
    pub fn remove_stale<T: 'static>(&self, platform: &str, live: &HashSet<Fingerprint>) -> usize {
        let mut buckets = self.buckets.write();
        let Some(bucket) = buckets.get_mut(&TypeId::of::<T>()) else {
            return 0;
        };
        let before = bucket.len();
        bucket.retain(|fingerprint, container| {
            container.platform_name() != platform || live.contains(fingerprint)
        });
        before - bucket.len()
    }

    /// Look a container up by fingerprint across every type.
    pub fn get(&self, fingerprint: Fingerprint) -> Option<Arc<Container>> {
        self.buckets
            .read()
            .values()
            .find_map(|bucket| bucket.get(&fingerprint).cloned())
    }

    /// Snapshot of every registered container.
    pub fn containers(&self) -> Vec<Arc<Container>> {
        self.buckets
            .read()
            .values()
            .flat_map(|bucket| bucket.values().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.buckets.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
