use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use geo::MultiPolygon;
use parking_lot::RwLock;

use super::{Artifact, ArtifactKey, ArtifactKind, Properties, StorageSink};
use crate::Result;

/// In-memory sink. Counts writes so resumed runs can be checked.
#[derive(Debug, Default)]
pub struct MemorySink {
    artifacts: RwLock<BTreeMap<ArtifactKey, Artifact>>,
    writes: AtomicUsize,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of successful `put` calls since creation.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.artifacts.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.read().is_empty()
    }

    pub fn keys(&self) -> Vec<ArtifactKey> {
        self.artifacts.read().keys().cloned().collect()
    }

    pub fn keys_of(&self, kind: ArtifactKind) -> Vec<ArtifactKey> {
        self.artifacts
            .read()
            .keys()
            .filter(|k| k.kind == kind)
            .cloned()
            .collect()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.read().values().cloned().collect()
    }
}

impl StorageSink for MemorySink {
    fn put(&self, key: &ArtifactKey, geometry: &MultiPolygon<f64>, properties: &Properties) -> Result<()> {
        let artifact = Artifact {
            key: key.clone(),
            geometry: geometry.clone(),
            properties: properties.clone(),
        };
        self.artifacts.write().insert(key.clone(), artifact);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn exists(&self, key: &ArtifactKey) -> Result<bool> {
        Ok(self.artifacts.read().contains_key(key))
    }

    fn get(&self, key: &ArtifactKey) -> Result<Option<Artifact>> {
        Ok(self.artifacts.read().get(key).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use rayon::prelude::*;

    #[test]
    fn test_concurrent_distinct_writes() {
        let sink = MemorySink::new();
        let geometry = MultiPolygon::new(vec![polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 0.0, y: 1.0)]]);
        (0..64).into_par_iter().for_each(|i| {
            let key = ArtifactKey::unit(&format!("AB1 {}AA", i % 10));
            let key = ArtifactKey::new(key.kind, format!("{}-{}", key.name, i));
            sink.put(&key, &geometry, &Properties::new()).unwrap();
        });
        assert_eq!(sink.writes(), 64);
        assert_eq!(sink.len(), 64);
        assert_eq!(sink.keys_of(ArtifactKind::Unit).len(), 64);
    }

    #[test]
    fn test_exists_and_get() {
        let sink = MemorySink::new();
        let key = ArtifactKey::sector("AB1 2");
        assert!(!sink.exists(&key).unwrap());
        assert!(sink.get(&key).unwrap().is_none());
        sink.put(&key, &MultiPolygon::new(Vec::new()), &Properties::new()).unwrap();
        assert!(sink.exists(&key).unwrap());
        assert_eq!(sink.get(&key).unwrap().unwrap().key, key);
    }
}
