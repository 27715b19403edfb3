//! # Vector store
//!
//! In-process vector index keyed by collection name, behind the [`VectorIndex`]
//! capability trait:
//!
//! - [`VectorIndex::create_collection`] declares a collection's dimension and [`Distance`].
//! - [`VectorIndex::upsert`] stores `(id, vector, payload)` triples ([`IndexEntry`]).
//! - [`VectorIndex::search`] returns up to `limit` [`SearchHit`]s, best first.
//!
//! ## Backends
//! - [`HnswVectorStore`]: approximate nearest neighbours through a
//!   [HNSW](https://arxiv.org/abs/1603.09320) graph (`hora` crate). The graph is rebuilt
//!   after every upsert batch; candidates are re-scored exactly before ranking.
//! - [`FlatVectorStore`]: exact linear scan. Same observable behaviour on small
//!   collections, handy for tests.
//!
//! ## Quick Example
//! ```
//! use patient_rag::vector_store::{Distance, FlatVectorStore, IndexEntry, IndexPayload, VectorIndex};
//! # use patient_rag::models::*;
//! # fn record() -> PatientRecord { serde_json::from_str(r#"{"patient_id":"A1",
//! #   "demographics":{"name":"N","date_of_birth":"1990-01-01","gender":"Female","age":34},
//! #   "medical_history":{},"current_vitals":{"blood_pressure":"120/80","heart_rate":60,
//! #   "temperature":98.1,"weight_kg":60,"height_cm":165},
//! #   "insurance":{"provider":"Aetna","policy_number":"P"}}"#).unwrap() }
//!
//! # fn main() -> patient_rag::error::Result<()> {
//! let mut store = FlatVectorStore::new();
//! store.create_collection("patients", 2, Distance::Cosine)?;
//! store.upsert("patients", vec![IndexEntry {
//!     id: 0,
//!     vector: vec![1.0, 0.0],
//!     payload: IndexPayload::new(record(), "A1 text".into()),
//! }])?;
//! let hits = store.search("patients", &[0.9, 0.1], 1)?;
//! assert_eq!(hits[0].payload.patient_id, "A1");
//! # Ok(()) }
//! ```

use hora::core::ann_index::ANNIndex;
use hora::core::metrics::Metric;
use hora::index::hnsw_idx::HNSWIndex;
use hora::index::hnsw_params::HNSWParams;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::config::IndexBackend;
use crate::error::{RagError, Result};
use crate::models::PatientRecord;

/// Similarity measure of a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distance {
    /// Cosine similarity; higher scores are closer.
    Cosine,
    /// Euclidean distance; lower scores are closer.
    Euclid,
}

impl Distance {
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Distance::Cosine => cosine_similarity(a, b),
            Distance::Euclid => euclidean_distance(a, b),
        }
    }

    /// Ordering that puts the better of two scores first.
    fn rank(&self, a: f32, b: f32) -> Ordering {
        match self {
            Distance::Cosine => b.total_cmp(&a),
            Distance::Euclid => a.total_cmp(&b),
        }
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a > 0.0 && norm_b > 0.0 {
        dot / (norm_a * norm_b)
    } else {
        0.0
    }
}

pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// What is stored next to each vector: the record id, its projected text and the record itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPayload {
    pub patient_id: String,
    pub text: String,
    pub full_record: PatientRecord,
}

impl IndexPayload {
    pub fn new(record: PatientRecord, text: String) -> Self {
        Self {
            patient_id: record.patient_id.clone(),
            text,
            full_record: record,
        }
    }
}

/// One stored point. `id` is the record's ordinal position in the ingested batch.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub id: usize,
    pub vector: Vec<f32>,
    pub payload: IndexPayload,
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: usize,
    pub score: f32,
    pub payload: IndexPayload,
}

/// Store of `(id, vector, payload)` triples with k-nearest-neighbour search.
pub trait VectorIndex {
    /// Create (or replace) a named collection.
    fn create_collection(&mut self, name: &str, dimension: usize, distance: Distance)
    -> Result<()>;

    /// Insert entries; an entry whose id already exists replaces it.
    fn upsert(&mut self, name: &str, entries: Vec<IndexEntry>) -> Result<()>;

    /// At most `limit` hits, best first.
    fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<SearchHit>>;

    /// Number of entries in the collection.
    fn count(&self, name: &str) -> Result<usize>;
}

impl<T: VectorIndex + ?Sized> VectorIndex for Box<T> {
    fn create_collection(
        &mut self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<()> {
        (**self).create_collection(name, dimension, distance)
    }

    fn upsert(&mut self, name: &str, entries: Vec<IndexEntry>) -> Result<()> {
        (**self).upsert(name, entries)
    }

    fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        (**self).search(name, query, limit)
    }

    fn count(&self, name: &str) -> Result<usize> {
        (**self).count(name)
    }
}

/// Open an empty index of the configured backend.
pub fn open_index(backend: IndexBackend) -> Box<dyn VectorIndex> {
    match backend {
        IndexBackend::Hnsw => Box::new(HnswVectorStore::new()),
        IndexBackend::Flat => Box::new(FlatVectorStore::new()),
    }
}

/// Entries of one collection plus its declared shape.
#[derive(Debug)]
struct Collection {
    dimension: usize,
    distance: Distance,
    entries: BTreeMap<usize, IndexEntry>,
}

impl Collection {
    fn new(dimension: usize, distance: Distance) -> Self {
        Self {
            dimension,
            distance,
            entries: BTreeMap::new(),
        }
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::Index(format!(
                "dimension mismatch: expected {}, got {}",
                self.dimension,
                vector.len()
            )));
        }
        Ok(())
    }

    fn insert_all(&mut self, entries: Vec<IndexEntry>) -> Result<()> {
        for entry in &entries {
            self.check_dimension(&entry.vector)?;
        }
        for entry in entries {
            self.entries.insert(entry.id, entry);
        }
        Ok(())
    }

    /// Score `ids` against `query`, keep the best `limit`.
    fn rank<'a>(
        &self,
        ids: impl Iterator<Item = &'a usize>,
        query: &[f32],
        limit: usize,
    ) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = ids
            .filter_map(|id| self.entries.get(id))
            .map(|entry| SearchHit {
                id: entry.id,
                score: self.distance.score(query, &entry.vector),
                payload: entry.payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| self.distance.rank(a.score, b.score).then(a.id.cmp(&b.id)));
        hits.truncate(limit);
        hits
    }
}

fn missing(name: &str) -> RagError {
    RagError::Index(format!("collection `{name}` does not exist"))
}

/// Exact nearest-neighbour search by scanning every entry.
#[derive(Debug, Default)]
pub struct FlatVectorStore {
    collections: HashMap<String, Collection>,
}

impl FlatVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for FlatVectorStore {
    fn create_collection(
        &mut self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<()> {
        if dimension == 0 {
            return Err(RagError::Index("collection dimension must be non-zero".into()));
        }
        self.collections
            .insert(name.to_string(), Collection::new(dimension, distance));
        Ok(())
    }

    fn upsert(&mut self, name: &str, entries: Vec<IndexEntry>) -> Result<()> {
        let collection = self.collections.get_mut(name).ok_or_else(|| missing(name))?;
        collection.insert_all(entries)
    }

    fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let collection = self.collections.get(name).ok_or_else(|| missing(name))?;
        collection.check_dimension(query)?;
        Ok(collection.rank(collection.entries.keys(), query, limit))
    }

    fn count(&self, name: &str) -> Result<usize> {
        let collection = self.collections.get(name).ok_or_else(|| missing(name))?;
        Ok(collection.entries.len())
    }
}

/// A collection and the HNSW graph built over its entries.
struct HnswCollection {
    collection: Collection,
    graph: Option<HNSWIndex<f32, usize>>,
}

impl HnswCollection {
    /// Vector as handed to the graph. Cosine collections index unit vectors under the
    /// Euclidean metric, which orders neighbours the same way cosine similarity does.
    fn graph_vector(&self, vector: &[f32]) -> Vec<f32> {
        match self.collection.distance {
            Distance::Cosine => {
                let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    vector.iter().map(|x| x / norm).collect()
                } else {
                    vector.to_vec()
                }
            }
            Distance::Euclid => vector.to_vec(),
        }
    }

    fn rebuild(&mut self) -> Result<()> {
        if self.collection.entries.is_empty() {
            self.graph = None;
            return Ok(());
        }
        let mut graph = HNSWIndex::<f32, usize>::new(
            self.collection.dimension,
            &HNSWParams::<f32>::default(),
        );
        for (id, entry) in &self.collection.entries {
            graph
                .add(&self.graph_vector(&entry.vector), *id)
                .map_err(|e| RagError::Index(format!("add failed: {e}")))?;
        }
        graph
            .build(Metric::Euclidean)
            .map_err(|e| RagError::Index(format!("build failed: {e}")))?;
        debug!(
            "Rebuilt HNSW graph over {} entries",
            self.collection.entries.len()
        );
        self.graph = Some(graph);
        Ok(())
    }
}

/// Approximate nearest-neighbour search over an HNSW graph.
#[derive(Default)]
pub struct HnswVectorStore {
    collections: HashMap<String, HnswCollection>,
}

impl HnswVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for HnswVectorStore {
    fn create_collection(
        &mut self,
        name: &str,
        dimension: usize,
        distance: Distance,
    ) -> Result<()> {
        if dimension == 0 {
            return Err(RagError::Index("collection dimension must be non-zero".into()));
        }
        self.collections.insert(
            name.to_string(),
            HnswCollection {
                collection: Collection::new(dimension, distance),
                graph: None,
            },
        );
        Ok(())
    }

    fn upsert(&mut self, name: &str, entries: Vec<IndexEntry>) -> Result<()> {
        let hnsw = self.collections.get_mut(name).ok_or_else(|| missing(name))?;
        hnsw.collection.insert_all(entries)?;
        hnsw.rebuild()
    }

    fn search(&self, name: &str, query: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let hnsw = self.collections.get(name).ok_or_else(|| missing(name))?;
        hnsw.collection.check_dimension(query)?;
        let Some(graph) = hnsw.graph.as_ref() else {
            return Ok(Vec::new());
        };
        if limit == 0 {
            return Ok(Vec::new());
        }
        let candidates = graph.search(&hnsw.graph_vector(query), limit);
        Ok(hnsw.collection.rank(candidates.iter(), query, limit))
    }

    fn count(&self, name: &str) -> Result<usize> {
        let hnsw = self.collections.get(name).ok_or_else(|| missing(name))?;
        Ok(hnsw.collection.entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::patient;

    fn entry(id: usize, patient_id: &str, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id,
            vector,
            payload: IndexPayload::new(patient(patient_id, "Asthma"), format!("{patient_id} text")),
        }
    }

    fn seeded(store: &mut dyn VectorIndex) {
        store.create_collection("patients", 3, Distance::Cosine).unwrap();
        store
            .upsert(
                "patients",
                vec![
                    entry(0, "A1", vec![1.0, 0.0, 0.0]),
                    entry(1, "B2", vec![0.0, 1.0, 0.0]),
                    entry(2, "C3", vec![0.7, 0.7, 0.0]),
                ],
            )
            .unwrap();
    }

    fn backends() -> Vec<Box<dyn VectorIndex>> {
        vec![Box::new(FlatVectorStore::new()), Box::new(HnswVectorStore::new())]
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 3.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_search_ranks_by_cosine_similarity() {
        for mut store in backends() {
            seeded(store.as_mut());
            let hits = store.search("patients", &[0.9, 0.1, 0.0], 3).unwrap();

            let ids: Vec<&str> = hits.iter().map(|h| h.payload.patient_id.as_str()).collect();
            assert_eq!(ids, vec!["A1", "C3", "B2"]);
            assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
        }
    }

    #[test]
    fn test_search_never_exceeds_limit_or_size() {
        for mut store in backends() {
            seeded(store.as_mut());
            assert_eq!(store.search("patients", &[1.0, 0.0, 0.0], 2).unwrap().len(), 2);
            assert_eq!(store.search("patients", &[1.0, 0.0, 0.0], 10).unwrap().len(), 3);
            assert!(store.search("patients", &[1.0, 0.0, 0.0], 0).unwrap().is_empty());
        }
    }

    #[test]
    fn test_upsert_replaces_existing_id() {
        for mut store in backends() {
            seeded(store.as_mut());
            store
                .upsert("patients", vec![entry(1, "Z9", vec![0.0, 0.0, 1.0])])
                .unwrap();

            assert_eq!(store.count("patients").unwrap(), 3);
            let hits = store.search("patients", &[0.0, 0.0, 1.0], 1).unwrap();
            assert_eq!(hits[0].payload.patient_id, "Z9");
        }
    }

    #[test]
    fn test_dimension_mismatch_is_rejected() {
        for mut store in backends() {
            seeded(store.as_mut());
            let err = store
                .upsert("patients", vec![entry(5, "X", vec![1.0, 0.0])])
                .unwrap_err();
            assert!(matches!(err, RagError::Index(_)));
            assert!(store.search("patients", &[1.0], 1).is_err());
            assert_eq!(store.count("patients").unwrap(), 3);
        }
    }

    #[test]
    fn test_unknown_collection() {
        for store in backends() {
            assert!(matches!(
                store.search("nope", &[1.0], 1),
                Err(RagError::Index(_))
            ));
        }
    }

    #[test]
    fn test_recreating_collection_clears_it() {
        for mut store in backends() {
            seeded(store.as_mut());
            store.create_collection("patients", 3, Distance::Cosine).unwrap();
            assert_eq!(store.count("patients").unwrap(), 0);
            assert!(store.search("patients", &[1.0, 0.0, 0.0], 3).unwrap().is_empty());
        }
    }

    #[test]
    fn test_euclid_ranks_smallest_distance_first() {
        let mut store = FlatVectorStore::new();
        store.create_collection("points", 2, Distance::Euclid).unwrap();
        store
            .upsert(
                "points",
                vec![entry(0, "far", vec![10.0, 10.0]), entry(1, "near", vec![1.0, 1.0])],
            )
            .unwrap();
        let hits = store.search("points", &[0.0, 0.0], 2).unwrap();
        assert_eq!(hits[0].payload.patient_id, "near");
        assert!(hits[0].score < hits[1].score);
    }
}
