//! # Retrieval pipeline
//!
//! Orchestrates the three capabilities ([`Embedder`], [`VectorIndex`], [`Completer`])
//! into retrieval-augmented question answering over patient records.
//!
//! ## Flow
//! - **ingest**: record → [`patient_to_text`] → embedding → staged [`IndexEntry`]
//!   (id = ordinal position) → one batch upsert.
//! - **retrieve**: embed the question → top-k search by cosine similarity.
//! - **answer**: render the grounding prompt → one completion call.
//! - **query**: `retrieve` followed by `answer`.
//!
//! `retrieve` and `answer` report their own wall-clock latency in milliseconds.
//!
//! ## Quick Example
//! ```no_run
//! use patient_rag::{api::OpenAiCompleter, config::RagConfig, pipeline::RetrievalPipeline};
//! use patient_rag::{embeddings::load_embedder, vector_store::open_index};
//!
//! # async fn run() -> patient_rag::error::Result<()> {
//! let config = RagConfig::default().apply_env()?;
//! let mut pipeline = RetrievalPipeline::new(
//!     &config,
//!     load_embedder(&config.embedding_model, config.vector_size)?,
//!     open_index(config.index_backend),
//!     OpenAiCompleter::new(&config),
//! )?;
//! pipeline.ingest_file(&config.patient_data_path)?;
//! let outcome = pipeline.query("Which patients have asthma?").await?;
//! println!("{} ({:.0} ms)", outcome.answer.text, outcome.answer.latency_ms);
//! # Ok(()) }
//! ```

use indicatif::{ParallelProgressIterator, ProgressBar, ProgressStyle};
use rayon::prelude::*;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

use crate::api::Completer;
use crate::config::RagConfig;
use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use crate::models::{PatientRecord, load_records};
use crate::projector::patient_to_text;
use crate::template::PromptTemplate;
use crate::vector_store::{Distance, IndexEntry, IndexPayload, SearchHit, VectorIndex};

/// Ranked hits plus the time spent embedding and searching.
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub hits: Vec<SearchHit>,
    pub latency_ms: f64,
}

/// Generated text plus the time spent building the prompt and completing it.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub latency_ms: f64,
}

/// Result of [`RetrievalPipeline::query`].
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub retrieval: Retrieval,
    pub answer: Answer,
}

/// Values the pipeline reads from [`RagConfig`] at construction.
#[derive(Debug, Clone)]
struct Settings {
    collection: String,
    dimension: usize,
    top_k: usize,
    temperature: f32,
    max_tokens: u32,
}

pub struct RetrievalPipeline<E, I, C> {
    embedder: E,
    index: I,
    completer: C,
    template: PromptTemplate,
    settings: Settings,
    loaded: bool,
    ingested: usize,
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Project and embed one record into a staged entry.
fn stage<E: Embedder>(embedder: &E, ordinal: usize, record: &PatientRecord) -> Result<IndexEntry> {
    let text = patient_to_text(record);
    let vector = embedder.encode(&text).map_err(|e| RagError::Ingest {
        ordinal,
        patient_id: record.patient_id.clone(),
        source: Box::new(e),
    })?;
    Ok(IndexEntry {
        id: ordinal,
        vector,
        payload: IndexPayload::new(record.clone(), text),
    })
}

fn progress_bar(len: usize) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar.set_message("embedding records");
    bar
}

impl<E, I, C> RetrievalPipeline<E, I, C>
where
    E: Embedder,
    I: VectorIndex,
    C: Completer,
{
    /// Create the collection and wire the capabilities together.
    ///
    /// # Errors
    /// [`RagError::Config`] if the embedder's dimension differs from
    /// `config.vector_size`, or the configuration is otherwise invalid.
    pub fn new(config: &RagConfig, embedder: E, mut index: I, completer: C) -> Result<Self> {
        config.validate()?;
        if embedder.dimension() != config.vector_size {
            return Err(RagError::Config(format!(
                "embedder produces {}-dimensional vectors but vector_size is {}",
                embedder.dimension(),
                config.vector_size
            )));
        }

        index.create_collection(&config.collection_name, config.vector_size, Distance::Cosine)?;

        Ok(Self {
            embedder,
            index,
            completer,
            template: PromptTemplate::default(),
            settings: Settings {
                collection: config.collection_name.clone(),
                dimension: config.vector_size,
                top_k: config.top_k,
                temperature: config.temperature,
                max_tokens: config.max_tokens,
            },
            loaded: false,
            ingested: 0,
        })
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Whether an ingestion has completed.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    /// Records in the index after the last successful ingestion.
    pub fn ingested(&self) -> usize {
        self.ingested
    }

    pub fn top_k(&self) -> usize {
        self.settings.top_k
    }

    /// Index `records`, replacing anything ingested before.
    ///
    /// Projection and embedding run in parallel; ids are the records' positions
    /// in `records`, so the resulting index does not depend on scheduling.
    /// The previous collection is only replaced once every record has been
    /// embedded.
    ///
    /// # Errors
    /// [`RagError::Ingest`] for the lowest-positioned record whose embedding
    /// failed, or the index error from the batch upsert. On an embedding failure
    /// nothing is upserted and the previous ingestion stays searchable.
    pub fn ingest(&mut self, records: &[PatientRecord]) -> Result<usize> {
        let bar = progress_bar(records.len());
        let embedder = &self.embedder;
        let staged: Vec<Result<IndexEntry>> = records
            .par_iter()
            .enumerate()
            .progress_with(bar.clone())
            .map(|(ordinal, record)| stage(embedder, ordinal, record))
            .collect();
        bar.finish_and_clear();
        let entries = staged.into_iter().collect::<Result<Vec<_>>>()?;

        if self.loaded {
            debug!("Recreating collection {}", self.settings.collection);
            self.loaded = false;
            self.ingested = 0;
            self.index.create_collection(
                &self.settings.collection,
                self.settings.dimension,
                Distance::Cosine,
            )?;
        }

        let count = entries.len();
        self.index.upsert(&self.settings.collection, entries)?;

        self.loaded = true;
        self.ingested = count;
        info!("Loaded {count} patient records");
        Ok(count)
    }

    /// Load the record file at `path` and ingest it.
    pub fn ingest_file(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let records = load_records(path)?;
        self.ingest(&records)
    }

    /// The `k` records most similar to `query`, best first.
    ///
    /// # Errors
    /// [`RagError::NotIngested`] before the first successful ingestion.
    pub fn retrieve(&self, query: &str, k: usize) -> Result<Retrieval> {
        if !self.loaded {
            return Err(RagError::NotIngested);
        }
        let start = Instant::now();
        let vector = self.embedder.encode(query)?;
        let hits = self.index.search(&self.settings.collection, &vector, k)?;
        let latency_ms = elapsed_ms(start);
        info!("Retrieved {} records in {latency_ms:.1} ms", hits.len());
        Ok(Retrieval { hits, latency_ms })
    }

    /// Ask the completer to answer `query` using only `hits` as context.
    pub async fn answer(&self, query: &str, hits: &[SearchHit]) -> Result<Answer> {
        let start = Instant::now();
        let prompt = self.template.render(query, hits);
        debug!("Prompt: {prompt}");
        let text = self
            .completer
            .complete(&prompt, self.settings.temperature, self.settings.max_tokens)
            .await?;
        let latency_ms = elapsed_ms(start);
        info!("Generated answer in {latency_ms:.1} ms");
        Ok(Answer { text, latency_ms })
    }

    /// `retrieve` with the configured top-k, then `answer`.
    pub async fn query(&self, question: &str) -> Result<QueryOutcome> {
        let retrieval = self.retrieve(question, self.settings.top_k)?;
        let answer = self.answer(question, &retrieval.hits).await?;
        Ok(QueryOutcome { retrieval, answer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::HashEmbedder;
    use crate::models::fixtures::{patient, visit};
    use crate::vector_store::{FlatVectorStore, HnswVectorStore};
    use std::sync::Mutex;

    /// Echoes the prompt back and remembers it.
    #[derive(Default)]
    struct EchoCompleter {
        prompts: Mutex<Vec<String>>,
    }

    impl Completer for EchoCompleter {
        async fn complete(&self, prompt: &str, _temperature: f32, _max_tokens: u32) -> Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(format!("echo: {prompt}"))
        }
    }

    /// Fails on any text mentioning `poison`.
    struct FlakyEmbedder {
        inner: HashEmbedder,
        poison: &'static str,
    }

    impl Embedder for FlakyEmbedder {
        fn dimension(&self) -> usize {
            self.inner.dimension()
        }

        fn encode(&self, text: &str) -> Result<Vec<f32>> {
            if text.contains(self.poison) {
                return Err(RagError::Embedding("model unavailable".into()));
            }
            self.inner.encode(text)
        }
    }

    fn config() -> RagConfig {
        RagConfig {
            top_k: 5,
            ..RagConfig::default()
        }
    }

    fn records() -> Vec<PatientRecord> {
        let a1 = patient("A1", "Asthma");
        let mut b2 = patient("B2", "Hypertension");
        b2.visit_history.push(visit("stable"));
        vec![a1, b2]
    }

    fn pipeline() -> RetrievalPipeline<HashEmbedder, FlatVectorStore, EchoCompleter> {
        RetrievalPipeline::new(
            &config(),
            HashEmbedder::new(384),
            FlatVectorStore::new(),
            EchoCompleter::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_ingest_indexes_every_record_by_position() {
        let mut pipeline = pipeline();
        let records = records();
        assert_eq!(pipeline.ingest(&records).unwrap(), 2);
        assert!(pipeline.is_loaded());
        assert_eq!(pipeline.ingested(), 2);
        assert_eq!(pipeline.index.count("patient_records").unwrap(), 2);

        let hits = pipeline.retrieve("patient", 10).unwrap().hits;
        assert_eq!(hits.len(), 2);
        for hit in hits {
            assert_eq!(hit.payload.patient_id, records[hit.id].patient_id);
            assert_eq!(hit.payload.full_record, records[hit.id]);
            assert_eq!(hit.payload.text, patient_to_text(&records[hit.id]));
        }
    }

    #[test]
    fn test_retrieve_finds_matching_condition() {
        let mut pipeline = pipeline();
        pipeline.ingest(&records()).unwrap();

        let retrieval = pipeline.retrieve("asthma", 1).unwrap();
        assert_eq!(retrieval.hits.len(), 1);
        assert_eq!(retrieval.hits[0].payload.patient_id, "A1");
        assert!(retrieval.latency_ms >= 0.0);

        let retrieval = pipeline.retrieve("hypertension stable", 1).unwrap();
        assert_eq!(retrieval.hits[0].payload.patient_id, "B2");
    }

    #[test]
    fn test_retrieve_with_hnsw_backend() {
        let mut pipeline = RetrievalPipeline::new(
            &config(),
            HashEmbedder::new(384),
            HnswVectorStore::new(),
            EchoCompleter::default(),
        )
        .unwrap();
        pipeline.ingest(&records()).unwrap();

        let hits = pipeline.retrieve("asthma", 5).unwrap().hits;
        assert!(!hits.is_empty() && hits.len() <= 2);
        assert_eq!(hits[0].payload.patient_id, "A1");
    }

    #[test]
    fn test_retrieve_before_ingest_is_rejected() {
        let pipeline = pipeline();
        assert!(matches!(
            pipeline.retrieve("asthma", 1),
            Err(RagError::NotIngested)
        ));
    }

    #[test]
    fn test_dimension_mismatch_is_config_error() {
        let result = RetrievalPipeline::new(
            &config(),
            HashEmbedder::new(128),
            FlatVectorStore::new(),
            EchoCompleter::default(),
        );
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_failed_embedding_aborts_whole_batch() {
        let mut pipeline = RetrievalPipeline::new(
            &config(),
            FlakyEmbedder {
                inner: HashEmbedder::new(384),
                poison: "Hypertension",
            },
            FlatVectorStore::new(),
            EchoCompleter::default(),
        )
        .unwrap();

        let err = pipeline.ingest(&records()).unwrap_err();
        match err {
            RagError::Ingest {
                ordinal,
                patient_id,
                ..
            } => {
                assert_eq!(ordinal, 1);
                assert_eq!(patient_id, "B2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!pipeline.is_loaded());
        assert_eq!(pipeline.index.count("patient_records").unwrap(), 0);
    }

    #[test]
    fn test_reingest_replaces_previous_records() {
        let mut pipeline = pipeline();
        pipeline.ingest(&records()).unwrap();
        pipeline.ingest(&[patient("C3", "COPD")]).unwrap();

        assert_eq!(pipeline.ingested(), 1);
        let hits = pipeline.retrieve("asthma", 10).unwrap().hits;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.patient_id, "C3");
    }

    #[test]
    fn test_failed_reingest_keeps_previous_index() {
        let mut pipeline = RetrievalPipeline::new(
            &config(),
            FlakyEmbedder {
                inner: HashEmbedder::new(384),
                poison: "COPD",
            },
            FlatVectorStore::new(),
            EchoCompleter::default(),
        )
        .unwrap();
        pipeline.ingest(&records()).unwrap();

        let err = pipeline
            .ingest(&[patient("C3", "Asthma"), patient("D4", "COPD")])
            .unwrap_err();
        assert!(matches!(err, RagError::Ingest { ordinal: 1, .. }), "got {err:?}");

        assert!(pipeline.is_loaded());
        assert_eq!(pipeline.ingested(), 2);
        assert_eq!(pipeline.index.count("patient_records").unwrap(), 2);
        let hits = pipeline.retrieve("asthma", 1).unwrap().hits;
        assert_eq!(hits[0].payload.patient_id, "A1");
    }

    #[test]
    fn test_lowest_failing_position_is_reported() {
        let mut pipeline = RetrievalPipeline::new(
            &config(),
            FlakyEmbedder {
                inner: HashEmbedder::new(384),
                poison: "COPD",
            },
            FlatVectorStore::new(),
            EchoCompleter::default(),
        )
        .unwrap();

        let mut batch: Vec<PatientRecord> = (0..64)
            .map(|i| patient(&format!("P{i}"), "COPD"))
            .collect();
        batch[0] = patient("OK", "Asthma");

        for _ in 0..4 {
            match pipeline.ingest(&batch).unwrap_err() {
                RagError::Ingest {
                    ordinal,
                    patient_id,
                    ..
                } => {
                    assert_eq!(ordinal, 1);
                    assert_eq!(patient_id, "P1");
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
        assert!(!pipeline.is_loaded());
    }

    #[test]
    fn test_ingest_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patients.json");
        crate::models::save_records(&path, &records()).unwrap();

        let mut pipeline = pipeline();
        assert_eq!(pipeline.ingest_file(&path).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_answer_prompt_contains_ranked_context() {
        let mut pipeline = pipeline();
        pipeline.ingest(&records()).unwrap();

        let retrieval = pipeline.retrieve("asthma", 2).unwrap();
        let answer = pipeline
            .answer("Who has asthma?", &retrieval.hits)
            .await
            .unwrap();

        let prompts = pipeline.completer.prompts.lock().unwrap();
        let prompt = &prompts[0];
        assert!(answer.text.starts_with("echo: "));
        assert!(answer.latency_ms >= 0.0);
        assert!(prompt.contains("Patient A1: Patient ID: A1 |"));
        assert!(prompt.find("Patient A1:").unwrap() < prompt.find("Patient B2:").unwrap());
        assert!(prompt.contains("Question: Who has asthma?"));
    }

    #[tokio::test]
    async fn test_answer_with_no_hits_still_calls_completer() {
        let pipeline = pipeline();
        let answer = pipeline.answer("Anyone?", &[]).await.unwrap();
        assert!(answer.text.contains("Question: Anyone?"));
        assert_eq!(pipeline.completer.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_uses_configured_top_k() {
        let mut pipeline = RetrievalPipeline::new(
            &RagConfig {
                top_k: 1,
                ..RagConfig::default()
            },
            HashEmbedder::new(384),
            FlatVectorStore::new(),
            EchoCompleter::default(),
        )
        .unwrap();
        pipeline.ingest(&records()).unwrap();

        let outcome = pipeline.query("asthma").await.unwrap();
        assert_eq!(outcome.retrieval.hits.len(), 1);
        assert!(outcome.answer.text.contains("Patient A1:"));
        assert!(!outcome.answer.text.contains("Patient B2:"));
    }

    #[tokio::test]
    async fn test_custom_template_is_used() {
        let pipeline = pipeline().with_template(PromptTemplate {
            instructions: "CUSTOM HEADER".into(),
            closing: "CUSTOM CLOSE".into(),
        });
        let answer = pipeline.answer("q", &[]).await.unwrap();
        assert!(answer.text.starts_with("echo: CUSTOM HEADER"));
        assert!(answer.text.ends_with("CUSTOM CLOSE"));
    }
}
