use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use docqa_core::traits::Embedder;
use docqa_core::types::Chunk;
use docqa_core::Error;
use docqa_embed::FakeEmbedder;
use docqa_vector::{retired_path, VectorIndex};
use tempfile::TempDir;

fn chunk(source: &str, index: usize, text: &str) -> Chunk {
    Chunk { source_id: source.to_string(), chunk_index: index, text: text.to_string() }
}

/// Fixed vectors keyed by text, counting every call.
struct TableEmbedder {
    vectors: HashMap<&'static str, Vec<f32>>,
    calls: AtomicUsize,
}

impl TableEmbedder {
    fn new() -> Self {
        let s = std::f32::consts::FRAC_1_SQRT_2;
        let vectors = HashMap::from([
            ("x", vec![1.0, 0.0]),
            ("y", vec![0.0, 1.0]),
            ("xy", vec![s, s]),
            ("-x", vec![-1.0, 0.0]),
        ]);
        Self { vectors, calls: AtomicUsize::new(0) }
    }
}

impl Embedder for TableEmbedder {
    fn dim(&self) -> usize {
        2
    }

    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        texts
            .iter()
            .map(|t| {
                let v = self.vectors.get(t.as_str()).cloned();
                v.ok_or_else(|| anyhow::anyhow!("unknown text {t}"))
            })
            .collect()
    }
}

fn sample_chunks() -> Vec<Chunk> {
    vec![
        chunk("a.pdf", 0, "y"),
        chunk("a.pdf", 1, "xy"),
        chunk("b.pdf", 0, "x"),
        chunk("b.pdf", 1, "-x"),
    ]
}

fn build_sample(tmp: &TempDir) -> VectorIndex {
    VectorIndex::build(&tmp.path().join("index"), &sample_chunks(), &TableEmbedder::new()).unwrap()
}

fn sources(result: &[docqa_core::types::ScoredChunk]) -> Vec<(String, usize)> {
    result.iter().map(|s| (s.chunk.source_id.clone(), s.chunk.chunk_index)).collect()
}

#[test]
fn build_embeds_each_chunk_once_and_load_round_trips() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("index");
    let embedder = TableEmbedder::new();

    let built = VectorIndex::build(&location, &sample_chunks(), &embedder).expect("build");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
    assert_eq!(built.chunk_count(), 4);
    assert!(VectorIndex::exists(&location).unwrap());

    let loaded = VectorIndex::load(&location).expect("load");
    assert_eq!(embedder.calls.load(Ordering::SeqCst), 4, "loading embeds nothing");
    assert_eq!(loaded.dim(), 2);
    assert_eq!(loaded.chunk_count(), 4);

    let mut texts: Vec<String> = loaded.records().iter().map(|r| r.chunk.text.clone()).collect();
    texts.sort();
    assert_eq!(texts, vec!["-x", "x", "xy", "y"]);

    let q = [1.0, 0.0];
    assert_eq!(sources(&built.search(&q, 4).unwrap()), sources(&loaded.search(&q, 4).unwrap()));
}

#[test]
fn search_orders_by_cosine_similarity() {
    let tmp = TempDir::new().unwrap();
    let index = build_sample(&tmp);

    let result = index.search(&[2.0, 0.0], 3).unwrap();
    assert_eq!(
        sources(&result),
        vec![("b.pdf".to_string(), 0), ("a.pdf".to_string(), 1), ("a.pdf".to_string(), 0)]
    );
    assert!((result[0].score - 1.0).abs() < 1e-6);
    assert!((result[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    assert!(result[2].score.abs() < 1e-6);
}

#[test]
fn k_is_clamped_to_chunk_count() {
    let tmp = TempDir::new().unwrap();
    let index = build_sample(&tmp);
    assert_eq!(index.search(&[0.0, 1.0], 50).unwrap().len(), 4);
    assert_eq!(index.search(&[0.0, 1.0], 1).unwrap().len(), 1);
}

#[test]
fn ties_break_on_chunk_index_then_source() {
    let tmp = TempDir::new().unwrap();
    let chunks = vec![
        chunk("b.pdf", 0, "same words"),
        chunk("a.pdf", 1, "same words"),
        chunk("a.pdf", 0, "same words"),
    ];
    let embedder = FakeEmbedder::new(32);
    let index = VectorIndex::build(&tmp.path().join("index"), &chunks, &embedder).unwrap();

    let q = embedder.embed("same words").unwrap();
    let result = index.search(&q, 3).unwrap();
    assert_eq!(
        sources(&result),
        vec![("a.pdf".to_string(), 0), ("b.pdf".to_string(), 0), ("a.pdf".to_string(), 1)]
    );
}

#[test]
fn empty_index_refuses_search() {
    let tmp = TempDir::new().unwrap();
    let never_built = VectorIndex::empty(tmp.path().join("nothing"));
    assert!(matches!(never_built.search(&[1.0, 0.0], 5), Err(Error::EmptyIndex)));

    let location = tmp.path().join("index");
    VectorIndex::build(&location, &[], &TableEmbedder::new()).expect("build empty");
    let loaded = VectorIndex::load(&location).expect("load empty");
    assert_eq!(loaded.chunk_count(), 0);
    assert!(matches!(loaded.search(&[1.0, 0.0], 5), Err(Error::EmptyIndex)));
}

#[test]
fn query_dimension_must_match() {
    let tmp = TempDir::new().unwrap();
    let index = build_sample(&tmp);
    assert!(matches!(
        index.search(&[1.0, 0.0, 0.0], 2),
        Err(Error::DimensionMismatch { expected: 2, actual: 3 })
    ));
}

#[test]
fn load_without_index_is_not_found() {
    let tmp = TempDir::new().unwrap();
    let missing = tmp.path().join("missing");
    assert!(matches!(VectorIndex::load(&missing), Err(Error::IndexNotFound(_))));

    // a directory without index metadata is not an index either
    let stray = tmp.path().join("stray");
    fs::create_dir_all(&stray).unwrap();
    assert!(!VectorIndex::exists(&stray).unwrap());
    assert!(matches!(VectorIndex::load(&stray), Err(Error::IndexNotFound(_))));
}

#[test]
fn build_refuses_to_overwrite() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("index");
    VectorIndex::build(&location, &sample_chunks(), &TableEmbedder::new()).unwrap();
    let err = VectorIndex::build(&location, &sample_chunks(), &TableEmbedder::new()).unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}

#[test]
fn rebuild_replaces_previous_contents() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("index");
    VectorIndex::build(&location, &sample_chunks(), &TableEmbedder::new()).unwrap();

    let rebuilt =
        VectorIndex::rebuild(&location, &[chunk("c.pdf", 0, "x")], &TableEmbedder::new()).unwrap();
    assert_eq!(rebuilt.chunk_count(), 1);
    assert!(!retired_path(&location).exists());

    let loaded = VectorIndex::load(&location).unwrap();
    assert_eq!(loaded.chunk_count(), 1);
    assert_eq!(loaded.records()[0].chunk.source_id, "c.pdf");
    assert_no_staging_left(tmp.path());
}

#[test]
fn failed_rebuild_keeps_old_index() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("index");
    VectorIndex::build(&location, &sample_chunks(), &TableEmbedder::new()).unwrap();

    let bad = [chunk("c.pdf", 0, "unknown")];
    let err = VectorIndex::rebuild(&location, &bad, &TableEmbedder::new()).unwrap_err();
    assert!(matches!(err, Error::Collaborator { .. }));
    assert_eq!(VectorIndex::load(&location).unwrap().chunk_count(), 4);
}

#[test]
fn interrupted_swap_is_repaired_on_load() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("index");
    VectorIndex::build(&location, &sample_chunks(), &TableEmbedder::new()).unwrap();

    // crash after the old index was moved aside but before the new one landed
    fs::rename(&location, retired_path(&location)).unwrap();
    assert!(!location.exists());

    let loaded = VectorIndex::load(&location).expect("restored");
    assert_eq!(loaded.chunk_count(), 4);
    assert!(location.exists());
    assert!(!retired_path(&location).exists());
}

#[test]
fn leftover_staging_does_not_affect_load() {
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("index");
    VectorIndex::build(&location, &sample_chunks(), &TableEmbedder::new()).unwrap();
    fs::create_dir_all(tmp.path().join(".index.staging-abandoned")).unwrap();

    assert!(VectorIndex::exists(&location).unwrap());
    assert_eq!(VectorIndex::load(&location).unwrap().chunk_count(), 4);
}

#[test]
fn embedder_dimension_is_checked() {
    struct Lying;
    impl Embedder for Lying {
        fn dim(&self) -> usize {
            3
        }

        fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }
    let tmp = TempDir::new().unwrap();
    let location = tmp.path().join("index");
    let err = VectorIndex::build(&location, &sample_chunks(), &Lying).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 3, actual: 2 }));
    assert!(!location.exists());
}

fn assert_no_staging_left(dir: &Path) {
    let leftovers: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .filter_map(Result::ok)
        .filter(|e| e.file_name().to_string_lossy().contains(".staging-"))
        .collect();
    assert!(leftovers.is_empty(), "staging directories left behind: {leftovers:?}");
}
