//! Concurrency behavior under batch ingestion.
//!
//! Batch ingestion classifies many documents from a worker pool against the
//! same shared engine. These tests verify that races between concurrently
//! classified documents resolve without double-counting, lost updates, or
//! `is_latest` violations.
#![allow(clippy::panic, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::thread;

use palimpsest::storage::ExhaustiveVectorIndex;
use palimpsest::{
    ChainUpdate, DedupEngine, DocumentId, DuplicateResult, EngineConfig, IngestDocument,
};

fn doc(id: &str, text: &str) -> IngestDocument {
    IngestDocument {
        id: DocumentId::new(id),
        normalized_text: text.to_string(),
        embedding: vec![1.0, 0.0],
    }
}

/// Distinct word vocabulary per document so unrelated documents share no
/// shingles at all.
fn unique_text(doc_idx: usize) -> String {
    (0..60)
        .map(|w| format!("d{doc_idx}w{w}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[test]
fn test_concurrent_batch_resolves_duplicates_exactly_once() {
    const TOTAL: usize = 1000;
    const COPIES: usize = 10;
    const WORKERS: usize = 20;

    let engine = Arc::new(
        DedupEngine::in_memory(Arc::new(ExhaustiveVectorIndex::new()), EngineConfig::default())
            .unwrap(),
    );

    // Ten documents share identical content; the rest are pairwise
    // unrelated. The copies are spread across workers so they genuinely
    // race.
    let duplicate_text = unique_text(usize::MAX);
    let documents: Vec<IngestDocument> = (0..TOTAL)
        .map(|i| {
            if i % (TOTAL / COPIES) == 0 {
                doc(&format!("copy-{i}"), &duplicate_text)
            } else {
                doc(&format!("doc-{i}"), &unique_text(i))
            }
        })
        .collect();

    let mut handles = Vec::new();
    for chunk in documents.chunks(TOTAL / WORKERS) {
        let engine = Arc::clone(&engine);
        let chunk: Vec<IngestDocument> = chunk.to_vec();
        handles.push(thread::spawn(move || {
            chunk
                .iter()
                .map(|d| engine.ingest(d).unwrap())
                .collect::<Vec<_>>()
        }));
    }

    let outcomes: Vec<_> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    assert_eq!(outcomes.len(), TOTAL);

    // Among the ten identical copies: exactly one Unique, nine Exact, all
    // nine pointing at the winner — regardless of submission order.
    let copy_outcomes: Vec<_> = outcomes
        .iter()
        .filter(|o| o.document_id.as_str().starts_with("copy-"))
        .collect();
    assert_eq!(copy_outcomes.len(), COPIES);

    let unique: Vec<_> = copy_outcomes
        .iter()
        .filter(|o| o.result == DuplicateResult::Unique)
        .collect();
    assert_eq!(unique.len(), 1, "exactly one copy may win");
    let winner = &unique[0].document_id;

    for outcome in &copy_outcomes {
        match &outcome.result {
            DuplicateResult::Unique => {}
            DuplicateResult::Exact { original_id } => assert_eq!(original_id, winner),
            other => panic!("copy classified as {other:?}"),
        }
    }

    // Every other document is unique; nothing was lost or double-counted.
    let unique_total = outcomes
        .iter()
        .filter(|o| o.result == DuplicateResult::Unique)
        .count();
    assert_eq!(unique_total, TOTAL - COPIES + 1);
    assert_eq!(engine.records().len().unwrap(), TOTAL - COPIES + 1);
}

#[test]
fn test_concurrent_versions_share_one_chain_with_one_latest() {
    const VARIANTS: usize = 12;

    let engine = Arc::new(
        DedupEngine::in_memory(Arc::new(ExhaustiveVectorIndex::new()), EngineConfig::default())
            .unwrap(),
    );

    let base_words: Vec<String> = (0..500).map(|i| format!("base{i}")).collect();
    engine.ingest(&doc("base", &base_words.join(" "))).unwrap();

    // Twelve lightly edited variants of the same base race to attach.
    let mut handles = Vec::new();
    for variant in 0..VARIANTS {
        let engine = Arc::clone(&engine);
        let mut variant_words = base_words.clone();
        handles.push(thread::spawn(move || {
            variant_words[variant * 3] = format!("variant{variant}");
            engine
                .ingest(&doc(
                    &format!("variant-{variant}"),
                    &variant_words.join(" "),
                ))
                .unwrap()
        }));
    }

    let mut chain_ids = Vec::new();
    for handle in handles {
        let outcome = handle.join().unwrap();
        assert!(
            matches!(outcome.result, DuplicateResult::Near { .. }),
            "variant was {:?}",
            outcome.result
        );
        match outcome.chain_update {
            ChainUpdate::Created { chain_id, .. } | ChainUpdate::Appended { chain_id, .. } => {
                chain_ids.push(chain_id);
            }
            other => panic!("unexpected chain update {other:?}"),
        }
    }

    // All attachments landed in the same chain.
    chain_ids.dedup();
    assert_eq!(chain_ids.len(), 1);
    let chain_id = &chain_ids[0];

    // The invariant held through every interleaving.
    assert!(engine.tracker().latest_is_exclusive(chain_id).unwrap());

    // Exactly one of the thirteen member records is latest.
    let records = engine.records();
    let mut latest = 0;
    for id in std::iter::once("base".to_string())
        .chain((0..VARIANTS).map(|v| format!("variant-{v}")))
    {
        let record = records.get(&DocumentId::new(&id)).unwrap().unwrap();
        assert_eq!(record.version_chain_id.as_ref(), Some(chain_id));
        if record.is_latest {
            latest += 1;
        }
    }
    assert_eq!(latest, 1);
}

#[test]
fn test_two_phase_race_resolves_at_commit() {
    const RACERS: usize = 8;

    let engine = Arc::new(
        DedupEngine::in_memory(Arc::new(ExhaustiveVectorIndex::new()), EngineConfig::default())
            .unwrap(),
    );
    let text = unique_text(0);

    // Classify all racers before any commit: everyone sees Unique.
    let classifications: Vec<_> = (0..RACERS)
        .map(|i| {
            let d = doc(&format!("racer-{i}"), &text);
            let c = engine.classify(&d).unwrap();
            assert_eq!(c.result, DuplicateResult::Unique);
            (d, c)
        })
        .collect();

    // Commit concurrently; the first-wins insert arbitrates.
    let mut handles = Vec::new();
    for (d, c) in classifications {
        let engine = Arc::clone(&engine);
        handles.push(thread::spawn(move || engine.commit(&d, c).unwrap()));
    }
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    let unique = outcomes
        .iter()
        .filter(|o| o.result == DuplicateResult::Unique)
        .count();
    let exact = outcomes
        .iter()
        .filter(|o| matches!(o.result, DuplicateResult::Exact { .. }))
        .count();
    assert_eq!(unique, 1);
    assert_eq!(exact, RACERS - 1);
    assert_eq!(engine.records().len().unwrap(), 1);
}
