use linkrank_core::{EngineConfig, Indexer, RankConfig, SearchEngine, Store, StoreIndexer};

const A: &str = "http://a.test/";
const B: &str = "http://b.test/";

fn two_page_engine() -> SearchEngine {
    let store = Store::temporary().unwrap();
    let indexer = StoreIndexer::new(store.clone());
    let (a, _) = indexer.index_url(A, "cats are great").unwrap();
    let (b, _) = indexer.index_url(B, "dogs are great").unwrap();
    indexer.add_link(a, b, "see dogs").unwrap();
    let engine = SearchEngine::new(store, EngineConfig::default());
    engine.rebuild_rank(&RankConfig::default()).unwrap();
    engine
}

#[test]
fn shared_term_returns_both_pages_with_the_linked_one_first() {
    let engine = two_page_engine();
    let hits = engine.query("great", 10).unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].url, B);
    assert_eq!(hits[1].url, A);

    // frequency 1 + location 1 + pagerank 1 + link text 0 ("great" is not in the anchor);
    // the edge from A reaches B here only through B's higher PageRank
    assert!((hits[0].score - 3.0).abs() < 1e-9);
    let store = engine.store();
    let rank_of = |url: &str| store.rank(store.lookup_document(url).unwrap().unwrap()).unwrap().unwrap();
    assert!(rank_of(B) > rank_of(A));
    // A: pagerank 0.15 against B's 0.2775
    let expected_a = 2.0 + 0.15 / (0.15 + 0.85 * 0.15);
    assert!((hits[1].score - expected_a).abs() < 1e-9);
}

#[test]
fn anchor_text_lifts_the_link_target() {
    let engine = two_page_engine();
    let hits = engine.query("dogs", 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].url, B);
    // frequency 1 + location 1 + pagerank 1 + link text 1 from the "see dogs" anchor
    assert!((hits[0].score - 4.0).abs() < 1e-9);
}

#[test]
fn unknown_query_is_an_empty_result() {
    let engine = two_page_engine();
    assert!(engine.query("zebra", 10).unwrap().is_empty());
    assert!(engine.query("", 10).unwrap().is_empty());
}

#[test]
fn top_n_truncates() {
    let engine = two_page_engine();
    assert_eq!(engine.query("great", 1).unwrap().len(), 1);
}

#[test]
fn feedback_shifts_personalized_activations() {
    let engine = two_page_engine();
    let candidates = vec![A.to_string(), B.to_string()];
    for _ in 0..5 {
        engine.submit_feedback("great", &candidates, A).unwrap();
    }
    let out = engine.personalized_query("great", &candidates).unwrap();
    assert_eq!(out[0].0, A);
    assert!(out[0].1 > out[1].1);
}

#[test]
fn feedback_blend_can_reorder_results() {
    let store = two_page_engine().store().clone();
    let mut config = EngineConfig::default();
    config.weights.feedback = 5.0;
    let engine = SearchEngine::new(store, config);
    let candidates = vec![A.to_string(), B.to_string()];
    for _ in 0..10 {
        engine.submit_feedback("great", &candidates, A).unwrap();
    }
    let hits = engine.query("great", 10).unwrap();
    assert_eq!(hits[0].url, A);
}

#[test]
fn feedback_rejects_unknown_selection() {
    let engine = two_page_engine();
    let candidates = vec![A.to_string()];
    assert!(engine.submit_feedback("great", &candidates, "http://nowhere.test/").is_err());
    assert!(engine.submit_feedback("great", &candidates, B).is_err());
}

#[test]
fn store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let store = Store::open(dir.path()).unwrap();
        let indexer = StoreIndexer::new(store.clone());
        indexer.index_url(A, "persistent words").unwrap();
        store.flush().unwrap();
    }
    let store = Store::open(dir.path()).unwrap();
    let doc = store.document_by_url(A).unwrap().unwrap();
    assert!(doc.indexed);
    assert_eq!(doc.word_count, 2);
    assert!(store.lookup_term("persistent").unwrap().is_some());
}
