use super::mock::{MockLexicalIndex, MockVectorIndex};
use super::model::{RankedDoc, SourceSpan};
use super::{LexicalIndexClient, VectorIndexClient};

fn seed_docs() -> Vec<RankedDoc> {
    vec![
        RankedDoc::new("t1:doc1:0", 12.5).with_text("first chunk"),
        RankedDoc::new("t1:doc1:1", 9.1).with_text("second chunk"),
        RankedDoc::new("t1:doc2:0", 4.0).with_text("third chunk"),
    ]
}

#[tokio::test]
async fn test_mock_lexical_respects_top_n() {
    let index = MockLexicalIndex::new();
    index.seed(1, seed_docs());

    let hits = index.search("anything", 1, 2).await.unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].chunk_id, "t1:doc1:0");
}

#[tokio::test]
async fn test_mock_lexical_tenant_scoping() {
    let index = MockLexicalIndex::new();
    index.seed(1, seed_docs());

    let other_tenant = index.search("anything", 2, 10).await.unwrap();
    assert!(other_tenant.is_empty());
}

#[tokio::test]
async fn test_mock_vector_failure_injection() {
    let index = MockVectorIndex::new();
    index.seed(1, seed_docs());
    index.set_failing(true);

    let result = index.search(vec![0.0; 4], 1, 10).await;
    assert!(result.is_err());
    assert!(!index.is_ready().await);

    index.set_failing(false);
    assert!(index.search(vec![0.0; 4], 1, 10).await.is_ok());
}

#[tokio::test]
async fn test_mock_counts_calls() {
    let index = MockVectorIndex::new();
    index.seed(1, seed_docs());

    let _ = index.search(vec![0.0; 4], 1, 10).await;
    let _ = index.search(vec![0.0; 4], 1, 10).await;
    assert_eq!(index.call_count(), 2);
}

#[test]
fn test_source_span_overlap() {
    let a = SourceSpan {
        uri: "s3://docs/a.md".to_string(),
        offset: 100,
        length: 200,
    };
    let b = SourceSpan {
        uri: "s3://docs/a.md".to_string(),
        offset: 250,
        length: 100,
    };
    let c = SourceSpan {
        uri: "s3://docs/a.md".to_string(),
        offset: 300,
        length: 50,
    };
    let other_doc = SourceSpan {
        uri: "s3://docs/b.md".to_string(),
        offset: 100,
        length: 200,
    };

    assert!(a.overlaps(&b));
    assert!(!a.overlaps(&c));
    assert!(!a.overlaps(&other_doc));
}
