use std::sync::Arc;

use hireflow::chat::{ChatConfig, ConversationSession};
use hireflow::embed::HashEmbeddingProvider;
use hireflow::error::RagError;
use hireflow::eval::{Evaluator, EvaluatorConfig};
use hireflow::index::{IndexHandle, VectorIndex};
use hireflow::llm::ScriptedModel;
use hireflow::rerank::{RerankPolicy, Reranker};
use hireflow::retrieval::Retriever;
use hireflow::store::DocumentStore;
use tokio_util::sync::CancellationToken;

const JD: &str = "Senior Accountant: GAAP, tax preparation, CPA";

async fn retriever_over(dir: &std::path::Path) -> Retriever {
    std::fs::write(dir.join("alice.txt"), "Alice. CPA with GAAP and tax preparation").unwrap();
    std::fs::write(dir.join("bob.txt"), "Bob. Welder and forklift operator").unwrap();
    std::fs::write(dir.join("carol.txt"), "Carol. Bookkeeper learning GAAP").unwrap();

    let store = DocumentStore::new(dir, &["txt".to_string()]);
    let report = store.load();
    assert_eq!(report.records.len(), 3);

    let embedder = Arc::new(HashEmbeddingProvider::new(256));
    let index = VectorIndex::build(report.records, embedder.as_ref()).await.unwrap();
    Retriever::new(IndexHandle::new(index), embedder)
}

#[tokio::test]
async fn retrieve_rerank_evaluate_chat() {
    let dir = tempfile::tempdir().unwrap();
    let retriever = retriever_over(dir.path()).await;

    let retrieved = retriever.retrieve(JD, 2).await.unwrap();
    assert_eq!(retrieved.len(), 2);
    assert_eq!(retrieved[0].id(), "alice.txt");

    let top = Reranker::new(RerankPolicy::Similarity).rerank(&retrieved, 1).unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0].id(), "alice.txt");

    let model = Arc::new(
        ScriptedModel::new("Alice is the strongest match.")
            .route("Evaluate how well", r#"{"score": 88, "rationale": "CPA and GAAP"}"#),
    );
    let evaluator = Evaluator::new(model.clone(), EvaluatorConfig::default());
    let report = evaluator
        .evaluate(&retrieved, JD, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.evaluations.len(), 2);
    assert_eq!(report.evaluations[0].candidate_id, "alice.txt");
    assert_eq!(report.degraded_count(), 0);

    let mut session = ConversationSession::new(
        retriever,
        model.clone(),
        ChatConfig::default(),
        Some(JD.to_string()),
    );
    let reply = session.send("Who should we interview?").await.unwrap();
    assert_eq!(reply, "Alice is the strongest match.");
    session.close();
    assert!(matches!(
        session.send("And then?").await,
        Err(RagError::SessionClosed)
    ));
    assert_eq!(session.history().turn_count(), 1);
}

#[tokio::test]
async fn rebuilt_index_is_visible_to_existing_retrievers() {
    let dir = tempfile::tempdir().unwrap();
    let retriever = retriever_over(dir.path()).await;
    let embedder = HashEmbeddingProvider::new(256);

    std::fs::write(dir.path().join("dave.txt"), "Dave. CPA, GAAP, tax preparation, audit").unwrap();
    let records = DocumentStore::new(dir.path(), &["txt".to_string()]).load().records;
    let rebuilt = VectorIndex::build(records, &embedder).await.unwrap();
    let previous = retriever.index().swap(rebuilt);
    assert_eq!(previous.len(), 3);

    let hits = retriever.retrieve(JD, 10).await.unwrap();
    assert_eq!(hits.len(), 4);
}
