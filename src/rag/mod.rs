//! RAG 모듈 - 검색 증강 질의응답
//!
//! 질문을 적재 때와 같은 임베딩 모델로 벡터화해 컬렉션에서 top-k
//! 청크를 가져오고, 컨텍스트로 묶은 프롬프트를 생성 모델에 보내
//! 답을 받습니다. 라우터는 현재 단일 경로 상수 함수이며, 질의
//! 분류가 생기면 여기서 갈라집니다.

use std::sync::Arc;

use crate::completion::CompletionProvider;
use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::knowledge::{floor_char_boundary, ScoredChunk, VectorIndex};

/// 기본 검색 청크 수
pub const DEFAULT_TOP_K: usize = 4;
/// 프롬프트에 담을 컨텍스트 총량 한도 (문자)
const DEFAULT_CONTEXT_BUDGET: usize = 6_000;

// ============================================================================
// Query Routing
// ============================================================================

/// 질의 경로
///
/// 현재는 RAG 단일 경로입니다. 요약/비교 같은 전용 경로가 생기면
/// 여기에 변형이 추가됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryRoute {
    /// 검색 증강 생성
    Rag,
}

/// 질의 분류
pub fn route_query(_question: &str) -> QueryRoute {
    QueryRoute::Rag
}

// ============================================================================
// RagChain
// ============================================================================

/// 검색 증강 답변 체인
pub struct RagChain {
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionProvider>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    context_budget: usize,
}

impl RagChain {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
        index: Arc<dyn VectorIndex>,
    ) -> Self {
        Self {
            embedder,
            completion,
            index,
            top_k: DEFAULT_TOP_K,
            context_budget: DEFAULT_CONTEXT_BUDGET,
        }
    }

    /// 검색 청크 수 변경 (최소 1)
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// 컨텍스트 한도 변경
    pub fn with_context_budget(mut self, context_budget: usize) -> Self {
        self.context_budget = context_budget.max(1);
        self
    }

    /// 질문에 답변
    pub async fn answer(&self, question: &str, collection: &str) -> Result<String> {
        match route_query(question) {
            QueryRoute::Rag => self.answer_with_rag(question, collection).await,
        }
    }

    async fn answer_with_rag(&self, question: &str, collection: &str) -> Result<String> {
        // 질문은 적재 때와 같은 모델로 임베딩해야 유사도가 의미 있음
        let query_vector = self.embedder.embed(question).await?;
        let hits = self
            .index
            .search(collection, &query_vector, self.top_k)
            .await?;
        tracing::info!("Retrieved {} chunks from '{}'", hits.len(), collection);

        let prompt = compose_prompt(question, &hits, self.context_budget);
        let answer = self.completion.complete(&prompt, None).await?;
        Ok(answer.trim().to_string())
    }
}

/// 컨텍스트를 한도 내로 담은 프롬프트 조립
///
/// 청크는 점수 순으로 이미 정렬되어 있으므로 한도를 넘기 시작하면
/// 낮은 순위부터 버려집니다.
fn compose_prompt(question: &str, chunks: &[ScoredChunk], budget: usize) -> String {
    let mut context = String::new();

    for chunk in chunks {
        let text = chunk.payload.text.trim();
        if text.is_empty() {
            continue;
        }
        if context.is_empty() {
            if text.len() > budget {
                // 첫 청크가 혼자 한도를 넘으면 잘라서라도 담음
                context.push_str(&text[..floor_char_boundary(text, budget)]);
            } else {
                context.push_str(text);
            }
        } else {
            if context.len() + 2 + text.len() > budget {
                break;
            }
            context.push_str("\n\n");
            context.push_str(text);
        }
    }

    format!(
        "You are an assistant for question-answering tasks. Use the following pieces \
         of retrieved context to answer the question. If you don't know the answer, \
         just say that you don't know. Use three sentences maximum and keep the \
         answer concise.\nQuestion: {question}\nContext: {context}\nAnswer:"
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::knowledge::ChunkPayload;
    use async_trait::async_trait;

    struct FakeEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "fake-embedder"
        }
    }

    /// 고정 검색 결과를 돌려주는 색인
    struct StaticIndex {
        hits: Vec<ScoredChunk>,
    }

    #[async_trait]
    impl VectorIndex for StaticIndex {
        async fn ensure_collection(&self, _name: &str, _dimension: usize) -> Result<()> {
            Ok(())
        }

        async fn recreate_collection(&self, _name: &str, _dimension: usize) -> Result<()> {
            Ok(())
        }

        async fn collection_exists(&self, _name: &str) -> Result<bool> {
            Ok(true)
        }

        async fn upsert(
            &self,
            _collection: &str,
            records: &[crate::knowledge::VectorRecord],
        ) -> Result<usize> {
            Ok(records.len())
        }

        async fn search(
            &self,
            _collection: &str,
            _vector: &[f32],
            limit: usize,
        ) -> Result<Vec<ScoredChunk>> {
            Ok(self.hits.iter().take(limit).cloned().collect())
        }

        async fn count(&self, _collection: &str) -> Result<usize> {
            Ok(self.hits.len())
        }
    }

    /// 검색이 실패하는 색인
    struct DownIndex;

    #[async_trait]
    impl VectorIndex for DownIndex {
        async fn ensure_collection(&self, _name: &str, _dimension: usize) -> Result<()> {
            Ok(())
        }

        async fn recreate_collection(&self, _name: &str, _dimension: usize) -> Result<()> {
            Ok(())
        }

        async fn collection_exists(&self, _name: &str) -> Result<bool> {
            Ok(true)
        }

        async fn upsert(
            &self,
            _collection: &str,
            _records: &[crate::knowledge::VectorRecord],
        ) -> Result<usize> {
            Ok(0)
        }

        async fn search(
            &self,
            _collection: &str,
            _vector: &[f32],
            _limit: usize,
        ) -> Result<Vec<ScoredChunk>> {
            Err(PipelineError::index("connection refused"))
        }

        async fn count(&self, _collection: &str) -> Result<usize> {
            Ok(0)
        }
    }

    /// 받은 프롬프트를 그대로 돌려주는 생성 페이크
    struct EchoCompletion;

    #[async_trait]
    impl CompletionProvider for EchoCompletion {
        async fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String> {
            assert_eq!(temperature, None);
            Ok(format!("  {prompt}  "))
        }

        fn name(&self) -> &str {
            "echo-fake"
        }
    }

    fn chunk(text: &str, score: f32) -> ScoredChunk {
        ScoredChunk {
            score,
            payload: ChunkPayload {
                text: text.to_string(),
                source: "doc_en.txt".to_string(),
                chunk_index: 0,
            },
        }
    }

    #[test]
    fn test_route_query_is_single_path() {
        assert_eq!(route_query("Hvad er arbejdsmiljø?"), QueryRoute::Rag);
        assert_eq!(route_query(""), QueryRoute::Rag);
    }

    #[test]
    fn test_compose_prompt_contains_question_and_context() {
        let chunks = vec![chunk("First passage.", 0.9), chunk("Second passage.", 0.8)];
        let prompt = compose_prompt("What is covered?", &chunks, 6000);

        assert!(prompt.contains("Question: What is covered?"));
        assert!(prompt.contains("First passage.\n\nSecond passage."));
        assert!(prompt.contains("three sentences maximum"));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn test_compose_prompt_respects_budget() {
        let chunks = vec![chunk(&"a".repeat(50), 0.9), chunk(&"b".repeat(50), 0.8)];
        let prompt = compose_prompt("q", &chunks, 60);
        assert!(prompt.contains(&"a".repeat(50)));
        // 두 번째 청크는 예산 초과로 제외
        assert!(!prompt.contains("bbb"));

        // 첫 청크 혼자 한도를 넘으면 잘라서 담음
        let chunks = vec![chunk(&"c".repeat(100), 0.9)];
        let prompt = compose_prompt("q", &chunks, 30);
        assert!(prompt.contains(&"c".repeat(30)));
        assert!(!prompt.contains(&"c".repeat(31)));
    }

    #[test]
    fn test_compose_prompt_skips_blank_chunks() {
        let chunks = vec![chunk("   ", 0.9), chunk("Real content.", 0.8)];
        let prompt = compose_prompt("q", &chunks, 6000);
        assert!(prompt.contains("Context: Real content.\n"));
    }

    #[tokio::test]
    async fn test_answer_flows_context_to_completion() {
        let index = StaticIndex {
            hits: vec![chunk("The Act covers workplace safety.", 0.95)],
        };
        let chain = RagChain::new(
            Arc::new(FakeEmbedder),
            Arc::new(EchoCompletion),
            Arc::new(index),
        );

        let answer = chain
            .answer("What does the Act cover?", "web_content")
            .await
            .expect("answer");

        assert!(answer.contains("The Act covers workplace safety."));
        assert!(answer.contains("Question: What does the Act cover?"));
        // 앞뒤 공백은 정리됨
        assert!(answer.starts_with("You are an assistant"));
    }

    #[tokio::test]
    async fn test_top_k_limits_retrieval() {
        let hits = (0..5)
            .map(|i| chunk(&format!("Passage {i}."), 1.0 - i as f32 / 10.0))
            .collect();
        let chain = RagChain::new(
            Arc::new(FakeEmbedder),
            Arc::new(EchoCompletion),
            Arc::new(StaticIndex { hits }),
        )
        .with_top_k(2);

        let answer = chain.answer("q", "web_content").await.expect("answer");
        assert!(answer.contains("Passage 0."));
        assert!(answer.contains("Passage 1."));
        assert!(!answer.contains("Passage 2."));
    }

    #[tokio::test]
    async fn test_search_failure_propagates() {
        let chain = RagChain::new(
            Arc::new(FakeEmbedder),
            Arc::new(EchoCompletion),
            Arc::new(DownIndex),
        );

        let err = chain
            .answer("q", "web_content")
            .await
            .expect_err("should fail");
        assert!(matches!(err, PipelineError::Index(_)));
    }
}
