//! Vector Index - 벡터 검색 트레이트 및 유틸리티
//!
//! 컬렉션 단위로 격리된 벡터 색인의 공통 인터페이스입니다.
//! 같은 컬렉션의 모든 레코드는 생성 시 선언한 차원을 가져야 합니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// 벡터 임베딩 차원 (Gemini text-embedding-004 기본값)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
pub const EMBEDDING_DIMENSION: usize = 768;

// ============================================================================
// Types
// ============================================================================

/// 청크 페이로드 (색인에 저장되는 본문 + 메타데이터)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// 청크 텍스트
    pub text: String,
    /// 원본 파일 경로
    #[serde(default)]
    pub source: String,
    /// 문서 내 청크 순번 (0-based)
    #[serde(default)]
    pub chunk_index: usize,
}

/// 벡터 레코드 (업서트 단위)
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    /// 고유 식별자 (UUID 문자열)
    pub id: String,
    /// 임베딩 벡터
    pub vector: Vec<f32>,
    /// 페이로드
    pub payload: ChunkPayload,
}

/// 검색 결과 (스코어 포함)
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// 유사도 스코어
    pub score: f32,
    /// 페이로드
    pub payload: ChunkPayload,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 색인 트레이트 (async)
///
/// 외부 벡터 데이터베이스의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// 컬렉션이 없으면 생성 (있으면 그대로 둠)
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// 컬렉션 삭제 후 재생성 (기존 데이터 전부 버림)
    async fn recreate_collection(&self, name: &str, dimension: usize) -> Result<()>;

    /// 컬렉션 존재 여부
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    /// 벡터 배치 업서트
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<usize>;

    /// 유사도 검색 (top-k)
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>>;

    /// 컬렉션의 벡터 개수 조회
    async fn count(&self, collection: &str) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 두 벡터 간의 코사인 유사도를 계산합니다.
/// 결과는 -1.0 ~ 1.0 범위입니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
