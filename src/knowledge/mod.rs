//! Knowledge 모듈 - 청킹과 벡터 색인
//!
//! - Chunker: 슬라이딩 윈도우 텍스트 분할 (1000자 / 200자 오버랩)
//! - VectorIndex: 컬렉션 단위 벡터 색인 트레이트
//! - QdrantIndex: Qdrant REST 구현

mod chunker;
mod qdrant;
mod vector;

// Re-exports
pub use chunker::{default_chunker, ChunkConfig, Chunker, SlidingChunker};
pub use qdrant::{QdrantIndex, DEFAULT_QDRANT_URL};
pub use vector::{
    cosine_similarity, ChunkPayload, ScoredChunk, VectorIndex, VectorRecord, EMBEDDING_DIMENSION,
};

pub(crate) use chunker::floor_char_boundary;
