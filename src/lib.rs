//! lovrag - 덴마크 법률 웹 문서 RAG 파이프라인
//!
//! 공공 웹 문서를 크롤링 → 본문 추출 → 영어 번역 → 청킹/임베딩
//! 순서로 가공해 Qdrant 컬렉션에 적재하고, 그 위에서 검색 증강
//! 질의응답을 제공합니다. 모든 단계는 공유 진행 파일로 멱등하게
//! 재실행됩니다.

pub mod cli;
pub mod completion;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod pipeline;
pub mod progress;
pub mod rag;
pub mod renderer;
pub mod sources;

// Re-exports
pub use completion::{CompletionProvider, GeminiCompletion};
pub use embedding::{create_embedder, get_api_key, has_api_key, EmbeddingProvider, GeminiEmbedding};
pub use error::{PipelineError, Result};
pub use knowledge::{
    default_chunker, ChunkConfig, ChunkPayload, Chunker, QdrantIndex, ScoredChunk, SlidingChunker,
    VectorIndex, VectorRecord, EMBEDDING_DIMENSION,
};
pub use pipeline::{Crawler, DataPaths, Extractor, Ingestor, Pipeline, StageReport, Translator};
pub use progress::{ProgressMap, ProgressRecord, ProgressStore};
pub use rag::{route_query, QueryRoute, RagChain, DEFAULT_TOP_K};
pub use renderer::{HttpRenderer, PageRenderer};
pub use sources::{load_data_sources, DataSources, PageEntry, SourceEntry};
