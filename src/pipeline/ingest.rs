//! 적재 단계 - 텍스트 청킹/임베딩 후 벡터 컬렉션에 업서트
//!
//! 기본 정책은 증분 적재입니다: 컬렉션은 없을 때만 만들고, 이미
//! ingested로 표시된 파일은 건너뜁니다. 파일 하나의 청크들은 배치
//! 업서트 한 번으로 들어가며, 업서트가 실패하면 표시가 남지 않아
//! 다음 실행에서 파일 단위로 재시도됩니다. recreate 모드는 컬렉션을
//! 지우고 표시와 무관하게 전부 다시 적재하는 전체 재구축 변형입니다.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use uuid::Uuid;

use crate::embedding::EmbeddingProvider;
use crate::error::Result;
use crate::knowledge::{default_chunker, ChunkPayload, Chunker, VectorIndex, VectorRecord};
use crate::progress::ProgressStore;

use super::StageReport;

// ============================================================================
// Ingestor
// ============================================================================

/// 적재 단계 실행기
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    chunker: Box<dyn Chunker>,
}

impl Ingestor {
    /// 기본 청킹 설정(1000자 / 200자 오버랩)으로 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Arc<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            chunker: default_chunker(),
        }
    }

    /// 청커 교체
    pub fn with_chunker(mut self, chunker: Box<dyn Chunker>) -> Self {
        self.chunker = chunker;
        self
    }

    /// 적재 패스 실행
    ///
    /// 디렉토리의 `.txt` 파일을 정렬 순서로 적재합니다. 파일 읽기
    /// 실패는 해당 파일만 기록하고 넘어가지만, 임베딩/인덱스 서비스
    /// 오류는 패스 전체를 중단합니다.
    pub async fn run(
        &self,
        dir: &Path,
        collection: &str,
        recreate: bool,
        store: &ProgressStore,
    ) -> Result<StageReport> {
        let dimension = self.embedder.dimension();
        if recreate {
            tracing::info!("Recreating collection '{}' ({}-dim)", collection, dimension);
            self.index.recreate_collection(collection, dimension).await?;
        } else {
            self.index.ensure_collection(collection, dimension).await?;
        }

        let files = text_files(dir)?;
        tracing::info!("Found {} text files in {}", files.len(), dir.display());

        let mut progress = store.load()?;
        let mut report = StageReport::new("ingest");

        for path in files {
            let key = path.display().to_string();

            // recreate 모드는 기존 표시를 무시하고 전부 다시 적재
            if !recreate && progress.get(&key).map_or(false, |r| r.ingested) {
                report.record_skipped();
                continue;
            }

            let text = match fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                    report.record_failure(key, e.into());
                    continue;
                }
            };

            let chunks = self.chunker.chunk(&text);
            if chunks.is_empty() {
                tracing::warn!("No chunks produced for {}", path.display());
                progress.entry(key).or_default().mark_ingested();
                store.save(&progress)?;
                report.record_skipped();
                continue;
            }

            let vectors = self.embedder.embed_batch(&chunks).await?;
            let records: Vec<VectorRecord> = chunks
                .into_iter()
                .zip(vectors)
                .enumerate()
                .map(|(chunk_index, (text, vector))| VectorRecord {
                    id: Uuid::new_v4().to_string(),
                    vector,
                    payload: ChunkPayload {
                        text,
                        source: key.clone(),
                        chunk_index,
                    },
                })
                .collect();

            let upserted = self.index.upsert(collection, &records).await?;
            progress.entry(key.clone()).or_default().mark_ingested();
            store.save(&progress)?;
            report.record_completed();
            tracing::info!("Ingested {} chunks from {}", upserted, key);
        }

        Ok(report)
    }
}

/// 디렉토리의 `.txt` 파일 목록 (정렬됨)
fn text_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().map_or(false, |ext| ext == "txt") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
