//! Pipeline 모듈 - 단계 실행기와 공유 타입
//!
//! crawl → extract → translate → ingest 네 단계는 같은 진행 파일을
//! 공유하는 독립 배치 패스입니다. 각 단계는 선행 단계가 끝난 상태의
//! 레코드만 건드리므로 어떤 순서로 몇 번을 실행해도 안전합니다.
//! `Pipeline`은 외부 서비스 클라이언트를 한 곳에서 주입받아 전체
//! 실행을 묶는 조립 지점입니다.

mod crawler;
mod extractor;
mod ingest;
mod translator;

// Re-exports
pub use crawler::{artifact_filename, infer_metadata, Crawler, DocMetadata, StructuredDocument};
pub use extractor::{clean_text_from_html, Extractor};
pub use ingest::Ingestor;
pub use translator::{Translator, TRANSLATION_FAILED_PREFIX};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::completion::CompletionProvider;
use crate::embedding::EmbeddingProvider;
use crate::error::{PipelineError, Result};
use crate::knowledge::VectorIndex;
use crate::progress::ProgressStore;
use crate::renderer::PageRenderer;
use crate::sources::DataSources;

// ============================================================================
// DataPaths
// ============================================================================

/// 데이터 디렉토리 배치
///
/// ```text
/// <data>/data_sources.json        크롤링 소스 목록
/// <data>/crawled/progress.json    진행 파일
/// <data>/crawled/structured/      구조화 아티팩트 (JSON)
/// <data>/crawled/processed/       추출/번역 텍스트 (_dk / _en)
/// ```
#[derive(Debug, Clone)]
pub struct DataPaths {
    data_dir: PathBuf,
}

impl DataPaths {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// 진행 파일 경로
    pub fn progress_file(&self) -> PathBuf {
        self.data_dir.join("crawled").join("progress.json")
    }

    /// 구조화 아티팩트 디렉토리
    pub fn structured_dir(&self) -> PathBuf {
        self.data_dir.join("crawled").join("structured")
    }

    /// 추출/번역 텍스트 디렉토리
    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("crawled").join("processed")
    }

    /// 기본 소스 설정 파일 경로
    pub fn default_sources_file(&self) -> PathBuf {
        self.data_dir.join("data_sources.json")
    }
}

impl Default for DataPaths {
    fn default() -> Self {
        Self::new("data")
    }
}

// ============================================================================
// StageReport
// ============================================================================

/// 단계 실행 결과 보고
///
/// 단계 루프는 문서 단위 실패를 삼키는 대신 여기에 쌓아 호출자가
/// 계속/중단을 판단하게 합니다.
#[derive(Debug)]
pub struct StageReport {
    /// 단계 이름 (crawl / extract / translate / ingest)
    pub stage: &'static str,
    /// 이번 패스에서 완료한 문서 수
    pub completed: usize,
    /// 건너뛴 문서 수 (이미 완료됐거나 내용이 비어 있음)
    pub skipped: usize,
    /// 문서 단위 실패 목록
    pub failures: Vec<DocFailure>,
}

/// 문서 하나의 실패 기록
#[derive(Debug)]
pub struct DocFailure {
    /// 문서 키 (URL 또는 파일 경로)
    pub key: String,
    /// 실패 원인
    pub error: PipelineError,
}

impl StageReport {
    pub fn new(stage: &'static str) -> Self {
        Self {
            stage,
            completed: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    /// 작업을 시도한 문서 수 (완료 + 실패)
    pub fn attempted(&self) -> usize {
        self.completed + self.failures.len()
    }

    /// 실패 없는 패스였는지
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub(crate) fn record_completed(&mut self) {
        self.completed += 1;
    }

    pub(crate) fn record_skipped(&mut self) {
        self.skipped += 1;
    }

    pub(crate) fn record_failure(&mut self, key: impl Into<String>, error: PipelineError) {
        self.failures.push(DocFailure {
            key: key.into(),
            error,
        });
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// 전체 파이프라인 조립 지점
///
/// 외부 서비스 클라이언트는 전부 여기로 주입됩니다. 테스트는 같은
/// 트레이트의 페이크를 꽂아 파이프라인 전체를 오프라인으로 돌립니다.
pub struct Pipeline {
    renderer: Arc<dyn PageRenderer>,
    embedder: Arc<dyn EmbeddingProvider>,
    completion: Arc<dyn CompletionProvider>,
    index: Arc<dyn VectorIndex>,
    paths: DataPaths,
    store: ProgressStore,
}

impl Pipeline {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        embedder: Arc<dyn EmbeddingProvider>,
        completion: Arc<dyn CompletionProvider>,
        index: Arc<dyn VectorIndex>,
        paths: DataPaths,
    ) -> Self {
        let store = ProgressStore::new(paths.progress_file());
        Self {
            renderer,
            embedder,
            completion,
            index,
            paths,
            store,
        }
    }

    pub fn paths(&self) -> &DataPaths {
        &self.paths
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    /// 크롤링 단계
    pub async fn crawl(&self, sources: &DataSources) -> Result<StageReport> {
        Crawler::new(self.renderer.clone(), self.paths.structured_dir())
            .run(sources, &self.store)
            .await
    }

    /// 추출 단계
    pub fn extract(&self) -> Result<StageReport> {
        Extractor::new(self.paths.processed_dir()).run(&self.store)
    }

    /// 번역 단계
    pub async fn translate(&self) -> Result<StageReport> {
        Translator::new(self.completion.clone()).run(&self.store).await
    }

    /// 적재 단계
    pub async fn ingest(
        &self,
        dir: &Path,
        collection: &str,
        recreate: bool,
    ) -> Result<StageReport> {
        Ingestor::new(self.embedder.clone(), self.index.clone())
            .run(dir, collection, recreate, &self.store)
            .await
    }

    /// 네 단계 전체 실행 (crawl → extract → translate → ingest)
    pub async fn run_all(
        &self,
        sources: &DataSources,
        collection: &str,
    ) -> Result<Vec<StageReport>> {
        let mut reports = Vec::with_capacity(4);
        reports.push(self.crawl(sources).await?);
        reports.push(self.extract()?);
        reports.push(self.translate().await?);
        reports.push(
            self.ingest(&self.paths.processed_dir(), collection, false)
                .await?,
        );
        Ok(reports)
    }
}

// ============================================================================
// Tests
// ============================================================================
