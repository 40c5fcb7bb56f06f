//! 크롤링 단계 - 소스 목록의 새 URL을 구조화 아티팩트로 저장
//!
//! 렌더링된 HTML을 메타데이터와 함께 JSON 아티팩트로 묶어 구조화
//! 디렉토리에 기록합니다. 이미 crawled로 표시된 URL은 건너뛰므로
//! 같은 소스 목록으로 몇 번을 실행해도 안전합니다. 가져오기 실패는
//! 해당 URL만 기록하고 넘어가며, 진행 레코드가 남지 않으므로 다음
//! 실행에서 자연히 재시도됩니다.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::progress::ProgressStore;
use crate::renderer::PageRenderer;
use crate::sources::DataSources;

use super::StageReport;

/// 관할 구역 - 덴마크 법률 문서만 다룸
const JURISDICTION: &str = "DK";
/// 소스 설정에 문서 유형이 없을 때의 기본값
const DEFAULT_DOC_TYPE: &str = "unknown";

// ============================================================================
// Types
// ============================================================================

/// 문서 메타데이터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    /// 관할 구역 (고정: DK)
    pub jurisdiction: String,
    /// 문서 유형 (소스 설정의 type)
    pub doc_type: String,
    /// 출처 호스트
    pub source: String,
    /// 발행 연도 (retsinformation.dk의 /lta/ 경로에서만 추출)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

/// 구조화 문서 아티팩트 - 크롤러가 쓰고 추출기가 읽음
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredDocument {
    pub source_url: String,
    pub metadata: DocMetadata,
    pub raw_html: String,
}

// ============================================================================
// Metadata Inference
// ============================================================================

/// URL과 소스 설정에서 메타데이터 추론
///
/// 연도는 retsinformation.dk의 `/lta/<연도>/` 경로 배치에서만
/// 추출합니다. 다른 사이트는 연도 없이 저장됩니다.
pub fn infer_metadata(url: &str, doc_type: Option<&str>) -> DocMetadata {
    let source = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_default();

    let year = if url.contains("retsinformation.dk") {
        extract_lta_year(url)
    } else {
        None
    };

    DocMetadata {
        jurisdiction: JURISDICTION.to_string(),
        doc_type: doc_type.unwrap_or(DEFAULT_DOC_TYPE).to_string(),
        source,
        year,
    }
}

/// `/lta/<4자리 연도>/` 경로 세그먼트에서 연도 추출
fn extract_lta_year(url: &str) -> Option<i32> {
    let re = regex::Regex::new(r"/lta/(\d{4})/").ok()?;
    re.captures(url)?.get(1)?.as_str().parse().ok()
}

/// 아티팩트 파일명 생성
///
/// `<관할>-<유형 대문자>-<연도|YYYY>-<마지막 경로 세그먼트>.json`
pub fn artifact_filename(url: &str, metadata: &DocMetadata) -> String {
    let year = metadata
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "YYYY".to_string());

    let doc_id = url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments().and_then(|segments| {
                segments
                    .filter(|s| !s.is_empty())
                    .last()
                    .map(str::to_string)
            })
        })
        .unwrap_or_else(|| "index".to_string());

    format!(
        "{}-{}-{}-{}.json",
        metadata.jurisdiction,
        metadata.doc_type.to_uppercase(),
        year,
        doc_id
    )
}

// ============================================================================
// Crawler
// ============================================================================

/// 크롤링 단계 실행기
pub struct Crawler {
    renderer: Arc<dyn PageRenderer>,
    structured_dir: PathBuf,
}

impl Crawler {
    pub fn new(renderer: Arc<dyn PageRenderer>, structured_dir: impl Into<PathBuf>) -> Self {
        Self {
            renderer,
            structured_dir: structured_dir.into(),
        }
    }

    /// 크롤링 패스 실행
    ///
    /// 소스 목록의 모든 페이지를 순회하며, crawled 미표시 URL만
    /// 가져와 아티팩트를 기록하고 진행 맵을 갱신합니다. 문서 하나를
    /// 마칠 때마다 진행 파일을 저장해 중단 지점부터 재개됩니다.
    pub async fn run(&self, sources: &DataSources, store: &ProgressStore) -> Result<StageReport> {
        fs::create_dir_all(&self.structured_dir)?;
        let mut progress = store.load()?;
        let mut report = StageReport::new("crawl");

        for (domain, entry) in sources {
            tracing::info!("Crawling domain {} ({} pages)", domain, entry.pages.len());
            let doc_type = entry.doc_type.as_deref();

            for page in &entry.pages {
                let url = page.url.as_str();
                if progress.get(url).map_or(false, |r| r.crawled) {
                    tracing::info!("Skipping already crawled URL: {}", url);
                    report.record_skipped();
                    continue;
                }

                let html = match self.renderer.render(url).await {
                    Ok(html) => html,
                    Err(e) => {
                        tracing::warn!("Fetch failed for {}: {}", url, e);
                        report.record_failure(url, e);
                        continue;
                    }
                };

                let metadata = infer_metadata(url, doc_type);
                match self.write_artifact(url, metadata, html) {
                    Ok(path) => {
                        progress.entry(url.to_string()).or_default().mark_crawled(&path);
                        store.save(&progress)?;
                        report.record_completed();
                        tracing::info!("Saved structured artifact: {}", path.display());
                    }
                    Err(e) => {
                        tracing::warn!("Failed to write artifact for {}: {}", url, e);
                        report.record_failure(url, e);
                    }
                }
            }
        }

        Ok(report)
    }

    fn write_artifact(&self, url: &str, metadata: DocMetadata, raw_html: String) -> Result<PathBuf> {
        let filename = artifact_filename(url, &metadata);
        let path = self.structured_dir.join(filename);

        let artifact = StructuredDocument {
            source_url: url.to_string(),
            metadata,
            raw_html,
        };
        let json = serde_json::to_string_pretty(&artifact)
            .map_err(|e| PipelineError::parse("structured artifact", e))?;
        fs::write(&path, json)?;

        Ok(path)
    }
}

// ============================================================================
// Tests
// ============================================================================
