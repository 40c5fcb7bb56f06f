//! 데이터 소스 설정 로더
//!
//! 크롤링 대상을 선언하는 data_sources.json을 읽습니다.
//! 형식: `{ "<도메인>": { "type": "<문서유형>", "pages": [{"url": ...}] } }`

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// 도메인 이름 → 소스 정의
pub type DataSources = BTreeMap<String, SourceEntry>;

/// 도메인 단위 소스 정의
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceEntry {
    /// 문서 유형 (LAW, GUIDANCE 등) - 메타데이터의 doc_type이 됨
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    /// 크롤링할 페이지 목록
    #[serde(default)]
    pub pages: Vec<PageEntry>,
}

/// 크롤링 대상 페이지
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageEntry {
    pub url: String,
    /// 도메인별 추가 필드 (제목, 메모 등) - 해석하지 않고 보존
    #[serde(flatten, default)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// data_sources.json 로드
///
/// 파일이 없으면 설정 오류로 처리합니다. 크롤링할 대상이 없는 상태로
/// 조용히 진행하는 것보다 명시적으로 알리는 편이 낫습니다.
pub fn load_data_sources(path: &Path) -> Result<DataSources> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(PipelineError::config(format!(
                "data sources file not found at {}",
                path.display()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    let sources: DataSources =
        serde_json::from_str(&raw).map_err(|e| PipelineError::parse(path.display(), e))?;

    let page_count: usize = sources.values().map(|s| s.pages.len()).sum();
    tracing::info!(
        "Loaded {} source domains ({} pages) from {}",
        sources.len(),
        page_count,
        path.display()
    );

    Ok(sources)
}

// ============================================================================
// Tests
// ============================================================================
