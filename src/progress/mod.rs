//! 진행 상태 저장소 - 파이프라인 체크포인트
//!
//! 모든 단계가 같은 JSON 파일을 공유합니다. 크롤링 단계는 URL을 키로,
//! 적재 단계는 파일 경로를 키로 레코드를 만들고, 각 단계는 자신이
//! 완료한 문서에 플래그를 표시합니다. 파일 전체를 읽고-수정하고-
//! 원자적으로 다시 쓰는 단순한 계약입니다 (임시 파일 작성 후 rename).
//!
//! 단계 순서 불변식: translated ⇒ processed ⇒ crawled.
//! 레코드 변경은 반드시 mark_* 메서드를 거쳐 순서를 보장합니다.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// 키(URL 또는 파일 경로) → 진행 레코드
pub type ProgressMap = BTreeMap<String, ProgressRecord>;

// ============================================================================
// Types
// ============================================================================

/// 문서별 진행 레코드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// 크롤링 완료 (구조화 아티팩트 생성됨)
    #[serde(default)]
    pub crawled: bool,
    /// 본문 추출 완료
    #[serde(default)]
    pub processed: bool,
    /// 번역 완료
    #[serde(default)]
    pub translated: bool,
    /// 벡터 인덱스 적재 완료
    #[serde(default)]
    pub ingested: bool,

    /// 구조화 아티팩트 경로 (JSON)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_filepath: Option<PathBuf>,
    /// 추출된 원어 텍스트 경로 (_dk.txt)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_filepath_dk: Option<PathBuf>,
    /// 번역된 텍스트 경로 (_en.txt)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed_filepath_en: Option<PathBuf>,

    /// 마지막 변경 시각
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    /// 크롤링 완료 표시 (레코드 생성 단계이므로 선행 조건 없음)
    pub fn mark_crawled(&mut self, artifact: &Path) {
        self.crawled = true;
        self.structured_filepath = Some(artifact.to_path_buf());
        self.touch();
    }

    /// 추출 완료 표시 (crawled 선행 필수)
    pub fn mark_processed(&mut self, output: &Path) -> Result<()> {
        if !self.crawled {
            return Err(PipelineError::progress(
                "cannot mark processed before crawled",
            ));
        }
        self.processed = true;
        self.processed_filepath_dk = Some(output.to_path_buf());
        self.touch();
        Ok(())
    }

    /// 번역 완료 표시 (processed 선행 필수)
    pub fn mark_translated(&mut self, output: &Path) -> Result<()> {
        if !self.processed {
            return Err(PipelineError::progress(
                "cannot mark translated before processed",
            ));
        }
        self.translated = true;
        self.processed_filepath_en = Some(output.to_path_buf());
        self.touch();
        Ok(())
    }

    /// 적재 완료 표시
    ///
    /// 적재 레코드는 파일 경로를 키로 하는 별도 항목이라
    /// 크롤링 플래그와는 독립입니다.
    pub fn mark_ingested(&mut self) {
        self.ingested = true;
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Some(Utc::now());
    }
}

/// 진행 통계 (status 명령어용)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressSummary {
    pub total: usize,
    pub crawled: usize,
    pub processed: usize,
    pub translated: usize,
    pub ingested: usize,
}

/// 진행 맵 집계
pub fn summarize(map: &ProgressMap) -> ProgressSummary {
    let mut summary = ProgressSummary {
        total: map.len(),
        ..Default::default()
    };
    for record in map.values() {
        if record.crawled {
            summary.crawled += 1;
        }
        if record.processed {
            summary.processed += 1;
        }
        if record.translated {
            summary.translated += 1;
        }
        if record.ingested {
            summary.ingested += 1;
        }
    }
    summary
}

// ============================================================================
// ProgressStore
// ============================================================================

/// 진행 상태 저장소
///
/// 부분 업데이트 API는 없습니다. 호출자는 `load()` → 수정 →
/// `save()` 순서로 전체 맵을 다시 씁니다.
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    /// 진행 파일 경로로 저장소 생성 (파일이 없어도 됨)
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 진행 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 전체 맵 로드 (파일이 없으면 빈 맵)
    pub fn load(&self) -> Result<ProgressMap> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(ProgressMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&raw)
            .map_err(|e| PipelineError::parse(self.path.display(), e))
    }

    /// 전체 맵 원자적 저장
    ///
    /// 같은 디렉토리에 임시 파일을 쓰고 rename으로 교체하므로
    /// 저장 중에 중단돼도 기존 파일이 깨지지 않습니다.
    pub fn save(&self, map: &ProgressMap) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(map)
            .map_err(|e| PipelineError::parse("progress map", e))?;

        let tmp_path = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        tracing::debug!("Progress saved: {} records", map.len());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
