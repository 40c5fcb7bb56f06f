//! 본문 추출 단계 - 구조화 아티팩트에서 깨끗한 텍스트 생성
//!
//! 대상 사이트들의 공통 배치를 따라 본문 영역을 `#page` → `main` →
//! `body` → 문서 전체 순으로 찾고, 영역 안의 내비게이션/머리말/
//! 꼬리말 같은 비본문 요소를 제거한 텍스트를 줄 단위로 기록합니다.
//! 네트워크가 필요 없는 유일한 단계라 동기 함수입니다.

use std::fs;
use std::path::{Path, PathBuf};

use scraper::{ElementRef, Html, Selector};

use crate::error::{PipelineError, Result};
use crate::progress::ProgressStore;

use super::crawler::StructuredDocument;
use super::StageReport;

/// 본문 영역 후보 (우선순위 순)
const CONTENT_SELECTORS: [&str; 3] = ["#page", "main", "body"];
/// 본문 영역 안에서 제거할 요소
const STRIP_TAGS: [&str; 6] = ["nav", "header", "footer", "aside", "script", "style"];
/// 인쇄 제외 클래스 - 제거 대상
const STRIP_CLASS: &str = "noprint";

// ============================================================================
// Text Extraction
// ============================================================================

/// HTML에서 본문 텍스트 추출
///
/// 블록 사이 줄바꿈은 유지하고 각 줄의 앞뒤 공백은 제거합니다.
pub fn clean_text_from_html(html: &str) -> String {
    let document = Html::parse_document(html);

    for selector_str in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(region) = document.select(&selector).next() {
                return collect_text(region);
            }
        }
    }

    // 본문 후보가 하나도 없는 비정형 문서는 루트 전체에서 수집
    collect_text(document.root_element())
}

/// 영역의 텍스트 노드를 줄 단위로 수집
///
/// scraper의 DOM은 수정할 수 없으므로 제거 대상 요소를 지우는 대신
/// 텍스트 노드마다 조상 검사로 거릅니다.
fn collect_text(region: ElementRef) -> String {
    let mut lines = Vec::new();

    for node in region.descendants() {
        if let Some(text) = node.value().as_text() {
            let stripped = node.ancestors().any(|ancestor| {
                ancestor.value().as_element().map_or(false, |element| {
                    STRIP_TAGS.contains(&element.name())
                        || element.attr("class").map_or(false, |classes| {
                            classes.split_whitespace().any(|c| c == STRIP_CLASS)
                        })
                })
            });
            if stripped {
                continue;
            }

            let trimmed = text.trim();
            if !trimmed.is_empty() {
                lines.push(trimmed.to_string());
            }
        }
    }

    lines.join("\n")
}

// ============================================================================
// Extractor
// ============================================================================

/// 추출 단계 실행기
pub struct Extractor {
    processed_dir: PathBuf,
}

impl Extractor {
    pub fn new(processed_dir: impl Into<PathBuf>) -> Self {
        Self {
            processed_dir: processed_dir.into(),
        }
    }

    /// 추출 패스 실행
    ///
    /// crawled이면서 아직 processed가 아닌 레코드만 처리합니다.
    /// 문서 단위 오류(아티팩트 누락, 깨진 JSON)는 기록 후 다음
    /// 문서로 넘어갑니다.
    pub fn run(&self, store: &ProgressStore) -> Result<StageReport> {
        fs::create_dir_all(&self.processed_dir)?;
        let mut progress = store.load()?;
        let mut report = StageReport::new("extract");

        let pending: Vec<String> = progress
            .iter()
            .filter(|(_, record)| record.crawled && !record.processed)
            .map(|(key, _)| key.clone())
            .collect();

        for key in pending {
            let artifact_path = progress
                .get(&key)
                .and_then(|r| r.structured_filepath.clone());
            let artifact_path = match artifact_path {
                Some(path) => path,
                None => {
                    let error = PipelineError::parse(&key, "no structured artifact recorded");
                    report.record_failure(key, error);
                    continue;
                }
            };

            match self.extract_document(&artifact_path) {
                Ok(output_path) => {
                    if let Some(record) = progress.get_mut(&key) {
                        record.mark_processed(&output_path)?;
                    }
                    store.save(&progress)?;
                    report.record_completed();
                    tracing::info!("Saved clean text: {}", output_path.display());
                }
                Err(e) => {
                    tracing::warn!("Extraction failed for {}: {}", artifact_path.display(), e);
                    report.record_failure(key, e);
                }
            }
        }

        Ok(report)
    }

    /// 아티팩트 하나를 읽어 깨끗한 텍스트로 저장
    fn extract_document(&self, artifact_path: &Path) -> Result<PathBuf> {
        let raw = fs::read_to_string(artifact_path)?;
        let artifact: StructuredDocument = serde_json::from_str(&raw)
            .map_err(|e| PipelineError::parse(artifact_path.display(), e))?;

        let clean = clean_text_from_html(&artifact.raw_html);

        let stem = artifact_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        let output_path = self.processed_dir.join(format!("{stem}_dk.txt"));
        fs::write(&output_path, clean)?;

        Ok(output_path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::infer_metadata;
    use crate::progress::{ProgressMap, ProgressRecord};
    use tempfile::TempDir;

    const PAGE_HTML: &str = r#"
        <html><body>
            <nav>Forside Menu</nav>
            <div id="page">
                <header class="top">Sidehoved</header>
                <h1>Bekendtgørelse om arbejdsmiljø</h1>
                <p>  § 1. Loven gælder for alle.  </p>
                <div class="noprint">Udskriv denne side</div>
                <footer>Kontakt os</footer>
            </div>
        </body></html>
    "#;

    fn write_artifact(path: &Path, url: &str, html: &str) {
        let artifact = StructuredDocument {
            source_url: url.to_string(),
            metadata: infer_metadata(url, Some("LAW")),
            raw_html: html.to_string(),
        };
        fs::write(path, serde_json::to_string(&artifact).expect("serialize")).expect("write");
    }

    #[test]
    fn test_clean_text_prefers_page_region_and_strips_chrome() {
        let text = clean_text_from_html(PAGE_HTML);
        assert!(text.contains("Bekendtgørelse om arbejdsmiljø"));
        assert!(text.contains("§ 1. Loven gælder for alle."));
        // 영역 밖 + 제거 대상 텍스트는 모두 빠짐
        assert!(!text.contains("Forside"));
        assert!(!text.contains("Sidehoved"));
        assert!(!text.contains("Udskriv"));
        assert!(!text.contains("Kontakt"));
    }

    #[test]
    fn test_clean_text_falls_back_to_main_then_body() {
        let text = clean_text_from_html("<body><main>Hello world.</main><nav>Menu</nav></body>");
        assert_eq!(text, "Hello world.");

        let text = clean_text_from_html("<body><nav>Menu</nav><p>Indhold</p></body>");
        assert_eq!(text, "Indhold");
    }

    #[test]
    fn test_clean_text_preserves_block_line_breaks() {
        let html = "<main><h1>Titel</h1><p>Første afsnit.</p><p>Andet afsnit.</p></main>";
        assert_eq!(clean_text_from_html(html), "Titel\nFørste afsnit.\nAndet afsnit.");
    }

    #[test]
    fn test_extract_pass_marks_processed_and_is_idempotent() {
        let dir = TempDir::new().expect("tempdir");
        let store = ProgressStore::new(dir.path().join("progress.json"));

        let artifact_path = dir.path().join("DK-LAW-2025-1108.json");
        write_artifact(&artifact_path, "https://example.dk/page", PAGE_HTML);

        let mut map = ProgressMap::new();
        let mut record = ProgressRecord::default();
        record.mark_crawled(&artifact_path);
        map.insert("https://example.dk/page".to_string(), record);
        store.save(&map).expect("save");

        let extractor = Extractor::new(dir.path().join("processed"));
        let report = extractor.run(&store).expect("run");
        assert_eq!(report.completed, 1);
        assert!(report.failures.is_empty());

        let progress = store.load().expect("load");
        let record = &progress["https://example.dk/page"];
        assert!(record.processed);
        let out = record.processed_filepath_dk.as_ref().expect("dk path");
        assert_eq!(
            out.file_name().expect("name").to_string_lossy(),
            "DK-LAW-2025-1108_dk.txt"
        );
        let clean = fs::read_to_string(out).expect("read");
        assert!(clean.contains("§ 1. Loven gælder for alle."));
        assert!(!clean.contains("Forside"));

        // 재실행은 no-op
        let report = extractor.run(&store).expect("rerun");
        assert_eq!(report.completed, 0);
        assert_eq!(store.load().expect("load"), progress);
    }

    #[test]
    fn test_missing_artifact_is_per_document_failure() {
        let dir = TempDir::new().expect("tempdir");
        let store = ProgressStore::new(dir.path().join("progress.json"));

        // 첫 문서는 아티팩트가 사라짐, 둘째는 정상
        let good_path = dir.path().join("DK-LAW-YYYY-good.json");
        write_artifact(&good_path, "https://example.dk/good", "<main>God tekst</main>");

        let mut map = ProgressMap::new();
        let mut broken = ProgressRecord::default();
        broken.mark_crawled(&dir.path().join("absent.json"));
        map.insert("https://example.dk/broken".to_string(), broken);
        let mut good = ProgressRecord::default();
        good.mark_crawled(&good_path);
        map.insert("https://example.dk/good".to_string(), good);
        store.save(&map).expect("save");

        let extractor = Extractor::new(dir.path().join("processed"));
        let report = extractor.run(&store).expect("run");

        // 실패한 문서는 기록만 남기고 배치는 계속됨
        assert_eq!(report.completed, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].key, "https://example.dk/broken");

        let progress = store.load().expect("load");
        assert!(!progress["https://example.dk/broken"].processed);
        assert!(progress["https://example.dk/good"].processed);
    }
}
