//! 번역 단계 - 덴마크어 텍스트를 영어로
//!
//! 문서 전체를 한 요청으로 번역하되, 길이 한도를 넘는 문서는 문단
//! (빈 줄) 경계 세그먼트로 나눠 요청 크기를 제한합니다. 번역 실패 시
//! `[Translation Failed]` 접두사를 붙인 원문을 폴백 아티팩트로
//! 남겨 하류 단계가 소비할 파일은 보장하되, translated 플래그는
//! 남기지 않아 다음 실행에서 재시도됩니다.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::completion::CompletionProvider;
use crate::error::{PipelineError, Result};
use crate::knowledge::floor_char_boundary;
use crate::progress::ProgressStore;

use super::StageReport;

/// 한 번역 요청의 최대 문자 수
const DEFAULT_MAX_SEGMENT_CHARS: usize = 12_000;
/// 번역 실패 폴백 접두사
pub const TRANSLATION_FAILED_PREFIX: &str = "[Translation Failed]";

// ============================================================================
// Translator
// ============================================================================

/// 번역 단계 실행기
pub struct Translator {
    completion: Arc<dyn CompletionProvider>,
    target_language: String,
    max_segment_chars: usize,
}

impl Translator {
    pub fn new(completion: Arc<dyn CompletionProvider>) -> Self {
        Self {
            completion,
            target_language: "English".to_string(),
            max_segment_chars: DEFAULT_MAX_SEGMENT_CHARS,
        }
    }

    /// 세그먼트 길이 한도 변경
    pub fn with_max_segment_chars(mut self, max_segment_chars: usize) -> Self {
        self.max_segment_chars = max_segment_chars.max(1);
        self
    }

    /// 번역 패스 실행
    ///
    /// processed이면서 아직 translated가 아닌 레코드만 처리합니다.
    pub async fn run(&self, store: &ProgressStore) -> Result<StageReport> {
        let mut progress = store.load()?;
        let mut report = StageReport::new("translate");

        let pending: Vec<String> = progress
            .iter()
            .filter(|(_, record)| record.processed && !record.translated)
            .map(|(key, _)| key.clone())
            .collect();

        for key in pending {
            let dk_path = progress
                .get(&key)
                .and_then(|r| r.processed_filepath_dk.clone());
            let dk_path = match dk_path {
                Some(path) => path,
                None => {
                    let error = PipelineError::parse(&key, "no processed text recorded");
                    report.record_failure(key, error);
                    continue;
                }
            };

            let text = match fs::read_to_string(&dk_path) {
                Ok(text) => text,
                Err(e) => {
                    report.record_failure(key, e.into());
                    continue;
                }
            };

            if text.trim().is_empty() {
                tracing::info!("Skipping empty document: {}", dk_path.display());
                report.record_skipped();
                continue;
            }

            let en_path = english_output_path(&dk_path);
            tracing::info!(
                "Translating {} ({} characters)",
                dk_path.display(),
                text.len()
            );

            match self.translate_document(&text).await {
                Ok(translated) => {
                    if let Err(e) = fs::write(&en_path, &translated) {
                        tracing::warn!("Failed to write {}: {}", en_path.display(), e);
                        report.record_failure(key, e.into());
                        continue;
                    }
                    if let Some(record) = progress.get_mut(&key) {
                        record.mark_translated(&en_path)?;
                    }
                    store.save(&progress)?;
                    report.record_completed();
                    tracing::info!("Saved translated text: {}", en_path.display());
                }
                Err(e) => {
                    // 폴백 아티팩트: 하류가 소비할 파일은 남긴다
                    let fallback = format!("{TRANSLATION_FAILED_PREFIX} {text}");
                    if let Err(write_err) = fs::write(&en_path, fallback) {
                        tracing::warn!("Failed to write fallback artifact: {}", write_err);
                    }
                    let error = PipelineError::translate(dk_path.display(), e);
                    tracing::warn!("{}", error);
                    report.record_failure(key, error);
                }
            }
        }

        Ok(report)
    }

    /// 문서 번역 (길이 한도 초과 시 세그먼트 분할)
    async fn translate_document(&self, text: &str) -> Result<String> {
        if text.len() <= self.max_segment_chars {
            return self.translate_segment(text).await;
        }

        let segments = segment_text(text, self.max_segment_chars);
        tracing::info!(
            "Document exceeds {} characters, translating {} segments",
            self.max_segment_chars,
            segments.len()
        );

        let mut translated = Vec::with_capacity(segments.len());
        for segment in &segments {
            translated.push(self.translate_segment(segment).await?);
        }
        Ok(translated.join("\n\n"))
    }

    /// 세그먼트 하나 번역
    ///
    /// temperature 0.0 고정: 번역은 결정적이어야 재실행 결과가
    /// 흔들리지 않습니다.
    async fn translate_segment(&self, text: &str) -> Result<String> {
        let prompt = format!(
            "Translate the following Danish text to {}. Do not add any commentary, \
             preamble, or markdown formatting. Provide only the translated text \
             directly:\n\n---\n{}\n---",
            self.target_language, text
        );

        let response = self.completion.complete(&prompt, Some(0.0)).await?;
        let trimmed = response.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::model("translation returned empty text"));
        }
        Ok(trimmed.to_string())
    }
}

/// `_dk` 접미사를 `_en`으로 바꾼 출력 경로
fn english_output_path(dk_path: &Path) -> PathBuf {
    let stem = dk_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let base = stem.strip_suffix("_dk").unwrap_or(&stem);
    dk_path.with_file_name(format!("{base}_en.txt"))
}

/// 문단(빈 줄) 경계를 우선하며 최대 길이 이하 세그먼트로 분할
///
/// 문단 하나가 한도를 넘으면 줄 경계로 물러나고, 한 줄이 한도를
/// 넘으면 그 줄만 문자 경계에서 강제 분할합니다.
pub(crate) fn segment_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces: Vec<&str> = Vec::new();
    for paragraph in split_paragraphs(text) {
        if paragraph.len() <= max_chars {
            pieces.push(paragraph);
            continue;
        }
        for line in paragraph.split_inclusive('\n') {
            if line.len() <= max_chars {
                pieces.push(line);
                continue;
            }
            let mut rest = line;
            while rest.len() > max_chars {
                let mut cut = floor_char_boundary(rest, max_chars);
                if cut == 0 {
                    // 한도보다 넓은 멀티바이트 문자: 최소 한 문자는 전진
                    cut = rest.chars().next().map(char::len_utf8).unwrap_or(rest.len());
                }
                pieces.push(&rest[..cut]);
                rest = &rest[cut..];
            }
            if !rest.is_empty() {
                pieces.push(rest);
            }
        }
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    for piece in pieces {
        if !current.is_empty() && current.len() + piece.len() > max_chars {
            segments.push(std::mem::take(&mut current));
        }
        current.push_str(piece);
    }
    if !current.is_empty() {
        segments.push(current);
    }

    segments.retain(|s| !s.trim().is_empty());
    segments
}

/// 빈 줄 단위로 문단을 나눔 (구분 빈 줄은 앞 문단 꼬리에 붙음)
fn split_paragraphs(text: &str) -> Vec<&str> {
    let mut paragraphs = Vec::new();
    let mut start = 0;
    let mut offset = 0;
    let mut in_separator = false;

    for line in text.split_inclusive('\n') {
        let blank = line.trim().is_empty();
        if in_separator && !blank {
            paragraphs.push(&text[start..offset]);
            start = offset;
        }
        in_separator = blank;
        offset += line.len();
    }
    if start < text.len() {
        paragraphs.push(&text[start..]);
    }
    paragraphs
}

// ============================================================================
// Tests
// ============================================================================
