//! 텍스트 생성 모듈 - Gemini generateContent API
//!
//! 번역과 질의응답이 같은 프로바이더를 공유합니다.
//! 번역은 temperature 0.0으로 결정적으로, 질의응답은 모델 기본값으로 호출합니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 텍스트 생성 프로바이더 트레이트
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 프롬프트를 보내고 생성된 텍스트를 받음
    ///
    /// `temperature`가 `None`이면 모델 기본값을 사용합니다.
    async fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String>;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Completion
// ============================================================================

/// Gemini API 베이스 URL
/// source: https://ai.google.dev/gemini-api/docs/text-generation
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// 기본 생성 모델
pub const DEFAULT_COMPLETION_MODEL: &str = "gemini-2.0-flash";

/// 긴 문서 번역을 위한 출력 토큰 한도
const MAX_OUTPUT_TOKENS: u32 = 8192;

/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Google Gemini 텍스트 생성 구현체
#[derive(Debug)]
pub struct GeminiCompletion {
    api_key: String,
    client: reqwest::Client,
    model: String,
    api_base: String,
}

impl GeminiCompletion {
    /// 새 Gemini 생성 인스턴스 생성 (기본 모델)
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_model(api_key, DEFAULT_COMPLETION_MODEL)
    }

    /// 모델을 지정하여 생성
    pub fn with_model(api_key: String, model: impl Into<String>) -> Result<Self> {
        // 번역은 문서 전체를 한 번에 보내므로 타임아웃을 넉넉하게
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            api_key,
            client,
            model: model.into(),
            api_base: GEMINI_API_BASE.to_string(),
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env() -> Result<Self> {
        let api_key = crate::embedding::get_api_key()?;
        Self::new(api_key)
    }

    /// API 베이스 URL 교체 (테스트용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.api_base.trim_end_matches('/'),
            self.model
        )
    }
}

/// Gemini generateContent 요청 본문
#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

/// Gemini generateContent 응답
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl CompletionProvider for GeminiCompletion {
    async fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String> {
        let request = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![TextPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: temperature.map(|t| GenerationConfig {
                temperature: t,
                max_output_tokens: MAX_OUTPUT_TOKENS,
            }),
        };

        let mut last_error: Option<PipelineError> = None;

        // 재시도 루프 (429 에러 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            let response = match self
                .client
                .post(self.endpoint())
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(PipelineError::model(format!(
                        "failed to send completion request: {e}"
                    )));
                    if attempt < MAX_RETRIES {
                        let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| PipelineError::model(format!("failed to read response body: {e}")))?;

            if status.is_success() {
                let generate: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
                    PipelineError::model(format!("unexpected completion response: {e}"))
                })?;

                let text: String = generate
                    .candidates
                    .first()
                    .map(|c| {
                        c.content
                            .parts
                            .iter()
                            .map(|p| p.text.as_str())
                            .collect::<Vec<_>>()
                            .join("")
                    })
                    .unwrap_or_default();

                if text.is_empty() {
                    return Err(PipelineError::model("completion returned no candidates"));
                }
                return Ok(text);
            }

            // 429 Rate Limit 에러 - 재시도
            if status.as_u16() == 429 {
                let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));
                tracing::warn!(
                    "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(PipelineError::model("rate limit exceeded (429)"));

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            } else {
                // 다른 에러 - 즉시 실패
                return Err(PipelineError::model(format!(
                    "Gemini API error ({status}): {body}"
                )));
            }
        }

        Err(last_error.unwrap_or_else(|| {
            PipelineError::model(format!("completion failed after {MAX_RETRIES} retries"))
        }))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
