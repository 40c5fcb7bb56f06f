//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 청크 적재와 질의 검색이 같은 프로바이더를 사용합니다.
//! 같은 모델로 만든 벡터끼리만 유사도가 의미 있으므로
//! 모델/차원은 컬렉션 생성 시점에 고정됩니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let vector = embedder.embed("Hello, world!").await?;
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{PipelineError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 길이 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// Gemini API 베이스 URL
/// source: https://ai.google.dev/gemini-api/docs/embeddings
const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// 임베딩 모델 이름
pub const EMBEDDING_MODEL: &str = "text-embedding-004";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;
/// text-embedding-004가 지원하는 최대 차원
const MAX_DIMENSION: usize = 768;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: u32 = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
/// 호출 간 최소 딜레이 (1000ms = 60 RPM 준수)
const MIN_DELAY_MS: u64 = 1000;
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    api_base: String,
    initial_backoff: Duration,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window - now.duration_since(oldest);
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                // 대기 후 다시 정리
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

impl GeminiEmbedding {
    /// 새 Gemini 임베딩 인스턴스 생성 (768차원)
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_dimension(api_key, DEFAULT_DIMENSION)
    }

    /// 차원을 지정하여 생성
    ///
    /// text-embedding-004는 출력 차원 축소만 지원하므로
    /// 1 이상 768 이하만 허용합니다.
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if dimension == 0 || dimension > MAX_DIMENSION {
            return Err(PipelineError::config(format!(
                "invalid embedding dimension: {dimension} (must be 1..={MAX_DIMENSION})"
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {e}")))?;

        let rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
            Duration::from_millis(MIN_DELAY_MS),
        )));

        Ok(Self {
            api_key,
            client,
            dimension,
            api_base: GEMINI_API_BASE.to_string(),
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            rate_limiter,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn from_env() -> Result<Self> {
        let api_key = get_api_key()?;
        Self::new(api_key)
    }

    /// API 베이스 URL 교체 (테스트용)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.api_base = base_url.into();
        self
    }

    /// 호출 간 최소 딜레이와 재시도 백오프 교체 (테스트용)
    pub fn with_pacing(mut self, min_delay: Duration, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self.rate_limiter = Arc::new(Mutex::new(RateLimiter::new(
            RATE_LIMIT_RPM,
            RATE_LIMIT_WINDOW,
            min_delay,
        )));
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:embedContent",
            self.api_base.trim_end_matches('/'),
            EMBEDDING_MODEL
        )
    }
}

/// Gemini API 요청 본문
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

/// Gemini API 에러 응답
#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트는 영벡터 (차원 유지)
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let request = EmbedRequest {
            model: format!("models/{EMBEDDING_MODEL}"),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: "RETRIEVAL_DOCUMENT".to_string(),
            output_dimensionality: Some(self.dimension),
        };

        let mut last_error: Option<PipelineError> = None;

        // 재시도 루프 (429 에러 시 지수 백오프)
        for attempt in 0..=MAX_RETRIES {
            // Rate limiting (매 시도마다)
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            // API 키는 URL이 아닌 헤더로 전송
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
                        "failed to send embedding request: {e}"
                    )));
                    if attempt < MAX_RETRIES {
                        let backoff = self.initial_backoff * 2u32.pow(attempt);
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

            // 성공
            if status.is_success() {
                let embed_response: EmbedResponse = serde_json::from_str(&body)
                    .map_err(|e| PipelineError::model(format!("unexpected embed response: {e}")))?;
                return Ok(embed_response.embedding.values);
            }

            // 429 Rate Limit 에러 - 재시도
            if status.as_u16() == 429 {
                let backoff = self.initial_backoff * 2u32.pow(attempt);
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
                if let Ok(error) = serde_json::from_str::<GeminiError>(&body) {
                    return Err(PipelineError::model(format!(
                        "Gemini API error ({}): {}",
                        error.error.status, error.error.message
                    )));
                }
                return Err(PipelineError::model(format!(
                    "Gemini API error ({status}): {body}"
                )));
            }
        }

        // 모든 재시도 실패
        Err(last_error.unwrap_or_else(|| {
            PipelineError::model(format!("embedding failed after {MAX_RETRIES} retries"))
        }))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        // Gemini는 배치 API가 없으므로 순차 처리
        // Rate limiter가 자동으로 조절함
        let mut results = Vec::with_capacity(texts.len());

        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        EMBEDDING_MODEL
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            tracing::debug!("Using API key from GEMINI_API_KEY");
            return Ok(key);
        }
    }

    if let Ok(key) = std::env::var("GOOGLE_AI_API_KEY") {
        if !key.is_empty() {
            tracing::debug!("Using API key from GOOGLE_AI_API_KEY");
            return Ok(key);
        }
    }

    Err(PipelineError::config(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey",
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            return true;
        }
    }

    if let Ok(key) = std::env::var("GOOGLE_AI_API_KEY") {
        if !key.is_empty() {
            return true;
        }
    }

    false
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성 (Gemini API)
///
/// 환경변수에서 API 키를 읽어 기본 차원의 GeminiEmbedding을 만듭니다.
pub fn create_embedder() -> Result<GeminiEmbedding> {
    let embedder = GeminiEmbedding::from_env()?;
    tracing::info!(
        "Using Gemini embedding {} (dimension: {})",
        EMBEDDING_MODEL,
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn test_has_api_key() {
        // 환경변수 설정 여부에 따라 결과가 달라짐
        let _ = has_api_key();
    }

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_dimension("fake_key".to_string(), 0);
        assert!(result.is_err());

        let result = GeminiEmbedding::with_dimension("fake_key".to_string(), 1536);
        assert!(matches!(result, Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [1, 256, 768] {
            let result = GeminiEmbedding::with_dimension("fake_key".to_string(), dim);
            assert!(result.is_ok());
        }
    }

    #[test]
    fn test_default_dimension() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).expect("embedder");
        assert_eq!(embedder.dimension(), 768);
        assert_eq!(EmbeddingProvider::name(&embedder), "text-embedding-004");
    }

    #[tokio::test]
    async fn test_empty_text_is_zero_vector() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).expect("embedder");
        let vector = embedder.embed("   ").await.expect("embed");
        assert_eq!(vector.len(), 768);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_request_wire_shape() {
        let request = EmbedRequest {
            model: format!("models/{EMBEDDING_MODEL}"),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: "hej".to_string(),
                }],
            },
            task_type: "RETRIEVAL_DOCUMENT".to_string(),
            output_dimensionality: Some(768),
        };

        let value = serde_json::to_value(&request).expect("serialize");
        assert_eq!(value["model"], "models/text-embedding-004");
        assert_eq!(value["taskType"], "RETRIEVAL_DOCUMENT");
        assert_eq!(value["outputDimensionality"], 768);
        assert_eq!(value["content"]["parts"][0]["text"], "hej");
    }

    #[tokio::test]
    async fn test_embed_parses_values() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/text-embedding-004:embedContent")
                    .header("x-goog-api-key", "test_key");
                then.status(200).json_body(serde_json::json!({
                    "embedding": { "values": [0.5, -0.25, 0.125] }
                }));
            })
            .await;

        let embedder = GeminiEmbedding::new("test_key".to_string())
            .expect("embedder")
            .with_base_url(server.base_url());

        let vector = embedder.embed("hej verden").await.expect("embed");
        assert_eq!(vector, vec![0.5, -0.25, 0.125]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_embed_retries_after_rate_limit() {
        let server = MockServer::start_async().await;
        let mut rate_limited = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/text-embedding-004:embedContent");
                then.status(429).body("quota exceeded");
            })
            .await;

        let embedder = GeminiEmbedding::new("test_key".to_string())
            .expect("embedder")
            .with_base_url(server.base_url())
            .with_pacing(Duration::from_millis(1), Duration::from_millis(200));

        // 첫 429를 받으면 백오프 중에 성공 응답으로 교체한다:
        // 재시도 요청이 두 번째 목에 도달해야 한다
        let started = Instant::now();
        let (result, success) = tokio::join!(embedder.embed("hej"), async {
            while rate_limited.hits_async().await == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            rate_limited.delete_async().await;
            server
                .mock_async(|when, then| {
                    when.method(POST)
                        .path("/v1beta/models/text-embedding-004:embedContent");
                    then.status(200).json_body(serde_json::json!({
                        "embedding": { "values": [0.5, 0.25] }
                    }));
                })
                .await
        });

        assert_eq!(result.expect("embed"), vec![0.5, 0.25]);
        assert!(started.elapsed() >= Duration::from_millis(200));
        success.assert_async().await;
    }

    #[tokio::test]
    async fn test_embed_api_error_fails_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/text-embedding-004:embedContent");
                then.status(400).json_body(serde_json::json!({
                    "error": { "message": "API key not valid", "status": "INVALID_ARGUMENT" }
                }));
            })
            .await;

        let embedder = GeminiEmbedding::new("bad_key".to_string())
            .expect("embedder")
            .with_base_url(server.base_url());

        let error = embedder.embed("hej").await.expect_err("must fail");
        assert!(matches!(error, PipelineError::Model(_)));
        assert!(error.to_string().contains("INVALID_ARGUMENT"));
        // 429가 아닌 에러는 재시도 없이 한 번만 호출
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_min_delay_paces_consecutive_requests() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/text-embedding-004:embedContent");
                then.status(200).json_body(serde_json::json!({
                    "embedding": { "values": [0.5] }
                }));
            })
            .await;

        let embedder = GeminiEmbedding::new("test_key".to_string())
            .expect("embedder")
            .with_base_url(server.base_url())
            .with_pacing(Duration::from_millis(150), Duration::from_millis(1));

        let started = Instant::now();
        embedder.embed("første").await.expect("embed");
        embedder.embed("anden").await.expect("embed");

        // 두 번째 호출은 최소 딜레이를 기다린 뒤 나간다
        assert!(started.elapsed() >= Duration::from_millis(150));
        mock.assert_hits_async(2).await;
    }
}
