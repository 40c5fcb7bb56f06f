//! 페이지 렌더러 - 크롤러의 fetch-and-render 경계
//!
//! 크롤러는 이 트레이트를 통해서만 페이지를 가져옵니다. 기본 구현은
//! 순수 HTTP GET이라 서버 렌더링 페이지에 적합하고, JS 렌더링이
//! 필요한 사이트는 외부 렌더링 백엔드를 같은 트레이트로 붙입니다.
//! 테스트는 고정 HTML을 돌려주는 페이크로 대체합니다.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{PipelineError, Result};

/// 페이지 간 기본 대기 (ms) - 대상 서버 부하 방지
const DEFAULT_FETCH_DELAY_MS: u64 = 3000;
/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// PageRenderer Trait
// ============================================================================

/// 렌더링된 HTML을 돌려주는 인터페이스
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// URL의 렌더링된 HTML 반환
    async fn render(&self, url: &str) -> Result<String>;
}

// ============================================================================
// HttpRenderer
// ============================================================================

/// HTTP 기반 렌더러
pub struct HttpRenderer {
    client: reqwest::Client,
    fetch_delay: Duration,
}

impl HttpRenderer {
    /// 기본 대기 시간으로 생성
    pub fn new() -> Result<Self> {
        Self::with_delay(Duration::from_millis(DEFAULT_FETCH_DELAY_MS))
    }

    /// 페이지 간 대기 시간을 지정하여 생성
    pub fn with_delay(fetch_delay: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("lovrag/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            fetch_delay,
        })
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn render(&self, url: &str) -> Result<String> {
        tracing::info!("Fetching: {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PipelineError::fetch(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::fetch(url, format!("HTTP {status}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| PipelineError::fetch(url, e))?;

        // 연속 요청 간 대기
        if !self.fetch_delay.is_zero() {
            tokio::time::sleep(self.fetch_delay).await;
        }

        Ok(html)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renderer_creation() {
        let renderer = HttpRenderer::new();
        assert!(renderer.is_ok());
    }

    #[tokio::test]
    async fn test_render_against_mock() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/page");
                then.status(200)
                    .body("<html><body><main>Indhold</main></body></html>");
            })
            .await;

        let renderer = HttpRenderer::with_delay(Duration::ZERO).expect("renderer");
        let html = renderer.render(&server.url("/page")).await.expect("render");

        assert!(html.contains("Indhold"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_render_http_error_is_fetch_error() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::GET).path("/missing");
                then.status(404);
            })
            .await;

        let renderer = HttpRenderer::with_delay(Duration::ZERO).expect("renderer");
        let err = renderer
            .render(&server.url("/missing"))
            .await
            .expect_err("should fail");

        assert!(matches!(err, PipelineError::Fetch { .. }));
        assert!(err.to_string().contains("404"));
    }
}
