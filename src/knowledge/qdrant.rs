//! Qdrant REST 클라이언트
//!
//! `VectorIndex` 트레이트의 Qdrant 구현입니다. 공식 SDK 대신 얇은
//! REST 호출로 컬렉션 관리 / 배치 업서트 / top-k 검색만 사용합니다.
//! ref: https://api.qdrant.tech/api-reference

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

use super::vector::{ChunkPayload, ScoredChunk, VectorIndex, VectorRecord, EMBEDDING_DIMENSION};

/// 기본 Qdrant 주소 (로컬 도커 기본 포트)
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// QdrantIndex
// ============================================================================

/// Qdrant 벡터 색인 클라이언트
///
/// 색인 하나는 생성 시 고정한 차원 하나만 다룹니다. 업서트 전에
/// 클라이언트 측에서 차원을 검증하므로 잘못된 벡터가 조용히 잘려
/// 들어가는 일은 없습니다.
#[derive(Debug, Clone)]
pub struct QdrantIndex {
    client: reqwest::Client,
    base_url: String,
    dimension: usize,
}

impl QdrantIndex {
    /// 기본 차원(768)으로 생성
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_dimension(base_url, EMBEDDING_DIMENSION)
    }

    /// 차원을 지정하여 생성
    pub fn with_dimension(base_url: impl Into<String>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(PipelineError::config("vector dimension must be positive"));
        }

        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::config(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            dimension,
        })
    }

    /// 환경변수에서 주소를 읽어 생성
    ///
    /// 우선순위: QDRANT_URL > QDRANT_HOST/QDRANT_PORT > localhost:6333
    pub fn from_env() -> Result<Self> {
        let url = match std::env::var("QDRANT_URL") {
            Ok(url) if !url.is_empty() => url,
            _ => match (std::env::var("QDRANT_HOST"), std::env::var("QDRANT_PORT")) {
                (Err(_), Err(_)) => DEFAULT_QDRANT_URL.to_string(),
                (host, port) => format!(
                    "http://{}:{}",
                    host.unwrap_or_else(|_| "localhost".to_string()),
                    port.unwrap_or_else(|_| "6333".to_string())
                ),
            },
        };
        Self::new(url)
    }

    /// 색인이 다루는 벡터 차원
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/collections/{name}", self.base_url)
    }

    async fn create_collection(&self, name: &str, dimension: usize) -> Result<()> {
        let request = CreateCollectionRequest {
            vectors: VectorParams {
                size: dimension,
                distance: "Cosine",
            },
        };

        let response = self
            .client
            .put(self.collection_url(name))
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error("create collection", e))?;
        check_status(response, "create collection").await?;

        tracing::info!("Created collection '{}' ({}-dim, cosine)", name, dimension);
        Ok(())
    }
}

/// 전송 자체가 실패한 경우 (연결 불가 포함)
fn send_error(what: &str, e: reqwest::Error) -> PipelineError {
    PipelineError::index(format!("{what} failed: {e}"))
}

/// 비정상 상태 코드를 본문과 함께 인덱스 에러로 변환
async fn check_status(response: reqwest::Response, what: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(PipelineError::index(format!(
        "{what} failed ({status}): {body}"
    )))
}

// ============================================================================
// Wire Types
// ============================================================================

/// 컬렉션 생성 요청 (PUT /collections/{name})
#[derive(Debug, Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
}

#[derive(Debug, Serialize)]
struct VectorParams {
    size: usize,
    distance: &'static str,
}

/// 포인트 업서트 요청 (PUT /collections/{name}/points)
#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: &'a [VectorRecord],
}

/// 검색 요청 (POST /collections/{name}/points/search)
#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

/// 카운트 요청 (POST /collections/{name}/points/count)
#[derive(Debug, Serialize)]
struct CountRequest {
    exact: bool,
}

/// Qdrant 공통 응답 래퍼
#[derive(Debug, Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    score: f32,
    #[serde(default)]
    payload: Option<ChunkPayload>,
}

#[derive(Debug, Deserialize)]
struct CountResult {
    count: usize,
}

// ============================================================================
// VectorIndex Implementation
// ============================================================================

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            tracing::debug!("Collection '{}' already exists", name);
            return Ok(());
        }
        self.create_collection(name, dimension).await
    }

    async fn recreate_collection(&self, name: &str, dimension: usize) -> Result<()> {
        if self.collection_exists(name).await? {
            tracing::info!("Deleting existing collection '{}'", name);
            let response = self
                .client
                .delete(self.collection_url(name))
                .send()
                .await
                .map_err(|e| send_error("delete collection", e))?;
            check_status(response, "delete collection").await?;
        }
        self.create_collection(name, dimension).await
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let url = format!("{}/exists", self.collection_url(name));
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| send_error("collection existence check", e))?;
        let response = check_status(response, "collection existence check").await?;

        let parsed: QdrantResponse<ExistsResult> = response
            .json()
            .await
            .map_err(|e| PipelineError::index(format!("unexpected exists response: {e}")))?;
        Ok(parsed.result.exists)
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        // 차원 검증: 잘못된 벡터는 전송 전에 거부
        for record in records {
            if record.vector.len() != self.dimension {
                return Err(PipelineError::index(format!(
                    "vector {} has dimension {} but index expects {}",
                    record.id,
                    record.vector.len(),
                    self.dimension
                )));
            }
        }

        let url = format!("{}/points?wait=true", self.collection_url(collection));
        let response = self
            .client
            .put(&url)
            .json(&UpsertRequest { points: records })
            .send()
            .await
            .map_err(|e| send_error("point upsert", e))?;
        check_status(response, "point upsert").await?;

        tracing::debug!("Upserted {} points into '{}'", records.len(), collection);
        Ok(records.len())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredChunk>> {
        let url = format!("{}/points/search", self.collection_url(collection));
        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error("vector search", e))?;
        let response = check_status(response, "vector search").await?;

        let parsed: QdrantResponse<Vec<ScoredPoint>> = response
            .json()
            .await
            .map_err(|e| PipelineError::index(format!("unexpected search response: {e}")))?;

        Ok(parsed
            .result
            .into_iter()
            .filter_map(|point| {
                point.payload.map(|payload| ScoredChunk {
                    score: point.score,
                    payload,
                })
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let url = format!("{}/points/count", self.collection_url(collection));
        let response = self
            .client
            .post(&url)
            .json(&CountRequest { exact: true })
            .send()
            .await
            .map_err(|e| send_error("point count", e))?;
        let response = check_status(response, "point count").await?;

        let parsed: QdrantResponse<CountResult> = response
            .json()
            .await
            .map_err(|e| PipelineError::index(format!("unexpected count response: {e}")))?;
        Ok(parsed.result.count)
    }
}

// ============================================================================
// Tests
// ============================================================================
