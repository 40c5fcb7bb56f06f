//! 에러 모듈 - 파이프라인 공통 에러 분류
//!
//! 단계 실행 루프가 문자열 매칭 대신 에러 종류로 재시도/중단을
//! 판단할 수 있도록 명시적인 분류를 제공합니다. 문서 단위 에러
//! (Fetch/Parse/Translate)는 해당 문서만 건너뛰고, 서비스 에러
//! (Index/Model)는 배치 전체를 중단합니다.

use thiserror::Error;

/// 크레이트 공통 Result
pub type Result<T> = std::result::Result<T, PipelineError>;

/// 파이프라인 에러 분류
#[derive(Debug, Error)]
pub enum PipelineError {
    /// 설정 오류 (API 키 누락 등) - 시작 시점에 치명적
    #[error("configuration error: {0}")]
    Config(String),

    /// 페이지 가져오기 실패 - 해당 문서만 건너뛰고 다음 실행에서 재시도
    #[error("failed to fetch {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// 아티팩트/설정 파싱 실패
    #[error("failed to parse {what}: {reason}")]
    Parse { what: String, reason: String },

    /// 번역 실패 - 폴백 아티팩트를 남기고 해당 문서만 실패 처리
    #[error("translation failed for {path}: {reason}")]
    Translate { path: String, reason: String },

    /// 벡터 인덱스 서비스 오류 (연결 불가 포함)
    #[error("vector index error: {0}")]
    Index(String),

    /// 모델 서비스(임베딩/완성) 호출 실패
    #[error("model service error: {0}")]
    Model(String),

    /// 진행 상태 저장소 오류 (단계 순서 위반 포함)
    #[error("progress store error: {0}")]
    Progress(String),

    /// 파일 I/O 오류
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// 설정 오류 생성
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }

    /// 가져오기 실패 생성
    pub fn fetch(url: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// 파싱 실패 생성
    pub fn parse(what: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Parse {
            what: what.to_string(),
            reason: reason.to_string(),
        }
    }

    /// 번역 실패 생성
    pub fn translate(path: impl std::fmt::Display, reason: impl std::fmt::Display) -> Self {
        Self::Translate {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }

    /// 인덱스 오류 생성
    pub fn index(reason: impl Into<String>) -> Self {
        Self::Index(reason.into())
    }

    /// 모델 서비스 오류 생성
    pub fn model(reason: impl Into<String>) -> Self {
        Self::Model(reason.into())
    }

    /// 진행 저장소 오류 생성
    pub fn progress(reason: impl Into<String>) -> Self {
        Self::Progress(reason.into())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipelineError::fetch("https://example.dk/page", "HTTP 500");
        assert_eq!(
            err.to_string(),
            "failed to fetch https://example.dk/page: HTTP 500"
        );

        let err = PipelineError::config("missing API key");
        assert_eq!(err.to_string(), "configuration error: missing API key");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }

    #[test]
    fn test_kind_matching() {
        // 단계 루프가 종류로 분기할 수 있어야 함
        let errors = vec![
            PipelineError::index("qdrant unreachable"),
            PipelineError::model("quota exceeded"),
            PipelineError::parse("progress.json", "unexpected EOF"),
        ];

        let service_failures = errors
            .iter()
            .filter(|e| matches!(e, PipelineError::Index(_) | PipelineError::Model(_)))
            .count();
        assert_eq!(service_failures, 2);
    }
}
