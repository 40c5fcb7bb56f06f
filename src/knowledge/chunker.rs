//! 텍스트 청킹 모듈
//!
//! 번역된 문서를 임베딩 단위로 자르는 슬라이딩 윈도우 분할을 제공합니다.
//! 연속 청크는 정확히 `overlap_characters`만큼 겹치고,
//! 청크 전체를 이으면 원문이 빠짐없이 복원됩니다.

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub max_characters: usize,
    /// 오버랩 크기 (문자 수)
    pub overlap_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_characters: 1000,
            overlap_characters: 200,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SlidingChunker
// ============================================================================

/// 슬라이딩 윈도우 청커
///
/// 문서를 최대 크기의 창으로 훑으며, 다음 창은 이전 창 끝에서
/// 오버랩만큼 되돌아간 위치에서 시작합니다. 창 경계가 단어 중간이면
/// 마지막 공백 뒤로 당겨서 자릅니다 (오버랩 영역 안까지는 당기지 않음).
pub struct SlidingChunker {
    config: ChunkConfig,
}

impl SlidingChunker {
    /// 설정으로 생성
    ///
    /// 오버랩이 최대 크기 이상이면 진행이 불가능하므로 거부합니다.
    pub fn new(config: ChunkConfig) -> crate::error::Result<Self> {
        if config.max_characters == 0 {
            return Err(crate::error::PipelineError::config(
                "chunk max_characters must be positive",
            ));
        }
        if config.overlap_characters >= config.max_characters {
            return Err(crate::error::PipelineError::config(format!(
                "chunk overlap ({}) must be smaller than max size ({})",
                config.overlap_characters, config.max_characters
            )));
        }
        Ok(Self { config })
    }

    /// 기본 설정으로 생성 (1000자 / 200자 오버랩)
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    /// 창 끝을 마지막 공백 뒤로 당김
    ///
    /// 공백이 오버랩 영역 안에 있으면 당기지 않습니다
    /// (다음 시작 위치가 뒤로 가지 않도록 보장).
    fn snap_to_whitespace(&self, text: &str, start: usize, hard_end: usize) -> usize {
        let window = &text[start..hard_end];
        if let Some(pos) = window.rfind(char::is_whitespace) {
            if let Some(ws) = window[pos..].chars().next() {
                let snapped = start + pos + ws.len_utf8();
                if snapped > start + self.config.overlap_characters {
                    return snapped;
                }
            }
        }
        hard_end
    }
}

impl Chunker for SlidingChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let max = self.config.max_characters;
        let overlap = self.config.overlap_characters;

        if text.len() <= max {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        loop {
            let hard_end = floor_char_boundary(text, (start + max).min(text.len()));
            let mut end = if hard_end < text.len() {
                self.snap_to_whitespace(text, start, hard_end)
            } else {
                hard_end
            };
            if end <= start {
                // 창보다 넓은 멀티바이트 문자: 최소 한 문자는 전진
                end = start
                    + text[start..]
                        .chars()
                        .next()
                        .map(char::len_utf8)
                        .unwrap_or(text.len() - start);
            }

            chunks.push(text[start..end].to_string());

            if end >= text.len() {
                break;
            }

            // 다음 창은 오버랩만큼 되돌아가서 시작 (경계 조정으로
            // 창 끝이 오버랩보다 앞일 수 있으므로 포화 뺄셈)
            let mut next = floor_char_boundary(text, end.saturating_sub(overlap));
            if next <= start {
                // UTF-8 경계 조정이 진행을 막으면 오버랩 없이 전진
                next = end;
            }
            start = next;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "SlidingChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// UTF-8 경계 조정 (인덱스 이하로)
#[inline]
pub(crate) fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(SlidingChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunker_empty() {
        let chunker = SlidingChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n  ").is_empty());
    }

    #[test]
    fn test_chunker_small_text_is_single_chunk() {
        let chunker = SlidingChunker::with_defaults();
        let chunks = chunker.chunk("Hello world.");
        assert_eq!(chunks, vec!["Hello world.".to_string()]);
    }

    #[test]
    fn test_chunk_coverage_and_exact_overlap() {
        let config = ChunkConfig {
            max_characters: 100,
            overlap_characters: 20,
        };
        let chunker = SlidingChunker::new(config).expect("chunker");

        // 공백 없는 ASCII: 스냅 없이 정확한 창 크기로 잘림
        let text: String = "abcdefghij".repeat(35);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);

        // 인접 청크는 정확히 20자 겹침
        for pair in chunks.windows(2) {
            let tail = &pair[0][pair[0].len() - 20..];
            let head = &pair[1][..20];
            assert_eq!(tail, head);
        }

        // 오버랩을 제거하고 이어 붙이면 원문 복원
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.push_str(&chunk[20..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_chunk_snaps_to_whitespace() {
        let config = ChunkConfig {
            max_characters: 50,
            overlap_characters: 10,
        };
        let chunker = SlidingChunker::new(config).expect("chunker");

        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa ".repeat(5);
        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);

        // 마지막 청크를 제외하면 모두 단어 경계에서 끝남
        for chunk in &chunks[..chunks.len() - 1] {
            assert!(chunk.ends_with(char::is_whitespace), "chunk: {chunk:?}");
        }

        // 커버리지: 오버랩 제거 후 원문 복원
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            rebuilt.push_str(&chunk[10..]);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn test_chunker_multibyte_no_panic() {
        let config = ChunkConfig {
            max_characters: 50,
            overlap_characters: 10,
        };
        let chunker = SlidingChunker::new(config).expect("chunker");

        let text = "덴마크 법률 문서를 한국어로 요약한 긴 본문입니다. ".repeat(20);
        let chunks = chunker.chunk(&text);
        assert!(!chunks.is_empty());
        for chunk in &chunks {
            assert!(chunk.len() <= 50 + 4);
        }
    }

    #[test]
    fn test_chunker_extreme_configs_advance() {
        // 4바이트 문자가 창 경계에 걸리면 경계 조정된 창 끝이
        // 오버랩보다 앞으로 올 수 있다: 그래도 전진해야 한다
        let config = ChunkConfig {
            max_characters: 6,
            overlap_characters: 5,
        };
        let chunker = SlidingChunker::new(config).expect("chunker");
        let text = "😀😀😀😀";
        let chunks = chunker.chunk(text);
        assert!(chunks.iter().all(|c| !c.is_empty()));
        assert_eq!(chunks.concat(), text);

        // 창이 문자 하나보다 좁아도 멈추지 않는다
        let config = ChunkConfig {
            max_characters: 2,
            overlap_characters: 1,
        };
        let chunker = SlidingChunker::new(config).expect("chunker");
        let chunks = chunker.chunk("😀😀");
        assert_eq!(chunks, vec!["😀".to_string(), "😀".to_string()]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let result = SlidingChunker::new(ChunkConfig {
            max_characters: 0,
            overlap_characters: 0,
        });
        assert!(result.is_err());

        let result = SlidingChunker::new(ChunkConfig {
            max_characters: 100,
            overlap_characters: 100,
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_floor_char_boundary() {
        let s = "Hello, 세계!"; // UTF-8 다중 바이트 문자

        // ASCII 범위는 그대로
        assert_eq!(floor_char_boundary(s, 5), 5);

        // 문자열 끝 초과
        assert_eq!(floor_char_boundary(s, 100), s.len());

        // 빈 문자열
        assert_eq!(floor_char_boundary("", 0), 0);
    }

    #[test]
    fn test_default_config() {
        let config = ChunkConfig::default();
        assert_eq!(config.max_characters, 1000);
        assert_eq!(config.overlap_characters, 200);
    }
}
