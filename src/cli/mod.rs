//! CLI 모듈
//!
//! lovrag CLI 명령어 정의 및 구현. 단계 명령어는 필요한 서비스
//! 클라이언트만 생성하므로 extract처럼 오프라인 단계는 API 키 없이
//! 실행됩니다.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::completion::GeminiCompletion;
use crate::embedding::{create_embedder, has_api_key};
use crate::error::PipelineError;
use crate::knowledge::{QdrantIndex, VectorIndex};
use crate::pipeline::{Crawler, DataPaths, Extractor, Ingestor, Pipeline, StageReport, Translator};
use crate::progress::{self, ProgressStore};
use crate::rag::{RagChain, DEFAULT_TOP_K};
use crate::renderer::HttpRenderer;
use crate::sources::{load_data_sources, DataSources};

/// 기본 벡터 컬렉션 이름
const DEFAULT_COLLECTION: &str = "web_content";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "lovrag")]
#[command(version, about = "덴마크 법률 웹 문서 RAG 파이프라인", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// 소스 설정 파일 (기본: <data-dir>/data_sources.json)
    #[arg(long, global = true)]
    pub sources: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 소스 목록의 새 URL을 크롤링하여 구조화 아티팩트 저장
    Crawl,

    /// 크롤링된 아티팩트에서 본문 텍스트 추출
    Extract,

    /// 추출된 덴마크어 텍스트를 영어로 번역
    Translate,

    /// 텍스트 파일을 청킹/임베딩하여 벡터 컬렉션에 적재
    Ingest {
        /// 적재할 디렉토리 (기본: <data-dir>/crawled/processed)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 벡터 컬렉션 이름
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,

        /// 컬렉션을 지우고 전부 다시 적재
        #[arg(long)]
        recreate: bool,
    },

    /// 네 단계 전체 실행 (crawl → extract → translate → ingest)
    Pipeline {
        /// 벡터 컬렉션 이름
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,
    },

    /// 질문 하나에 답변
    Ask {
        /// 질문
        question: String,

        /// 벡터 컬렉션 이름
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,

        /// 검색할 청크 수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// 대화형 질의응답 루프
    Chat {
        /// 벡터 컬렉션 이름
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,

        /// 검색할 청크 수
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// 진행 상태와 서비스 연결 확인
    Status {
        /// 벡터 컬렉션 이름
        #[arg(short, long, default_value = DEFAULT_COLLECTION)]
        collection: String,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let paths = DataPaths::new(&cli.data_dir);
    let sources_file = cli
        .sources
        .clone()
        .unwrap_or_else(|| paths.default_sources_file());

    match cli.command {
        Commands::Crawl => cmd_crawl(&paths, &sources_file).await,
        Commands::Extract => cmd_extract(&paths),
        Commands::Translate => cmd_translate(&paths).await,
        Commands::Ingest {
            dir,
            collection,
            recreate,
        } => cmd_ingest(&paths, dir, &collection, recreate).await,
        Commands::Pipeline { collection } => cmd_pipeline(&paths, &sources_file, &collection).await,
        Commands::Ask {
            question,
            collection,
            top_k,
        } => cmd_ask(&question, &collection, top_k).await,
        Commands::Chat { collection, top_k } => cmd_chat(&collection, top_k).await,
        Commands::Status { collection } => cmd_status(&paths, &collection).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 크롤링 명령어 (crawl)
async fn cmd_crawl(paths: &DataPaths, sources_file: &Path) -> Result<()> {
    let sources = load_sources(sources_file)?;
    let total_pages: usize = sources.values().map(|entry| entry.pages.len()).sum();
    println!("[*] 크롤링 시작: {} 도메인, {} 페이지", sources.len(), total_pages);

    let renderer = Arc::new(HttpRenderer::new().context("HTTP 렌더러 생성 실패")?);
    let crawler = Crawler::new(renderer, paths.structured_dir());
    let store = ProgressStore::new(paths.progress_file());

    let report = crawler.run(&sources, &store).await?;
    print_report(&report);
    Ok(())
}

/// 추출 명령어 (extract)
fn cmd_extract(paths: &DataPaths) -> Result<()> {
    println!("[*] 본문 추출 시작");

    let extractor = Extractor::new(paths.processed_dir());
    let store = ProgressStore::new(paths.progress_file());

    let report = extractor.run(&store)?;
    print_report(&report);
    Ok(())
}

/// 번역 명령어 (translate)
async fn cmd_translate(paths: &DataPaths) -> Result<()> {
    ensure_api_key()?;
    println!("[*] 번역 시작");

    let completion = Arc::new(GeminiCompletion::from_env().context("Gemini 클라이언트 생성 실패")?);
    let translator = Translator::new(completion);
    let store = ProgressStore::new(paths.progress_file());

    let report = translator.run(&store).await?;
    print_report(&report);
    Ok(())
}

/// 적재 명령어 (ingest)
async fn cmd_ingest(
    paths: &DataPaths,
    dir: Option<PathBuf>,
    collection: &str,
    recreate: bool,
) -> Result<()> {
    ensure_api_key()?;

    let dir = dir.unwrap_or_else(|| paths.processed_dir());
    println!("[*] 적재 시작: {} → '{}'", dir.display(), collection);
    if recreate {
        println!("[!] recreate 모드: 컬렉션을 지우고 전부 다시 적재합니다");
    }

    let embedder = Arc::new(create_embedder().context("임베딩 클라이언트 생성 실패")?);
    let index = Arc::new(QdrantIndex::from_env().context("Qdrant 클라이언트 생성 실패")?);
    let ingestor = Ingestor::new(embedder, index);
    let store = ProgressStore::new(paths.progress_file());

    match ingestor.run(&dir, collection, recreate, &store).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => fail_with_hint(e),
    }
}

/// 전체 파이프라인 명령어 (pipeline)
async fn cmd_pipeline(paths: &DataPaths, sources_file: &Path, collection: &str) -> Result<()> {
    ensure_api_key()?;

    let sources = load_sources(sources_file)?;
    println!("[*] 전체 파이프라인 실행: {} 도메인 → '{}'", sources.len(), collection);

    let pipeline = Pipeline::new(
        Arc::new(HttpRenderer::new().context("HTTP 렌더러 생성 실패")?),
        Arc::new(create_embedder().context("임베딩 클라이언트 생성 실패")?),
        Arc::new(GeminiCompletion::from_env().context("Gemini 클라이언트 생성 실패")?),
        Arc::new(QdrantIndex::from_env().context("Qdrant 클라이언트 생성 실패")?),
        paths.clone(),
    );

    match pipeline.run_all(&sources, collection).await {
        Ok(reports) => {
            for report in &reports {
                print_report(report);
            }
            println!("[OK] 파이프라인 완료");
            Ok(())
        }
        Err(e) => fail_with_hint(e),
    }
}

/// 단일 질문 명령어 (ask)
async fn cmd_ask(question: &str, collection: &str, top_k: usize) -> Result<()> {
    ensure_api_key()?;

    let chain = build_chain(top_k)?;
    println!("[*] 질문: {}", question);

    match chain.answer(question, collection).await {
        Ok(answer) => {
            println!("\n{answer}");
            Ok(())
        }
        Err(e) => fail_with_hint(e),
    }
}

/// 대화형 질의응답 명령어 (chat)
async fn cmd_chat(collection: &str, top_k: usize) -> Result<()> {
    ensure_api_key()?;

    let chain = build_chain(top_k)?;
    println!("[*] 대화 모드 ('{}' 컬렉션, top-{})", collection, top_k);
    println!("    종료: exit 또는 quit\n");

    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        // EOF (Ctrl-D)도 종료로 취급
        if stdin.read_line(&mut line)? == 0 {
            println!();
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match chain.answer(question, collection).await {
            Ok(answer) => println!("\n{answer}\n"),
            Err(e) => {
                // 대화는 계속되어야 하므로 종료하지 않고 힌트만 출력
                println!("[!] 답변 실패: {}", truncate_text(&e.to_string(), 200));
                print_service_hint(&e);
            }
        }
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(paths: &DataPaths, collection: &str) -> Result<()> {
    println!("lovrag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", paths.data_dir().display());

    // 진행 상태
    let store = ProgressStore::new(paths.progress_file());
    match store.load() {
        Ok(map) => {
            let summary = progress::summarize(&map);
            println!("[OK] 진행 레코드: {} 건", summary.total);
            println!(
                "     크롤링 {} | 추출 {} | 번역 {} | 적재 {}",
                summary.crawled, summary.processed, summary.translated, summary.ingested
            );
        }
        Err(e) => {
            println!("[!] 진행 파일 읽기 실패: {}", e);
        }
    }

    // API 키 상태
    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    // 벡터 인덱스 상태
    match QdrantIndex::from_env() {
        Ok(index) => match index.count(collection).await {
            Ok(count) => {
                println!("[OK] 벡터 컬렉션 '{}': {} 포인트", collection, count);
            }
            Err(e) => {
                println!("[!] 벡터 컬렉션 '{}' 조회 실패: {}", collection, truncate_text(&e.to_string(), 120));
                println!("    확인: Qdrant가 실행 중인지, QDRANT_URL이 올바른지");
            }
        },
        Err(e) => {
            println!("[!] Qdrant 클라이언트 생성 실패: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// API 키 확인
fn ensure_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

/// 소스 설정 로드
fn load_sources(sources_file: &Path) -> Result<DataSources> {
    let sources = load_data_sources(sources_file)
        .with_context(|| format!("소스 설정 로드 실패: {}", sources_file.display()))?;
    if sources.is_empty() {
        bail!("소스 설정이 비어 있습니다: {}", sources_file.display());
    }
    Ok(sources)
}

/// 질의 체인 조립
fn build_chain(top_k: usize) -> Result<RagChain> {
    let embedder = Arc::new(create_embedder().context("임베딩 클라이언트 생성 실패")?);
    let completion = Arc::new(GeminiCompletion::from_env().context("Gemini 클라이언트 생성 실패")?);
    let index = Arc::new(QdrantIndex::from_env().context("Qdrant 클라이언트 생성 실패")?);
    Ok(RagChain::new(embedder, completion, index).with_top_k(top_k))
}

/// 단계 보고 출력
fn print_report(report: &StageReport) {
    println!(
        "[OK] {}: 완료 {}, 건너뜀 {}, 실패 {}",
        report.stage,
        report.completed,
        report.skipped,
        report.failures.len()
    );
    for failure in &report.failures {
        println!(
            "     [!] {}: {}",
            failure.key,
            truncate_text(&failure.error.to_string(), 200)
        );
    }
}

/// 서비스 오류에 대한 조치 힌트 출력
fn print_service_hint(error: &PipelineError) {
    match error {
        PipelineError::Index(_) => {
            println!("    확인: Qdrant가 실행 중인지 (docker run -p 6333:6333 qdrant/qdrant)");
        }
        PipelineError::Model(_) | PipelineError::Config(_) => {
            println!("    확인: GEMINI_API_KEY가 올바르게 설정되어 있는지");
        }
        _ => {}
    }
}

/// 서비스 오류를 힌트와 함께 상위로 전달
fn fail_with_hint(error: PipelineError) -> Result<()> {
    print_service_hint(&error);
    Err(error.into())
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
