use anyhow::{Result, anyhow};
use arxivbuddy_rs::arxiv::{PaperRecord, PaperRepository};
use arxivbuddy_rs::config::Config;
use arxivbuddy_rs::generator::assembler::{AssemblyInput, PaperEntry, assemble};
use arxivbuddy_rs::generator::context::PipelineContext;
use arxivbuddy_rs::generator::pipeline::PipelineEngine;
use arxivbuddy_rs::generator::types::{ExplanationLevel, RunOptions, TaskKind};
use arxivbuddy_rs::generator::workflow::process_query;
use arxivbuddy_rs::i18n::TargetLanguage;
use arxivbuddy_rs::llm::CompletionBackend;
use arxivbuddy_rs::memory::JsonlMemory;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 取出 prompt 第一行中第一对双引号内的问题文本
fn quoted_query(prompt: &str) -> String {
    let first_line = prompt.lines().next().unwrap_or_default();
    first_line
        .split('"')
        .nth(1)
        .unwrap_or_default()
        .to_string()
}

/// 按 prompt 开头回复固定内容，并把问题文本带入回复
struct EchoBackend {
    fail_synthesis: bool,
    prompts: Mutex<Vec<String>>,
}

impl EchoBackend {
    fn new() -> Self {
        Self {
            fail_synthesis: false,
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn prompts_starting_with(&self, opening: &str) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.starts_with(opening))
            .cloned()
            .collect()
    }
}

fn fenced(object: serde_json::Value) -> String {
    format!("Here you go.\n```json\n{}\n```", object)
}

#[async_trait]
impl CompletionBackend for EchoBackend {
    async fn complete(
        &self,
        prompt: &str,
        _role_persona: &str,
        _temperature: f64,
        _max_tokens: u32,
    ) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let query = quoted_query(prompt);

        if prompt.starts_with("Analyse this natural-language") {
            return Ok(fenced(serde_json::json!({
                "search_query": query,
                "keywords": ["transformer", "attention"],
                "context": format!("Context of {}", query),
            })));
        }
        if prompt.starts_with("Search arXiv") {
            return Ok(fenced(serde_json::json!({ "search_query": "" })));
        }
        if prompt.starts_with("Analyse in depth") {
            return Ok(fenced(serde_json::json!({ "paper_analyses": format!("Analyses for {}", query) })));
        }
        if prompt.starts_with("Write a simplified summary") {
            return Ok(fenced(serde_json::json!({ "summary_text": format!("Summary for {}", query) })));
        }
        if prompt.starts_with("Write a comparative synthesis") {
            if self.fail_synthesis {
                return Err(anyhow!("rate limited"));
            }
            return Ok(fenced(serde_json::json!({ "synthesis_text": format!("Synthesis for {}", query) })));
        }
        if prompt.starts_with("Answer the question") {
            return Ok(fenced(serde_json::json!({ "answer_text": format!("Answer for {}", query) })));
        }
        if prompt.starts_with("Translate the summary") {
            return Ok(fenced(serde_json::json!({
                "summary_translated": "Résumé traduit.",
                "synthesis_translated": "Synthèse traduite.",
            })));
        }
        // 贡献说明只给第一篇论文
        Ok(fenced(serde_json::json!({
            "contributions": { "2401.00001": "Introduces the first idea." }
        })))
    }
}

/// 每次检索依次返回预设结果，用尽后返回固定结果
struct StaticRepository {
    scripted: Mutex<Vec<Vec<PaperRecord>>>,
    fallback: Vec<PaperRecord>,
    calls: Mutex<usize>,
}

impl StaticRepository {
    fn returning(papers: Vec<PaperRecord>) -> Self {
        Self {
            scripted: Mutex::new(Vec::new()),
            fallback: papers,
            calls: Mutex::new(0),
        }
    }

    fn scripted(mut responses: Vec<Vec<PaperRecord>>) -> Self {
        responses.reverse();
        Self {
            scripted: Mutex::new(responses),
            fallback: Vec::new(),
            calls: Mutex::new(0),
        }
    }

    fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl PaperRepository for StaticRepository {
    async fn search(&self, _query: &str, max_results: usize, _categories: &[String]) -> Vec<PaperRecord> {
        *self.calls.lock().unwrap() += 1;
        let mut papers = self
            .scripted
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| self.fallback.clone());
        papers.truncate(max_results);
        papers
    }
}

fn paper(n: usize) -> PaperRecord {
    let id = format!("2401.0000{}", n);
    PaperRecord {
        title: format!("Efficient Attention {}", n),
        authors: vec![
            "First Author".to_string(),
            "Second Author".to_string(),
            "Third Author".to_string(),
            "Fourth Author".to_string(),
        ],
        published: chrono::NaiveDate::from_ymd_opt(2024, 1, n as u32),
        abstract_text: format!("Paper {} proposes a new attention variant. It is fast.", n),
        categories: vec!["cs.LG".to_string()],
        url: format!("https://arxiv.org/abs/{}", id),
        pdf_url: Some(format!("https://arxiv.org/pdf/{}", id)),
        id,
    }
}

fn engine(backend: Arc<EchoBackend>, repository: Arc<StaticRepository>) -> PipelineEngine {
    let context = PipelineContext::with_collaborators(Config::default(), backend, repository)
        .expect("default config builds a context");
    PipelineEngine::new(context)
}

fn beginner_in_french(max_results: usize) -> RunOptions {
    RunOptions {
        max_results,
        level: ExplanationLevel::Beginner,
        translate: true,
        target_language: TargetLanguage::French,
    }
}

#[tokio::test]
async fn test_beginner_translated_run() {
    let backend = Arc::new(EchoBackend::new());
    let repository = Arc::new(StaticRepository::returning((1..=5).map(paper).collect()));
    let engine = engine(backend.clone(), repository.clone());

    let document = process_query(&engine, "What is sparse attention?", beginner_in_french(3)).await;

    assert!(document.starts_with("### Résultat de votre question :\n*What is sparse attention?*"));
    assert!(document.contains("#### ⚡ Réponse à la question :\nAnswer for What is sparse attention?"));
    assert!(document.contains("#### 🔍 Résumé des découvertes principales :\nRésumé traduit."));
    assert!(document.contains("#### 🧠 Synthèse comparative :\nSynthèse traduite."));
    assert!(document.contains("3. **Efficient Attention 3**"));
    assert!(!document.contains("4. **"));
    assert!(document.contains("   *First Author, Second Author, Third Author et al.*"));
    assert!(document.contains("   Introduces the first idea."));
    assert!(document.contains("   Paper 2 proposes a new attention variant."));
    assert_eq!(repository.calls(), 1);

    // 讲解深度注入了读者描述
    let summaries = backend.prompts_starting_with("Write a simplified summary");
    assert!(summaries[0].contains("someone with basic scientific literacy"));
}

#[tokio::test]
async fn test_no_papers_returns_explanation() {
    let backend = Arc::new(EchoBackend::new());
    let repository = Arc::new(StaticRepository::returning(Vec::new()));
    let engine = engine(backend.clone(), repository.clone());

    let output = process_query(&engine, "quantum llamas", beginner_in_french(5)).await;

    assert!(output.starts_with("❌ An error occurred while processing your query:"));
    assert!(output.contains("no papers found"));
    assert_eq!(repository.calls(), 2);
    assert!(backend.prompts_starting_with("Analyse in depth").is_empty());
}

#[tokio::test]
async fn test_two_papers_trigger_exactly_one_retry() {
    let backend = Arc::new(EchoBackend::new());
    let repository = Arc::new(StaticRepository::scripted(vec![
        vec![paper(1), paper(2)],
        vec![paper(2), paper(3)],
    ]));
    let engine = engine(backend.clone(), repository.clone());

    let run = engine
        .run("sparse attention transformers", beginner_in_french(5))
        .await
        .unwrap();

    assert_eq!(repository.calls(), 2);
    assert_eq!(backend.prompts_starting_with("Search arXiv").len(), 1);
    let ids: Vec<&str> = run.papers().iter().map(|p| p.id.as_str()).collect();
    assert_eq!(ids, vec!["2401.00001", "2401.00002", "2401.00003"]);
}

#[tokio::test]
async fn test_synthesis_failure_still_returns_document() {
    let backend = Arc::new(EchoBackend {
        fail_synthesis: true,
        prompts: Mutex::new(Vec::new()),
    });
    let repository = Arc::new(StaticRepository::returning((1..=3).map(paper).collect()));
    let engine = engine(backend, repository);

    let mut options = beginner_in_french(3);
    options.translate = false;
    let document = process_query(&engine, "What is sparse attention?", options).await;

    assert!(!document.starts_with("❌"));
    assert!(document.contains(
        "#### 🧠 Comparative synthesis :\n> ⚠️ *This section could not be generated.*"
    ));
    assert!(document.contains("Summary for What is sparse attention?"));
}

#[tokio::test]
async fn test_synthesis_failure_is_marked_in_translated_document() {
    let backend = Arc::new(EchoBackend {
        fail_synthesis: true,
        prompts: Mutex::new(Vec::new()),
    });
    let repository = Arc::new(StaticRepository::returning((1..=3).map(paper).collect()));
    let engine = engine(backend.clone(), repository);

    let document = process_query(&engine, "What is sparse attention?", beginner_in_french(3)).await;

    assert!(document.contains("Résumé traduit."));
    assert!(document.contains(
        "#### 🧠 Synthèse comparative :\n> ⚠️ *Cette section n'a pas pu être générée.*"
    ));
    assert!(!document.contains("Synthèse traduite."));
    for prompt in backend.prompts_starting_with("Translate the summary") {
        assert!(!prompt.contains("[degraded content]"));
    }
}

#[tokio::test]
async fn test_format_final_sees_every_predecessor() {
    let backend = Arc::new(EchoBackend::new());
    let repository = Arc::new(StaticRepository::returning((1..=3).map(paper).collect()));
    let engine = engine(backend.clone(), repository);

    let run = engine
        .run("What is sparse attention?", beginner_in_french(3))
        .await
        .unwrap();

    let search_raw = run.result(TaskKind::Search).unwrap().raw.clone();
    let analyze = run.node(TaskKind::Analyze).unwrap().instruction().unwrap();
    assert!(analyze.contains(search_raw.trim()));

    let final_prompt = run.node(TaskKind::FormatFinal).unwrap().instruction().unwrap();
    for expected in [
        "Efficient Attention 1",
        "Summary for What is sparse attention?",
        "Synthesis for What is sparse attention?",
        "Résumé traduit.",
        "Answer for What is sparse attention?",
    ] {
        assert!(final_prompt.contains(expected), "missing {}", expected);
    }
}

#[test]
fn test_assemble_is_deterministic() {
    let papers: Vec<PaperRecord> = (1..=3).map(paper).collect();
    let entries: Vec<PaperEntry> = papers
        .iter()
        .map(|p| PaperEntry {
            paper: p,
            contribution: "A note.",
        })
        .collect();
    let input = AssemblyInput {
        query: "q",
        direct_answer: Some("a"),
        summary: None,
        papers: &entries,
        synthesis: Some("s"),
        translated: None,
        labels: TargetLanguage::German.document_labels(),
        max_results: 3,
    };

    assert_eq!(assemble(&input), assemble(&input));
}

#[tokio::test]
async fn test_concurrent_runs_do_not_share_state() {
    let backend = Arc::new(EchoBackend::new());
    let repository = Arc::new(StaticRepository::returning((1..=3).map(paper).collect()));
    let engine = engine(backend, repository);

    let queries = [
        "How does linear attention work?",
        "Why do transformers need positional encodings?",
        "What limits context length?",
    ];
    let mut options = beginner_in_french(3);
    options.translate = false;

    let documents = futures::future::join_all(
        queries
            .iter()
            .map(|query| process_query(&engine, query, options.clone())),
    )
    .await;

    for (query, document) in queries.iter().zip(&documents) {
        assert!(document.contains(&format!("Answer for {}", query)));
        for other in queries.iter().filter(|q| *q != query) {
            assert!(!document.contains(&format!("Answer for {}", other)));
        }
    }
}

#[tokio::test]
async fn test_memory_carries_over_between_runs() {
    let temp_dir = TempDir::new().unwrap();
    let memory_path = temp_dir.path().join("memory").join("history.jsonl");
    let backend = Arc::new(EchoBackend::new());
    let repository = Arc::new(StaticRepository::returning((1..=3).map(paper).collect()));
    let context = PipelineContext::with_collaborators(Config::default(), backend.clone(), repository)
        .unwrap()
        .with_memory(Arc::new(JsonlMemory::new(&memory_path)));
    let engine = PipelineEngine::new(context);

    let mut options = beginner_in_french(3);
    options.translate = false;
    engine.run("What is sparse attention?", options.clone()).await.unwrap();
    engine.run("Which attention variants scale best?", options).await.unwrap();

    let lines = std::fs::read_to_string(&memory_path).unwrap();
    assert_eq!(lines.lines().count(), 2);

    let parse_prompts = backend.prompts_starting_with("Analyse this natural-language");
    assert!(!parse_prompts[0].contains("Related previous research"));
    assert!(parse_prompts[1].contains("Previous question \"What is sparse attention?\""));
}
