use crate::config::{Config, LLMProvider, OutputFormat};
use crate::generator::types::{ExplanationLevel, RunOptions};
use crate::i18n::TargetLanguage;
use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tracing::warn;

/// arxivbuddy-rs - 由Rust与LLM驱动的arXiv论文研究助手
#[derive(Parser, Debug)]
#[command(name = "arxivbuddy-rs")]
#[command(
    about = "Research assistant that searches arXiv for a natural-language question and produces a structured answer: direct answer, summary of findings, recommended papers and a comparative synthesis."
)]
#[command(version)]
pub struct Args {
    /// 研究问题
    pub query: String,

    /// 最多检索的论文数量
    #[arg(short = 'n', long)]
    pub max_results: Option<usize>,

    /// 讲解深度 (expert, medium, beginner)
    #[arg(short, long)]
    pub level: Option<String>,

    /// 不翻译摘要与综述
    #[arg(long)]
    pub no_translate: bool,

    /// 目标语言 (fr, en, zh, ja, ko, de, es, ru)
    #[arg(short, long)]
    pub target_language: Option<String>,

    /// 结果文件格式 (md, json, txt)
    #[arg(short, long)]
    pub format: Option<String>,

    /// 结果保存目录
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// 配置文件路径
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// LLM Provider (openai, moonshot, deepseek, mistral, openrouter, anthropic, gemini, ollama)
    #[arg(long)]
    pub llm_provider: Option<String>,

    /// 模型名称
    #[arg(short, long)]
    pub model: Option<String>,

    /// LLM API基地址
    #[arg(long)]
    pub llm_api_base_url: Option<String>,

    /// LLM API KEY
    #[arg(long)]
    pub llm_api_key: Option<String>,

    /// 温度参数
    #[arg(long)]
    pub temperature: Option<f64>,

    /// 最大tokens数
    #[arg(long)]
    pub max_tokens: Option<u32>,

    /// 启用跨查询记忆
    #[arg(long)]
    pub memory: bool,

    /// 是否启用详细日志
    #[arg(short, long)]
    pub verbose: bool,

    /// 以JSON格式输出日志
    #[arg(long)]
    pub log_json: bool,

    /// 跳过启动时的模型连接检查
    #[arg(long)]
    pub skip_connection_check: bool,

    /// 不保存结果文件
    #[arg(long)]
    pub no_save: bool,
}

impl Args {
    /// 加载配置文件与环境变量，再用命令行参数覆盖
    pub fn into_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;
        self.apply_to(&mut config);
        Ok(config)
    }

    /// 命令行参数优先级最高
    pub fn apply_to(&self, config: &mut Config) {
        // 覆盖LLM配置
        if let Some(provider_str) = &self.llm_provider {
            match provider_str.parse::<LLMProvider>() {
                Ok(provider) => config.llm.provider = provider,
                Err(_) => warn!("⚠️ 未知的provider: {}，保留 {}", provider_str, config.llm.provider),
            }
        }
        if let Some(llm_api_base_url) = &self.llm_api_base_url {
            config.llm.api_base_url = llm_api_base_url.clone();
        }
        if let Some(llm_api_key) = &self.llm_api_key {
            config.llm.api_key = llm_api_key.clone();
        }
        if let Some(model) = &self.model {
            config.llm.model = model.clone();
        }
        if let Some(max_tokens) = self.max_tokens {
            config.llm.max_tokens = max_tokens;
        }
        if let Some(temperature) = self.temperature {
            config.llm.temperature = temperature;
        }

        // 检索与讲解参数
        if let Some(max_results) = self.max_results {
            config.arxiv.max_results = max_results;
        }
        if let Some(level) = &self.level {
            let parsed = ExplanationLevel::from_str_lossy(level);
            if !level.eq_ignore_ascii_case(&parsed.to_string()) {
                warn!("⚠️ 未知的讲解深度: {}，使用 {}", level, parsed);
            }
            config.level = parsed;
        }
        if self.no_translate {
            config.translate = false;
        }
        if let Some(target_language_str) = &self.target_language {
            match target_language_str.parse::<TargetLanguage>() {
                Ok(target_language) => config.target_language = target_language,
                Err(_) => warn!(
                    "⚠️ 未知的目标语言: {}，使用 {}",
                    target_language_str,
                    config.target_language.display_name()
                ),
            }
        }

        // 输出配置
        if let Some(format_str) = &self.format {
            config.output.format = format_str.parse::<OutputFormat>().unwrap_or_else(|_| {
                warn!("⚠️ 未知的输出格式: {}，使用 md", format_str);
                OutputFormat::Md
            });
        }
        if let Some(output_dir) = &self.output_dir {
            config.output.dir = output_dir.clone();
        }
        if self.no_save {
            config.output.save = false;
        }

        // 其他配置
        if self.memory {
            config.memory.enabled = true;
        }
        if self.verbose {
            config.verbose = true;
        }
    }
}

/// 由最终配置得到单次运行参数
pub fn run_options(config: &Config) -> RunOptions {
    RunOptions {
        max_results: config.arxiv.max_results,
        level: config.level,
        translate: config.translate,
        target_language: config.target_language,
    }
}
