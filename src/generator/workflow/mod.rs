use crate::config::{Config, OutputConfig};
use crate::generator::context::PipelineContext;
use crate::generator::outlet::save_document;
use crate::generator::pipeline::PipelineEngine;
use crate::generator::types::{PipelineError, RunOptions};
use crate::llm::LLMClient;

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// 时间跟踪作用域，阶段按开始顺序记录
#[derive(Debug)]
pub struct TimingScope {
    start_time: Instant,
    phase_start_times: Vec<(String, Instant)>,
    phase_durations: Vec<(String, Duration)>,
}

impl Default for TimingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl TimingScope {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            phase_start_times: Vec::new(),
            phase_durations: Vec::new(),
        }
    }

    /// 开始一个新的阶段计时
    pub fn start_phase(&mut self, phase_name: &str) {
        self.phase_start_times
            .retain(|(name, _)| name != phase_name);
        self.phase_start_times
            .push((phase_name.to_string(), Instant::now()));
    }

    /// 结束一个阶段的计时
    pub fn end_phase(&mut self, phase_name: &str) -> Option<Duration> {
        let position = self
            .phase_start_times
            .iter()
            .position(|(name, _)| name == phase_name)?;
        let (name, start_time) = self.phase_start_times.remove(position);
        let duration = start_time.elapsed();
        self.phase_durations.push((name, duration));
        Some(duration)
    }

    /// 获取总执行时间
    pub fn get_total_duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 获取所有阶段的执行时间
    pub fn get_phase_durations(&self) -> &[(String, Duration)] {
        &self.phase_durations
    }

    /// 获取格式化的执行时间报告
    pub fn generate_timing_report(&self) -> String {
        let mut report = format!(
            "总执行时间: {:.2}秒\n",
            self.get_total_duration().as_secs_f64()
        );

        if !self.phase_durations.is_empty() {
            report.push_str("\n各阶段执行时间:\n");
            for (phase, duration) in &self.phase_durations {
                report.push_str(&format!("- {}: {:.3}秒\n", phase, duration.as_secs_f64()));
            }
        }

        report
    }
}

/// 执行一次查询，返回组装好的文档
pub async fn run_query(
    engine: &PipelineEngine,
    query: &str,
    options: RunOptions,
) -> Result<String, PipelineError> {
    let run = engine.run(query, options).await?;
    Ok(run.document().unwrap_or_default().to_string())
}

/// 执行一次查询；失败时返回可直接展示给用户的说明文字
pub async fn process_query(engine: &PipelineEngine, query: &str, options: RunOptions) -> String {
    match run_query(engine, query, options).await {
        Ok(document) => document,
        Err(e) => {
            error!("❌ 查询处理失败: {}", e);
            failure_message(&e)
        }
    }
}

pub fn failure_message(error: &PipelineError) -> String {
    format!("❌ An error occurred while processing your query: {}", error)
}

/// 按输出配置保存文档；保存失败只记录警告，不影响已生成的文档
pub async fn persist_document(output: &OutputConfig, query: &str, document: &str) -> Option<PathBuf> {
    if !output.save {
        return None;
    }
    match save_document(
        query,
        document,
        output.format,
        &output.dir,
        output.filename_max_len,
    )
    .await
    {
        Ok(path) => {
            info!("💾 结果已保存到: {}", path.display());
            Some(path)
        }
        Err(e) => {
            warn!("⚠️ 保存结果失败: {:#}", e);
            None
        }
    }
}

/// 一次命令行运行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchOutcome {
    /// 文档，或失败时的说明文字
    pub output: String,
    pub saved_path: Option<PathBuf>,
    pub succeeded: bool,
}

/// 启动一次完整的研究流程
///
/// 连接检查失败属于配置错误，以 `Err` 返回；流水线失败则体现在 `LaunchOutcome` 中。
pub async fn launch(
    config: &Config,
    query: &str,
    options: RunOptions,
    skip_connection_check: bool,
) -> Result<LaunchOutcome> {
    let llm_client = LLMClient::new(config.llm.clone())?;

    // 启动时检查模型连接
    if !skip_connection_check {
        llm_client.check_connection().await?;
    }

    let context = PipelineContext::with_backend(config.clone(), Arc::new(llm_client))?;
    let engine = PipelineEngine::new(context);

    match run_query(&engine, query, options).await {
        Ok(document) => {
            let saved_path = persist_document(&config.output, query, &document).await;
            Ok(LaunchOutcome {
                output: document,
                saved_path,
                succeeded: true,
            })
        }
        Err(e) => {
            error!("❌ 查询处理失败: {}", e);
            Ok(LaunchOutcome {
                output: failure_message(&e),
                saved_path: None,
                succeeded: false,
            })
        }
    }
}

// Include tests
#[cfg(test)]
mod tests;
