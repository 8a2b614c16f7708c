//! LLM客户端 - 提供统一的LLM服务接口

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::LLMConfig;

mod providers;

pub use providers::SamplingParams;
use providers::ProviderClient;

/// LLM补全能力的抽象
///
/// 流水线只依赖这个 trait：给定 prompt 与角色设定返回任意自由文本，不假定任何输出结构。
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        role_persona: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String>;
}

/// LLM客户端 - 基于 rig 的多 provider 实现
#[derive(Clone)]
pub struct LLMClient {
    config: LLMConfig,
    client: ProviderClient,
}

impl LLMClient {
    /// 创建新的LLM客户端
    pub fn new(config: LLMConfig) -> Result<Self> {
        let client = ProviderClient::new(&config)?;
        Ok(Self { client, config })
    }

    /// 检查模型连接和功能是否正常
    pub async fn check_connection(&self) -> Result<()> {
        info!("🔄 正在检查模型连接...");
        match self
            .complete("Hello", "You are a helpful assistant.", 0.0, 16)
            .await
        {
            Ok(_) => {
                info!("✅ 模型连接正常");
                Ok(())
            }
            Err(e) => {
                error!("❌ 模型连接失败: {}", e);
                Err(e)
            }
        }
    }

    /// 通用重试逻辑，单次尝试受 `timeout_seconds` 约束
    async fn retry_with_backoff<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, anyhow::Error>>,
    {
        let max_retries = self.config.retry_attempts.max(1);
        let retry_delay = Duration::from_millis(self.config.retry_delay_ms);
        let timeout = Duration::from_secs(self.config.timeout_seconds);
        let mut retries = 0;

        loop {
            let attempt = match tokio::time::timeout(timeout, operation()).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "model call timed out after {}s",
                    timeout.as_secs()
                )),
            };
            match attempt {
                Ok(result) => return Ok(result),
                Err(err) => {
                    retries += 1;
                    warn!(
                        "❌ 调用模型服务出错，重试中 (第 {} / {}次尝试): {}",
                        retries, max_retries, err
                    );
                    if retries >= max_retries {
                        return Err(err);
                    }
                    tokio::time::sleep(retry_delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl CompletionBackend for LLMClient {
    async fn complete(
        &self,
        prompt: &str,
        role_persona: &str,
        temperature: f64,
        max_tokens: u32,
    ) -> Result<String> {
        let agent = self.client.create_agent(
            &self.config.model,
            role_persona,
            SamplingParams {
                temperature,
                max_tokens,
            },
        );

        self.retry_with_backoff(|| async { agent.prompt(prompt).await })
            .await
    }
}
