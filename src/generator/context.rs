use std::sync::Arc;

use anyhow::Result;

use crate::arxiv::{ArxivClient, PaperRepository};
use crate::config::Config;
use crate::generator::prompts::PromptTemplateStore;
use crate::generator::roles::RoleRegistry;
use crate::llm::CompletionBackend;
use crate::memory::{JsonlMemory, ResearchMemory};

/// 流水线运行所需的协作者与只读表
///
/// 所有字段都可以在并发运行之间共享；每次运行的可变状态只存在于各自的 `PipelineRun` 中。
#[derive(Clone)]
pub struct PipelineContext {
    /// LLM调用器
    pub backend: Arc<dyn CompletionBackend>,
    /// 论文仓库
    pub repository: Arc<dyn PaperRepository>,
    /// 可选的跨运行记忆
    pub memory: Option<Arc<dyn ResearchMemory>>,
    pub roles: Arc<RoleRegistry>,
    pub prompts: Arc<PromptTemplateStore>,
    /// 配置
    pub config: Config,
}

impl PipelineContext {
    /// 使用已创建好的 LLM 客户端（例如已通过连接检查的客户端），
    /// 论文仓库为 arXiv 客户端，并在启用时挂上 JSONL 记忆
    pub fn with_backend(config: Config, backend: Arc<dyn CompletionBackend>) -> Result<Self> {
        let repository = Arc::new(ArxivClient::new(config.arxiv.clone())?);
        let mut context = Self::with_collaborators(config, backend, repository)?;
        if context.config.memory.enabled {
            let memory = JsonlMemory::new(context.config.memory.path.clone());
            context = context.with_memory(Arc::new(memory));
        }
        Ok(context)
    }

    /// 注入任意协作者，配置中的角色覆盖在这里校验
    pub fn with_collaborators(
        config: Config,
        backend: Arc<dyn CompletionBackend>,
        repository: Arc<dyn PaperRepository>,
    ) -> Result<Self> {
        let roles = RoleRegistry::builtin().with_overrides(&config.roles)?;
        Ok(Self {
            backend,
            repository,
            memory: None,
            roles: Arc::new(roles),
            prompts: Arc::new(PromptTemplateStore::builtin()),
            config,
        })
    }

    pub fn with_memory(mut self, memory: Arc<dyn ResearchMemory>) -> Self {
        self.memory = Some(memory);
        self
    }
}
