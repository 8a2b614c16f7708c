//! 角色注册表：每个角色对应一份固定的人设（role / goal / backstory）

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

use super::types::PipelineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    QueryParser,
    Searcher,
    Analyzer,
    Summarizer,
    Synthesizer,
    Translator,
    Professor,
}

impl RoleKind {
    pub const ALL: [RoleKind; 7] = [
        RoleKind::QueryParser,
        RoleKind::Searcher,
        RoleKind::Analyzer,
        RoleKind::Summarizer,
        RoleKind::Synthesizer,
        RoleKind::Translator,
        RoleKind::Professor,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            RoleKind::QueryParser => "query_parser",
            RoleKind::Searcher => "searcher",
            RoleKind::Analyzer => "analyzer",
            RoleKind::Summarizer => "summarizer",
            RoleKind::Synthesizer => "synthesizer",
            RoleKind::Translator => "translator",
            RoleKind::Professor => "professor",
        }
    }

    fn index(&self) -> usize {
        *self as usize
    }
}

impl Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for RoleKind {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        RoleKind::ALL
            .into_iter()
            .find(|kind| kind.key() == normalized)
            .ok_or_else(|| PipelineError::UnknownRoleKey(s.to_string()))
    }
}

/// 用于引导模型行为的人设
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePersona {
    pub role: String,
    pub goal: String,
    pub backstory: String,
}

impl RolePersona {
    fn new(role: &str, goal: &str, backstory: &str) -> Self {
        Self {
            role: role.to_string(),
            goal: goal.to_string(),
            backstory: backstory.to_string(),
        }
    }

    /// 渲染为系统提示词
    pub fn preamble(&self) -> String {
        format!(
            "You are {}.\nYour goal: {}\n\n{}",
            self.role, self.goal, self.backstory
        )
    }
}

fn builtin_persona(kind: RoleKind) -> RolePersona {
    match kind {
        RoleKind::QueryParser => RolePersona::new(
            "a scientific literature search expert",
            "Extract the best search terms from a natural-language research question",
            "You know exactly how to turn a question asked in everyday language into an \
             optimized query for the arXiv repository. You identify the key concepts, the \
             specific technical terms and the relations between them.",
        ),
        RoleKind::Searcher => RolePersona::new(
            "an arXiv search specialist",
            "Find the most relevant scientific papers on arXiv",
            "You know the arXiv database and its categories inside out. You master the art \
             of bibliographic search and know how to phrase precise queries that surface the \
             most relevant papers.",
        ),
        RoleKind::Analyzer => RolePersona::new(
            "a scientific publication analyst",
            "Extract and understand the key information of scientific papers",
            "You excel at pulling out the essentials of a paper: its methodology, its results \
             and their implications. You quickly judge how important and how relevant a paper \
             is for a given research question.",
        ),
        RoleKind::Summarizer => RolePersona::new(
            "a science communication expert",
            "Simplify and summarize complex scientific papers",
            "You have a rare talent for turning complex scientific concepts into clear and \
             accessible explanations while keeping their precision and nuance. You adapt your \
             level of explanation to any audience, from experts to beginners.",
        ),
        RoleKind::Synthesizer => RolePersona::new(
            "a research analyst",
            "Build a comparative synthesis and identify trends",
            "You specialise in comparing research work. You spot similarities, differences and \
             emerging trends across several papers and write syntheses that give a clear, \
             structured overview of a scientific topic.",
        ),
        RoleKind::Translator => RolePersona::new(
            "a translator of scientific content",
            "Adapt scientific content to a target language and audience level",
            "You translate and adapt scientific explanations for experts, students and the \
             general public. You always keep the scientific meaning intact, even when \
             simplifying.",
        ),
        RoleKind::Professor => RolePersona::new(
            "an outstanding teaching professor",
            "Give a clear, precise and accessible answer to the user's question",
            "You are known for explaining complex scientific concepts in an engaging way \
             without sacrificing rigour. You use relevant analogies, structure your answers \
             pedagogically, and always get straight to the point before giving the context \
             needed for full understanding.",
        ),
    }
}

/// 角色到人设的完整映射，构建后只读
#[derive(Debug, Clone, PartialEq)]
pub struct RoleRegistry {
    personas: [RolePersona; 7],
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl RoleRegistry {
    pub fn builtin() -> Self {
        Self {
            personas: std::array::from_fn(|i| builtin_persona(RoleKind::ALL[i])),
        }
    }

    /// 应用配置中的人设覆盖，未知的角色名在构建时报错
    pub fn with_overrides(
        mut self,
        overrides: &BTreeMap<String, RolePersona>,
    ) -> Result<Self, PipelineError> {
        for (key, persona) in overrides {
            let kind: RoleKind = key.parse()?;
            self.personas[kind.index()] = persona.clone();
        }
        Ok(self)
    }

    pub fn persona(&self, kind: RoleKind) -> &RolePersona {
        &self.personas[kind.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_registry_is_total() {
        let registry = RoleRegistry::builtin();
        for kind in RoleKind::ALL {
            let persona = registry.persona(kind);
            assert!(!persona.role.is_empty(), "{} has no role", kind);
            assert!(!persona.goal.is_empty());
            assert!(!persona.backstory.is_empty());
        }
    }

    #[test]
    fn test_role_kind_parse() {
        assert_eq!("query_parser".parse::<RoleKind>().unwrap(), RoleKind::QueryParser);
        assert_eq!("Query-Parser".parse::<RoleKind>().unwrap(), RoleKind::QueryParser);
        assert_eq!(
            "critic".parse::<RoleKind>(),
            Err(PipelineError::UnknownRoleKey("critic".to_string()))
        );
    }

    #[test]
    fn test_with_overrides() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "summarizer".to_string(),
            RolePersona::new("a journalist", "Explain simply", "Writes for newspapers."),
        );

        let registry = RoleRegistry::builtin().with_overrides(&overrides).unwrap();
        assert_eq!(registry.persona(RoleKind::Summarizer).role, "a journalist");
        assert_eq!(
            registry.persona(RoleKind::Professor),
            RoleRegistry::builtin().persona(RoleKind::Professor)
        );
    }

    #[test]
    fn test_with_overrides_rejects_unknown_key() {
        let mut overrides = BTreeMap::new();
        overrides.insert(
            "reviewer".to_string(),
            RolePersona::new("a reviewer", "Review", "Reviews papers."),
        );

        let result = RoleRegistry::builtin().with_overrides(&overrides);
        assert_eq!(
            result,
            Err(PipelineError::UnknownRoleKey("reviewer".to_string()))
        );
    }

    #[test]
    fn test_preamble_contains_persona() {
        let persona = RoleRegistry::builtin().persona(RoleKind::Professor).clone();
        let preamble = persona.preamble();
        assert!(preamble.starts_with("You are an outstanding teaching professor."));
        assert!(preamble.contains(&persona.goal));
        assert!(preamble.contains(&persona.backstory));
    }
}
