use serde::{Deserialize, Serialize};

/// 目标语言类型
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetLanguage {
    #[serde(rename = "fr")]
    #[default]
    French,
    #[serde(rename = "en")]
    English,
    #[serde(rename = "zh")]
    Chinese,
    #[serde(rename = "ja")]
    Japanese,
    #[serde(rename = "ko")]
    Korean,
    #[serde(rename = "de")]
    German,
    #[serde(rename = "es")]
    Spanish,
    #[serde(rename = "ru")]
    Russian,
}

impl std::fmt::Display for TargetLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetLanguage::French => write!(f, "fr"),
            TargetLanguage::English => write!(f, "en"),
            TargetLanguage::Chinese => write!(f, "zh"),
            TargetLanguage::Japanese => write!(f, "ja"),
            TargetLanguage::Korean => write!(f, "ko"),
            TargetLanguage::German => write!(f, "de"),
            TargetLanguage::Spanish => write!(f, "es"),
            TargetLanguage::Russian => write!(f, "ru"),
        }
    }
}

impl std::str::FromStr for TargetLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fr" | "french" | "français" | "francais" => Ok(TargetLanguage::French),
            "en" | "english" => Ok(TargetLanguage::English),
            "zh" | "chinese" | "中文" => Ok(TargetLanguage::Chinese),
            "ja" | "japanese" | "日本語" => Ok(TargetLanguage::Japanese),
            "ko" | "korean" | "한국어" => Ok(TargetLanguage::Korean),
            "de" | "german" | "deutsch" => Ok(TargetLanguage::German),
            "es" | "spanish" | "español" | "espanol" => Ok(TargetLanguage::Spanish),
            "ru" | "russian" | "русский" => Ok(TargetLanguage::Russian),
            _ => Err(format!("Unknown target language: {}", s)),
        }
    }
}

/// 最终文档中各个章节的标题文本
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentLabels {
    pub result: &'static str,
    pub answer: &'static str,
    pub summary: &'static str,
    pub papers: &'static str,
    pub synthesis: &'static str,
    pub unavailable: &'static str,
}

impl DocumentLabels {
    pub const ENGLISH: DocumentLabels = DocumentLabels {
        result: "Result for your query",
        answer: "Answer to your question",
        summary: "Summary of the main findings",
        papers: "Recommended papers",
        synthesis: "Comparative synthesis",
        unavailable: "This section could not be generated",
    };
}

impl TargetLanguage {
    /// 获取语言的描述性名称
    pub fn display_name(&self) -> &'static str {
        match self {
            TargetLanguage::French => "Français",
            TargetLanguage::English => "English",
            TargetLanguage::Chinese => "中文",
            TargetLanguage::Japanese => "日本語",
            TargetLanguage::Korean => "한국어",
            TargetLanguage::German => "Deutsch",
            TargetLanguage::Spanish => "Español",
            TargetLanguage::Russian => "Русский",
        }
    }

    /// 语言的英文名称，用于拼装发给模型的指令
    pub fn english_name(&self) -> &'static str {
        match self {
            TargetLanguage::French => "French",
            TargetLanguage::English => "English",
            TargetLanguage::Chinese => "Chinese",
            TargetLanguage::Japanese => "Japanese",
            TargetLanguage::Korean => "Korean",
            TargetLanguage::German => "German",
            TargetLanguage::Spanish => "Spanish",
            TargetLanguage::Russian => "Russian",
        }
    }

    /// 获取语言的提示词指令
    pub fn prompt_instruction(&self) -> &'static str {
        match self {
            TargetLanguage::French => {
                "Rédige ta réponse en français, dans un style précis, fluide et naturel."
            }
            TargetLanguage::English => {
                "Write your answer in English, ensuring accurate, professional, and easy-to-understand language."
            }
            TargetLanguage::Chinese => "请使用中文作答，确保语言表达准确、专业、易于理解。",
            TargetLanguage::Japanese => {
                "日本語で回答してください。正確で専門的で理解しやすい言語表現を心がけてください。"
            }
            TargetLanguage::Korean => {
                "한국어로 답변해 주세요. 정확하고 전문적이며 이해하기 쉬운 언어 표현을 사용해 주세요."
            }
            TargetLanguage::German => {
                "Bitte antworte auf Deutsch, präzise, professionell und leicht verständlich."
            }
            TargetLanguage::Spanish => {
                "Redacta tu respuesta en español, de forma precisa, profesional y fácil de entender."
            }
            TargetLanguage::Russian => {
                "Пожалуйста, отвечай на русском языке, точно, профессионально и понятно."
            }
        }
    }

    /// 获取本地化的文档章节标题
    pub fn document_labels(&self) -> DocumentLabels {
        match self {
            TargetLanguage::English => DocumentLabels::ENGLISH,
            TargetLanguage::French => DocumentLabels {
                result: "Résultat de votre question",
                answer: "Réponse à la question",
                summary: "Résumé des découvertes principales",
                papers: "Papiers recommandés",
                synthesis: "Synthèse comparative",
                unavailable: "Cette section n'a pas pu être générée",
            },
            TargetLanguage::Chinese => DocumentLabels {
                result: "问题结果",
                answer: "问题解答",
                summary: "主要发现摘要",
                papers: "推荐论文",
                synthesis: "对比综述",
                unavailable: "该部分未能生成",
            },
            TargetLanguage::Japanese => DocumentLabels {
                result: "ご質問への結果",
                answer: "質問への回答",
                summary: "主な発見の要約",
                papers: "おすすめ論文",
                synthesis: "比較まとめ",
                unavailable: "このセクションは生成できませんでした",
            },
            TargetLanguage::Korean => DocumentLabels {
                result: "질문 결과",
                answer: "질문에 대한 답변",
                summary: "주요 발견 요약",
                papers: "추천 논문",
                synthesis: "비교 종합",
                unavailable: "이 섹션을 생성할 수 없습니다",
            },
            TargetLanguage::German => DocumentLabels {
                result: "Ergebnis Ihrer Frage",
                answer: "Antwort auf die Frage",
                summary: "Zusammenfassung der wichtigsten Erkenntnisse",
                papers: "Empfohlene Artikel",
                synthesis: "Vergleichende Synthese",
                unavailable: "Dieser Abschnitt konnte nicht erstellt werden",
            },
            TargetLanguage::Spanish => DocumentLabels {
                result: "Resultado de su pregunta",
                answer: "Respuesta a la pregunta",
                summary: "Resumen de los hallazgos principales",
                papers: "Artículos recomendados",
                synthesis: "Síntesis comparativa",
                unavailable: "No se pudo generar esta sección",
            },
            TargetLanguage::Russian => DocumentLabels {
                result: "Результат по вашему вопросу",
                answer: "Ответ на вопрос",
                summary: "Краткое изложение основных результатов",
                papers: "Рекомендуемые статьи",
                synthesis: "Сравнительный синтез",
                unavailable: "Этот раздел не удалось сгенерировать",
            },
        }
    }
}
