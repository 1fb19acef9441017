use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 论文记录（只读输入）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published: DateTime<Utc>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
}

impl PaperRecord {
    /// 摘要预览（用于日志和提示词）
    pub fn abstract_preview(&self, max_chars: usize) -> String {
        crate::utils::logging::truncate_text(&self.abstract_text, max_chars)
    }
}

impl std::fmt::Display for PaperRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let title_preview = crate::utils::logging::truncate_text(&self.title, 80);
        write!(f, "{} [{}]", title_preview, self.paper_id)
    }
}
