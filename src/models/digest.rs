//! 一次运行的最终产物

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{AnalysisResult, FailedItem, Specialty};

/// 某个专科下的论文（保持输入顺序）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyGroup {
    pub specialty: Specialty,
    pub papers: Vec<AnalysisResult>,
}

/// 关键词出现次数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordCount {
    pub keyword: String,
    pub count: usize,
}

/// 专科维度统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialtyStats {
    pub specialty: Specialty,
    pub paper_count: usize,
    pub unique_authors: usize,
    pub mean_score: f64,
    pub top_keywords: Vec<KeywordCount>,
}

/// 分数分布：[0,2) [2,4) [4,6) [6,8) [8,10]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreDistribution {
    pub buckets: [usize; 5],
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mean: Option<f64>,
}

impl ScoreDistribution {
    pub fn bucket_label(index: usize) -> &'static str {
        match index {
            0 => "0-2",
            1 => "2-4",
            2 => "4-6",
            3 => "6-8",
            _ => "8-10",
        }
    }
}

/// 高分论文摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopPaper {
    pub paper_id: String,
    pub title: String,
    pub specialty: Specialty,
    pub interest_score: f64,
}

/// 全局叙述字段，汇总调用失败时保持为空
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DigestNarrative {
    pub executive_summary: String,
    pub key_discoveries: Vec<String>,
    pub emerging_trends: String,
    pub cross_specialty_insights: String,
    pub clinical_implications: String,
    pub research_gaps: String,
    pub future_directions: String,
}

/// 研究摘要
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    /// 进入分析的论文数量
    pub attempted: usize,
    /// 成功完成分析的论文数量
    pub total_papers: usize,
    pub specialties: Vec<SpecialtyGroup>,
    pub specialty_stats: Vec<SpecialtyStats>,
    pub score_distribution: ScoreDistribution,
    pub top_papers: Vec<TopPaper>,
    pub high_interest_count: usize,
    pub narrative: DigestNarrative,
    /// 分析失败的论文（不参与专科分组）
    pub failed: Vec<FailedItem>,
    /// 重复标识而被跳过的结果数量
    pub duplicates_skipped: usize,
}

impl Digest {
    /// 空摘要（没有可分析的论文）
    pub fn empty(attempted: usize) -> Self {
        Self {
            generated_at: Utc::now(),
            attempted,
            total_papers: 0,
            specialties: Vec::new(),
            specialty_stats: Vec::new(),
            score_distribution: ScoreDistribution::default(),
            top_papers: Vec::new(),
            high_interest_count: 0,
            narrative: DigestNarrative::default(),
            failed: Vec::new(),
            duplicates_skipped: 0,
        }
    }

    /// 各专科论文数量（按首次出现顺序）
    pub fn specialty_counts(&self) -> Vec<(Specialty, usize)> {
        self.specialties
            .iter()
            .map(|group| (group.specialty, group.papers.len()))
            .collect()
    }

    pub fn papers_in(&self, specialty: Specialty) -> &[AnalysisResult] {
        self.specialties
            .iter()
            .find(|group| group.specialty == specialty)
            .map(|group| group.papers.as_slice())
            .unwrap_or(&[])
    }

    /// 是否只完成了部分论文
    pub fn is_partial(&self) -> bool {
        self.total_papers < self.attempted
    }
}
