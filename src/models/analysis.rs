//! 单篇论文的分析结果与失败诊断

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Specialty;

/// 分数与分项之和允许的误差
pub const SCORE_TOLERANCE: f64 = 1e-6;
pub const MIN_INTEREST_SCORE: f64 = 0.0;
pub const MAX_INTEREST_SCORE: f64 = 10.0;

/// 分项为空时，整体分数记入的分项名
pub const OVERALL_COMPONENT: &str = "overall";
/// 分数越界时用于补齐的分项名
pub const ADJUSTMENT_COMPONENT: &str = "adjustment";

/// 兴趣分数的分项明细（按名称排序，输出稳定）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreBreakdown(BTreeMap<String, f64>);

impl ScoreBreakdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// 写入分项，同名分项累加
    pub fn add(&mut self, name: impl Into<String>, value: f64) {
        *self.0.entry(name.into()).or_insert(0.0) += value;
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// 分项之和是否为有限值（单个分项有限，求和仍可能溢出）
    pub fn is_finite(&self) -> bool {
        self.total().is_finite()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, value)| (name.as_str(), *value))
    }

    /// 让分数与分项之和保持一致
    ///
    /// - 非有限分项直接丢弃；分项之和溢出时整个分项明细作废
    /// - 分项为空时，以上报分数作为唯一分项
    /// - 上报分数与分项之和不一致时，以分项之和为准
    /// - 结果越出 [0, 10] 时，补一个 `adjustment` 分项把总和拉回区间
    /// - 补齐后因数量级过大丢失精度时，只保留 `overall` 分项
    pub fn reconcile(self, reported: f64) -> ReconciledScore {
        let mut breakdown = ScoreBreakdown(
            self.0
                .into_iter()
                .filter(|(_, value)| value.is_finite())
                .collect(),
        );
        let mut corrected = false;
        if !breakdown.is_finite() {
            breakdown = ScoreBreakdown::new();
            corrected = true;
        }

        if breakdown.is_empty() {
            let value = if reported.is_finite() { reported } else { 0.0 };
            breakdown.add(OVERALL_COMPONENT, value);
            corrected |= !reported.is_finite();
        }

        let sum = breakdown.total();
        if !reported.is_finite() || (reported - sum).abs() > SCORE_TOLERANCE {
            corrected = true;
        }

        let clamped = sum.clamp(MIN_INTEREST_SCORE, MAX_INTEREST_SCORE);
        if (clamped - sum).abs() > 0.0 {
            breakdown.add(ADJUSTMENT_COMPONENT, clamped - sum);
            corrected = true;
        }

        if (breakdown.total() - clamped).abs() > SCORE_TOLERANCE {
            breakdown = ScoreBreakdown::new();
            breakdown.add(OVERALL_COMPONENT, clamped);
            corrected = true;
        }

        ReconciledScore {
            score: clamped,
            breakdown,
            corrected,
        }
    }
}

impl FromIterator<(String, f64)> for ScoreBreakdown {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        let mut breakdown = ScoreBreakdown::new();
        for (name, value) in iter {
            breakdown.add(name, value);
        }
        breakdown
    }
}

/// 分数校正结果
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledScore {
    pub score: f64,
    pub breakdown: ScoreBreakdown,
    /// 上报分数是否被改写
    pub corrected: bool,
}

/// 单篇论文的分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub paper_id: String,
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    pub specialty: Specialty,
    pub keywords: Vec<String>,
    pub focus: String,
    pub interest_score: f64,
    pub score_breakdown: ScoreBreakdown,
    pub analyzed_at: DateTime<Utc>,
}

impl AnalysisResult {
    /// 分项之和是否与兴趣分数一致
    pub fn breakdown_consistent(&self) -> bool {
        (self.score_breakdown.total() - self.interest_score).abs() <= SCORE_TOLERANCE
    }
}

/// 分析阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnalysisStage {
    Pending,
    Classifying,
    Extracting,
    Scoring,
}

impl std::fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            AnalysisStage::Pending => "待处理",
            AnalysisStage::Classifying => "专科分类",
            AnalysisStage::Extracting => "关键词提取",
            AnalysisStage::Scoring => "兴趣评分",
        };
        f.write_str(label)
    }
}

/// 分析失败的诊断记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedItem {
    pub paper_id: String,
    pub title: String,
    pub stage: AnalysisStage,
    pub reason: String,
    pub failed_at: DateTime<Utc>,
}
