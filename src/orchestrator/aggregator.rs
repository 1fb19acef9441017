//! 结果汇总器 - 编排层
//!
//! 把完成的分析结果折叠成 [`Digest`]：
//!
//! 1. 按输入位置收集结果，同一论文标识只保留输入位置最靠前的一条
//! 2. 按专科分组（组内与组间都按首次出现的输入顺序）
//! 3. 计算统计量：专科统计、分数分布、高分论文、高关注度数量
//! 4. 通过额外的汇总调用生成叙述字段，单个字段失败只会让该字段留空
//!
//! 分组和统计都是纯函数，对同一组结果重复执行得到相同的分组与计数。

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::models::{
    AnalysisResult, Digest, DigestNarrative, FailedItem, KeywordCount, ScoreDistribution,
    Specialty, SpecialtyGroup, SpecialtyStats, TopPaper,
};
use crate::services::CallExecutor;
use crate::workflow::prompts::{self, NarrativeField};
use crate::workflow::response_parser;

/// 每个专科统计中保留的高频关键词数量
pub const TOP_KEYWORDS_PER_SPECIALTY: usize = 8;

#[derive(Debug, Default)]
struct AggregatorState {
    /// (输入位置, 结果)
    results: Vec<(usize, AnalysisResult)>,
    /// 论文标识 → 已收录结果的输入位置
    positions: HashMap<String, usize>,
    failed: Vec<(usize, FailedItem)>,
    duplicates: usize,
}

/// 汇总器
pub struct Aggregator {
    top_papers: usize,
    high_interest_threshold: f64,
    max_rollup_papers: usize,
    state: Mutex<AggregatorState>,
}

impl Aggregator {
    pub fn new(config: &Config) -> Self {
        Self {
            top_papers: config.top_papers,
            high_interest_threshold: config.high_interest_threshold,
            max_rollup_papers: config.max_rollup_papers,
            state: Mutex::new(AggregatorState::default()),
        }
    }

    /// 收录一条完成的结果
    ///
    /// 返回 `false` 表示该结果因论文标识重复被丢弃。
    pub fn add_result(&self, position: usize, result: AnalysisResult) -> bool {
        let mut state = self.lock();
        match state.positions.get(&result.paper_id).copied() {
            Some(existing) if existing <= position => {
                state.duplicates += 1;
                debug!("重复的论文标识 {}，丢弃位置 {} 的结果", result.paper_id, position);
                false
            }
            Some(existing) => {
                // 更靠前的输入位置覆盖已收录的结果
                state.results.retain(|(pos, _)| *pos != existing);
                state.duplicates += 1;
                state.positions.insert(result.paper_id.clone(), position);
                state.results.push((position, result));
                true
            }
            None => {
                state.positions.insert(result.paper_id.clone(), position);
                state.results.push((position, result));
                true
            }
        }
    }

    /// 记录一条失败诊断
    pub fn add_failure(&self, position: usize, failed: FailedItem) {
        self.lock().failed.push((position, failed));
    }

    /// 已收录结果（按输入位置排序）
    pub fn results(&self) -> Vec<AnalysisResult> {
        let mut results = self.lock().results.clone();
        results.sort_by_key(|(position, _)| *position);
        results.into_iter().map(|(_, result)| result).collect()
    }

    pub fn failures(&self) -> Vec<FailedItem> {
        let mut failed = self.lock().failed.clone();
        failed.sort_by_key(|(position, _)| *position);
        failed.into_iter().map(|(_, item)| item).collect()
    }

    /// 记录调度前就被跳过的重复论文
    pub fn skip_duplicates(&self, count: usize) {
        self.lock().duplicates += count;
    }

    pub fn duplicates(&self) -> usize {
        self.lock().duplicates
    }

    /// 生成不含叙述字段的摘要
    pub fn build_digest(&self, attempted: usize) -> Digest {
        let results = self.results();
        let specialties = fold(&results);

        Digest {
            generated_at: Utc::now(),
            attempted,
            total_papers: results.len(),
            specialty_stats: specialty_stats(&specialties),
            score_distribution: score_distribution(&results),
            top_papers: top_papers(&results, self.top_papers),
            high_interest_count: high_interest_count(&results, self.high_interest_threshold),
            specialties,
            narrative: DigestNarrative::default(),
            failed: self.failures(),
            duplicates_skipped: self.duplicates(),
        }
    }

    /// 生成最终摘要，包括叙述字段的汇总调用
    ///
    /// 没有完成的结果时不发起任何汇总调用。
    pub async fn finalize(&self, attempted: usize, executor: &CallExecutor) -> Digest {
        let mut digest = self.build_digest(attempted);
        if digest.total_papers == 0 {
            info!("⚠️ 没有完成分析的论文，跳过汇总调用");
            return digest;
        }

        let results = self.results();
        let context = rollup_context(&results, self.max_rollup_papers);
        info!(
            "\n🧾 开始生成摘要叙述 ({} 个字段，携带 {} 篇论文)",
            NarrativeField::ALL.len(),
            context.len()
        );
        digest.narrative = generate_narrative(executor, &context).await;
        digest
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ========== 纯函数：分组与统计 ==========

/// 按专科分组，组的顺序和组内顺序都沿用输入顺序
pub fn fold(results: &[AnalysisResult]) -> Vec<SpecialtyGroup> {
    let mut groups: Vec<SpecialtyGroup> = Vec::new();
    for result in results {
        match groups
            .iter_mut()
            .find(|group| group.specialty == result.specialty)
        {
            Some(group) => group.papers.push(result.clone()),
            None => groups.push(SpecialtyGroup {
                specialty: result.specialty,
                papers: vec![result.clone()],
            }),
        }
    }
    groups
}

pub fn specialty_stats(groups: &[SpecialtyGroup]) -> Vec<SpecialtyStats> {
    groups
        .iter()
        .map(|group| {
            let unique_authors: HashSet<String> = group
                .papers
                .iter()
                .flat_map(|paper| paper.authors.iter())
                .map(|author| author.trim().to_lowercase())
                .filter(|author| !author.is_empty())
                .collect();

            let mean_score = if group.papers.is_empty() {
                0.0
            } else {
                group.papers.iter().map(|p| p.interest_score).sum::<f64>()
                    / group.papers.len() as f64
            };

            SpecialtyStats {
                specialty: group.specialty,
                paper_count: group.papers.len(),
                unique_authors: unique_authors.len(),
                mean_score,
                top_keywords: top_keywords(&group.papers, TOP_KEYWORDS_PER_SPECIALTY),
            }
        })
        .collect()
}

/// 高频关键词（大小写不敏感计数，展示首次出现的写法；同频按首次出现顺序）
fn top_keywords(papers: &[AnalysisResult], limit: usize) -> Vec<KeywordCount> {
    let mut counts: Vec<KeywordCount> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for keyword in papers.iter().flat_map(|paper| paper.keywords.iter()) {
        let key = keyword.to_lowercase();
        match index.get(&key) {
            Some(&i) => counts[i].count += 1,
            None => {
                index.insert(key, counts.len());
                counts.push(KeywordCount {
                    keyword: keyword.clone(),
                    count: 1,
                });
            }
        }
    }

    // sort_by 是稳定排序，同频保持首次出现顺序
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts.truncate(limit);
    counts
}

pub fn score_distribution(results: &[AnalysisResult]) -> ScoreDistribution {
    let mut distribution = ScoreDistribution::default();
    if results.is_empty() {
        return distribution;
    }

    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for result in results {
        let score = result.interest_score;
        let bucket = ((score / 2.0).floor().max(0.0) as usize).min(4);
        distribution.buckets[bucket] += 1;
        sum += score;
        min = min.min(score);
        max = max.max(score);
    }

    distribution.min = Some(min);
    distribution.max = Some(max);
    distribution.mean = Some(sum / results.len() as f64);
    distribution
}

/// 分数从高到低排序（同分保持输入顺序）
fn by_score_desc(results: &[AnalysisResult]) -> Vec<&AnalysisResult> {
    let mut ranked: Vec<&AnalysisResult> = results.iter().collect();
    ranked.sort_by(|a, b| {
        b.interest_score
            .partial_cmp(&a.interest_score)
            .unwrap_or(Ordering::Equal)
    });
    ranked
}

pub fn top_papers(results: &[AnalysisResult], limit: usize) -> Vec<TopPaper> {
    by_score_desc(results)
        .into_iter()
        .take(limit)
        .map(|result| TopPaper {
            paper_id: result.paper_id.clone(),
            title: result.title.clone(),
            specialty: result.specialty,
            interest_score: result.interest_score,
        })
        .collect()
}

pub fn high_interest_count(results: &[AnalysisResult], threshold: f64) -> usize {
    results
        .iter()
        .filter(|result| result.interest_score >= threshold)
        .count()
}

/// 汇总调用携带的论文：分数最高的若干篇
fn rollup_context(results: &[AnalysisResult], limit: usize) -> Vec<&AnalysisResult> {
    let mut ranked = by_score_desc(results);
    ranked.truncate(limit);
    ranked
}

// ========== 汇总调用 ==========

async fn generate_narrative(executor: &CallExecutor, context: &[&AnalysisResult]) -> DigestNarrative {
    let mut narrative = DigestNarrative::default();

    for field in NarrativeField::ALL {
        let prompt = prompts::narrative_prompt(field, context);
        let response = match executor.execute(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("⚠️ 摘要字段 {:?} 生成失败，保持为空: {}", field, e);
                continue;
            }
        };

        if field.is_list() {
            narrative.key_discoveries = response_parser::parse_narrative_list(&response);
            debug!("✓ {:?}: {} 条", field, narrative.key_discoveries.len());
            continue;
        }

        let Some(text) = response_parser::parse_narrative_text(&response) else {
            warn!("⚠️ 摘要字段 {:?} 返回为空", field);
            continue;
        };
        let slot = match field {
            NarrativeField::ExecutiveSummary => &mut narrative.executive_summary,
            NarrativeField::EmergingTrends => &mut narrative.emerging_trends,
            NarrativeField::CrossSpecialtyInsights => &mut narrative.cross_specialty_insights,
            NarrativeField::ClinicalImplications => &mut narrative.clinical_implications,
            NarrativeField::ResearchGaps => &mut narrative.research_gaps,
            NarrativeField::FutureDirections => &mut narrative.future_directions,
            NarrativeField::KeyDiscoveries => continue,
        };
        *slot = text;
        debug!("✓ {:?} 已生成", field);
    }

    narrative
}
