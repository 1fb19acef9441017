//! 提示词
//!
//! 每个提示词以固定的 `TASK:` 标题行开头，响应解析和测试桩都依赖这一行。

use crate::models::{AnalysisResult, PaperRecord, Specialty};

pub const CLASSIFY_HEADER: &str = "TASK: CLASSIFY SPECIALTY";
pub const EXTRACT_HEADER: &str = "TASK: EXTRACT KEYWORDS";
pub const SCORE_HEADER: &str = "TASK: SCORE INTEREST";

/// 摘要中每个提示词生成的叙述字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NarrativeField {
    ExecutiveSummary,
    KeyDiscoveries,
    EmergingTrends,
    CrossSpecialtyInsights,
    ClinicalImplications,
    ResearchGaps,
    FutureDirections,
}

impl NarrativeField {
    pub const ALL: [NarrativeField; 7] = [
        NarrativeField::ExecutiveSummary,
        NarrativeField::KeyDiscoveries,
        NarrativeField::EmergingTrends,
        NarrativeField::CrossSpecialtyInsights,
        NarrativeField::ClinicalImplications,
        NarrativeField::ResearchGaps,
        NarrativeField::FutureDirections,
    ];

    pub fn header(self) -> &'static str {
        match self {
            NarrativeField::ExecutiveSummary => "TASK: DIGEST EXECUTIVE SUMMARY",
            NarrativeField::KeyDiscoveries => "TASK: DIGEST KEY DISCOVERIES",
            NarrativeField::EmergingTrends => "TASK: DIGEST EMERGING TRENDS",
            NarrativeField::CrossSpecialtyInsights => "TASK: DIGEST CROSS-SPECIALTY INSIGHTS",
            NarrativeField::ClinicalImplications => "TASK: DIGEST CLINICAL IMPLICATIONS",
            NarrativeField::ResearchGaps => "TASK: DIGEST RESEARCH GAPS",
            NarrativeField::FutureDirections => "TASK: DIGEST FUTURE DIRECTIONS",
        }
    }

    /// 是否要求返回 JSON 数组
    pub fn is_list(self) -> bool {
        matches!(self, NarrativeField::KeyDiscoveries)
    }

    fn instructions(self) -> &'static str {
        match self {
            NarrativeField::ExecutiveSummary => {
                "Write a 2-3 paragraph executive summary. Open with the most impactful finding, \
                 then cover the major themes and how they could change clinical practice."
            }
            NarrativeField::KeyDiscoveries => {
                "List the most important discoveries, one or two sentences each, \
                 including the specialty where relevant. Return ONLY a JSON array of strings."
            }
            NarrativeField::EmergingTrends => {
                "Describe the 2-3 most significant emerging trends in methods, technologies, \
                 or care delivery, with examples from the papers."
            }
            NarrativeField::CrossSpecialtyInsights => {
                "Describe connections between specialties and where findings in one field \
                 inform another."
            }
            NarrativeField::ClinicalImplications => {
                "Describe the practical impact on patient care, diagnosis, and treatment."
            }
            NarrativeField::ResearchGaps => {
                "Identify open questions and gaps these papers leave unaddressed."
            }
            NarrativeField::FutureDirections => {
                "Describe the research directions these papers point toward."
            }
        }
    }
}

pub fn classification_prompt(paper: &PaperRecord) -> String {
    let vocabulary: Vec<&str> = Specialty::ALL.iter().map(|s| s.name()).collect();
    format!(
        "{header}\n\
         Identify the primary medical specialty of this paper.\n\
         Choose exactly one of: {vocabulary}.\n\
         Return ONLY a JSON object: {{\"specialty\": \"<name>\"}}\n\n\
         Title: {title}\n\
         Categories: {categories}\n\
         Abstract: {abstract_text}\n",
        header = CLASSIFY_HEADER,
        vocabulary = vocabulary.join(", "),
        title = paper.title,
        categories = paper.categories.join(", "),
        abstract_text = paper.abstract_text,
    )
}

pub fn extraction_prompt(paper: &PaperRecord) -> String {
    format!(
        "{header}\n\
         Extract up to 5 key medical concepts and write one sentence describing the paper's focus.\n\
         Return ONLY a JSON object: {{\"keywords\": [\"...\"], \"focus\": \"...\"}}\n\n\
         Title: {title}\n\
         Abstract: {abstract_text}\n",
        header = EXTRACT_HEADER,
        title = paper.title,
        abstract_text = paper.abstract_text,
    )
}

pub fn scoring_prompt(
    paper: &PaperRecord,
    specialty: Specialty,
    keywords: &[String],
    focus: &str,
) -> String {
    format!(
        "{header}\n\
         Rate how interesting this paper is for a clinical research digest on a 0-10 scale.\n\
         Score each criterion and make interest_score the sum of the components:\n\
         - methodology: -1 to 4 (randomized trials and meta-analyses score highest)\n\
         - content_depth: 0 to 1\n\
         - author_collaboration: 0 to 1 (multi-author, multi-institution work)\n\
         - category_relevance: 0 to 2\n\
         - keyword_relevance: 0 to 2\n\
         Return ONLY a JSON object: {{\"interest_score\": <number>, \"breakdown\": {{\"methodology\": <number>, ...}}}}\n\n\
         Title: {title}\n\
         Specialty: {specialty}\n\
         Authors: {authors}\n\
         Keywords: {keywords}\n\
         Focus: {focus}\n\
         Abstract: {abstract_text}\n",
        header = SCORE_HEADER,
        title = paper.title,
        specialty = specialty,
        authors = paper.authors.len(),
        keywords = keywords.join(", "),
        focus = focus,
        abstract_text = paper.abstract_text,
    )
}

/// 汇总提示词，携带按分数排序后的论文摘要
pub fn narrative_prompt(field: NarrativeField, results: &[&AnalysisResult]) -> String {
    let research: Vec<String> = results
        .iter()
        .map(|result| {
            format!(
                "- [{}] {} (score {:.1}; keywords: {}) {}",
                result.specialty,
                result.title,
                result.interest_score,
                result.keywords.join(", "),
                result.focus
            )
        })
        .collect();

    format!(
        "{header}\n\
         You are a senior medical research analyst writing a research digest for clinicians.\n\
         {instructions}\n\
         Start directly with the content, without introductory phrases.\n\n\
         RESEARCH DATA ({count} papers):\n{research}\n",
        header = field.header(),
        instructions = field.instructions(),
        count = results.len(),
        research = research.join("\n"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn paper() -> PaperRecord {
        PaperRecord {
            paper_id: "p1".into(),
            title: "Troponin kinetics after PCI".into(),
            authors: vec!["A".into(), "B".into()],
            categories: vec!["q-bio".into()],
            published: Utc::now(),
            abstract_text: "We studied troponin.".into(),
        }
    }

    #[test]
    fn test_prompts_start_with_headers() {
        let paper = paper();
        assert!(classification_prompt(&paper).starts_with(CLASSIFY_HEADER));
        assert!(extraction_prompt(&paper).starts_with(EXTRACT_HEADER));
        assert!(scoring_prompt(&paper, Specialty::Cardiology, &[], "focus").starts_with(SCORE_HEADER));
        for field in NarrativeField::ALL {
            assert!(narrative_prompt(field, &[]).starts_with(field.header()));
        }
    }

    #[test]
    fn test_classification_lists_vocabulary_and_title() {
        let prompt = classification_prompt(&paper());
        assert!(prompt.contains("General Medicine"));
        assert!(prompt.contains("Troponin kinetics after PCI"));
    }
}
