#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::time::Instant;

use med_digest::error::{ProviderError, RejectionKind};
use med_digest::models::PaperRecord;
use med_digest::services::{LlmProvider, LlmResponse};
use med_digest::workflow::prompts::{CLASSIFY_HEADER, EXTRACT_HEADER, SCORE_HEADER};
use med_digest::Config;

/// 按提示词标题行回答的测试服务方
///
/// - 通过提示词中的 `Title: ` 行识别论文
/// - 记录调用次数、最大并发调用数，以及每篇论文的首次调用开始和末次调用结束时间
#[derive(Default)]
pub struct StubProvider {
    specialties: HashMap<String, String>,
    reject_titles: HashSet<String>,
    reject_headers: HashSet<String>,
    delays: HashMap<String, Duration>,
    default_delay: Duration,
    rate_limited_first: AtomicUsize,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    spans: Mutex<HashMap<String, (Instant, Instant)>>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn specialty(mut self, title: &str, label: &str) -> Self {
        self.specialties.insert(title.to_string(), label.to_string());
        self
    }

    /// 该论文的任何分析调用都被永久拒绝
    pub fn reject_title(mut self, title: &str) -> Self {
        self.reject_titles.insert(title.to_string());
        self
    }

    /// 以该标题行开头的调用都被永久拒绝
    pub fn reject_header(mut self, header: &str) -> Self {
        self.reject_headers.insert(header.to_string());
        self
    }

    pub fn delay(mut self, title: &str, delay: Duration) -> Self {
        self.delays.insert(title.to_string(), delay);
        self
    }

    pub fn default_delay(mut self, delay: Duration) -> Self {
        self.default_delay = delay;
        self
    }

    /// 前 `n` 次调用返回频率限制
    pub fn rate_limited_first(self, n: usize) -> Self {
        self.rate_limited_first.store(n, Ordering::SeqCst);
        self
    }

    pub fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// 论文的 (首次调用开始, 末次调用结束)
    pub fn span(&self, title: &str) -> Option<(Instant, Instant)> {
        self.spans.lock().unwrap().get(title).copied()
    }

    fn respond(&self, header: &str, title: Option<&str>) -> String {
        match header {
            CLASSIFY_HEADER => {
                let label = title
                    .and_then(|t| self.specialties.get(t))
                    .map(String::as_str)
                    .unwrap_or("Other");
                format!("{{\"specialty\": \"{}\"}}", label)
            }
            EXTRACT_HEADER => format!(
                "{{\"keywords\": [\"biomarker\", \"Biomarker\", \"cohort\"], \"focus\": \"Focus of {}.\"}}",
                title.unwrap_or("unknown")
            ),
            // 分项之和 6.5 与上报分数不一致
            SCORE_HEADER => "{\"interest_score\": 9.0, \"breakdown\": {\"methodology\": 3, \"content_depth\": 1, \"keyword_relevance\": 2.5}}".to_string(),
            h if h.contains("KEY DISCOVERIES") => {
                "[\"First discovery\", \"Second discovery\"]".to_string()
            }
            _ => "Narrative paragraph.".to_string(),
        }
    }
}

fn title_of(prompt: &str) -> Option<&str> {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Title: "))
        .map(str::trim)
}

#[async_trait]
impl LlmProvider for StubProvider {
    async fn invoke(&self, prompt: &str, _max_tokens: u32) -> Result<LlmResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if self
            .rate_limited_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ProviderError::RateLimited { retry_after: None });
        }

        let header = prompt.lines().next().unwrap_or_default();
        let title = title_of(prompt);
        let is_item_call = !header.starts_with("TASK: DIGEST");

        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        let started = Instant::now();
        let delay = title
            .and_then(|t| self.delays.get(t))
            .copied()
            .unwrap_or(self.default_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let finished = Instant::now();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let (true, Some(title)) = (is_item_call, title) {
            let mut spans = self.spans.lock().unwrap();
            let span = spans.entry(title.to_string()).or_insert((started, finished));
            span.0 = span.0.min(started);
            span.1 = span.1.max(finished);
        }

        let rejected_title = is_item_call && title.is_some_and(|t| self.reject_titles.contains(t));
        if rejected_title || self.reject_headers.contains(header) {
            return Err(ProviderError::Rejected {
                kind: RejectionKind::ContentPolicy,
                reason: "blocked by stub".to_string(),
            });
        }

        Ok(LlmResponse {
            text: self.respond(header, title),
            input_tokens: 0,
            output_tokens: 0,
        })
    }

    fn model_name(&self) -> &str {
        "stub"
    }
}

pub fn published() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap()
}

pub fn since() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
}

pub fn paper(id: &str, title: &str) -> PaperRecord {
    PaperRecord {
        paper_id: id.to_string(),
        title: title.to_string(),
        authors: vec!["A. Author".to_string(), format!("{} Lead", id)],
        categories: vec!["q-bio.QM".to_string()],
        published: published(),
        abstract_text: format!("Abstract for {}.", title),
    }
}

/// `Paper-01` … `Paper-NN`，标题互不为子串
pub fn papers(count: usize) -> Vec<PaperRecord> {
    (1..=count)
        .map(|i| paper(&format!("id-{:02}", i), &format!("Paper-{:02}", i)))
        .collect()
}

pub fn test_config() -> Config {
    Config {
        base_backoff_ms: 10,
        call_timeout_secs: 30,
        ..Config::default()
    }
}
