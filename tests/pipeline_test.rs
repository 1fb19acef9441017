mod common;

use std::sync::Arc;
use std::time::Duration;

use med_digest::error::{AppError, SourceError};
use med_digest::models::{AnalysisStage, Specialty};
use med_digest::orchestrator::DigestPipeline;
use med_digest::services::{AnalysisStore, InMemoryPaperSource, MemoryStore, TomlPaperSource};
use med_digest::workflow::prompts::NarrativeField;
use med_digest::workflow::CANCELLED_BEFORE_START;
use med_digest::Config;

use common::{paper, papers, since, test_config, StubProvider};

fn pipeline(
    config: Config,
    papers: Vec<med_digest::PaperRecord>,
    provider: Arc<StubProvider>,
    store: Arc<MemoryStore>,
) -> DigestPipeline {
    DigestPipeline::new(
        config,
        Arc::new(InMemoryPaperSource::new(papers)),
        provider,
        store,
    )
}

#[tokio::test(start_paused = true)]
async fn test_ten_papers_run_in_three_sequential_batches() {
    let config = Config {
        batch_size: 4,
        max_concurrent_items: 2,
        ..test_config()
    };
    let provider = StubProvider::new()
        .default_delay(Duration::from_millis(100))
        .build();
    let store = Arc::new(MemoryStore::new());
    let input = papers(10);

    let report = pipeline(config, input.clone(), provider.clone(), store)
        .run(since())
        .await
        .unwrap();

    let sizes: Vec<usize> = report.batches.iter().map(|b| b.size).collect();
    assert_eq!(sizes, vec![4, 4, 2]);
    assert_eq!(report.digest.total_papers, 10);
    assert_eq!(provider.max_in_flight(), 2);

    // 后一批的论文在前一批全部结束后才开始
    let batches: Vec<&[med_digest::PaperRecord]> = input.chunks(4).collect();
    for pair in batches.windows(2) {
        let previous_end = pair[0]
            .iter()
            .map(|p| provider.span(&p.title).unwrap().1)
            .max()
            .unwrap();
        let next_start = pair[1]
            .iter()
            .map(|p| provider.span(&p.title).unwrap().0)
            .min()
            .unwrap();
        assert!(next_start >= previous_end);
    }
}

#[tokio::test(start_paused = true)]
async fn test_empty_source_makes_no_calls() {
    let provider = StubProvider::new().build();
    let store = Arc::new(MemoryStore::new());

    let report = pipeline(test_config(), vec![], provider.clone(), store.clone())
        .run(since())
        .await
        .unwrap();

    assert_eq!(report.digest.total_papers, 0);
    assert!(report.digest.specialties.is_empty());
    assert_eq!(provider.calls(), 0);
    assert_eq!(report.usage.total_calls, 0);
    assert_eq!(store.digests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_unavailable_source_ends_with_empty_digest() {
    let provider = StubProvider::new().build();
    let pipeline = DigestPipeline::new(
        test_config(),
        Arc::new(TomlPaperSource::new("/no/such/paper/folder")),
        provider.clone(),
        Arc::new(MemoryStore::new()),
    );

    let report = pipeline.run(since()).await.unwrap();

    assert_eq!(report.digest.attempted, 0);
    assert_eq!(report.digest.total_papers, 0);
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_record_aborts_run() {
    let provider = StubProvider::new().build();
    let input = vec![paper("ok-1", "Fine paper"), paper("", "Broken paper")];

    let result = pipeline(test_config(), input, provider.clone(), Arc::new(MemoryStore::new()))
        .run(since())
        .await;

    assert!(matches!(
        result,
        Err(AppError::Source(SourceError::InvalidRecord { .. }))
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_isolated() {
    let input = papers(4);
    let provider = StubProvider::new()
        .specialty("Paper-01", "Cardiology")
        .specialty("Paper-03", "cancer")
        .reject_title("Paper-02")
        .build();
    let store = Arc::new(MemoryStore::new());

    let report = pipeline(test_config(), input, provider, store.clone())
        .run(since())
        .await
        .unwrap();
    let digest = report.digest;

    assert_eq!(digest.attempted, 4);
    assert_eq!(digest.total_papers, 3);
    assert!(digest.is_partial());
    assert_eq!(digest.failed.len(), 1);
    assert_eq!(digest.failed[0].paper_id, "id-02");
    assert_eq!(digest.failed[0].stage, AnalysisStage::Classifying);
    assert!(digest
        .specialties
        .iter()
        .flat_map(|group| group.papers.iter())
        .all(|result| result.paper_id != "id-02"));
    assert_eq!(digest.papers_in(Specialty::Cardiology).len(), 1);
    assert_eq!(digest.papers_in(Specialty::Oncology).len(), 1);
    assert_eq!(digest.papers_in(Specialty::Other).len(), 1);
    assert_eq!(store.analysis_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_grouping_follows_input_order_not_completion_order() {
    let input = papers(4);
    let provider = StubProvider::new()
        .specialty("Paper-01", "Neurology")
        .specialty("Paper-02", "Surgery")
        .specialty("Paper-03", "Neurology")
        .specialty("Paper-04", "Surgery")
        .delay("Paper-01", Duration::from_secs(3))
        .delay("Paper-03", Duration::from_secs(2))
        .build();
    let config = Config {
        batch_size: 4,
        max_concurrent_items: 4,
        ..test_config()
    };

    let digest = pipeline(config, input, provider, Arc::new(MemoryStore::new()))
        .run(since())
        .await
        .unwrap()
        .digest;

    let order: Vec<Specialty> = digest.specialties.iter().map(|g| g.specialty).collect();
    assert_eq!(order, vec![Specialty::Neurology, Specialty::Surgery]);
    let neurology: Vec<&str> = digest
        .papers_in(Specialty::Neurology)
        .iter()
        .map(|r| r.paper_id.as_str())
        .collect();
    assert_eq!(neurology, vec!["id-01", "id-03"]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_identifiers_keep_first_input() {
    let input = vec![
        paper("dup", "First copy"),
        paper("solo", "Solo paper"),
        paper("dup", "Second copy"),
    ];
    let provider = StubProvider::new()
        .delay("Second copy", Duration::from_secs(5))
        .build();
    let store = Arc::new(MemoryStore::new());

    let digest = pipeline(test_config(), input, provider.clone(), store.clone())
        .run(since())
        .await
        .unwrap()
        .digest;

    assert_eq!(digest.total_papers, 2);
    assert_eq!(digest.duplicates_skipped, 1);
    let titles: Vec<&str> = digest
        .specialties
        .iter()
        .flat_map(|g| g.papers.iter())
        .map(|r| r.title.as_str())
        .collect();
    assert_eq!(titles, vec!["First copy", "Solo paper"]);
    assert_eq!(
        digest.total_papers + digest.failed.len() + digest.duplicates_skipped,
        digest.attempted
    );

    // 存储中的结果与摘要一致，重复的论文不消耗调用
    let stored: Vec<String> = store
        .query_by_specialty(Specialty::Other)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.title)
        .collect();
    assert_eq!(stored, vec!["First copy", "Solo paper"]);
    assert_eq!(store.analysis_count(), 2);
    assert!(provider.span("Second copy").is_none());
    assert_eq!(provider.calls(), 2 * 3 + NarrativeField::ALL.len());
}

#[tokio::test(start_paused = true)]
async fn test_every_result_breakdown_sums_to_score() {
    let provider = StubProvider::new().build();

    let digest = pipeline(test_config(), papers(5), provider, Arc::new(MemoryStore::new()))
        .run(since())
        .await
        .unwrap()
        .digest;

    let results: Vec<_> = digest
        .specialties
        .iter()
        .flat_map(|g| g.papers.iter())
        .collect();
    assert_eq!(results.len(), 5);
    for result in results {
        assert!(result.breakdown_consistent());
        assert!((result.interest_score - 6.5).abs() <= 1e-6);
        assert_eq!(result.keywords, vec!["biomarker", "cohort"]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_rollup_failure_degrades_only_that_field() {
    let provider = StubProvider::new()
        .reject_header(NarrativeField::ExecutiveSummary.header())
        .build();

    let digest = pipeline(test_config(), papers(2), provider, Arc::new(MemoryStore::new()))
        .run(since())
        .await
        .unwrap()
        .digest;

    assert_eq!(digest.total_papers, 2);
    assert!(digest.narrative.executive_summary.is_empty());
    assert_eq!(
        digest.narrative.key_discoveries,
        vec!["First discovery", "Second discovery"]
    );
    assert_eq!(digest.narrative.emerging_trends, "Narrative paragraph.");
    assert_eq!(digest.narrative.future_directions, "Narrative paragraph.");
}

#[tokio::test(start_paused = true)]
async fn test_usage_summary_counts_item_and_rollup_calls() {
    let provider = StubProvider::new().build();

    let report = pipeline(test_config(), papers(2), provider.clone(), Arc::new(MemoryStore::new()))
        .run(since())
        .await
        .unwrap();

    // 每篇 3 次分析调用 + 7 个叙述字段
    let expected = 2 * 3 + NarrativeField::ALL.len();
    assert_eq!(report.usage.total_calls, expected);
    assert_eq!(provider.calls(), expected);
    assert_eq!(report.usage.failed_calls, 0);
    assert!(report.usage.total_tokens() > 0);
    assert!(report.usage.total_cost_usd > 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limits_are_absorbed_by_retries() {
    let provider = StubProvider::new().rate_limited_first(2).build();
    let config = Config {
        max_call_retries: 3,
        ..test_config()
    };

    let report = pipeline(config, papers(1), provider.clone(), Arc::new(MemoryStore::new()))
        .run(since())
        .await
        .unwrap();

    assert_eq!(report.digest.total_papers, 1);
    assert_eq!(provider.calls(), 3 + NarrativeField::ALL.len() + 2);
    assert_eq!(report.usage.total_calls, 3 + NarrativeField::ALL.len());
}

#[tokio::test(start_paused = true)]
async fn test_small_budget_waits_instead_of_failing() {
    let config = Config {
        max_tokens_per_minute: 400,
        max_budget_waits: 20,
        ..test_config()
    };
    let provider = StubProvider::new().build();
    let pipeline = pipeline(config, papers(3), provider, Arc::new(MemoryStore::new()));

    let started = tokio::time::Instant::now();
    let report = pipeline.run(since()).await.unwrap();

    assert_eq!(report.digest.total_papers, 3);
    assert_eq!(report.usage.failed_calls, 0);
    assert!(started.elapsed() >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_run_starts_nothing() {
    let provider = StubProvider::new().build();
    let pipeline = pipeline(test_config(), papers(7), provider.clone(), Arc::new(MemoryStore::new()));
    pipeline.cancel_token().cancel();

    let report = pipeline.run(since()).await.unwrap();
    let digest = report.digest;

    assert_eq!(provider.calls(), 0);
    assert_eq!(digest.attempted, 7);
    assert_eq!(digest.total_papers, 0);
    assert_eq!(digest.failed.len(), 7);
    assert!(digest
        .failed
        .iter()
        .all(|f| f.stage == AnalysisStage::Pending && f.reason == CANCELLED_BEFORE_START));
    let failed_ids: Vec<&str> = digest.failed.iter().map(|f| f.paper_id.as_str()).collect();
    assert_eq!(failed_ids, vec!["id-01", "id-02", "id-03", "id-04", "id-05", "id-06", "id-07"]);
}

#[tokio::test(start_paused = true)]
async fn test_usage_persists_across_runs_when_not_reset() {
    let config = Config {
        reset_budget_each_run: false,
        ..test_config()
    };
    let provider = StubProvider::new().build();
    let pipeline = pipeline(config, papers(1), provider, Arc::new(MemoryStore::new()));

    let first = pipeline.run(since()).await.unwrap();
    let second = pipeline.run(since()).await.unwrap();

    assert_eq!(second.usage.total_calls, 2 * first.usage.total_calls);
}

#[tokio::test(start_paused = true)]
async fn test_usage_resets_between_runs_by_default() {
    let provider = StubProvider::new().build();
    let pipeline = pipeline(test_config(), papers(1), provider, Arc::new(MemoryStore::new()));

    let first = pipeline.run(since()).await.unwrap();
    let second = pipeline.run(since()).await.unwrap();

    assert_eq!(second.usage.total_calls, first.usage.total_calls);
    assert_eq!(pipeline.usage_summary(), second.usage);
}
