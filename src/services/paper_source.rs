//! 论文来源 - 业务能力层
//!
//! 核心只通过 [`PaperSource::fetch_papers`] 拿到只读的论文列表，
//! 空列表是合法的（本次运行不做任何事）。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::SourceError;
use crate::models::{load_all_toml_files, PaperRecord};

/// 论文来源
#[async_trait]
pub trait PaperSource: Send + Sync {
    /// 获取 `since` 之后发表的论文
    ///
    /// 连接类故障返回 [`SourceError::Unavailable`]。
    async fn fetch_papers(&self, since: DateTime<Utc>) -> Result<Vec<PaperRecord>, SourceError>;
}

/// 从 TOML 文件夹读取论文
pub struct TomlPaperSource {
    folder: PathBuf,
}

impl TomlPaperSource {
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    pub fn folder(&self) -> &Path {
        &self.folder
    }
}

#[async_trait]
impl PaperSource for TomlPaperSource {
    async fn fetch_papers(&self, since: DateTime<Utc>) -> Result<Vec<PaperRecord>, SourceError> {
        let location = self.folder.display().to_string();
        if !self.folder.is_dir() {
            return Err(SourceError::unavailable(&location, "文件夹不存在"));
        }

        info!("\n📁 正在扫描论文目录: {}", location);
        let papers = load_all_toml_files(&location)
            .await
            .map_err(|e| SourceError::unavailable(&location, format!("{:#}", e)))?;

        validate_records(&papers, &location)?;

        let total = papers.len();
        let recent: Vec<PaperRecord> = papers
            .into_iter()
            .filter(|paper| paper.published >= since)
            .collect();
        info!(
            "✓ 共 {} 篇论文, {} 篇发表于 {} 之后",
            total,
            recent.len(),
            since.format("%Y-%m-%d")
        );
        Ok(recent)
    }
}

/// 内存中的论文来源
#[derive(Debug, Default, Clone)]
pub struct InMemoryPaperSource {
    papers: Vec<PaperRecord>,
}

impl InMemoryPaperSource {
    pub fn new(papers: Vec<PaperRecord>) -> Self {
        Self { papers }
    }
}

#[async_trait]
impl PaperSource for InMemoryPaperSource {
    async fn fetch_papers(&self, since: DateTime<Utc>) -> Result<Vec<PaperRecord>, SourceError> {
        validate_records(&self.papers, "memory")?;
        Ok(self
            .papers
            .iter()
            .filter(|paper| paper.published >= since)
            .cloned()
            .collect())
    }
}

fn validate_records(papers: &[PaperRecord], location: &str) -> Result<(), SourceError> {
    match papers
        .iter()
        .position(|paper| paper.paper_id.trim().is_empty())
    {
        Some(index) => Err(SourceError::InvalidRecord {
            location: location.to_string(),
            reason: format!("第 {} 条记录缺少论文标识", index + 1),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn paper(id: &str, day: u32) -> PaperRecord {
        PaperRecord {
            paper_id: id.to_string(),
            title: format!("Paper {}", id),
            authors: vec![],
            categories: vec![],
            published: Utc.with_ymd_and_hms(2025, 6, day, 0, 0, 0).unwrap(),
            abstract_text: "abstract".to_string(),
        }
    }

    #[tokio::test]
    async fn test_missing_folder_is_unavailable() {
        let source = TomlPaperSource::new("/definitely/not/a/real/folder");
        let err = source
            .fetch_papers(Utc::now())
            .await
            .expect_err("missing folder must fail");
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_filters_by_publication_date() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("week.toml"),
            r#"
[[papers]]
paper_id = "old"
title = "Old paper"
published = "2025-05-01T00:00:00Z"
abstract = "old"

[[papers]]
paper_id = "new"
title = "New paper"
published = "2025-06-10T00:00:00Z"
abstract = "new"
"#,
        )
        .unwrap();

        let source = TomlPaperSource::new(dir.path());
        let since = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let papers = source.fetch_papers(since).await.unwrap();

        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].paper_id, "new");
    }

    #[tokio::test]
    async fn test_empty_identifier_is_invalid_record() {
        let source = InMemoryPaperSource::new(vec![paper("a", 2), paper("  ", 3)]);
        let since = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let err = source.fetch_papers(since).await.unwrap_err();
        assert!(matches!(err, SourceError::InvalidRecord { .. }));
    }

    #[test]
    fn test_in_memory_source_preserves_order() {
        let source = InMemoryPaperSource::new(vec![paper("b", 5), paper("a", 4), paper("c", 6)]);
        let since = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let ids: Vec<String> = tokio_test::block_on(source.fetch_papers(since))
            .unwrap()
            .into_iter()
            .map(|p| p.paper_id)
            .collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
    }
}
