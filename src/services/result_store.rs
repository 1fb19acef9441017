//! 分析结果存储 - 业务能力层
//!
//! 只负责"写入 / 查询"能力，不关心流程。
//! 核心在一次运行内每篇完成的论文写入一次、最终摘要写入一次，从不回读自己的写入。

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::fs;
use tracing::debug;

use crate::error::PersistenceError;
use crate::models::{AnalysisResult, Digest, Specialty};

/// 结果存储
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn store_analysis(&self, result: &AnalysisResult) -> Result<(), PersistenceError>;

    async fn store_digest(&self, digest: &Digest) -> Result<(), PersistenceError>;

    /// 按专科查询（按论文标识排序）
    async fn query_by_specialty(
        &self,
        specialty: Specialty,
    ) -> Result<Vec<AnalysisResult>, PersistenceError>;

    /// 按分数区间 `[min, max]` 查询（分数从高到低）
    async fn query_by_score_range(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<AnalysisResult>, PersistenceError>;
}

fn by_score_desc(a: &AnalysisResult, b: &AnalysisResult) -> Ordering {
    b.interest_score
        .partial_cmp(&a.interest_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.paper_id.cmp(&b.paper_id))
}

fn select_by_specialty(
    mut results: Vec<AnalysisResult>,
    specialty: Specialty,
) -> Vec<AnalysisResult> {
    results.retain(|result| result.specialty == specialty);
    results.sort_by(|a, b| a.paper_id.cmp(&b.paper_id));
    results
}

fn select_by_score(mut results: Vec<AnalysisResult>, min: f64, max: f64) -> Vec<AnalysisResult> {
    results.retain(|result| result.interest_score >= min && result.interest_score <= max);
    results.sort_by(by_score_desc);
    results
}

// ========== 文件存储 ==========

/// 把结果写成 JSON 文件
///
/// - `<root>/analyses/<paper_id>.json`
/// - `<root>/digests/digest_<时间戳>.json`
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn analyses_dir(&self) -> PathBuf {
        self.root.join("analyses")
    }

    fn digests_dir(&self) -> PathBuf {
        self.root.join("digests")
    }

    async fn write_json<T: serde::Serialize + ?Sized>(
        &self,
        dir: &Path,
        file_name: &str,
        value: &T,
    ) -> Result<PathBuf, PersistenceError> {
        fs::create_dir_all(dir)
            .await
            .map_err(|e| PersistenceError::io(dir.display().to_string(), e))?;

        let path = dir.join(file_name);
        let path_str = path.display().to_string();
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| PersistenceError::serialization(&path_str, e))?;
        fs::write(&path, json)
            .await
            .map_err(|e| PersistenceError::io(&path_str, e))?;
        Ok(path)
    }

    async fn load_analyses(&self) -> Result<Vec<AnalysisResult>, PersistenceError> {
        let dir = self.analyses_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = fs::read_dir(&dir)
            .await
            .map_err(|e| PersistenceError::io(dir.display().to_string(), e))?;

        let mut results = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| PersistenceError::io(dir.display().to_string(), e))?
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let path_str = path.display().to_string();
            let content = fs::read_to_string(&path)
                .await
                .map_err(|e| PersistenceError::io(&path_str, e))?;
            let result: AnalysisResult = serde_json::from_str(&content)
                .map_err(|e| PersistenceError::serialization(&path_str, e))?;
            results.push(result);
        }
        Ok(results)
    }
}

/// 把论文标识转成安全的文件名
///
/// 字母、数字、`-`、`.` 原样保留，其余字节（包括 `_`）写成 `_XX` 十六进制，
/// 不同的标识不会落到同一个文件。
fn sanitize_file_stem(paper_id: &str) -> String {
    let mut stem = String::with_capacity(paper_id.len());
    for byte in paper_id.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.') {
            stem.push(char::from(byte));
        } else {
            stem.push_str(&format!("_{:02X}", byte));
        }
    }
    stem
}

#[async_trait]
impl AnalysisStore for FileStore {
    async fn store_analysis(&self, result: &AnalysisResult) -> Result<(), PersistenceError> {
        let file_name = format!("{}.json", sanitize_file_stem(&result.paper_id));
        let path = self
            .write_json(&self.analyses_dir(), &file_name, result)
            .await?;
        debug!("分析结果已写入: {}", path.display());
        Ok(())
    }

    async fn store_digest(&self, digest: &Digest) -> Result<(), PersistenceError> {
        let file_name = format!(
            "digest_{}.json",
            digest.generated_at.format("%Y%m%d_%H%M%S")
        );
        let path = self
            .write_json(&self.digests_dir(), &file_name, digest)
            .await?;
        debug!("摘要已写入: {}", path.display());
        Ok(())
    }

    async fn query_by_specialty(
        &self,
        specialty: Specialty,
    ) -> Result<Vec<AnalysisResult>, PersistenceError> {
        Ok(select_by_specialty(self.load_analyses().await?, specialty))
    }

    async fn query_by_score_range(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<AnalysisResult>, PersistenceError> {
        Ok(select_by_score(self.load_analyses().await?, min, max))
    }
}

// ========== 内存存储 ==========

#[derive(Debug, Default)]
struct MemoryState {
    analyses: HashMap<String, AnalysisResult>,
    digests: Vec<Digest>,
}

/// 内存中的结果存储
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analysis_count(&self) -> usize {
        self.lock().analyses.len()
    }

    pub fn digests(&self) -> Vec<Digest> {
        self.lock().digests.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn store_analysis(&self, result: &AnalysisResult) -> Result<(), PersistenceError> {
        self.lock()
            .analyses
            .insert(result.paper_id.clone(), result.clone());
        Ok(())
    }

    async fn store_digest(&self, digest: &Digest) -> Result<(), PersistenceError> {
        self.lock().digests.push(digest.clone());
        Ok(())
    }

    async fn query_by_specialty(
        &self,
        specialty: Specialty,
    ) -> Result<Vec<AnalysisResult>, PersistenceError> {
        let all: Vec<AnalysisResult> = self.lock().analyses.values().cloned().collect();
        Ok(select_by_specialty(all, specialty))
    }

    async fn query_by_score_range(
        &self,
        min: f64,
        max: f64,
    ) -> Result<Vec<AnalysisResult>, PersistenceError> {
        let all: Vec<AnalysisResult> = self.lock().analyses.values().cloned().collect();
        Ok(select_by_score(all, min, max))
    }
}
