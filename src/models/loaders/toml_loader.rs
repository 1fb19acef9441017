use crate::models::PaperRecord;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

/// 单个 TOML 文件的结构：若干 `[[papers]]` 条目
///
/// `published` 需写成 RFC 3339 字符串，例如 `"2025-06-02T08:00:00Z"`。
#[derive(Debug, Deserialize)]
struct PaperFile {
    #[serde(default)]
    papers: Vec<PaperRecord>,
}

/// 从 TOML 文件加载论文列表
pub async fn load_toml_papers(toml_file_path: &Path) -> Result<Vec<PaperRecord>> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let file: PaperFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    Ok(file.papers)
}

/// 从文件夹中加载所有 TOML 文件中的论文（按文件名顺序）
///
/// 无法解析的文件会被跳过并记录警告。
pub async fn load_all_toml_files(folder_path: &str) -> Result<Vec<PaperRecord>> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut toml_files = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            toml_files.push(path);
        }
    }
    toml_files.sort();

    let mut papers = Vec::new();
    for path in toml_files {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_toml_papers(&path).await {
            Ok(loaded) => {
                tracing::info!("成功加载 {} 篇论文", loaded.len());
                papers.extend(loaded);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {:#}", path.display(), e);
            }
        }
    }

    Ok(papers)
}
