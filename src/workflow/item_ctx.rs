//! 论文分析上下文
//!
//! 封装"我正在处理第几批的第几篇论文"这一信息

use std::fmt::Display;

/// 论文分析上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 论文标识
    pub paper_id: String,

    /// 批次编号（从1开始）
    pub batch_index: usize,

    /// 论文在整次运行中的位置（从1开始，仅用于日志显示）
    pub position: usize,

    /// 本次运行的论文总数
    pub total: usize,
}

impl ItemCtx {
    pub fn new(paper_id: String, batch_index: usize, position: usize, total: usize) -> Self {
        Self {
            paper_id,
            batch_index,
            position,
            total,
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[批次 {} 论文 {}/{}]",
            self.batch_index, self.position, self.total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefix() {
        let ctx = ItemCtx::new("2506.00001".to_string(), 2, 7, 10);
        assert_eq!(ctx.to_string(), "[批次 2 论文 7/10]");
    }
}
