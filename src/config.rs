use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::Specialty;

/// 程序配置文件
#[derive(Clone, Debug)]
pub struct Config {
    // --- 预算与并发 ---
    /// 滑动一分钟窗口内允许消耗的 token 上限
    pub max_tokens_per_minute: u64,
    /// 每批论文数量
    pub batch_size: usize,
    /// 每批内同时分析的论文数量
    pub max_concurrent_items: usize,
    /// 批次失败比例超过该值时发出警告
    pub batch_failure_threshold: f64,
    /// 每次运行开始时是否重置 token 预算与用量账本
    pub reset_budget_each_run: bool,
    // --- 调用弹性 ---
    /// 单次调用的最大重试次数
    pub max_call_retries: u32,
    /// 退避基准时长（毫秒）
    pub base_backoff_ms: u64,
    /// 等待 token 预算的最大次数
    pub max_budget_waits: u32,
    /// 单次调用超时（秒）
    pub call_timeout_secs: u64,
    /// 单个分析阶段的重试次数
    pub stage_retries: u32,
    /// 单次调用的最大输出 token
    pub max_output_tokens: u32,
    // --- 分析与汇总 ---
    /// 无法识别的专科标签归入的默认专科
    pub default_specialty: Specialty,
    /// 摘要中展示的高分论文数量
    pub top_papers: usize,
    /// 高关注度分数线
    pub high_interest_threshold: f64,
    /// 汇总调用最多携带的论文数量
    pub max_rollup_papers: usize,
    // --- 计费 ---
    pub input_cost_per_million: f64,
    pub output_cost_per_million: f64,
    // --- 输入输出 ---
    /// 回溯天数
    pub lookback_days: u32,
    /// 论文 TOML 文件目录
    pub paper_folder: String,
    /// 分析结果输出目录
    pub output_dir: String,
    /// 输出日志文件
    pub output_log_file: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    // --- LLM 配置 ---
    pub llm_api_key: String,
    pub llm_api_base_url: String,
    pub llm_model_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_tokens_per_minute: 16_000,
            batch_size: 5,
            max_concurrent_items: 3,
            batch_failure_threshold: 0.5,
            reset_budget_each_run: true,
            max_call_retries: 3,
            base_backoff_ms: 1_000,
            max_budget_waits: 8,
            call_timeout_secs: 60,
            stage_retries: 1,
            max_output_tokens: 1024,
            default_specialty: Specialty::Other,
            top_papers: 5,
            high_interest_threshold: 7.0,
            max_rollup_papers: 40,
            input_cost_per_million: 0.05,
            output_cost_per_million: 0.08,
            lookback_days: 7,
            paper_folder: "papers".to_string(),
            output_dir: "digest_output".to_string(),
            output_log_file: "digest_run.log".to_string(),
            verbose_logging: false,
            llm_api_key: String::new(),
            llm_api_base_url: "https://api.openai.com/v1".to_string(),
            llm_model_name: "gpt-4o-mini".to_string(),
        }
    }
}

impl Config {
    /// 从环境变量读取配置，未设置的项使用默认值
    ///
    /// 已设置但无法解析的值会返回错误，而不是悄悄回退到默认值。
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        let default_specialty = match std::env::var("DEFAULT_SPECIALTY") {
            Ok(label) => Specialty::parse(&label).ok_or_else(|| ConfigError::EnvVarParseFailed {
                var_name: "DEFAULT_SPECIALTY".to_string(),
                value: label.clone(),
                expected_type: "Specialty".to_string(),
            })?,
            Err(_) => default.default_specialty,
        };

        let config = Self {
            max_tokens_per_minute: env_or("MAX_TOKENS_PER_MINUTE", default.max_tokens_per_minute)?,
            batch_size: env_or("BATCH_SIZE", default.batch_size)?,
            max_concurrent_items: env_or("MAX_CONCURRENT_ITEMS", default.max_concurrent_items)?,
            batch_failure_threshold: env_or("BATCH_FAILURE_THRESHOLD", default.batch_failure_threshold)?,
            reset_budget_each_run: env_or("RESET_BUDGET_EACH_RUN", default.reset_budget_each_run)?,
            max_call_retries: env_or("MAX_CALL_RETRIES", default.max_call_retries)?,
            base_backoff_ms: env_or("BASE_BACKOFF_MS", default.base_backoff_ms)?,
            max_budget_waits: env_or("MAX_BUDGET_WAITS", default.max_budget_waits)?,
            call_timeout_secs: env_or("CALL_TIMEOUT_SECS", default.call_timeout_secs)?,
            stage_retries: env_or("STAGE_RETRIES", default.stage_retries)?,
            max_output_tokens: env_or("MAX_OUTPUT_TOKENS", default.max_output_tokens)?,
            default_specialty,
            top_papers: env_or("TOP_PAPERS", default.top_papers)?,
            high_interest_threshold: env_or("HIGH_INTEREST_THRESHOLD", default.high_interest_threshold)?,
            max_rollup_papers: env_or("MAX_ROLLUP_PAPERS", default.max_rollup_papers)?,
            input_cost_per_million: env_or("INPUT_COST_PER_MILLION", default.input_cost_per_million)?,
            output_cost_per_million: env_or("OUTPUT_COST_PER_MILLION", default.output_cost_per_million)?,
            lookback_days: env_or("LOOKBACK_DAYS", default.lookback_days)?,
            paper_folder: std::env::var("PAPER_FOLDER").unwrap_or(default.paper_folder),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(default.output_dir),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            verbose_logging: env_or("VERBOSE_LOGGING", default.verbose_logging)?,
            llm_api_key: std::env::var("LLM_API_KEY").unwrap_or(default.llm_api_key),
            llm_api_base_url: std::env::var("LLM_API_BASE_URL").unwrap_or(default.llm_api_base_url),
            llm_model_name: std::env::var("LLM_MODEL_NAME").unwrap_or(default.llm_model_name),
        };

        config.validate()?;
        Ok(config)
    }

    /// 校验配置取值
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tokens_per_minute == 0 {
            return Err(ConfigError::out_of_range("max_tokens_per_minute", "必须大于 0"));
        }
        if self.batch_size == 0 {
            return Err(ConfigError::out_of_range("batch_size", "必须大于 0"));
        }
        if self.max_concurrent_items == 0 {
            return Err(ConfigError::out_of_range("max_concurrent_items", "必须大于 0"));
        }
        if !(self.batch_failure_threshold > 0.0 && self.batch_failure_threshold <= 1.0) {
            return Err(ConfigError::out_of_range(
                "batch_failure_threshold",
                format!("必须位于 (0, 1] 区间, 当前为 {}", self.batch_failure_threshold),
            ));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::out_of_range("call_timeout_secs", "必须大于 0"));
        }
        if self.max_output_tokens == 0 {
            return Err(ConfigError::out_of_range("max_output_tokens", "必须大于 0"));
        }
        for (name, value) in [
            ("input_cost_per_million", self.input_cost_per_million),
            ("output_cost_per_million", self.output_cost_per_million),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::out_of_range(name, "必须是非负有限数"));
            }
        }
        if !(0.0..=10.0).contains(&self.high_interest_threshold) {
            return Err(ConfigError::out_of_range(
                "high_interest_threshold",
                "必须位于 [0, 10] 区间",
            ));
        }
        Ok(())
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

/// 读取环境变量并解析，未设置时返回默认值
fn env_or<T: FromStr>(var_name: &str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value: raw.clone(),
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let config = Config {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OutOfRange { ref name, .. }) if name == "batch_size"
        ));
    }

    #[test]
    fn test_failure_threshold_bounds() {
        let config = Config {
            batch_failure_threshold: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            batch_failure_threshold: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_or_reports_unparsable_value() {
        std::env::set_var("MED_DIGEST_TEST_BAD_NUMBER", "abc");
        let result = env_or::<u64>("MED_DIGEST_TEST_BAD_NUMBER", 5);
        std::env::remove_var("MED_DIGEST_TEST_BAD_NUMBER");
        assert!(matches!(result, Err(ConfigError::EnvVarParseFailed { .. })));
    }

    #[test]
    fn test_env_or_falls_back_when_unset() {
        let value = env_or::<usize>("MED_DIGEST_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
