use crate::auth::JwtConfig;
use std::time::Duration;

/// 服务器配置 - 调度引擎的所有配置项
///
/// # 环境变量
///
/// 所有配置项都可以通过环境变量覆盖：
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/dispatch | 工作目录 (日志) |
/// | HTTP_PORT | 3000 | HTTP 服务端口 |
/// | ENVIRONMENT | development | 运行环境 |
/// | OFFER_TIMEOUT_SECS | 60 | 配送邀约等待窗口 |
/// | RETRY_BASE_DELAY_SECS | 120 | 重试退避基数 |
/// | RETRY_MAX_DELAY_SECS | 900 | 重试退避上限 |
/// | MAX_DISPATCH_RETRIES | 5 | 业务重试次数上限 |
/// | JOB_MAX_ATTEMPTS | 3 | 任务运行器重试上限 |
/// | JOB_RETRY_DELAY_SECS | 5 | 任务运行器重试间隔 |
///
/// # 示例
///
/// ```ignore
/// OFFER_TIMEOUT_SECS=30 HTTP_PORT=8080 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存储日志文件
    pub work_dir: String,
    /// HTTP API 服务端口
    pub http_port: u16,
    /// JWT 认证配置
    pub jwt: JwtConfig,
    /// 运行环境: development | staging | production
    pub environment: String,
    /// 调度协调器参数
    pub dispatch: DispatchConfig,
    /// 任务运行器参数
    pub jobs: JobConfig,
}

/// Dispatch coordinator tunables.
///
/// The assignment-offer window, backoff schedule and retry cap were never
/// documented upstream; they are explicit parameters here, not guesses
/// baked into the code.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// How long one partner may hold an offer before it times out
    pub offer_timeout: Duration,
    /// First backoff delay after a search round exhausts its candidates
    pub retry_base_delay: Duration,
    /// Backoff ceiling (delays double per round up to this)
    pub retry_max_delay: Duration,
    /// Maximum number of deferred search rounds before escalating to a human
    pub max_retries: u32,
}

impl DispatchConfig {
    /// Backoff delay before retry round `round` (1-based): base doubling
    /// per round, capped.
    pub fn backoff_delay(&self, round: u32) -> Duration {
        let exp = round.saturating_sub(1).min(16);
        let delay = self.retry_base_delay.saturating_mul(1u32 << exp);
        delay.min(self.retry_max_delay)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            offer_timeout: Duration::from_secs(60),
            retry_base_delay: Duration::from_secs(120),
            retry_max_delay: Duration::from_secs(900),
            max_retries: 5,
        }
    }
}

/// Job runner tunables (infrastructure retries, distinct from the
/// coordinator's business retries)
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Attempts per job before the runner gives up
    pub max_attempts: u32,
    /// Delay between runner-level attempts
    pub retry_delay: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置，使用默认值
    pub fn from_env() -> Self {
        let dispatch_defaults = DispatchConfig::default();
        let job_defaults = JobConfig::default();
        Self {
            work_dir: std::env::var("WORK_DIR").unwrap_or_else(|_| "/var/lib/dispatch".into()),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            jwt: JwtConfig::default(),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            dispatch: DispatchConfig {
                offer_timeout: env_u64("OFFER_TIMEOUT_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(dispatch_defaults.offer_timeout),
                retry_base_delay: env_u64("RETRY_BASE_DELAY_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(dispatch_defaults.retry_base_delay),
                retry_max_delay: env_u64("RETRY_MAX_DELAY_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(dispatch_defaults.retry_max_delay),
                max_retries: env_u64("MAX_DISPATCH_RETRIES")
                    .map(|v| v as u32)
                    .unwrap_or(dispatch_defaults.max_retries),
            },
            jobs: JobConfig {
                max_attempts: env_u64("JOB_MAX_ATTEMPTS")
                    .map(|v| v as u32)
                    .unwrap_or(job_defaults.max_attempts),
                retry_delay: env_u64("JOB_RETRY_DELAY_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(job_defaults.retry_delay),
            },
        }
    }

    /// 使用自定义调度参数覆盖部分配置
    ///
    /// 常用于测试场景（毫秒级超时）
    pub fn with_dispatch(dispatch: DispatchConfig) -> Self {
        let mut config = Self::from_env();
        config.dispatch = dispatch;
        config
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = DispatchConfig {
            offer_timeout: Duration::from_secs(60),
            retry_base_delay: Duration::from_secs(120),
            retry_max_delay: Duration::from_secs(900),
            max_retries: 5,
        };
        assert_eq!(cfg.backoff_delay(1), Duration::from_secs(120));
        assert_eq!(cfg.backoff_delay(2), Duration::from_secs(240));
        assert_eq!(cfg.backoff_delay(3), Duration::from_secs(480));
        assert_eq!(cfg.backoff_delay(4), Duration::from_secs(900));
        assert_eq!(cfg.backoff_delay(5), Duration::from_secs(900));
    }
}
