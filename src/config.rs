use backon::ExponentialBuilder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub allocation: AllocationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// 存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
}

/// 分配引擎的重试设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationConfig {
    /// 版本冲突时整轮 读取-计算-提交 的最大次数
    pub max_conflict_retries: u32,
    pub commit_retry_min_delay_ms: u64,
    pub commit_retry_max_delay_ms: u64,
    pub commit_retry_max_times: usize,
}

impl AllocationConfig {
    /// 提交重试的退避策略 (只包裹存储提交，不包裹分配计算)
    pub fn commit_backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(self.commit_retry_min_delay_ms))
            .with_max_delay(Duration::from_millis(self.commit_retry_max_delay_ms))
            .with_max_times(self.commit_retry_max_times)
            .with_jitter()
    }
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            commit_retry_min_delay_ms: 20,
            commit_retry_max_delay_ms: 2_000,
            commit_retry_max_times: 3,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            database: DatabaseConfig {
                backend: StoreBackend::Postgres,
                url: "postgres://localhost/customer_ledger".to_string(),
                max_connections: 20,
                acquire_timeout_secs: 10,
                run_migrations: true,
            },
            allocation: AllocationConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置：默认值 < config/ledger.yaml < LEDGER__* 环境变量
    ///
    /// DATABASE_URL / SERVER_HOST / SERVER_PORT 仍然生效并优先。
    pub fn load() -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())?;
        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(config::File::with_name("config/ledger").required(false))
            .add_source(
                config::Environment::with_prefix("LEDGER")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        let mut app: AppConfig = settings.try_deserialize()?;
        app.apply_legacy_env();
        Ok(app)
    }

    fn apply_legacy_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(host) = std::env::var("SERVER_HOST") {
            self.server.host = host;
        }
        if let Some(port) = std::env::var("SERVER_PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}
