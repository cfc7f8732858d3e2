use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use ::config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::{FleetError, FleetResult};

/// 配置校验接口
pub trait ConfigValidator {
    fn validate(&self) -> FleetResult<()>;
}

/// 注册中心/持久化服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistryConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl ConfigValidator for RegistryConfig {
    fn validate(&self) -> FleetResult<()> {
        if self.base_url.trim().is_empty() {
            return Err(FleetError::Configuration("注册中心地址不能为空".to_string()));
        }
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(FleetError::Configuration(format!(
                "注册中心地址必须以http://或https://开头: {}",
                self.base_url
            )));
        }
        if self.request_timeout_seconds == 0 {
            return Err(FleetError::Configuration("请求超时时间必须大于0".to_string()));
        }
        Ok(())
    }
}

/// 节点健康缓存配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct HealthCacheConfig {
    /// 快照有效期（秒）
    pub ttl_seconds: u64,
    /// 单个节点探活超时（毫秒）
    pub probe_timeout_ms: u64,
    /// 刷新时并发探活的节点数
    pub probe_concurrency: usize,
}

impl Default for HealthCacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: 30,
            probe_timeout_ms: 2000,
            probe_concurrency: 8,
        }
    }
}

impl HealthCacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl ConfigValidator for HealthCacheConfig {
    fn validate(&self) -> FleetResult<()> {
        if self.ttl_seconds == 0 {
            return Err(FleetError::Configuration("缓存有效期必须大于0".to_string()));
        }
        if self.probe_timeout_ms == 0 {
            return Err(FleetError::Configuration("探活超时必须大于0".to_string()));
        }
        if self.probe_concurrency == 0 {
            return Err(FleetError::Configuration("探活并发数必须大于0".to_string()));
        }
        Ok(())
    }
}

/// 分派协调器配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 工作池大小，即同时进行的节点RPC上限
    pub pool_size: usize,
    pub max_transforms_per_job: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            max_transforms_per_job: 5,
        }
    }
}

impl ConfigValidator for DispatcherConfig {
    fn validate(&self) -> FleetResult<()> {
        if self.pool_size == 0 {
            return Err(FleetError::Configuration("工作池大小必须大于0".to_string()));
        }
        if self.max_transforms_per_job == 0 {
            return Err(FleetError::Configuration("每个作业的变换上限必须大于0".to_string()));
        }
        Ok(())
    }
}

/// API服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8000".to_string(),
        }
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> FleetResult<()> {
        if self.enabled && self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(FleetError::Configuration(format!(
                "无效的API绑定地址: {}",
                self.bind_address
            )));
        }
        Ok(())
    }
}

/// 日志与指标配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9100".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> FleetResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(FleetError::Configuration(format!(
                "无效的日志级别: {}",
                self.log_level
            )));
        }
        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            return Err(FleetError::Configuration(format!(
                "不支持的日志格式: {}",
                self.log_format
            )));
        }
        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(FleetError::Configuration(format!(
                "无效的指标监听地址: {}",
                self.metrics_bind_address
            )));
        }
        Ok(())
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub registry: RegistryConfig,
    pub health_cache: HealthCacheConfig,
    pub dispatcher: DispatcherConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 加载配置：内置默认值 < TOML配置文件 < `FLEET__` 前缀环境变量
    ///
    /// 显式指定的文件不存在时报错；未指定时依次查找默认路径，都不存在则只使用默认值。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = ConfigBuilder::try_from(&AppConfig::default()).context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/fleet.toml", "fleet.toml", "/etc/fleet/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FLEET")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }
}

impl ConfigValidator for AppConfig {
    fn validate(&self) -> FleetResult<()> {
        self.registry.validate()?;
        self.health_cache.validate()?;
        self.dispatcher.validate()?;
        self.api.validate()?;
        self.observability.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.health_cache.ttl(), Duration::from_secs(30));
        assert_eq!(config.dispatcher.pool_size, 10);
        assert_eq!(config.dispatcher.max_transforms_per_job, 5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml_str = r#"
            [dispatcher]
            pool_size = 4

            [health_cache]
            ttl_seconds = 10
        "#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.dispatcher.pool_size, 4);
        assert_eq!(config.dispatcher.max_transforms_per_job, 5);
        assert_eq!(config.health_cache.ttl_seconds, 10);
        assert_eq!(config.health_cache.probe_timeout_ms, 2000);
        assert_eq!(config.registry.base_url, "http://localhost:5000");
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = AppConfig::default();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validation_failures() {
        let mut config = AppConfig::default();
        config.dispatcher.pool_size = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.health_cache.ttl_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.registry.base_url = "localhost:5000".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.api.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [registry]
            base_url = "http://registry.internal:5000"

            [dispatcher]
            pool_size = 3
            "#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.registry.base_url, "http://registry.internal:5000");
        assert_eq!(config.dispatcher.pool_size, 3);
        assert_eq!(config.health_cache.ttl_seconds, 30);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = AppConfig::load(Some("/nonexistent/fleet.toml"));
        assert!(result.is_err());
    }
}
