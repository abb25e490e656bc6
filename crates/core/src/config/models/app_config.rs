use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    coordination::CoordinationConfig,
    jobs::{ConversionConfig, EncryptionConfig},
    observability::ObservabilityConfig,
    storage::{CacheConfig, DatabaseConfig},
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub coordination: CoordinationConfig,
    pub conversion: ConversionConfig,
    pub encryption: EncryptionConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: COORDINATOR_, nested keys separated by `__`,
    ///    e.g. `COORDINATOR_COORDINATION__SINGLETON_MODE=true`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = ["config/coordinator.toml", "coordinator.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("COORDINATOR")
                .prefix_separator("_")
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

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.cache.validate().context("缓存配置验证失败")?;
        self.coordination
            .validate()
            .context("选举配置验证失败")?;
        self.conversion
            .validate()
            .context("转换任务配置验证失败")?;
        self.encryption
            .validate()
            .context("加密任务配置验证失败")?;
        self.observability
            .validate()
            .context("日志配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheBackendType, RegistrationBackendType};
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.coordination.singleton_mode);
        assert_eq!(config.coordination.time_until_unregister_in_seconds, 30);
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let toml_str = r#"
            [coordination]
            singleton_mode = true
            registration_backend = "memory"

            [cache]
            backend = "memory"
        "#;

        let config = AppConfig::from_toml(toml_str).unwrap();
        assert!(config.coordination.singleton_mode);
        assert_eq!(
            config.coordination.registration_backend,
            RegistrationBackendType::Memory
        );
        assert_eq!(config.cache.backend, CacheBackendType::Memory);
        // 未指定的字段使用默认值
        assert_eq!(config.coordination.heartbeat_interval_seconds, 5);
        assert_eq!(config.encryption.queue_name, "encryption");
    }

    #[test]
    fn test_heartbeat_must_be_shorter_than_ttl() {
        let toml_str = r#"
            [coordination]
            time_until_unregister_in_seconds = 10
            heartbeat_interval_seconds = 10
        "#;

        let result = AppConfig::from_toml(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_log_format_rejected() {
        let mut config = AppConfig::default();
        config.observability.log_format = "xml".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_roundtrip_keeps_values() {
        let mut config = AppConfig::default();
        config.conversion.queue_name = "previews".to_string();
        let toml_str = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&toml_str).unwrap();
        assert_eq!(parsed.conversion.queue_name, "previews");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
            [coordination]
            time_until_unregister_in_seconds = 60
            heartbeat_interval_seconds = 10

            [encryption]
            max_parallelism = 8
            stale_after_seconds = 120
            "#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.coordination.time_until_unregister_in_seconds, 60);
        assert_eq!(config.encryption.max_parallelism, 8);
        assert_eq!(config.encryption.stale_after().num_seconds(), 120);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let result = AppConfig::load(Some("/nonexistent/coordinator.toml"));
        assert!(result.is_err());
    }
}
