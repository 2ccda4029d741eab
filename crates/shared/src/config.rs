//! 配置管理模块
//!
//! 支持多格式配置文件加载，环境变量覆盖，以及类型安全的配置访问。

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "RULE_EDITOR";

/// 下拉选项配置（事实、操作符、事件共用）
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OptionConfig {
    pub value: String,
    pub label: String,
}

impl OptionConfig {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// 编辑器配置
///
/// 默认值与演示页面一致：温度/湿度两个事实、六个比较操作符、两个事件。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// 是否启用规则测试器
    pub show_rule_tester: bool,
    pub facts: Vec<OptionConfig>,
    pub operators: Vec<OptionConfig>,
    pub events: Vec<OptionConfig>,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            show_rule_tester: true,
            facts: vec![
                OptionConfig::new("temperature", "Temperature"),
                OptionConfig::new("humidity", "Humidity"),
            ],
            operators: vec![
                OptionConfig::new("equal", "=="),
                OptionConfig::new("notEqual", "!="),
                OptionConfig::new("lessThan", "<"),
                OptionConfig::new("lessThanInclusive", "<="),
                OptionConfig::new("greaterThan", ">"),
                OptionConfig::new("greaterThanInclusive", ">="),
            ],
            events: vec![
                OptionConfig::new("set_thermostat", "Set Thermostat"),
                OptionConfig::new("set_fan", "Set Fan"),
            ],
        }
    }
}

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// 日志输出格式：json（结构化）或 pretty（人类可读）
    pub log_format: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }
}

/// 应用配置
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub service_name: String,
    pub environment: String,
    pub editor: EditorConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序（后加载的会覆盖先加载的同名配置项）：
    /// 1. config/default.toml（默认配置）
    /// 2. config/{environment}.toml（环境特定配置）
    /// 3. config/{service_name}.toml（服务特定配置）
    /// 4. 环境变量（RULE_EDITOR_ 前缀，层级用双下划线分隔，
    ///    如 RULE_EDITOR_OBSERVABILITY__LOG_LEVEL -> observability.log_level）
    pub fn load(service_name: &str) -> Result<Self, ConfigError> {
        let env = std::env::var("RULE_EDITOR_ENV").unwrap_or_else(|_| "development".to_string());

        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".to_string());

        Self::load_from(&config_dir, service_name, &env)
    }

    /// 从指定目录加载配置
    pub fn load_from(config_dir: &str, service_name: &str, env: &str) -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .set_default("service_name", service_name)?
            .set_default("environment", env)?
            .add_source(File::from(Path::new(config_dir).join("default.toml")).required(false))
            .add_source(
                File::from(Path::new(config_dir).join(format!("{}.toml", env))).required(false),
            )
            .add_source(
                File::from(Path::new(config_dir).join(format!("{}.toml", service_name)))
                    .required(false),
            )
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}
