//! 共享库
//!
//! 包含规则编辑器各个入口共用的配置加载与日志初始化代码。

pub mod config;
pub mod observability;

pub use config::{AppConfig, EditorConfig, ObservabilityConfig, OptionConfig};
