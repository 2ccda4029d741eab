//! 规则编辑器核心
//!
//! 提供 json-rules-engine 规则列表的编辑与测试能力：
//! - 规则模型与 JSON 序列化（`{"all": [...]}` / `{"any": [...]}` 条件组）
//! - 按路径定位的条件树变更，每次变更后推送序列化快照
//! - 输入文本到规则值的转换
//! - 可替换的评估器与规则测试器
//! - 行命令编辑会话

pub mod engine;
pub mod error;
pub mod models;
pub mod operators;
pub mod options;
pub mod shell;
pub mod store;
pub mod tester;
pub mod value;

pub use engine::{Engine, EngineOptions, EngineRun, Facts, RuleEngine};
pub use error::{Result, RuleError};
pub use models::{
    Condition, ConditionGroup, ConditionNode, Event, EventParams, GroupOperator, NodeEntry, Rule,
};
pub use operators::Operator;
pub use options::{RuleOptions, SelectOption};
pub use shell::{Command, CommandError, Reply, Shell};
pub use store::{RuleStore, initialize, resolve_group, serialize, try_initialize};
pub use tester::{EngineFactory, RuleTester, TestOutcome};
pub use value::parse_rule_value;
