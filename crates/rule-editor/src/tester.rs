//! 规则测试器
//!
//! 用用户输入的事实评估当前规则列表。每次执行都通过引擎工厂创建新的评估器并
//! 注册当前全部规则，评估结果或错误消息写入结果槽；所有错误都在本地恢复，
//! 不会影响规则树，也不会向调用方传播。

use crate::engine::{Engine, Facts, RuleEngine};
use crate::models::Rule;
use crate::options::SelectOption;
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// 评估器构造函数
pub type EngineFactory = Arc<dyn Fn() -> Box<dyn RuleEngine> + Send + Sync>;

/// 一次测试的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    /// 触发的事件（缩进 JSON）
    Events(String),
    /// 评估失败的错误消息（原样展示）
    Error(String),
}

impl TestOutcome {
    pub fn message(&self) -> &str {
        match self {
            Self::Events(text) | Self::Error(text) => text,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// 规则测试器
#[derive(Clone)]
pub struct RuleTester {
    facts: Facts,
    /// 最近一次结果；并发执行时以最后写入者为准
    result: Arc<Mutex<Option<String>>>,
    engine_factory: EngineFactory,
}

impl RuleTester {
    /// 创建测试器，每个事实的初始测试值为空字符串
    pub fn new(facts: &[SelectOption]) -> Self {
        let facts = facts
            .iter()
            .map(|fact| (fact.value.clone(), Value::String(String::new())))
            .collect();

        Self {
            facts,
            result: Arc::new(Mutex::new(None)),
            engine_factory: Arc::new(|| Box::new(Engine::new()) as Box<dyn RuleEngine>),
        }
    }

    /// 使用自定义评估器（如注册了自定义操作符的引擎）
    pub fn with_engine_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Box<dyn RuleEngine> + Send + Sync + 'static,
    {
        self.engine_factory = Arc::new(factory);
        self
    }

    pub fn facts(&self) -> &Facts {
        &self.facts
    }

    /// 当前测试事实的缩进 JSON
    pub fn facts_text(&self) -> String {
        serde_json::to_string_pretty(&self.facts).unwrap_or_default()
    }

    /// 用 JSON 文本替换测试事实
    ///
    /// 成功时清空结果槽；失败时把错误消息写入结果槽并保留原事实。
    pub fn set_facts_text(&mut self, text: &str) -> bool {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(facts)) => {
                self.facts = facts;
                *self.result.lock() = None;
                true
            }
            Ok(other) => {
                let message = format!("facts must be a JSON object, got: {}", other);
                *self.result.lock() = Some(message);
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to parse test facts");
                *self.result.lock() = Some(e.to_string());
                false
            }
        }
    }

    /// 最近一次结果文本
    pub fn result(&self) -> Option<String> {
        self.result.lock().clone()
    }

    /// 用当前事实评估规则，结果同时写入结果槽
    pub async fn execute(&self, rules: &[Rule]) -> TestOutcome {
        let mut engine = (self.engine_factory)();
        for rule in rules {
            engine.add_rule(rule.clone());
        }

        let outcome = match engine.run(&self.facts).await {
            Ok(run) => match serde_json::to_string_pretty(&run.events) {
                Ok(text) => {
                    info!(events = run.events.len(), "Rule test finished");
                    TestOutcome::Events(text)
                }
                Err(e) => TestOutcome::Error(e.to_string()),
            },
            Err(e) => {
                warn!(error = %e, "Rule test failed");
                TestOutcome::Error(e.to_string())
            }
        };

        *self.result.lock() = Some(outcome.message().to_string());
        outcome
    }

    /// 在后台执行测试，不支持取消
    pub fn spawn_execute(&self, rules: Vec<Rule>) -> JoinHandle<TestOutcome> {
        let tester = self.clone();
        tokio::spawn(async move { tester.execute(&rules).await })
    }
}
