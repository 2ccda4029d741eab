//! 规则评估引擎
//!
//! [`RuleEngine`] 是测试器依赖的评估器接口：注册规则、提交事实、异步得到
//! 触发的事件或错误。[`Engine`] 是默认实现，语义与 json-rules-engine 一致：
//! - 规则按优先级从高到低评估，同优先级保持注册顺序
//! - `all`/`any` 按条件优先级分批评估，批内任一条件出错即失败，只在批间短路；
//!   空 `all` 为真，空 `any` 为假
//! - 未注册的操作符报 `Unknown operator: <name>`
//! - 未提供的事实报 `Undefined fact: <name>`，除非允许未定义事实

use crate::error::{Result, RuleError};
use crate::models::{Condition, ConditionGroup, ConditionNode, Event, GroupOperator, Rule};
use crate::operators::{Operator, default_operators};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use tracing::{debug, instrument};

/// 事实集合：事实标识 -> 事实值
pub type Facts = Map<String, Value>;

/// 未设置优先级时的默认优先级
const DEFAULT_PRIORITY: u32 = 1;

/// 一次评估的结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineRun {
    /// 条件满足的规则触发的事件
    pub events: Vec<Event>,
    /// 条件不满足的规则对应的事件
    #[serde(rename = "failureEvents")]
    pub failure_events: Vec<Event>,
}

/// 规则评估器接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RuleEngine: Send + Sync {
    /// 注册一条规则
    fn add_rule(&mut self, rule: Rule);

    /// 用给定事实评估所有已注册规则
    async fn run(&self, facts: &Facts) -> Result<EngineRun>;
}

/// 引擎选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// 允许条件引用未提供的事实（视为 null）
    pub allow_undefined_facts: bool,
}

/// 默认规则引擎
pub struct Engine {
    rules: Vec<Rule>,
    operators: HashMap<String, Operator>,
    options: EngineOptions,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        let operators = default_operators()
            .into_iter()
            .map(|op| (op.name().to_string(), op))
            .collect();

        Self {
            rules: Vec::new(),
            operators,
            options,
        }
    }

    /// 注册自定义操作符（同名时覆盖）
    pub fn add_operator(&mut self, operator: Operator) {
        debug!(operator = operator.name(), "Operator registered");
        self.operators.insert(operator.name().to_string(), operator);
    }

    /// 同步评估所有规则
    pub fn evaluate(&self, facts: &Facts) -> Result<EngineRun> {
        let mut ordered: Vec<&Rule> = self.rules.iter().collect();
        // sort_by_key 是稳定排序，同优先级保持注册顺序
        ordered.sort_by_key(|rule| std::cmp::Reverse(rule.priority.unwrap_or(DEFAULT_PRIORITY)));

        let mut run = EngineRun::default();
        for rule in ordered {
            let matched = self.evaluate_group(&rule.conditions, facts)?;
            debug!(
                event_type = %rule.event.event_type,
                matched,
                "Rule evaluated"
            );

            if matched {
                run.events.push(rule.event.clone());
            } else {
                run.failure_events.push(rule.event.clone());
            }
        }

        Ok(run)
    }

    /// 评估条件组
    ///
    /// 子节点按优先级分批，同一批内的节点全部评估，任一节点出错则整次评估失败；
    /// 只在批与批之间短路。
    fn evaluate_group(&self, group: &ConditionGroup, facts: &Facts) -> Result<bool> {
        let mut children: Vec<&ConditionNode> = group.children.iter().collect();
        children.sort_by_key(|node| std::cmp::Reverse(node_priority(node)));

        let decided = match group.operator {
            GroupOperator::All => false,
            GroupOperator::Any => true,
        };

        for batch in children.chunk_by(|a, b| node_priority(a) == node_priority(b)) {
            let results = batch
                .iter()
                .map(|child| self.evaluate_node(child, facts))
                .collect::<Result<Vec<bool>>>()?;

            if results.contains(&decided) {
                return Ok(decided);
            }
        }

        Ok(!decided)
    }

    fn evaluate_node(&self, node: &ConditionNode, facts: &Facts) -> Result<bool> {
        match node {
            ConditionNode::Leaf(cond) => self.evaluate_condition(cond, facts),
            ConditionNode::Group(group) => self.evaluate_group(group, facts),
        }
    }

    /// 评估叶子条件
    fn evaluate_condition(&self, cond: &Condition, facts: &Facts) -> Result<bool> {
        let operator = self
            .operators
            .get(&cond.operator)
            .ok_or_else(|| RuleError::UnknownOperator(cond.operator.clone()))?;

        let expected = self.resolve_value(&cond.value, facts)?;
        let fact_value = self.fact_value(&cond.fact, cond.path.as_deref(), facts)?;

        Ok(operator.evaluate(&fact_value, &expected))
    }

    /// 期望值为 `{"fact": "x"}` 时取事实 x 的值
    fn resolve_value(&self, value: &Value, facts: &Facts) -> Result<Value> {
        match value {
            Value::Object(map) => match map.get("fact").and_then(Value::as_str) {
                Some(fact) => {
                    let path = map.get("path").and_then(Value::as_str);
                    self.fact_value(fact, path, facts)
                }
                None => Ok(value.clone()),
            },
            other => Ok(other.clone()),
        }
    }

    /// 取事实值，可选地按路径取子值
    fn fact_value(&self, fact: &str, path: Option<&str>, facts: &Facts) -> Result<Value> {
        let value = match facts.get(fact) {
            Some(value) => value,
            None if self.options.allow_undefined_facts => return Ok(Value::Null),
            None => return Err(RuleError::UndefinedFact(fact.to_string())),
        };

        Ok(match path {
            Some(path) => select_path(value, path).cloned().unwrap_or(Value::Null),
            None => value.clone(),
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RuleEngine for Engine {
    fn add_rule(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    #[instrument(skip(self, facts))]
    async fn run(&self, facts: &Facts) -> Result<EngineRun> {
        self.evaluate(facts)
    }
}

/// 条件节点的评估优先级（条件组使用默认优先级）
fn node_priority(node: &ConditionNode) -> u32 {
    match node {
        ConditionNode::Leaf(cond) => cond.priority.unwrap_or(DEFAULT_PRIORITY),
        ConditionNode::Group(_) => DEFAULT_PRIORITY,
    }
}

/// 按路径取子值（支持 `$.a.b`、`a.b`，数字段用于数组下标，如 `items.0.name`）
pub fn select_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let path = path.strip_prefix('$').unwrap_or(path);
    let path = path.strip_prefix('.').unwrap_or(path);
    if path.is_empty() {
        return Some(value);
    }

    let mut current = value;
    for part in path.split('.') {
        match current {
            Value::Object(map) => {
                current = map.get(part)?;
            }
            Value::Array(arr) => {
                let index: usize = part.parse().ok()?;
                current = arr.get(index)?;
            }
            _ => return None,
        }
    }

    Some(current)
}
