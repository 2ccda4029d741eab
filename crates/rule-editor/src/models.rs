//! 规则领域模型
//!
//! 线上格式与 json-rules-engine 的规则 JSON 一致：条件组是只有一个键
//! （`all` 或 `any`）的对象，内存中则以 [`ConditionGroup`] 的
//! "操作符 + 子节点" 形式表示。

use crate::error::RuleError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// 规则定义：条件树 + 满足时触发的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub conditions: ConditionGroup,
    pub event: Event,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// 评估优先级，数值越大越先评估（缺省视为 1）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
}

impl Rule {
    pub fn new(conditions: ConditionGroup, event: Event) -> Self {
        Self {
            conditions,
            event,
            name: None,
            priority: None,
        }
    }

    /// 按渲染顺序列出条件树中的所有节点及其路径
    pub fn walk(&self) -> Vec<NodeEntry<'_>> {
        self.conditions.walk()
    }
}

/// 条件组操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    All,
    Any,
}

impl fmt::Display for GroupOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Any => write!(f, "any"),
        }
    }
}

impl FromStr for GroupOperator {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "any" => Ok(Self::Any),
            other => Err(RuleError::InvalidGroupOperator(other.to_string())),
        }
    }
}

/// 条件组节点
///
/// 任何时候都恰好有一个操作符；子节点可以为空。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GroupRepr", into = "GroupRepr")]
pub struct ConditionGroup {
    pub operator: GroupOperator,
    pub children: Vec<ConditionNode>,
}

/// 线上格式：`{"all": [...]}` 或 `{"any": [...]}`
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum GroupRepr {
    All(Vec<ConditionNode>),
    Any(Vec<ConditionNode>),
}

impl From<GroupRepr> for ConditionGroup {
    fn from(repr: GroupRepr) -> Self {
        match repr {
            GroupRepr::All(children) => Self::all(children),
            GroupRepr::Any(children) => Self::any(children),
        }
    }
}

impl From<ConditionGroup> for GroupRepr {
    fn from(group: ConditionGroup) -> Self {
        match group.operator {
            GroupOperator::All => Self::All(group.children),
            GroupOperator::Any => Self::Any(group.children),
        }
    }
}

impl ConditionGroup {
    pub fn new(operator: GroupOperator, children: Vec<ConditionNode>) -> Self {
        Self { operator, children }
    }

    pub fn all(children: Vec<ConditionNode>) -> Self {
        Self::new(GroupOperator::All, children)
    }

    pub fn any(children: Vec<ConditionNode>) -> Self {
        Self::new(GroupOperator::Any, children)
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// 深度优先列出所有后代节点，路径相对于本组
    pub fn walk(&self) -> Vec<NodeEntry<'_>> {
        let mut entries = Vec::new();
        self.collect_entries(&mut Vec::new(), &mut entries);
        entries
    }

    fn collect_entries<'a>(&'a self, prefix: &mut Vec<usize>, entries: &mut Vec<NodeEntry<'a>>) {
        for (index, child) in self.children.iter().enumerate() {
            prefix.push(index);
            entries.push(NodeEntry {
                path: prefix.clone(),
                node: child,
            });
            if let ConditionNode::Group(group) = child {
                group.collect_entries(prefix, entries);
            }
            prefix.pop();
        }
    }
}

/// 条件树节点（叶子条件或嵌套条件组）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionNode {
    Group(ConditionGroup),
    Leaf(Condition),
}

impl ConditionNode {
    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }

    pub fn as_group(&self) -> Option<&ConditionGroup> {
        match self {
            Self::Group(group) => Some(group),
            Self::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&Condition> {
        match self {
            Self::Leaf(cond) => Some(cond),
            Self::Group(_) => None,
        }
    }
}

impl From<Condition> for ConditionNode {
    fn from(cond: Condition) -> Self {
        Self::Leaf(cond)
    }
}

impl From<ConditionGroup> for ConditionNode {
    fn from(group: ConditionGroup) -> Self {
        Self::Group(group)
    }
}

/// 叶子条件：用操作符比较某个事实与期望值
///
/// `fact`/`operator` 只是标识符，不做引用完整性检查。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub fact: String,
    pub operator: String,
    /// 通常是字符串或数字；`{"fact": "other"}` 表示引用另一个事实
    pub value: Value,
    /// 在事实值内部取子路径，如 `$.profile.age`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Map<String, Value>>,
}

impl Condition {
    pub fn new(fact: impl Into<String>, operator: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            fact: fact.into(),
            operator: operator.into(),
            value: value.into(),
            path: None,
            priority: None,
            params: None,
        }
    }
}

/// 规则触发的事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub params: EventParams,
}

impl Event {
    pub fn new(event_type: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            event_type: event_type.into(),
            params: EventParams {
                value: value.into(),
                extra: Map::new(),
            },
        }
    }

    pub fn value(&self) -> &Value {
        &self.params.value
    }
}

/// 事件参数
///
/// 编辑器只维护 `value`；加载时带入的其他参数原样保留，直到事件被整体替换。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EventParams {
    #[serde(default)]
    pub value: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 条件树中的一个节点及其定位路径
#[derive(Debug, Clone, PartialEq)]
pub struct NodeEntry<'a> {
    pub path: Vec<usize>,
    pub node: &'a ConditionNode,
}

impl NodeEntry<'_> {
    /// 嵌套深度，顶层子节点为 1
    pub fn depth(&self) -> usize {
        self.path.len()
    }
}
