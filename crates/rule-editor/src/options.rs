//! 下拉选项与默认值
//!
//! 新建条件/规则时使用各枚举的第一个选项作为默认值，
//! 这些枚举在构造 [`RuleStore`](crate::store::RuleStore) 时显式传入。

use crate::models::{Condition, ConditionGroup, Event, Rule};
use rule_editor_shared::{EditorConfig, OptionConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 选项：标识符 + 展示文本
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

impl From<OptionConfig> for SelectOption {
    fn from(option: OptionConfig) -> Self {
        Self::new(option.value, option.label)
    }
}

/// 编辑器可选的事实、操作符与事件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleOptions {
    pub facts: Vec<SelectOption>,
    pub operators: Vec<SelectOption>,
    pub events: Vec<SelectOption>,
}

impl RuleOptions {
    pub fn new(
        facts: Vec<SelectOption>,
        operators: Vec<SelectOption>,
        events: Vec<SelectOption>,
    ) -> Self {
        Self {
            facts,
            operators,
            events,
        }
    }

    /// 默认条件：第一个事实 + 第一个操作符 + 空值
    pub fn default_condition(&self) -> Condition {
        Condition::new(
            first_value(&self.facts),
            first_value(&self.operators),
            Value::String(String::new()),
        )
    }

    /// 默认条件组：`{ all: [默认条件] }`
    pub fn default_group(&self) -> ConditionGroup {
        ConditionGroup::all(vec![self.default_condition().into()])
    }

    /// 默认事件：第一个事件类型 + 空值
    pub fn default_event(&self) -> Event {
        Event::new(first_value(&self.events), Value::String(String::new()))
    }

    pub fn default_rule(&self) -> Rule {
        Rule::new(self.default_group(), self.default_event())
    }
}

impl From<EditorConfig> for RuleOptions {
    fn from(config: EditorConfig) -> Self {
        Self::new(
            config.facts.into_iter().map(Into::into).collect(),
            config.operators.into_iter().map(Into::into).collect(),
            config.events.into_iter().map(Into::into).collect(),
        )
    }
}

fn first_value(options: &[SelectOption]) -> String {
    options
        .first()
        .map(|option| option.value.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_use_first_option() {
        let options = RuleOptions::new(
            vec![SelectOption::new("age", "Age"), SelectOption::new("score", "Score")],
            vec![SelectOption::new("greaterThan", ">")],
            vec![SelectOption::new("adult", "Adult")],
        );

        let rule = options.default_rule();
        let leaf = rule.conditions.children[0].as_leaf().unwrap();

        assert_eq!(leaf.fact, "age");
        assert_eq!(leaf.operator, "greaterThan");
        assert_eq!(leaf.value, json!(""));
        assert_eq!(rule.event.event_type, "adult");
        assert_eq!(rule.event.value(), &json!(""));
    }

    #[test]
    fn test_defaults_with_empty_options() {
        let options = RuleOptions::default();
        let leaf = options.default_condition();

        assert_eq!(leaf.fact, "");
        assert_eq!(leaf.operator, "");
        assert_eq!(options.default_event().event_type, "");
    }

    #[test]
    fn test_from_editor_config() {
        let options = RuleOptions::from(EditorConfig::default());
        assert_eq!(options.facts[0], SelectOption::new("temperature", "Temperature"));
        assert_eq!(options.operators.len(), 6);
    }
}
