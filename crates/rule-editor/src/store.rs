//! 规则存储与条件树变更
//!
//! `RuleStore` 是规则列表的唯一数据源。所有变更都在规则列表的副本上进行，
//! 成功后才提交并通知订阅者；失败的变更不会改变状态，也不会触发通知。
//!
//! 条件树中的节点用路径定位：路径的每个元素都是当前条件组子节点列表的下标，
//! 空路径表示规则的顶层条件组。路径总是由调用方根据当前树形即时计算
//! （见 [`Rule::walk`]），因此路径解析失败属于完整性错误，直接返回错误。

use crate::error::{Result, RuleError};
use crate::models::{Condition, ConditionGroup, ConditionNode, Event, GroupOperator, Rule};
use crate::options::RuleOptions;
use crate::value::parse_rule_value;
use serde_json::Value;
use tracing::{debug, error, instrument};

/// 变更订阅者，参数为变更后的序列化快照
pub type ChangeListener = Box<dyn FnMut(&str) + Send>;

/// 从序列化文本初始化规则列表
///
/// 空输入得到空列表；数组原样作为规则列表，单个对象包装成单元素列表。
/// 解析失败时记录错误日志并返回空列表，不向调用方传播。
pub fn initialize(value: Option<&str>) -> Vec<Rule> {
    try_initialize(value).unwrap_or_else(|e| {
        error!(error = %e, "Failed to parse rule value");
        Vec::new()
    })
}

/// 从序列化文本初始化规则列表，解析失败时返回错误
pub fn try_initialize(value: Option<&str>) -> Result<Vec<Rule>> {
    let text = match value {
        Some(text) if !text.trim().is_empty() => text,
        _ => return Ok(Vec::new()),
    };

    let parsed: Value = serde_json::from_str(text)?;
    let rules = match parsed {
        Value::Array(_) => serde_json::from_value(parsed)?,
        other => vec![serde_json::from_value(other)?],
    };

    Ok(rules)
}

/// 序列化规则列表（线上格式）
pub fn serialize(rules: &[Rule]) -> Result<String> {
    Ok(serde_json::to_string(rules)?)
}

/// 沿路径解析条件组
pub fn resolve_group<'a>(path: &[usize], root: &'a ConditionGroup) -> Result<&'a ConditionGroup> {
    let mut current = root;
    for (depth, &index) in path.iter().enumerate() {
        current = match current.children.get(index) {
            Some(ConditionNode::Group(group)) => group,
            Some(ConditionNode::Leaf(_)) => {
                return Err(RuleError::NotAGroup {
                    path: path[..=depth].to_vec(),
                });
            }
            None => {
                return Err(RuleError::InvalidPath {
                    path: path.to_vec(),
                    depth,
                    index,
                });
            }
        };
    }
    Ok(current)
}

/// 沿路径解析条件组（可变）
pub fn resolve_group_mut<'a>(
    path: &[usize],
    root: &'a mut ConditionGroup,
) -> Result<&'a mut ConditionGroup> {
    let mut current = root;
    for (depth, &index) in path.iter().enumerate() {
        current = match current.children.get_mut(index) {
            Some(ConditionNode::Group(group)) => group,
            Some(ConditionNode::Leaf(_)) => {
                return Err(RuleError::NotAGroup {
                    path: path[..=depth].to_vec(),
                });
            }
            None => {
                return Err(RuleError::InvalidPath {
                    path: path.to_vec(),
                    depth,
                    index,
                });
            }
        };
    }
    Ok(current)
}

/// 将非空路径拆成父组路径和最后一个下标
fn split_path(path: &[usize]) -> Result<(&[usize], usize)> {
    match path.split_last() {
        Some((&last, parent)) => Ok((parent, last)),
        None => Err(RuleError::EmptyPath),
    }
}

/// 解析父组并取出最后一个下标处的节点（可变）
fn resolve_child_mut<'a>(path: &[usize], root: &'a mut ConditionGroup) -> Result<&'a mut ConditionNode> {
    let (parent_path, index) = split_path(path)?;
    let parent = resolve_group_mut(parent_path, root)?;
    parent
        .children
        .get_mut(index)
        .ok_or_else(|| RuleError::InvalidPath {
            path: path.to_vec(),
            depth: parent_path.len(),
            index,
        })
}

/// 规则存储
pub struct RuleStore {
    rules: Vec<Rule>,
    options: RuleOptions,
    listeners: Vec<ChangeListener>,
}

impl RuleStore {
    /// 创建规则存储，`initial_value` 为序列化的规则（可为空）
    pub fn new(options: RuleOptions, initial_value: Option<&str>) -> Self {
        Self::from_rules(options, initialize(initial_value))
    }

    pub fn from_rules(options: RuleOptions, rules: Vec<Rule>) -> Self {
        Self {
            rules,
            options,
            listeners: Vec::new(),
        }
    }

    /// 注册变更订阅者，每次变更成功后以新快照调用
    pub fn subscribe<F>(&mut self, listener: F)
    where
        F: FnMut(&str) + Send + 'static,
    {
        self.listeners.push(Box::new(listener));
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, rule_index: usize) -> Result<&Rule> {
        self.rules
            .get(rule_index)
            .ok_or(RuleError::RuleNotFound(rule_index))
    }

    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 当前状态的序列化快照
    pub fn serialize(&self) -> Result<String> {
        serialize(&self.rules)
    }

    /// 缩进格式的快照，用于展示
    pub fn serialize_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.rules)?)
    }

    /// 在规则列表副本上执行变更，成功后提交并通知订阅者
    fn commit<F>(&mut self, mutate: F) -> Result<&[Rule]>
    where
        F: FnOnce(&mut Vec<Rule>) -> Result<()>,
    {
        let mut next = self.rules.clone();
        mutate(&mut next)?;

        let snapshot = serialize(&next)?;
        self.rules = next;

        debug!(rules = self.rules.len(), "Rules updated");
        for listener in &mut self.listeners {
            listener(&snapshot);
        }

        Ok(self.rules.as_slice())
    }

    /// 在指定规则上执行变更
    fn commit_rule<F>(&mut self, rule_index: usize, mutate: F) -> Result<&[Rule]>
    where
        F: FnOnce(&mut Rule) -> Result<()>,
    {
        self.commit(|rules| {
            let rule = rules
                .get_mut(rule_index)
                .ok_or(RuleError::RuleNotFound(rule_index))?;
            mutate(rule)
        })
    }

    /// 追加一条默认规则
    #[instrument(skip(self))]
    pub fn add_rule(&mut self) -> Result<&[Rule]> {
        let rule = self.options.default_rule();
        self.commit(|rules| {
            rules.push(rule);
            Ok(())
        })
    }

    /// 删除规则，之后的规则下标依次前移
    #[instrument(skip(self))]
    pub fn delete_rule(&mut self, rule_index: usize) -> Result<&[Rule]> {
        self.commit(|rules| {
            if rule_index >= rules.len() {
                return Err(RuleError::RuleNotFound(rule_index));
            }
            rules.remove(rule_index);
            Ok(())
        })
    }

    /// 向路径指向的条件组追加默认条件
    #[instrument(skip(self))]
    pub fn add_condition(&mut self, rule_index: usize, path: &[usize]) -> Result<&[Rule]> {
        let condition = self.options.default_condition();
        self.commit_rule(rule_index, |rule| {
            resolve_group_mut(path, &mut rule.conditions)?
                .children
                .push(condition.into());
            Ok(())
        })
    }

    /// 删除路径指向的条件
    ///
    /// 删除组内最后一个条件后，该组保留操作符并成为空组。
    #[instrument(skip(self))]
    pub fn delete_condition(&mut self, rule_index: usize, path: &[usize]) -> Result<&[Rule]> {
        self.remove_node(rule_index, path, false)
    }

    /// 替换路径指向的条件
    #[instrument(skip(self, condition))]
    pub fn update_condition(
        &mut self,
        rule_index: usize,
        path: &[usize],
        condition: Condition,
    ) -> Result<&[Rule]> {
        self.commit_rule(rule_index, |rule| {
            *resolve_child_mut(path, &mut rule.conditions)? = condition.into();
            Ok(())
        })
    }

    /// 向路径指向的条件组追加嵌套组 `{ all: [默认条件] }`
    #[instrument(skip(self))]
    pub fn add_group(&mut self, rule_index: usize, path: &[usize]) -> Result<&[Rule]> {
        let group = self.options.default_group();
        self.commit_rule(rule_index, |rule| {
            resolve_group_mut(path, &mut rule.conditions)?
                .children
                .push(group.into());
            Ok(())
        })
    }

    /// 删除路径指向的嵌套组
    #[instrument(skip(self))]
    pub fn delete_group(&mut self, rule_index: usize, path: &[usize]) -> Result<&[Rule]> {
        self.remove_node(rule_index, path, true)
    }

    fn remove_node(&mut self, rule_index: usize, path: &[usize], group: bool) -> Result<&[Rule]> {
        self.commit_rule(rule_index, |rule| {
            let (parent_path, index) = split_path(path)?;
            let parent = resolve_group_mut(parent_path, &mut rule.conditions)?;

            match parent.children.get(index) {
                Some(node) if node.is_group() == group => {
                    parent.children.remove(index);
                    Ok(())
                }
                Some(_) => Err(RuleError::NodeKindMismatch {
                    path: path.to_vec(),
                    expected: if group { "group" } else { "condition" },
                }),
                None => Err(RuleError::InvalidPath {
                    path: path.to_vec(),
                    depth: parent_path.len(),
                    index,
                }),
            }
        })
    }

    /// 切换条件组操作符，子节点保持不变
    ///
    /// 空路径切换规则顶层条件组，否则切换路径指向的嵌套组。
    #[instrument(skip(self))]
    pub fn update_group_operator(
        &mut self,
        rule_index: usize,
        path: &[usize],
        operator: GroupOperator,
    ) -> Result<&[Rule]> {
        self.commit_rule(rule_index, |rule| {
            if path.is_empty() {
                rule.conditions.operator = operator;
                return Ok(());
            }

            match resolve_child_mut(path, &mut rule.conditions)? {
                ConditionNode::Group(group) => {
                    group.operator = operator;
                    Ok(())
                }
                ConditionNode::Leaf(_) => Err(RuleError::NotAGroup {
                    path: path.to_vec(),
                }),
            }
        })
    }

    /// 整体替换规则事件为 `{ type, params: { value } }`，不合并旧参数
    #[instrument(skip(self, value))]
    pub fn update_event(
        &mut self,
        rule_index: usize,
        event_type: &str,
        value: Value,
    ) -> Result<&[Rule]> {
        let event = Event::new(event_type, value);
        self.commit_rule(rule_index, |rule| {
            rule.event = event;
            Ok(())
        })
    }

    // ==================== 表单编辑操作 ====================

    /// 路径指向的叶子条件
    pub fn condition(&self, rule_index: usize, path: &[usize]) -> Result<&Condition> {
        let rule = self.rule(rule_index)?;
        let (parent_path, index) = split_path(path)?;
        let parent = resolve_group(parent_path, &rule.conditions)?;

        match parent.children.get(index) {
            Some(ConditionNode::Leaf(cond)) => Ok(cond),
            Some(ConditionNode::Group(_)) => Err(RuleError::NodeKindMismatch {
                path: path.to_vec(),
                expected: "condition",
            }),
            None => Err(RuleError::InvalidPath {
                path: path.to_vec(),
                depth: parent_path.len(),
                index,
            }),
        }
    }

    /// 修改条件的事实
    pub fn set_condition_fact(
        &mut self,
        rule_index: usize,
        path: &[usize],
        fact: &str,
    ) -> Result<&[Rule]> {
        let mut condition = self.condition(rule_index, path)?.clone();
        condition.fact = fact.to_string();
        self.update_condition(rule_index, path, condition)
    }

    /// 修改条件的操作符
    pub fn set_condition_operator(
        &mut self,
        rule_index: usize,
        path: &[usize],
        operator: &str,
    ) -> Result<&[Rule]> {
        let mut condition = self.condition(rule_index, path)?.clone();
        condition.operator = operator.to_string();
        self.update_condition(rule_index, path, condition)
    }

    /// 用输入文本修改条件值（数字文本转为数字）
    pub fn set_condition_value(
        &mut self,
        rule_index: usize,
        path: &[usize],
        text: &str,
    ) -> Result<&[Rule]> {
        let mut condition = self.condition(rule_index, path)?.clone();
        condition.value = parse_rule_value(text);
        self.update_condition(rule_index, path, condition)
    }

    /// 修改事件类型，保留当前事件值
    pub fn set_event_type(&mut self, rule_index: usize, event_type: &str) -> Result<&[Rule]> {
        let value = self.rule(rule_index)?.event.value().clone();
        self.update_event(rule_index, event_type, value)
    }

    /// 用输入文本修改事件值，保留当前事件类型
    pub fn set_event_value(&mut self, rule_index: usize, text: &str) -> Result<&[Rule]> {
        let event_type = self.rule(rule_index)?.event.event_type.clone();
        self.update_event(rule_index, &event_type, parse_rule_value(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::SelectOption;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn options() -> RuleOptions {
        RuleOptions::new(
            vec![SelectOption::new("age", "Age"), SelectOption::new("score", "Score")],
            vec![
                SelectOption::new("greaterThan", ">"),
                SelectOption::new("equal", "=="),
            ],
            vec![SelectOption::new("adult", "Adult")],
        )
    }

    fn leaf(fact: &str, value: i64) -> ConditionNode {
        Condition::new(fact, "equal", value).into()
    }

    /// 规则 0: all[c1, any[c2, c3]]，规则 1: any[c4]
    fn sample_store() -> RuleStore {
        let rules = vec![
            Rule::new(
                ConditionGroup::all(vec![
                    leaf("c1", 1),
                    ConditionGroup::any(vec![leaf("c2", 2), leaf("c3", 3)]).into(),
                ]),
                Event::new("first", "one"),
            ),
            Rule::new(ConditionGroup::any(vec![leaf("c4", 4)]), Event::new("second", 2)),
        ];
        RuleStore::from_rules(options(), rules)
    }

    fn recorder(store: &mut RuleStore) -> Arc<Mutex<Vec<String>>> {
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let sink = snapshots.clone();
        store.subscribe(move |snapshot| sink.lock().push(snapshot.to_string()));
        snapshots
    }

    // ==================== 初始化 ====================

    #[test]
    fn test_initialize_empty() {
        assert!(initialize(None).is_empty());
        assert!(initialize(Some("")).is_empty());
    }

    #[test]
    fn test_initialize_invalid_json_fails_soft() {
        assert!(initialize(Some("not json")).is_empty());
        assert!(try_initialize(Some("not json")).is_err());
    }

    #[test]
    fn test_initialize_single_object_is_wrapped() {
        let json = r#"{"conditions":{"all":[]},"event":{"type":"x","params":{"value":""}}}"#;
        let rules = initialize(Some(json));

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].event.event_type, "x");
    }

    #[test]
    fn test_initialize_round_trip() {
        let json = r#"[{"conditions":{"all":[{"fact":"temperature","operator":"lessThan","value":20}]},"event":{"type":"set_thermostat","params":{"value":22}}}]"#;
        let rules = initialize(Some(json));

        assert_eq!(serialize(&rules).unwrap(), json);
    }

    // ==================== 路径解析 ====================

    #[test]
    fn test_resolve_empty_path_returns_root() {
        let store = sample_store();
        let root = &store.rules()[0].conditions;
        assert!(std::ptr::eq(resolve_group(&[], root).unwrap(), root));
    }

    #[test]
    fn test_resolve_nested_group() {
        let store = sample_store();
        let group = resolve_group(&[1], &store.rules()[0].conditions).unwrap();

        assert_eq!(group.operator, GroupOperator::Any);
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn test_resolve_out_of_bounds() {
        let store = sample_store();
        let err = resolve_group(&[5], &store.rules()[0].conditions).unwrap_err();
        assert!(matches!(err, RuleError::InvalidPath { depth: 0, index: 5, .. }));
    }

    #[test]
    fn test_resolve_through_leaf() {
        let store = sample_store();
        let err = resolve_group(&[0, 1], &store.rules()[0].conditions).unwrap_err();
        assert!(matches!(err, RuleError::NotAGroup { path } if path == vec![0]));
    }

    // ==================== 变更操作 ====================

    #[test]
    fn test_add_rule_on_empty_store() {
        let mut store = RuleStore::new(options(), None);
        let snapshots = recorder(&mut store);

        store.add_rule().unwrap();

        let rule = &store.rules()[0];
        assert_eq!(rule.conditions.operator, GroupOperator::All);
        assert_eq!(rule.conditions.len(), 1);
        assert_eq!(rule.event.event_type, "adult");

        let snapshots = snapshots.lock();
        assert_eq!(snapshots.len(), 1);
        let parsed: Value = serde_json::from_str(&snapshots[0]).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_delete_rule_shifts_indices() {
        let mut store = sample_store();
        store.delete_rule(0).unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.rules()[0].event.event_type, "second");
    }

    #[test]
    fn test_delete_rule_out_of_range() {
        let mut store = sample_store();
        assert!(matches!(store.delete_rule(9), Err(RuleError::RuleNotFound(9))));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_add_condition_to_nested_group() {
        let mut store = sample_store();
        store.add_condition(0, &[1]).unwrap();

        let group = resolve_group(&[1], &store.rules()[0].conditions).unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(group.children[2].as_leaf().unwrap().fact, "age");
    }

    #[test]
    fn test_delete_only_condition_leaves_empty_group() {
        let mut store = sample_store();
        store.delete_condition(1, &[0]).unwrap();

        let root = &store.rules()[1].conditions;
        assert!(root.is_empty());
        assert_eq!(root.operator, GroupOperator::Any);
        assert!(resolve_group(&[], root).is_ok());
        assert_eq!(
            serde_json::to_value(root).unwrap(),
            json!({"any": []})
        );
    }

    #[test]
    fn test_delete_condition_requires_path() {
        let mut store = sample_store();
        assert!(matches!(
            store.delete_condition(0, &[]),
            Err(RuleError::EmptyPath)
        ));
    }

    #[test]
    fn test_delete_condition_rejects_group() {
        let mut store = sample_store();
        assert!(matches!(
            store.delete_condition(0, &[1]),
            Err(RuleError::NodeKindMismatch { .. })
        ));
    }

    #[test]
    fn test_update_condition() {
        let mut store = sample_store();
        store
            .update_condition(0, &[1, 0], Condition::new("score", "greaterThan", 90))
            .unwrap();

        let group = resolve_group(&[1], &store.rules()[0].conditions).unwrap();
        assert_eq!(
            group.children[0],
            ConditionNode::from(Condition::new("score", "greaterThan", 90))
        );
        assert_eq!(group.children[1], leaf("c3", 3));
    }

    #[test]
    fn test_add_and_delete_group() {
        let mut store = sample_store();
        store.add_group(0, &[1]).unwrap();

        let nested = resolve_group(&[1, 2], &store.rules()[0].conditions).unwrap();
        assert_eq!(nested.operator, GroupOperator::All);
        assert_eq!(nested.len(), 1);

        store.delete_group(0, &[1, 2]).unwrap();
        assert_eq!(resolve_group(&[1], &store.rules()[0].conditions).unwrap().len(), 2);
    }

    #[test]
    fn test_delete_group_rejects_leaf() {
        let mut store = sample_store();
        assert!(store.delete_group(0, &[0]).is_err());
    }

    #[test]
    fn test_update_top_level_operator() {
        let mut store = sample_store();
        let before = store.rules()[0].conditions.children.clone();
        let other = store.rules()[1].clone();

        store.update_group_operator(0, &[], GroupOperator::Any).unwrap();

        let root = &store.rules()[0].conditions;
        assert_eq!(root.operator, GroupOperator::Any);
        assert_eq!(root.children, before);
        assert_eq!(store.rules()[1], other);
    }

    #[test]
    fn test_update_nested_operator() {
        let mut store = sample_store();
        store.update_group_operator(0, &[1], GroupOperator::All).unwrap();

        let group = resolve_group(&[1], &store.rules()[0].conditions).unwrap();
        assert_eq!(group.operator, GroupOperator::All);
        assert_eq!(group.children, vec![leaf("c2", 2), leaf("c3", 3)]);
    }

    #[test]
    fn test_update_operator_on_leaf_fails() {
        let mut store = sample_store();
        assert!(matches!(
            store.update_group_operator(0, &[0], GroupOperator::Any),
            Err(RuleError::NotAGroup { .. })
        ));
    }

    #[test]
    fn test_update_event_replaces_params() {
        let json = r#"[{"conditions":{"all":[]},"event":{"type":"a","params":{"value":1,"extra":true}}}]"#;
        let mut store = RuleStore::new(options(), Some(json));

        store.update_event(0, "b", json!("new")).unwrap();

        let event = &store.rules()[0].event;
        assert_eq!(event.event_type, "b");
        assert_eq!(event.value(), &json!("new"));
        assert!(event.params.extra.is_empty());
    }

    #[test]
    fn test_failed_mutation_keeps_state_and_skips_listeners() {
        let mut store = sample_store();
        let snapshots = recorder(&mut store);
        let before = store.serialize().unwrap();

        assert!(store.add_condition(0, &[0]).is_err());
        assert!(store.add_group(7, &[]).is_err());

        assert_eq!(store.serialize().unwrap(), before);
        assert!(snapshots.lock().is_empty());
    }

    #[test]
    fn test_every_mutation_notifies() {
        let mut store = sample_store();
        let snapshots = recorder(&mut store);

        store.add_condition(0, &[]).unwrap();
        store.set_condition_value(0, &[2], "18").unwrap();

        let snapshots = snapshots.lock();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[1], store.serialize().unwrap());
    }

    // ==================== 表单编辑操作 ====================

    #[test]
    fn test_set_condition_fields() {
        let mut store = sample_store();
        store.set_condition_fact(0, &[0], "score").unwrap();
        store.set_condition_operator(0, &[0], "greaterThan").unwrap();
        store.set_condition_value(0, &[0], "18").unwrap();

        let cond = store.condition(0, &[0]).unwrap();
        assert_eq!(cond, &Condition::new("score", "greaterThan", 18));

        store.set_condition_value(0, &[0], "18.").unwrap();
        assert_eq!(store.condition(0, &[0]).unwrap().value, json!("18."));
    }

    #[test]
    fn test_set_event_type_and_value() {
        let mut store = sample_store();
        store.set_event_type(0, "adult").unwrap();
        assert_eq!(store.rules()[0].event, Event::new("adult", "one"));

        store.set_event_value(0, "42").unwrap();
        assert_eq!(store.rules()[0].event, Event::new("adult", 42));
    }

    #[test]
    fn test_walk_paths_resolve_back() {
        let mut store = sample_store();
        store.add_group(0, &[1]).unwrap();
        let rule = &store.rules()[0];

        for entry in rule.walk() {
            if let ConditionNode::Group(group) = entry.node {
                let resolved = resolve_group(&entry.path, &rule.conditions).unwrap();
                assert!(std::ptr::eq(resolved, group));
            } else {
                assert!(store.condition(0, &entry.path).is_ok());
            }
        }
    }
}
