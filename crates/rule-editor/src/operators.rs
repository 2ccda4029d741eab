//! 条件操作符
//!
//! 内置操作符与 json-rules-engine 的默认操作符同名同义：
//! `equal` 为严格相等（不做跨类型转换）；数值比较要求事实值可解析为数字，
//! 否则直接判定为不满足；`contains` 系列要求事实值为数组。

use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 比较回调：(事实值, 期望值) -> 是否满足
pub type OperatorFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// 事实值校验回调，不通过时条件直接判定为不满足
pub type FactValidatorFn = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// 命名的条件操作符
#[derive(Clone)]
pub struct Operator {
    name: String,
    callback: OperatorFn,
    fact_validator: Option<FactValidatorFn>,
}

impl Operator {
    pub fn new<F>(name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&Value, &Value) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            callback: Arc::new(callback),
            fact_validator: None,
        }
    }

    pub fn with_fact_validator<F>(mut self, validator: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        self.fact_validator = Some(Arc::new(validator));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 评估条件
    pub fn evaluate(&self, fact_value: &Value, expected: &Value) -> bool {
        if let Some(validator) = &self.fact_validator {
            if !validator(fact_value) {
                return false;
            }
        }
        (self.callback)(fact_value, expected)
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator")
            .field("name", &self.name)
            .field("has_fact_validator", &self.fact_validator.is_some())
            .finish()
    }
}

/// 内置操作符列表
pub fn default_operators() -> Vec<Operator> {
    vec![
        Operator::new("equal", strict_eq),
        Operator::new("notEqual", |a, b| !strict_eq(a, b)),
        Operator::new("in", |a, b| in_list(a, b)),
        Operator::new("notIn", |a, b| !in_list(a, b)),
        Operator::new("contains", |a, b| in_list(b, a)).with_fact_validator(Value::is_array),
        Operator::new("doesNotContain", |a, b| !in_list(b, a)).with_fact_validator(Value::is_array),
        Operator::new("lessThan", |a, b| compare(a, b, |x, y| x < y)).with_fact_validator(is_numeric),
        Operator::new("lessThanInclusive", |a, b| compare(a, b, |x, y| x <= y))
            .with_fact_validator(is_numeric),
        Operator::new("greaterThan", |a, b| compare(a, b, |x, y| x > y))
            .with_fact_validator(is_numeric),
        Operator::new("greaterThanInclusive", |a, b| compare(a, b, |x, y| x >= y))
            .with_fact_validator(is_numeric),
    ]
}

/// 严格相等：数字按数值比较（18 == 18.0），其他类型要求类型与值都相同
pub fn strict_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// `item` 是否在 `list` 数组中
fn in_list(item: &Value, list: &Value) -> bool {
    list.as_array()
        .is_some_and(|items| items.iter().any(|candidate| strict_eq(item, candidate)))
}

/// 数值比较，任一侧无法转为数字时不满足
fn compare<F>(a: &Value, b: &Value, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

fn is_numeric(value: &Value) -> bool {
    as_f64(value).is_some()
}

/// 尝试将 Value 转换为 f64（数字字符串也可参与数值比较）
fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
        _ => None,
    }
}
