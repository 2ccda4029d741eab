//! 交互式编辑命令
//!
//! 以行命令驱动 [`RuleStore`] 与 [`RuleTester`]，代替图形界面的表单操作。
//! 路径写成以点分隔的下标（如 `1.0`），`.` 表示规则的顶层条件组；
//! 规则下标从 0 开始。

use crate::error::RuleError;
use crate::models::{ConditionNode, GroupOperator, Rule};
use crate::store::RuleStore;
use crate::tester::RuleTester;
use crate::value::display_rule_value;
use std::fmt::Write as _;
use std::io::BufRead;
use std::str::FromStr;
use std::thread;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::warn;

pub const HELP: &str = "\
Commands:
  rules                                  show all rules with node paths
  add-rule                               append a default rule
  delete-rule <rule>                     delete a rule
  add-condition <rule> <path>            append a default condition to a group
  delete-condition <rule> <path>         delete a condition
  fact <rule> <path> <fact>              change a condition's fact
  operator <rule> <path> <operator>      change a condition's operator
  value <rule> <path> <text>             change a condition's value
  add-group <rule> <path>                append a nested group to a group
  delete-group <rule> <path>             delete a nested group
  group-op <rule> <path> <all|any>       change a group's operator
  event-type <rule> <type>               change a rule's event type
  event-value <rule> <text>              change a rule's event value
  facts [json]                           show or replace the test facts
  test                                   evaluate the rules against the test facts
  help                                   show this help
  quit                                   exit
Paths are dotted indices such as 1.0; use . for a rule's top-level group.";

/// 命令错误
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command: {0} (type `help` for a list)")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("invalid index: {0}")]
    InvalidIndex(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("the rule tester is disabled")]
    TesterDisabled,

    #[error(transparent)]
    Rule(#[from] RuleError),
}

/// 解析后的命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Rules,
    AddRule,
    DeleteRule(usize),
    AddCondition(usize, Vec<usize>),
    DeleteCondition(usize, Vec<usize>),
    Fact(usize, Vec<usize>, String),
    Operator(usize, Vec<usize>, String),
    Value(usize, Vec<usize>, String),
    AddGroup(usize, Vec<usize>),
    DeleteGroup(usize, Vec<usize>),
    GroupOperator(usize, Vec<usize>, GroupOperator),
    EventType(usize, String),
    EventValue(usize, String),
    Facts(Option<String>),
    Test,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (name, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let mut args = Args::new(rest);

        let command = match name {
            "rules" | "ls" => Self::Rules,
            "add-rule" => Self::AddRule,
            "delete-rule" => Self::DeleteRule(args.index("delete-rule <rule>")?),
            "add-condition" => {
                let usage = "add-condition <rule> <path>";
                Self::AddCondition(args.index(usage)?, args.path(usage)?)
            }
            "delete-condition" => {
                let usage = "delete-condition <rule> <path>";
                Self::DeleteCondition(args.index(usage)?, args.path(usage)?)
            }
            "fact" => {
                let usage = "fact <rule> <path> <fact>";
                Self::Fact(args.index(usage)?, args.path(usage)?, args.word(usage)?)
            }
            "operator" => {
                let usage = "operator <rule> <path> <operator>";
                Self::Operator(args.index(usage)?, args.path(usage)?, args.word(usage)?)
            }
            "value" => {
                let usage = "value <rule> <path> <text>";
                Self::Value(args.index(usage)?, args.path(usage)?, args.rest())
            }
            "add-group" => {
                let usage = "add-group <rule> <path>";
                Self::AddGroup(args.index(usage)?, args.path(usage)?)
            }
            "delete-group" => {
                let usage = "delete-group <rule> <path>";
                Self::DeleteGroup(args.index(usage)?, args.path(usage)?)
            }
            "group-op" => {
                let usage = "group-op <rule> <path> <all|any>";
                let index = args.index(usage)?;
                let path = args.path(usage)?;
                let operator = args.word(usage)?.parse::<GroupOperator>()?;
                Self::GroupOperator(index, path, operator)
            }
            "event-type" => {
                let usage = "event-type <rule> <type>";
                Self::EventType(args.index(usage)?, args.word(usage)?)
            }
            "event-value" => {
                let usage = "event-value <rule> <text>";
                Self::EventValue(args.index(usage)?, args.rest())
            }
            "facts" => {
                let text = args.rest();
                Self::Facts((!text.is_empty()).then_some(text))
            }
            "test" | "run" => Self::Test,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(CommandError::UnknownCommand(other.to_string())),
        };

        Ok(command)
    }
}

/// 命令参数游标
struct Args<'a> {
    rest: &'a str,
}

impl<'a> Args<'a> {
    fn new(rest: &'a str) -> Self {
        Self { rest: rest.trim() }
    }

    fn word(&mut self, usage: &'static str) -> Result<String, CommandError> {
        if self.rest.is_empty() {
            return Err(CommandError::Usage(usage));
        }
        let (word, rest) = self
            .rest
            .split_once(char::is_whitespace)
            .unwrap_or((self.rest, ""));
        self.rest = rest.trim_start();
        Ok(word.to_string())
    }

    fn index(&mut self, usage: &'static str) -> Result<usize, CommandError> {
        let word = self.word(usage)?;
        word.parse().map_err(|_| CommandError::InvalidIndex(word))
    }

    fn path(&mut self, usage: &'static str) -> Result<Vec<usize>, CommandError> {
        let word = self.word(usage)?;
        parse_path(&word).ok_or(CommandError::InvalidPath(word))
    }

    /// 剩余的整段文本（值可以包含空格）
    fn rest(&mut self) -> String {
        std::mem::take(&mut self.rest).to_string()
    }
}

/// 解析点分路径，`.` 为空路径
pub fn parse_path(text: &str) -> Option<Vec<usize>> {
    if text == "." {
        return Some(Vec::new());
    }
    text.split('.').map(|part| part.parse().ok()).collect()
}

/// 格式化路径，空路径为 `.`
pub fn format_path(path: &[usize]) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// 命令执行结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// 需要展示的文本
    Text(String),
    /// 变更成功，快照已由订阅者输出
    Updated,
    Quit,
}

/// 交互式编辑会话
pub struct Shell {
    store: RuleStore,
    tester: Option<RuleTester>,
}

impl Shell {
    /// `tester` 为 None 时禁用测试命令
    pub fn new(store: RuleStore, tester: Option<RuleTester>) -> Self {
        Self { store, tester }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    /// 解析并执行一行输入
    pub async fn handle_line(&mut self, line: &str) -> Result<Reply, CommandError> {
        if line.trim().is_empty() {
            return Ok(Reply::Text(String::new()));
        }
        let command: Command = line.parse()?;
        self.execute(command).await
    }

    pub async fn execute(&mut self, command: Command) -> Result<Reply, CommandError> {
        let store = &mut self.store;
        match command {
            Command::Rules => return Ok(Reply::Text(render_rules(store.rules()))),
            Command::AddRule => {
                store.add_rule()?;
            }
            Command::DeleteRule(index) => {
                store.delete_rule(index)?;
            }
            Command::AddCondition(index, path) => {
                store.add_condition(index, &path)?;
            }
            Command::DeleteCondition(index, path) => {
                store.delete_condition(index, &path)?;
            }
            Command::Fact(index, path, fact) => {
                store.set_condition_fact(index, &path, &fact)?;
            }
            Command::Operator(index, path, operator) => {
                store.set_condition_operator(index, &path, &operator)?;
            }
            Command::Value(index, path, text) => {
                store.set_condition_value(index, &path, &text)?;
            }
            Command::AddGroup(index, path) => {
                store.add_group(index, &path)?;
            }
            Command::DeleteGroup(index, path) => {
                store.delete_group(index, &path)?;
            }
            Command::GroupOperator(index, path, operator) => {
                store.update_group_operator(index, &path, operator)?;
            }
            Command::EventType(index, event_type) => {
                store.set_event_type(index, &event_type)?;
            }
            Command::EventValue(index, text) => {
                store.set_event_value(index, &text)?;
            }
            Command::Facts(text) => return self.facts(text),
            Command::Test => return self.test().await,
            Command::Help => return Ok(Reply::Text(HELP.to_string())),
            Command::Quit => return Ok(Reply::Quit),
        }
        Ok(Reply::Updated)
    }

    fn facts(&mut self, text: Option<String>) -> Result<Reply, CommandError> {
        let tester = self.tester.as_mut().ok_or(CommandError::TesterDisabled)?;
        match text {
            None => Ok(Reply::Text(tester.facts_text())),
            Some(text) if tester.set_facts_text(&text) => Ok(Reply::Text(tester.facts_text())),
            // 解析错误写在测试器的结果槽里
            Some(_) => Ok(Reply::Text(tester.result().unwrap_or_default())),
        }
    }

    async fn test(&self) -> Result<Reply, CommandError> {
        let tester = self.tester.as_ref().ok_or(CommandError::TesterDisabled)?;
        let outcome = tester.execute(self.store.rules()).await;
        Ok(Reply::Text(outcome.message().to_string()))
    }
}

/// 在独立线程上逐行读取输入，经通道交给异步循环
///
/// 读取线程不占用运行时的阻塞线程池，退出时无需等待未完成的读取。
/// 输入结束、读取出错或接收端关闭时通道关闭。
pub fn spawn_line_reader<R>(reader: R) -> mpsc::Receiver<String>
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in reader.lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!(error = %e, "Failed to read input line");
                    break;
                }
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// 以树形展示规则，每个节点前标注其路径
pub fn render_rules(rules: &[Rule]) -> String {
    if rules.is_empty() {
        return "no rules (use `add-rule`)".to_string();
    }

    let mut out = String::new();
    for (index, rule) in rules.iter().enumerate() {
        let _ = writeln!(
            out,
            "Rule {} -> event {} = {}",
            index,
            rule.event.event_type,
            display_rule_value(rule.event.value())
        );
        let _ = writeln!(out, "  [.] {}", rule.conditions.operator);
        for entry in rule.walk() {
            let indent = "  ".repeat(entry.depth() + 1);
            let path = format_path(&entry.path);
            match entry.node {
                ConditionNode::Leaf(cond) => {
                    let _ = writeln!(
                        out,
                        "{}[{}] {} {} {}",
                        indent,
                        path,
                        cond.fact,
                        cond.operator,
                        display_rule_value(&cond.value)
                    );
                }
                ConditionNode::Group(group) => {
                    let _ = writeln!(out, "{}[{}] {}", indent, path, group.operator);
                }
            }
        }
    }
    out.trim_end().to_string()
}
