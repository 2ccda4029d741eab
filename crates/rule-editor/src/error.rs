//! 规则编辑器错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("规则未找到: index={0}")]
    RuleNotFound(usize),

    /// 路径越界，说明路径不是从当前规则树推导出来的
    #[error("无效的路径 {path:?}: 第 {depth} 层索引 {index} 越界")]
    InvalidPath {
        path: Vec<usize>,
        depth: usize,
        index: usize,
    },

    #[error("路径 {path:?} 指向的是条件而不是条件组")]
    NotAGroup { path: Vec<usize> },

    #[error("该操作需要非空路径")]
    EmptyPath,

    #[error("路径 {path:?} 处的节点类型不匹配: 期望 {expected}")]
    NodeKindMismatch {
        path: Vec<usize>,
        expected: &'static str,
    },

    #[error("无效的组操作符: {0}")]
    InvalidGroupOperator(String),

    // 以下错误消息与 json-rules-engine 保持一致，测试器会原样展示
    #[error("Unknown operator: {0}")]
    UnknownOperator(String),

    #[error("Undefined fact: {0}")]
    UndefinedFact(String),

    #[error("规则执行失败: {0}")]
    ExecutionError(String),

    #[error("{0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
