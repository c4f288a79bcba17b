//! 统一错误域：稳定错误码、错误链与 `Result` 别名。

use alloc::{boxed::Box, string::String};
use core::{error::Error, fmt};

/// `CoreError` 表示 flint 各组件统一的错误域。
///
/// # 设计背景（Why）
/// - 缓冲与编解码子系统需要跨层传递稳定的错误码，以便日志、指标与告警系统
///   进行机器可读的根因识别；
/// - 错误必须运行在 `no_std` 环境下，因此基于 `core::error::Error` 而非
///   `std` 专属设施，并兼容可选的底层原因链。
///
/// # 逻辑解析（How）
/// - 结构体以 Builder 风格的方法累积上下文，例如 [`CoreError::with_cause`]；
/// - `code` 字段承载稳定错误码，`message` 面向人类调试；
///   `cause` 保存底层原因，支撑 `Error::source` 链式溯源。
///
/// # 契约说明（What）
/// - **前置条件**：调用方应保证错误码在 [`codes`] 模块中声明，
///   或遵守约定的 `domain.reason` 形式；
/// - **后置条件**：所有构造方法都会产生 `CoreError` 拥有的所有权，
///   确保可以跨线程移动与重试。
///
/// # 设计取舍与风险（Trade-offs）
/// - 采用 `String` 储存消息，牺牲少量拷贝成本换取在日志与跨组件通信上的灵活性；
/// - 错误码取 `&'static str` 而非枚举，允许扩展 crate 在不修改核心的情况下
///   注册新错误域，代价是无法在编译期穷举。
#[derive(Debug)]
pub struct CoreError {
    code: &'static str,
    message: String,
    cause: Option<ErrorCause>,
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以方便跨线程传递。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

/// 框架统一的 `Result` 别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;

impl CoreError {
    /// 使用稳定错误码与消息创建 `CoreError`。
    ///
    /// # 契约说明
    /// - **参数**：`code` 必须是全局唯一且稳定的字符串；`message` 为任意人类可读文本；
    /// - **前置条件**：`code` 应遵循 `domain.reason` 命名，避免泄漏敏感信息；
    /// - **后置条件**：返回的实例尚未附带任何底层原因。
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取人类可读的错误描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 附带一个底层原因，形成错误链。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 获取可选的底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for CoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 框架内置的错误码常量集合，确保可观测性系统具有稳定识别符。
pub mod codes {
    /// 对引用计数已归零的缓冲执行任何操作。
    pub const BUFFER_ILLEGAL_REFCOUNT: &str = "buffer.illegal_refcount";
    /// 读写游标或绝对索引越界。
    pub const BUFFER_INDEX_OUT_OF_RANGE: &str = "buffer.index_out_of_range";
    /// 扩容请求超过缓冲的最大容量上限。
    pub const BUFFER_CAPACITY_EXCEEDED: &str = "buffer.capacity_exceeded";
    /// 当前缓冲变体不支持该操作（例如对切片视图扩容）。
    pub const BUFFER_UNSUPPORTED: &str = "buffer.unsupported";
    /// 输入数据损坏：DEFLATE 流无法还原。
    pub const CODEC_INVALID_DATA: &str = "codec.invalid_data";
    /// 协议违例：帧类型、分片顺序或空帧位置不合法。
    pub const CODEC_PROTOCOL_VIOLATION: &str = "codec.protocol_violation";
}
