//! 流水线事件载荷：统一承载字节缓冲与业务对象。

use core::any::Any;
use core::fmt;

use flint_buffer::ByteBuf;

/// `PipelineMessage` 统一承载网络层字节与业务层对象。
///
/// # 设计背景（Why）
/// - 流水线需要在编解码、协议适配与业务层之间传递异构数据；
///   以枚举承载两类载荷，既保留缓冲的零拷贝语义，又允许业务对象
///   通过 `Any` 在运行时下转型。
///
/// # 契约说明（What）
/// - `Buffer` 变体承载 [`ByteBuf`]，随消息移交一份引用计数，
///   接收方负责 release 或继续传递；
/// - `User` 变体承载任意 `Send + Sync` 对象，消费前需显式类型判定。
///
/// # 风险提示（Trade-offs）
/// - `Debug` 输出刻意隐藏内部字节，避免日志泄漏负载内容。
pub enum PipelineMessage {
    /// 字节缓冲载荷。
    Buffer(ByteBuf),
    /// 业务对象载荷。
    User(Box<dyn Any + Send + Sync>),
}

impl PipelineMessage {
    /// 尝试取出缓冲载荷；业务对象原样退回。
    pub fn into_buffer(self) -> Result<ByteBuf, PipelineMessage> {
        match self {
            PipelineMessage::Buffer(buf) => Ok(buf),
            other => Err(other),
        }
    }
}

impl fmt::Debug for PipelineMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineMessage::Buffer(buf) => f
                .debug_tuple("Buffer")
                .field(&buf.readable_bytes())
                .finish(),
            PipelineMessage::User(_) => f.debug_tuple("User").field(&"<erased-user>").finish(),
        }
    }
}
