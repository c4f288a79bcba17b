//! Handler 与上下文契约：编解码器与传输栈之间的唯一接缝。

use flint_buffer::BufferAllocator;
use flint_core::{CoreError, Result};

use crate::future::WriteFuture;
use crate::message::PipelineMessage;

/// Handler 访问运行时能力与事件流的统一入口。
///
/// # 设计背景（Why）
/// - 编解码器不应感知传输栈的具体形态；通过对象安全的上下文接口注入
///   缓冲分配、事件传播与异常上报能力，实现与装配解耦；
/// - 测试环境以探针实现替换上下文即可观察编解码器的全部外部行为。
///
/// # 契约说明（What）
/// - `allocator`：租借缓冲的入口，返回值遵循"租借即还"原则；
/// - `fire_channel_read`：把解码产物沿入站方向继续传播；
/// - `write`：把编码产物交给下游写出，返回的 [`WriteFuture`]
///   在本层构造时即已完成，真实网络完成事件由传输层接驳；
/// - `fire_exception_caught`：异常沿流水线上报，通常触发通道关闭。
///
/// # 前置/后置条件（Contract）
/// - **前置**：调用发生在事件回调内部；跨线程持有上下文引用由实现负责
///   线程安全；
/// - **后置**：通过 `write`/`fire_channel_read` 移交的消息，其中的缓冲
///   引用计数一并移交，接收侧负责释放。
pub trait HandlerContext: Send + Sync {
    /// 缓冲分配入口。
    fn allocator(&self) -> &dyn BufferAllocator;

    /// 向入站方向传播一条消息。
    fn fire_channel_read(&self, msg: PipelineMessage);

    /// 向出站方向写出一条消息。
    fn write(&self, msg: PipelineMessage) -> WriteFuture;

    /// 上报异常。
    fn fire_exception_caught(&self, error: CoreError);
}

/// 入站事件处理合约，面向从传输层到业务层的正向数据流。
///
/// # 设计背景（Why）
/// - 入站消息的转换往往是一对多（一帧解出多个业务对象），
///   以输出列表承载产物，避免在契约层强加一对一假设；
/// - 同一通道的回调由传输层串行调度，Handler 以 `&mut self`
///   持有解码状态（如跨帧的滑动窗口），无需内部加锁。
///
/// # 契约说明（What）
/// - `decode` 返回错误时，实现必须已经释放自己持有的在途缓冲，
///   调用方随后通过 [`HandlerContext::fire_exception_caught`] 上报；
/// - `handler_removed` 是强制的清理钩子：释放全部保留缓冲、
///   销毁流式编解码状态。
pub trait InboundHandler: Send + 'static {
    /// 入站输入类型。
    type Input: Send + 'static;
    /// 入站产物类型。
    type Output: Send + 'static;

    /// 处理一条入站消息，产物追加到 `out`。
    fn decode(
        &mut self,
        ctx: &dyn HandlerContext,
        input: Self::Input,
        out: &mut Vec<Self::Output>,
    ) -> Result<()>;

    /// Handler 从流水线移除时的清理钩子。
    fn handler_removed(&mut self, _ctx: &dyn HandlerContext) -> Result<()> {
        Ok(())
    }
}

/// 出站事件处理合约，负责从业务层到传输层的逆向数据流。
///
/// 契约与 [`InboundHandler`] 对偶：`encode` 的错误路径同样要求先释放
/// 在途缓冲；`handler_removed` 负责清理编码侧的流式状态。
pub trait OutboundHandler: Send + 'static {
    /// 出站输入类型。
    type Input: Send + 'static;
    /// 出站产物类型。
    type Output: Send + 'static;

    /// 处理一条出站消息，产物追加到 `out`。
    fn encode(
        &mut self,
        ctx: &dyn HandlerContext,
        input: Self::Input,
        out: &mut Vec<Self::Output>,
    ) -> Result<()>;

    /// Handler 从流水线移除时的清理钩子。
    fn handler_removed(&mut self, _ctx: &dyn HandlerContext) -> Result<()> {
        Ok(())
    }
}
