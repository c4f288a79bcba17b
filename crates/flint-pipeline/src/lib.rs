#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `flint-pipeline` 定义编解码器挂接流水线所需的最小契约面。
//!
//! # 模块定位（Why）
//! - 编解码器只关心四件事：租借缓冲、向上游传播解码结果、向下游写出
//!   编码结果、上报异常。把这四件事收敛为一个对象安全的上下文接口，
//!   编解码实现即可脱离具体传输栈独立演进与测试；
//! - Handler 的输入输出类型以关联类型表达，注册与装配期保持静态类型安全。
//!
//! # 并发契约（What）
//! - 同一通道上的入站与出站回调由传输层串行调度，Handler 可以安全持有
//!   单线程状态（`&mut self`），但对缓冲的 retain/release 必须成对，
//!   因为其它线程可能持有同一存储的引用；
//! - 不同通道的 Handler 在不同线程上并发运行。
//!
//! # 阻塞约束
//! - 任何回调不得阻塞 I/O；压缩等 CPU 密集工作内联执行，时延由调用方承担。

mod future;
mod handler;
mod message;

pub use future::{BoxFuture, LocalBoxFuture, WriteFuture};
pub use handler::{HandlerContext, InboundHandler, OutboundHandler};
pub use message::PipelineMessage;
