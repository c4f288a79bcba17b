#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `flint-codec-deflate` 实现 WebSocket permessage-deflate 扩展的帧级编解码。
//!
//! # 模块定位（Why）
//! - 压缩状态跨帧、跨分片甚至跨消息存续，必须由一对有状态 Handler 承载：
//!   编码侧驱动 DEFLATE 流并置 RSV1，解码侧补回逐帧尾部并还原明文；
//! - 编解码器只依赖 `flint-pipeline` 的上下文契约与 `flint-buffer` 的
//!   引用计数缓冲，不感知握手与传输细节。
//!
//! # 使用概览（How）
//! - 以 [`DeflateConfig`] 定格协商参数，构造 [`DeflateFrameEncoder`] /
//!   [`DeflateFrameDecoder`] 挂入流水线；
//! - 跳过策略通过 [`SkipFilter`] 注入，小帧或已压缩负载可绕过压缩；
//! - `no_context` 模式在每条消息边界重置滑动窗口，消息之间完全独立。
//!
//! # 线程契约（What）
//! - 同一通道的帧按序串行进入 Handler，编解码状态无需加锁；
//! - 帧内容缓冲的引用计数随帧移交，错误路径先释放在途缓冲再上报。

mod config;
mod decoder;
mod encoder;
mod filter;
mod frame;
mod zlib;

pub use config::DeflateConfig;
pub use decoder::DeflateFrameDecoder;
pub use encoder::DeflateFrameEncoder;
pub use filter::{AlwaysSkip, NeverSkip, SkipFilter};
pub use frame::{Opcode, WsFrame, rsv};
pub use zlib::{EMPTY_DEFLATE_BLOCK, FRAME_TAIL};
