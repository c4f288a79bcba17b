#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `flint-buffer` 提供引用计数、两级池化的字节缓冲实现。
//!
//! # 模块定位（Why）
//! - 反应器流水线的热路径以缓冲分配与释放为主要开销，本 crate 用
//!   进程级数组池（按 2 的幂档位复用后备内存）与线程本地对象槽
//!   （复用缓冲节点壳）把两类分配都摊平；
//! - 编解码层需要切片、复制视图与组合缓冲来实现零拷贝组帧，
//!   这些视图的生命周期由显式引用计数驱动，最后一次 release
//!   确定性地把存储归还来源池。
//!
//! # 设计概要（How）
//! - [`RefCounter`] 是 retain/release 的原子原语，归零后任何操作
//!   确定性失败；
//! - [`ArrayPool`] 是进程级后备数组池；线程本地对象槽对使用方透明，
//!   由释放路径与 [`PooledBufferAllocator`] 协作驱动；
//! - [`ByteBuf`] 是唯一的公开缓冲句柄，数组、保留视图与组合存储
//!   以共享节点承载；
//! - [`text`] 模块提供 UTF-16 到 UTF-8 / ASCII 的直写快速路径。
//!
//! # 并发契约（What）
//! - 引用计数原子，缓冲可以跨线程移交；
//! - 读写游标不是线程安全的：同一时刻至多一个线程对缓冲执行变更；
//! - 数组池内部同步，任意线程均可租借与归还。

mod allocator;
mod array_pool;
mod byte_buf;
mod composite;
mod recycler;
mod refcount;
pub mod text;

pub use allocator::{BufferAllocator, PooledBufferAllocator};
pub use array_pool::{ArrayPool, PoolStats};
pub use byte_buf::{ByteBuf, ReadableSpan, WritableSpan};
pub use refcount::RefCounter;
