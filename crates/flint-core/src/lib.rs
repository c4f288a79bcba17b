#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `flint-core` 是 flint 工具箱各组件共享的最小契约层。
//!
//! # 模块定位（Why）
//! - 缓冲层、流水线层与编解码扩展都需要跨 crate 传递稳定的错误码，
//!   以便日志与指标系统进行机器可读的根因识别；
//! - 错误必须能运行在 `no_std + alloc` 轨道上，避免把下游扩展绑死在 `std`。
//!
//! # 设计概要（How）
//! - [`CoreError`] 以 `&'static str` 稳定错误码 + 人类可读消息构成，
//!   支持 Builder 风格附加底层原因形成错误链；
//! - [`error::codes`] 枚举全部框架内置错误码，按 `domain.reason` 命名；
//! - [`Result`] 默认以 [`CoreError`] 作为错误类型，统一各 crate 的函数签名。
//!
//! # 契约说明（What）
//! - 本 crate 不包含任何运行时状态，也不依赖第三方库；
//! - 下游 crate 不得自造错误码字符串，应复用 [`error::codes`] 中的常量。

extern crate alloc;

pub mod error;

pub use error::{CoreError, ErrorCause, Result, codes};
