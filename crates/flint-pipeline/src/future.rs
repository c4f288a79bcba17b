//! 写路径的完成通知：框架核心全程同步，Future 在构造时即已完成。

use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll};

use flint_core::{CoreError, Result};

/// `BoxFuture` 是跨线程安全的通用 Future 包装。
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `LocalBoxFuture` 封装 `!Send` Future，服务单线程执行器。
pub type LocalBoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + 'a>>;

/// `WriteFuture` 表示一次出站写的完成状态。
///
/// # 设计背景（Why）
/// - 编解码层的写出在返回前已经完成（核心没有挂起点），但调用方
///   往往按异步接口编程；提供一个构造即完成的 Future，
///   传输层再决定是否把真实的网络完成事件接驳上来。
///
/// # 契约说明（What）
/// - 第一次 `poll` 返回 `Ready` 与结果；
/// - 结果被取走后再次 `poll` 返回 `Pending`，不会 panic。
pub struct WriteFuture {
    outcome: Option<Result<()>>,
}

impl WriteFuture {
    /// 构造一个立即成功的写完成。
    pub fn completed() -> Self {
        Self {
            outcome: Some(Ok(())),
        }
    }

    /// 构造一个立即失败的写完成。
    pub fn failed(error: CoreError) -> Self {
        Self {
            outcome: Some(Err(error)),
        }
    }

    /// 同步取出结果，供不运行执行器的调用方使用。
    pub fn into_result(mut self) -> Result<()> {
        self.outcome.take().unwrap_or(Ok(()))
    }
}

impl Future for WriteFuture {
    type Output = Result<()>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.outcome.take() {
            Some(result) => Poll::Ready(result),
            None => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_future_resolves_synchronously() {
        let fut = WriteFuture::completed();
        assert!(fut.into_result().is_ok());
    }

    #[test]
    fn failed_future_carries_error() {
        let fut = WriteFuture::failed(CoreError::new(
            flint_core::codes::CODEC_PROTOCOL_VIOLATION,
            "write rejected",
        ));
        let err = fut.into_result().expect_err("应返回错误");
        assert_eq!(err.code(), flint_core::codes::CODEC_PROTOCOL_VIOLATION);
    }
}
