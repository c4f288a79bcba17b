//! 帧级跳过策略：按帧决定是否绕过压缩。

use crate::frame::WsFrame;

/// `SkipFilter` 在消息起始帧上决定整条消息是否绕过压缩。
///
/// # 契约说明（What）
/// - 返回 `true` 的帧原样透传，RSV 不被触碰；
/// - 分片消息的判定只发生在起始帧：后续分片跟随消息的既定形态，
///   过滤器不再被询问。
///
/// # 典型用法
/// - 小帧跳过（压缩头开销超过收益）、已压缩媒体负载跳过。
pub trait SkipFilter: Send + Sync {
    /// 该帧是否必须绕过压缩。
    fn must_skip(&self, frame: &WsFrame) -> bool;
}

/// 永不跳过：所有数据帧参与压缩。
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverSkip;

impl SkipFilter for NeverSkip {
    fn must_skip(&self, _frame: &WsFrame) -> bool {
        false
    }
}

/// 永远跳过：压缩器退化为透传，用于协商降级或对照测试。
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysSkip;

impl SkipFilter for AlwaysSkip {
    fn must_skip(&self, _frame: &WsFrame) -> bool {
        true
    }
}
