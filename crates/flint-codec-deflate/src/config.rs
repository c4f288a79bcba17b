//! permessage-deflate 协商参数。

use flint_core::{CoreError, Result, codes};

/// `DeflateConfig` 承载一条连接上协商定格的压缩参数。
///
/// # 契约说明（What）
/// - `compression_level ∈ [0, 9]`：0 为仅封块不压缩，9 为最高压缩比；
/// - `window_bits ∈ [9, 15]`：握手层协商的滑动窗口指数。内嵌 DEFLATE
///   后端固定以 32 KiB（15 位）窗口运行，参数仅作记录与校验；
///   编码输出对任何协商窗口的接收方都合法，解码侧接受任意窗口的输入；
/// - `no_context == true` 时滑动窗口在每条消息结束后重置，
///   牺牲压缩比换取消息之间的独立性与更低的常驻内存。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeflateConfig {
    compression_level: u32,
    window_bits: u8,
    no_context: bool,
}

impl DeflateConfig {
    /// 构造并校验参数组合。
    pub fn new(compression_level: u32, window_bits: u8, no_context: bool) -> Result<Self> {
        if compression_level > 9 {
            return Err(CoreError::new(
                codes::CODEC_PROTOCOL_VIOLATION,
                format!("compression level {compression_level} outside [0, 9]"),
            ));
        }
        if !(9..=15).contains(&window_bits) {
            return Err(CoreError::new(
                codes::CODEC_PROTOCOL_VIOLATION,
                format!("window bits {window_bits} outside [9, 15]"),
            ));
        }
        Ok(Self {
            compression_level,
            window_bits,
            no_context,
        })
    }

    /// 压缩级别。
    pub fn compression_level(&self) -> u32 {
        self.compression_level
    }

    /// 协商的窗口指数。
    pub fn window_bits(&self) -> u8 {
        self.window_bits
    }

    /// 是否逐消息重置滑动窗口。
    pub fn no_context(&self) -> bool {
        self.no_context
    }
}

impl Default for DeflateConfig {
    /// 默认组合：级别 6、15 位窗口、保留跨消息上下文。
    fn default() -> Self {
        Self {
            compression_level: 6,
            window_bits: 15,
            no_context: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_parameters() {
        let err = DeflateConfig::new(10, 15, false).expect_err("级别越界");
        assert_eq!(err.code(), codes::CODEC_PROTOCOL_VIOLATION);
        let err = DeflateConfig::new(6, 8, false).expect_err("窗口越界");
        assert_eq!(err.code(), codes::CODEC_PROTOCOL_VIOLATION);
        assert!(DeflateConfig::new(0, 9, true).is_ok());
    }
}
