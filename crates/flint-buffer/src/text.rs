//! 文本快速路径：UTF-16 到 UTF-8 / ASCII 的直写编码与字符串解码。

use flint_core::{CoreError, Result, codes};

use crate::byte_buf::ByteBuf;

/// 替换字节：所有不可编码码元统一降级为 `'?'`。
const REPLACEMENT: u8 = 0x3F;

/// 编码结果状态。
///
/// - `Done`：输入全部消费；
/// - `DestinationTooSmall`：目标窗口不足，计数停在最后一个完整编码的码元，
///   调用方扩容后对剩余部分重新调用；
/// - `InvalidData`：保留给无替换策略的严格模式，本模块的编码器以替换字节
///   降级，不会返回该状态；
/// - `NeedMoreData`：非终结输入以高代理项结尾，等待后续码元再判定配对。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextCodecStatus {
    /// 输入全部消费。
    Done,
    /// 目标窗口耗尽，请扩容后续传。
    DestinationTooSmall,
    /// 输入无法在当前策略下编码。
    InvalidData,
    /// 输入在码元边界被截断，需要更多数据。
    NeedMoreData,
}

/// 一次编码调用的消费/产出计数。
#[derive(Debug, Clone, Copy)]
pub struct EncodeResult {
    /// 结束状态。
    pub status: TextCodecStatus,
    /// 已消费的 UTF-16 码元数。
    pub units_read: usize,
    /// 已写出的字节数。
    pub bytes_written: usize,
}

impl EncodeResult {
    fn new(status: TextCodecStatus, units_read: usize, bytes_written: usize) -> Self {
        Self {
            status,
            units_read,
            bytes_written,
        }
    }
}

/// 把 UTF-16 码元序列编码为 UTF-8 写入 `dst`。
///
/// # 编码规则（What）
/// - `< 0x80` 一字节；`< 0x800` 两字节；非代理 BMP 三字节；
/// - 高低代理对按 `0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00)` 合成
///   码点，输出四字节；
/// - 高代理后跟非低代理、孤立低代理、终结输入末尾的截断代理对：
///   各写出一个替换字节 `0x3F`，随后从下一个位置继续；
/// - `is_final == false` 时，末尾的孤立高代理不消费，返回 `NeedMoreData`，
///   让流式调用方拼齐后续码元再续传。
///
/// # 契约说明
/// - 返回 `DestinationTooSmall` 时，`units_read`/`bytes_written` 指向最后
///   一个完整编码的码元边界，`dst` 中已写入的前缀始终是合法 UTF-8。
pub fn encode_utf16_to_utf8(units: &[u16], dst: &mut [u8], is_final: bool) -> EncodeResult {
    let mut read = 0;
    let mut written = 0;
    while read < units.len() {
        let unit = units[read];
        if unit < 0x80 {
            if written + 1 > dst.len() {
                return EncodeResult::new(TextCodecStatus::DestinationTooSmall, read, written);
            }
            dst[written] = unit as u8;
            written += 1;
            read += 1;
        } else if unit < 0x800 {
            if written + 2 > dst.len() {
                return EncodeResult::new(TextCodecStatus::DestinationTooSmall, read, written);
            }
            dst[written] = 0xC0 | (unit >> 6) as u8;
            dst[written + 1] = 0x80 | (unit & 0x3F) as u8;
            written += 2;
            read += 1;
        } else if (0xD800..0xDC00).contains(&unit) {
            // 高代理项：向前看一个码元决定是配对还是降级。
            if read + 1 == units.len() {
                if !is_final {
                    return EncodeResult::new(TextCodecStatus::NeedMoreData, read, written);
                }
                if written + 1 > dst.len() {
                    return EncodeResult::new(TextCodecStatus::DestinationTooSmall, read, written);
                }
                dst[written] = REPLACEMENT;
                written += 1;
                read += 1;
            } else {
                let follower = units[read + 1];
                if (0xDC00..0xE000).contains(&follower) {
                    if written + 4 > dst.len() {
                        return EncodeResult::new(
                            TextCodecStatus::DestinationTooSmall,
                            read,
                            written,
                        );
                    }
                    let code_point = 0x1_0000
                        + (((unit as u32) - 0xD800) << 10)
                        + ((follower as u32) - 0xDC00);
                    dst[written] = 0xF0 | (code_point >> 18) as u8;
                    dst[written + 1] = 0x80 | ((code_point >> 12) & 0x3F) as u8;
                    dst[written + 2] = 0x80 | ((code_point >> 6) & 0x3F) as u8;
                    dst[written + 3] = 0x80 | (code_point & 0x3F) as u8;
                    written += 4;
                    read += 2;
                } else {
                    if written + 1 > dst.len() {
                        return EncodeResult::new(
                            TextCodecStatus::DestinationTooSmall,
                            read,
                            written,
                        );
                    }
                    dst[written] = REPLACEMENT;
                    written += 1;
                    read += 1;
                }
            }
        } else if (0xDC00..0xE000).contains(&unit) {
            // 孤立低代理项。
            if written + 1 > dst.len() {
                return EncodeResult::new(TextCodecStatus::DestinationTooSmall, read, written);
            }
            dst[written] = REPLACEMENT;
            written += 1;
            read += 1;
        } else {
            if written + 3 > dst.len() {
                return EncodeResult::new(TextCodecStatus::DestinationTooSmall, read, written);
            }
            dst[written] = 0xE0 | (unit >> 12) as u8;
            dst[written + 1] = 0x80 | ((unit >> 6) & 0x3F) as u8;
            dst[written + 2] = 0x80 | (unit & 0x3F) as u8;
            written += 3;
            read += 1;
        }
    }
    EncodeResult::new(TextCodecStatus::Done, read, written)
}

/// 把 UTF-16 码元序列降级为单字节 ASCII 写入 `dst`。
///
/// ASCII 范围内的码元取低 7 位直写；其余（含代理项）一律替换为 `0x3F`。
pub fn encode_utf16_to_ascii(units: &[u16], dst: &mut [u8]) -> EncodeResult {
    let mut read = 0;
    let mut written = 0;
    while read < units.len() {
        if written + 1 > dst.len() {
            return EncodeResult::new(TextCodecStatus::DestinationTooSmall, read, written);
        }
        let unit = units[read];
        dst[written] = if unit < 0x80 {
            (unit & 0x7F) as u8
        } else {
            REPLACEMENT
        };
        written += 1;
        read += 1;
    }
    EncodeResult::new(TextCodecStatus::Done, read, written)
}

/// 在写游标处追加 UTF-8 编码结果，返回写出的字节数。
///
/// 实现走"编码、窗口耗尽则扩容、对剩余续传"的循环，
/// 扩容策略与缓冲本身一致（2 的幂，受 `max_capacity` 封顶）。
pub fn write_utf16(buf: &mut ByteBuf, units: &[u16]) -> Result<usize> {
    let mut total = 0;
    let mut offset = 0;
    loop {
        if offset == units.len() {
            return Ok(total);
        }
        let window = buf.writable_bytes().max(64);
        let result = {
            let mut span = buf.writable_span(window)?;
            encode_utf16_to_utf8(&units[offset..], &mut span, true)
        };
        buf.advance_writer(result.bytes_written)?;
        total += result.bytes_written;
        offset += result.units_read;
        match result.status {
            TextCodecStatus::Done => return Ok(total),
            TextCodecStatus::DestinationTooSmall => {
                // 剩余码元最坏 3 字节（代理对 4 字节摊到两码元）。
                let worst = (units.len() - offset).saturating_mul(3).max(4);
                buf.ensure_writable(worst)?;
            }
            TextCodecStatus::InvalidData | TextCodecStatus::NeedMoreData => {
                return Err(CoreError::new(
                    codes::CODEC_INVALID_DATA,
                    "utf-16 input rejected by final-mode encoder",
                ));
            }
        }
    }
}

/// 在写游标处追加 ASCII 编码结果，返回写出的字节数。
pub fn write_utf16_ascii(buf: &mut ByteBuf, units: &[u16]) -> Result<usize> {
    buf.ensure_writable(units.len())?;
    let result = {
        let mut span = buf.writable_span(units.len())?;
        encode_utf16_to_ascii(units, &mut span)
    };
    buf.advance_writer(result.bytes_written)?;
    Ok(result.bytes_written)
}

/// 解码目标字符集。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    /// UTF-8，非法序列以 U+FFFD 替换。
    Utf8,
    /// 单字节 ASCII，高位字节替换为 `?`。
    Ascii,
}

/// 把 `[index, index + len)` 解码为字符串。
///
/// 文本解码永不因内容失败：非法序列按字符集规则替换；
/// 区间越界仍返回 `buffer.index_out_of_range`。零长度输入得到空串。
pub fn decode_string(
    buf: &ByteBuf,
    index: usize,
    len: usize,
    encoding: TextEncoding,
) -> Result<String> {
    if len == 0 {
        return Ok(String::new());
    }
    let mut raw = vec![0u8; len];
    buf.get_bytes(index, &mut raw)?;
    Ok(match encoding {
        TextEncoding::Utf8 => String::from_utf8_lossy(&raw).into_owned(),
        TextEncoding::Ascii => raw
            .iter()
            .map(|byte| if *byte < 0x80 { *byte as char } else { '?' })
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(text: &str) -> Vec<u16> {
        text.encode_utf16().collect()
    }

    #[test]
    fn encodes_one_two_three_and_four_byte_classes() {
        let units = utf16("a\u{00e9}\u{4e2d}\u{1f600}");
        let mut dst = [0u8; 16];
        let result = encode_utf16_to_utf8(&units, &mut dst, true);
        assert_eq!(result.status, TextCodecStatus::Done);
        assert_eq!(
            &dst[..result.bytes_written],
            "a\u{00e9}\u{4e2d}\u{1f600}".as_bytes()
        );
    }

    #[test]
    fn unpaired_surrogates_become_replacement() {
        // 高代理 + 非低代理、孤立低代理、末尾截断对，各降级为一个 '?'。
        let cases: [&[u16]; 3] = [
            &[0xD800, 0x0041],
            &[0xDC00, 0x0041],
            &[0x0041, 0xD800],
        ];
        let expected: [&[u8]; 3] = [b"?A", b"?A", b"A?"];
        for (units, want) in cases.iter().zip(expected) {
            let mut dst = [0u8; 8];
            let result = encode_utf16_to_utf8(units, &mut dst, true);
            assert_eq!(result.status, TextCodecStatus::Done);
            assert_eq!(&dst[..result.bytes_written], want);
        }
    }

    #[test]
    fn streaming_input_waits_on_trailing_high_surrogate() {
        let units = [0x0041, 0xD83D];
        let mut dst = [0u8; 8];
        let result = encode_utf16_to_utf8(&units, &mut dst, false);
        assert_eq!(result.status, TextCodecStatus::NeedMoreData);
        assert_eq!(result.units_read, 1);
        assert_eq!(result.bytes_written, 1);
    }

    #[test]
    fn destination_too_small_stops_at_unit_boundary() {
        let units = utf16("\u{4e2d}\u{6587}");
        let mut dst = [0u8; 4];
        let result = encode_utf16_to_utf8(&units, &mut dst, true);
        assert_eq!(result.status, TextCodecStatus::DestinationTooSmall);
        assert_eq!(result.units_read, 1);
        assert_eq!(result.bytes_written, 3);
        assert_eq!(&dst[..3], "\u{4e2d}".as_bytes());
    }

    #[test]
    fn ascii_encoder_replaces_non_ascii() {
        let units = utf16("ab\u{00e9}");
        let mut dst = [0u8; 3];
        let result = encode_utf16_to_ascii(&units, &mut dst);
        assert_eq!(result.status, TextCodecStatus::Done);
        assert_eq!(&dst, b"ab?");
    }
}
