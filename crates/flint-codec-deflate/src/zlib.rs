//! 原始 DEFLATE 流包装：跨帧保留 LZ77 滑动窗口，输出直写池化缓冲。

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use tracing::debug;

use flint_buffer::{BufferAllocator, ByteBuf, ReadableSpan};
use flint_core::{CoreError, Result, codes};

/// 每条压缩消息的逐帧尾部：同步刷出块的收尾序列，发送前剥离、接收后补回。
pub const FRAME_TAIL: [u8; 4] = [0x00, 0x00, 0xFF, 0xFF];

/// 空消息的规范负载：一个字节的空 DEFLATE 块。
pub const EMPTY_DEFLATE_BLOCK: [u8; 1] = [0x00];

/// 单个输出块的容量上限，防止极端输入一次租下过大的缓冲。
const MAX_OUTPUT_CHUNK: usize = 16 * 1024;

fn output_chunk_len(remaining_input: usize) -> usize {
    remaining_input.saturating_add(10).clamp(64, MAX_OUTPUT_CHUNK)
}

/// 压缩方向的流：`zlib_header = false` 即无封装的原始 DEFLATE。
///
/// # 设计背景（Why）
/// - permessage-deflate 的压缩状态跨帧存续：同一消息的分片共享一条流，
///   `no_context` 关闭时甚至跨消息共享，LZ77 历史由流对象承载；
/// - 输出以池化缓冲块挂到组合缓冲上，避免先聚合到临时数组再拷贝。
///
/// # 驱动方式（How）
/// - 每帧调用一次 [`DeflateStream::compress_chunk`]：吃尽输入并以
///   Sync 方式刷出，保证帧边界上所有待决字节落地（尾部恰为
///   [`FRAME_TAIL`]）；
/// - 输出窗口写满即再租一块，直到输入耗尽且本轮产出未填满窗口。
pub(crate) struct DeflateStream {
    raw: Compress,
}

impl DeflateStream {
    pub(crate) fn new(level: u32) -> Self {
        debug!(level, "deflate stream created");
        Self {
            raw: Compress::new(Compression::new(level), false),
        }
    }

    /// 压缩 `input` 并把输出块追加到组合缓冲 `out`，返回产出字节总数。
    pub(crate) fn compress_chunk(
        &mut self,
        input: &[u8],
        allocator: &dyn BufferAllocator,
        out: &mut ByteBuf,
    ) -> Result<usize> {
        let mut consumed = 0;
        let mut produced_total = 0;
        loop {
            let mut block = allocator.buffer(output_chunk_len(input.len() - consumed))?;
            let window = block.writable_bytes();
            let produced = {
                let before_in = self.raw.total_in();
                let before_out = self.raw.total_out();
                let mut span = block.writable_span(window)?;
                let status = self
                    .raw
                    .compress(&input[consumed..], &mut span, FlushCompress::Sync)
                    .map_err(|cause| {
                        CoreError::new(codes::CODEC_INVALID_DATA, "deflate stream failed")
                            .with_cause(cause)
                    });
                match status {
                    Ok(_) => {
                        consumed += (self.raw.total_in() - before_in) as usize;
                        (self.raw.total_out() - before_out) as usize
                    }
                    Err(err) => {
                        drop(span);
                        let _ = block.release();
                        return Err(err);
                    }
                }
            };
            if produced > 0 {
                block.advance_writer(produced)?;
                out.add_component(block, true)?;
                produced_total += produced;
            } else {
                let _ = block.release();
            }
            // Sync 刷出完成的判定：输入吃尽且本轮产出未填满窗口。
            if consumed == input.len() && produced < window {
                return Ok(produced_total);
            }
        }
    }
}

/// 解压方向的流：原始 DEFLATE 充气机，窗口历史同样跨帧存续。
pub(crate) struct InflateStream {
    raw: Decompress,
}

impl InflateStream {
    pub(crate) fn new() -> Self {
        debug!("inflate stream created");
        Self {
            raw: Decompress::new(false),
        }
    }

    /// 解压 `input` 并把输出块追加到组合缓冲 `out`。
    ///
    /// 损坏的 DEFLATE 数据返回 `codec.invalid_data`；输入耗尽即返回，
    /// 不要求遇到流终结块（permessage-deflate 的流从不显式终结）。
    pub(crate) fn decompress_chunk(
        &mut self,
        input: &[u8],
        allocator: &dyn BufferAllocator,
        out: &mut ByteBuf,
    ) -> Result<usize> {
        let mut consumed = 0;
        let mut produced_total = 0;
        loop {
            let consumed_before = consumed;
            let mut block = allocator.buffer(output_chunk_len(input.len() - consumed))?;
            let window = block.writable_bytes();
            let (produced, status) = {
                let before_in = self.raw.total_in();
                let before_out = self.raw.total_out();
                let mut span = block.writable_span(window)?;
                let status = self
                    .raw
                    .decompress(&input[consumed..], &mut span, FlushDecompress::None)
                    .map_err(|cause| {
                        CoreError::new(codes::CODEC_INVALID_DATA, "corrupted deflate stream")
                            .with_cause(cause)
                    });
                match status {
                    Ok(status) => {
                        consumed += (self.raw.total_in() - before_in) as usize;
                        ((self.raw.total_out() - before_out) as usize, status)
                    }
                    Err(err) => {
                        drop(span);
                        let _ = block.release();
                        return Err(err);
                    }
                }
            };
            let made_progress = produced > 0;
            if made_progress {
                block.advance_writer(produced)?;
                out.add_component(block, true)?;
                produced_total += produced;
            } else {
                let _ = block.release();
            }
            if matches!(status, Status::StreamEnd) {
                return Ok(produced_total);
            }
            if consumed == input.len() && produced < window {
                return Ok(produced_total);
            }
            if !made_progress && consumed == consumed_before && consumed < input.len() {
                return Err(CoreError::new(
                    codes::CODEC_INVALID_DATA,
                    "inflater stalled before consuming the whole frame",
                ));
            }
        }
    }
}

/// 帧内容的连续字节视图：数组后备走零拷贝窗口，组合内容退化为一次聚合拷贝。
pub(crate) enum FrameBytes<'a> {
    Span(ReadableSpan<'a>),
    Owned(Vec<u8>),
}

impl AsRef<[u8]> for FrameBytes<'_> {
    fn as_ref(&self) -> &[u8] {
        match self {
            FrameBytes::Span(span) => span,
            FrameBytes::Owned(bytes) => bytes,
        }
    }
}

pub(crate) fn frame_bytes(content: &ByteBuf) -> Result<FrameBytes<'_>> {
    match content.readable_span(content.reader_index(), content.readable_bytes()) {
        Ok(span) => Ok(FrameBytes::Span(span)),
        Err(_) => Ok(FrameBytes::Owned(content.to_vec()?)),
    }
}
