//! permessage-deflate 出站编码器：逐帧压缩、尾部剥离与分片状态机。

use tracing::debug;

use flint_core::{CoreError, Result, codes};
use flint_pipeline::{HandlerContext, OutboundHandler};

use crate::config::DeflateConfig;
use crate::filter::{NeverSkip, SkipFilter};
use crate::frame::{Opcode, WsFrame, rsv};
use crate::zlib::{DeflateStream, EMPTY_DEFLATE_BLOCK, frame_bytes};

/// 消息级状态：空闲，或正处于一条压缩分片消息中段。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MessagePhase {
    Idle,
    MidMessage,
}

/// `DeflateFrameEncoder` 把出站数据帧压缩为带 RSV1 标志的帧。
///
/// # 帧级决策（What）
/// - 跳过策略命中、或起始帧已带 RSV1（上游预压缩）：原样透传；
/// - 空的最终帧：负载替换为规范空块 `{0x00}` 并置 RSV1，不驱动压缩流；
/// - 空的非最终帧：协议违例；
/// - 非数据帧：协议违例（握手层应在上游拦下控制帧）；
/// - 其余数据帧：送入压缩流，Text/Binary 置 RSV1，Continuation 保持
///   输入 RSV 不变；最终分片从输出尾部剥离 `{0x00, 0x00, 0xFF, 0xFF}`。
///
/// # 分片状态机（How）
/// - `Idle` 收到非最终可压缩帧进入 `MidMessage`；
/// - `MidMessage` 只接受 Continuation，收到其它操作码即协议违例；
/// - 最终分片回到 `Idle`；`no_context` 同时丢弃压缩流，
///   下一条消息以全新滑动窗口起步；
/// - 以未压缩形态开场的消息（被跳过或预压缩）不进入 `MidMessage`，
///   其 Continuation 分片在 `Idle` 下原样透传。
///
/// # 资源契约
/// - 压缩流懒构造于首个可压缩帧；
/// - 错误路径先释放输入帧与已产出的缓冲再返回；
/// - `handler_removed` 丢弃压缩流，等价于消息边界上的上下文销毁。
pub struct DeflateFrameEncoder {
    config: DeflateConfig,
    filter: Box<dyn SkipFilter>,
    stream: Option<DeflateStream>,
    phase: MessagePhase,
}

impl DeflateFrameEncoder {
    /// 以默认跳过策略（永不跳过）构造编码器。
    pub fn new(config: DeflateConfig) -> Self {
        Self::with_filter(config, Box::new(NeverSkip))
    }

    /// 指定跳过策略构造编码器。
    pub fn with_filter(config: DeflateConfig, filter: Box<dyn SkipFilter>) -> Self {
        Self {
            config,
            filter,
            stream: None,
            phase: MessagePhase::Idle,
        }
    }

    fn compress_frame(
        &mut self,
        ctx: &dyn HandlerContext,
        frame: WsFrame,
        out: &mut Vec<WsFrame>,
    ) -> Result<()> {
        if frame.is_empty() && !frame.final_fragment {
            let _ = frame.release();
            return Err(CoreError::new(
                codes::CODEC_PROTOCOL_VIOLATION,
                "cannot compress an empty non-final frame",
            ));
        }

        let stream = self
            .stream
            .get_or_insert_with(|| DeflateStream::new(self.config.compression_level()));

        let mut compressed = ctx.allocator().composite_buffer()?;
        let fed = (|| {
            let bytes = frame_bytes(&frame.content)?;
            stream.compress_chunk(bytes.as_ref(), ctx.allocator(), &mut compressed)
        })();
        if let Err(err) = fed {
            let _ = compressed.release();
            let _ = frame.release();
            return Err(err);
        }
        if compressed.readable_bytes() == 0 {
            let _ = compressed.release();
            let _ = frame.release();
            return Err(CoreError::new(
                codes::CODEC_PROTOCOL_VIOLATION,
                "compressor produced no output for a readable frame",
            ));
        }

        // 最终分片剥离逐帧尾部；同步刷出保证尾部必然存在。
        let content = if frame.final_fragment {
            let len = compressed.readable_bytes();
            if len < 4 {
                let _ = compressed.release();
                let _ = frame.release();
                return Err(CoreError::new(
                    codes::CODEC_PROTOCOL_VIOLATION,
                    "compressed output shorter than the frame tail",
                ));
            }
            compressed.slice(0, len - 4)?
        } else {
            compressed
        };

        let out_rsv = match frame.opcode {
            Opcode::Continuation => frame.rsv,
            _ => frame.rsv | rsv::RSV1,
        };
        let WsFrame {
            opcode,
            final_fragment,
            content: input_content,
            ..
        } = frame;
        input_content.release()?;

        if final_fragment {
            self.phase = MessagePhase::Idle;
            if self.config.no_context() && self.stream.take().is_some() {
                debug!("deflate context reset at message boundary");
            }
        } else {
            self.phase = MessagePhase::MidMessage;
        }

        out.push(WsFrame::with_flags(opcode, out_rsv, final_fragment, content));
        Ok(())
    }
}

impl OutboundHandler for DeflateFrameEncoder {
    type Input = WsFrame;
    type Output = WsFrame;

    fn encode(
        &mut self,
        ctx: &dyn HandlerContext,
        frame: WsFrame,
        out: &mut Vec<WsFrame>,
    ) -> Result<()> {
        if self.phase == MessagePhase::MidMessage {
            // 分片不变式：压缩消息中段只允许 Continuation。
            if frame.opcode != Opcode::Continuation {
                let _ = frame.release();
                return Err(CoreError::new(
                    codes::CODEC_PROTOCOL_VIOLATION,
                    "non-continuation frame inside a fragmented compressed message",
                ));
            }
            return self.compress_frame(ctx, frame, out);
        }

        // 以未压缩形态开场的消息：后续分片保持原样。
        if frame.opcode == Opcode::Continuation {
            out.push(frame);
            return Ok(());
        }
        if self.filter.must_skip(&frame) {
            out.push(frame);
            return Ok(());
        }
        if frame.rsv & rsv::RSV1 != 0 {
            // 上游已压缩，透传并保持 RSV 原样。
            out.push(frame);
            return Ok(());
        }
        if !frame.opcode.is_data() {
            let _ = frame.release();
            return Err(CoreError::new(
                codes::CODEC_PROTOCOL_VIOLATION,
                "unexpected frame type on the compression path",
            ));
        }
        if frame.is_empty() && frame.final_fragment {
            // 空消息不驱动压缩流：负载即规范空块。
            let mut content = ctx.allocator().buffer(EMPTY_DEFLATE_BLOCK.len())?;
            content.write_bytes(&EMPTY_DEFLATE_BLOCK)?;
            let out_rsv = frame.rsv | rsv::RSV1;
            let WsFrame {
                opcode,
                content: input_content,
                ..
            } = frame;
            input_content.release()?;
            out.push(WsFrame::with_flags(opcode, out_rsv, true, content));
            return Ok(());
        }
        self.compress_frame(ctx, frame, out)
    }

    fn handler_removed(&mut self, _ctx: &dyn HandlerContext) -> Result<()> {
        if self.stream.take().is_some() {
            debug!("deflate encoder stream disposed on handler removal");
        }
        self.phase = MessagePhase::Idle;
        Ok(())
    }
}
