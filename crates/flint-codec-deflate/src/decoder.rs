//! permessage-deflate 入站解码器：尾部补回、跨分片充气与 RSV1 清除。

use tracing::debug;

use flint_core::{CoreError, Result, codes};
use flint_pipeline::{HandlerContext, InboundHandler};

use crate::config::DeflateConfig;
use crate::frame::{Opcode, WsFrame, rsv};
use crate::zlib::{FRAME_TAIL, InflateStream, frame_bytes};

/// `DeflateFrameDecoder` 把带 RSV1 的入站帧还原为明文帧。
///
/// # 帧级决策（What）
/// - 控制帧（Ping/Pong/Close）永远原样透传，即使夹在分片消息中间；
/// - 起始数据帧带 RSV1：进入解压状态，内容送入充气机，
///   最终分片在内容之后补回逐帧尾部 `{0x00, 0x00, 0xFF, 0xFF}`；
/// - 解压状态下的 Continuation：继续送入同一条流；
/// - 未处于解压状态且不带 RSV1：原样透传；
/// - 未处于解压状态的 Continuation 带 RSV1：协议违例；
/// - 输出帧保持操作码与最终标志，RSV1 清零。
///
/// # 状态契约（How）
/// - `decompressing` 跟踪"带压缩的分片消息进行中"；
/// - 最终分片落地后复位；`no_context` 同时丢弃充气机，
///   滑动窗口不跨消息保留；
/// - 损坏的 DEFLATE 数据以 `codec.invalid_data` 上报，
///   在途缓冲先于错误传播释放。
pub struct DeflateFrameDecoder {
    config: DeflateConfig,
    stream: Option<InflateStream>,
    decompressing: bool,
}

impl DeflateFrameDecoder {
    /// 构造解码器。
    pub fn new(config: DeflateConfig) -> Self {
        Self {
            config,
            stream: None,
            decompressing: false,
        }
    }

    fn inflate_frame(
        &mut self,
        ctx: &dyn HandlerContext,
        frame: WsFrame,
        out: &mut Vec<WsFrame>,
    ) -> Result<()> {
        let stream = self.stream.get_or_insert_with(InflateStream::new);
        let mut restored = ctx.allocator().composite_buffer()?;
        let fed = (|| {
            let bytes = frame_bytes(&frame.content)?;
            stream.decompress_chunk(bytes.as_ref(), ctx.allocator(), &mut restored)?;
            if frame.final_fragment {
                // 发送端剥离的逐帧尾部在此补回，闭合本消息的块边界。
                stream.decompress_chunk(&FRAME_TAIL, ctx.allocator(), &mut restored)?;
            }
            Ok(())
        })();
        if let Err(err) = fed {
            let _ = restored.release();
            let _ = frame.release();
            return Err(err);
        }

        let out_rsv = frame.rsv & !rsv::RSV1;
        let WsFrame {
            opcode,
            final_fragment,
            content: input_content,
            ..
        } = frame;
        input_content.release()?;

        if final_fragment {
            self.decompressing = false;
            if self.config.no_context() && self.stream.take().is_some() {
                debug!("inflate context reset at message boundary");
            }
        }

        out.push(WsFrame::with_flags(opcode, out_rsv, final_fragment, restored));
        Ok(())
    }
}

impl InboundHandler for DeflateFrameDecoder {
    type Input = WsFrame;
    type Output = WsFrame;

    fn decode(
        &mut self,
        ctx: &dyn HandlerContext,
        frame: WsFrame,
        out: &mut Vec<WsFrame>,
    ) -> Result<()> {
        if frame.opcode.is_control() {
            out.push(frame);
            return Ok(());
        }

        if frame.opcode == Opcode::Continuation {
            if self.decompressing {
                return self.inflate_frame(ctx, frame, out);
            }
            if frame.rsv & rsv::RSV1 != 0 {
                let _ = frame.release();
                return Err(CoreError::new(
                    codes::CODEC_PROTOCOL_VIOLATION,
                    "continuation with RSV1 outside an active compressed message",
                ));
            }
            out.push(frame);
            return Ok(());
        }

        // 起始数据帧。
        if self.decompressing {
            let _ = frame.release();
            return Err(CoreError::new(
                codes::CODEC_PROTOCOL_VIOLATION,
                "new data frame while a fragmented compressed message is in progress",
            ));
        }
        if frame.rsv & rsv::RSV1 == 0 {
            out.push(frame);
            return Ok(());
        }
        self.decompressing = true;
        self.inflate_frame(ctx, frame, out)
    }

    fn handler_removed(&mut self, _ctx: &dyn HandlerContext) -> Result<()> {
        if self.stream.take().is_some() {
            debug!("inflate stream disposed on handler removal");
        }
        self.decompressing = false;
        Ok(())
    }
}
