//! `permessage_deflate_contract` 集成测试：帧级压缩语义的端到端契约。
//!
//! # 测试总览（Why）
//! - 覆盖编码器决策表的全部分支：压缩、透传、空帧、协议违例；
//! - 验证分片消息共享一条 DEFLATE 流，以及 `no_context` 的消息独立性；
//! - 解码侧校验尾部补回、RSV1 清除与乱序分片的拒绝。

use std::sync::Arc;

use flint_buffer::{ArrayPool, BufferAllocator, PooledBufferAllocator};
use flint_codec_deflate::{
    DeflateConfig, DeflateFrameDecoder, DeflateFrameEncoder, FRAME_TAIL, Opcode, SkipFilter,
    WsFrame, rsv,
};
use flint_core::{CoreError, codes};
use flint_pipeline::{HandlerContext, InboundHandler, OutboundHandler, PipelineMessage, WriteFuture};
use proptest::prelude::*;

/// 测试上下文：真实的池化分配器加事件黑洞。
struct TestContext {
    allocator: PooledBufferAllocator,
}

impl TestContext {
    fn new() -> Self {
        Self {
            allocator: PooledBufferAllocator::new(Arc::new(ArrayPool::new())),
        }
    }
}

impl HandlerContext for TestContext {
    fn allocator(&self) -> &dyn BufferAllocator {
        &self.allocator
    }

    fn fire_channel_read(&self, msg: PipelineMessage) {
        if let PipelineMessage::Buffer(buf) = msg {
            let _ = buf.release();
        }
    }

    fn write(&self, msg: PipelineMessage) -> WriteFuture {
        if let PipelineMessage::Buffer(buf) = msg {
            let _ = buf.release();
        }
        WriteFuture::completed()
    }

    fn fire_exception_caught(&self, _error: CoreError) {}
}

fn make_frame(
    ctx: &TestContext,
    opcode: Opcode,
    rsv_bits: u8,
    final_fragment: bool,
    payload: &[u8],
) -> WsFrame {
    let mut content = ctx
        .allocator
        .buffer(payload.len().max(1))
        .expect("租借帧内容");
    content.write_bytes(payload).expect("写入负载");
    WsFrame::with_flags(opcode, rsv_bits, final_fragment, content)
}

fn deterministic_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + 7) as u8).collect()
}

fn encode_one(encoder: &mut DeflateFrameEncoder, ctx: &TestContext, frame: WsFrame) -> WsFrame {
    let mut out = Vec::new();
    encoder.encode(ctx, frame, &mut out).expect("编码成功");
    assert_eq!(out.len(), 1, "单帧输入应产出单帧");
    out.remove(0)
}

fn decode_one(decoder: &mut DeflateFrameDecoder, ctx: &TestContext, frame: WsFrame) -> WsFrame {
    let mut out = Vec::new();
    decoder.decode(ctx, frame, &mut out).expect("解码成功");
    assert_eq!(out.len(), 1, "单帧输入应产出单帧");
    out.remove(0)
}

/// 用独立充气机验证压缩字节：输入应还原为期望明文。
fn inflate_all(input: &[u8]) -> Vec<u8> {
    let mut raw = flate2::Decompress::new(false);
    let mut out = Vec::new();
    let mut window = [0u8; 4096];
    let mut consumed = 0usize;
    while consumed < input.len() {
        let before_in = raw.total_in();
        let before_out = raw.total_out();
        let status = raw
            .decompress(
                &input[consumed..],
                &mut window,
                flate2::FlushDecompress::None,
            )
            .expect("参考充气机不应失败");
        consumed += (raw.total_in() - before_in) as usize;
        out.extend_from_slice(&window[..(raw.total_out() - before_out) as usize]);
        if matches!(status, flate2::Status::StreamEnd) {
            break;
        }
        if raw.total_in() == before_in && raw.total_out() == before_out {
            break;
        }
    }
    out
}

#[test]
fn compressed_binary_frame_sets_rsv1_and_roundtrips() {
    let ctx = TestContext::new();
    let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());
    let payload = deterministic_payload(300);

    let encoded = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, rsv::RSV3, true, &payload),
    );
    assert_eq!(encoded.rsv, rsv::RSV1 | rsv::RSV3);
    assert_eq!(encoded.opcode, Opcode::Binary);
    assert!(encoded.final_fragment);

    let mut wire = encoded.content.to_vec().expect("压缩内容");
    wire.extend_from_slice(&FRAME_TAIL);
    assert_eq!(inflate_all(&wire), payload);
    assert!(encoded.release().expect("释放输出帧"));
}

#[test]
fn already_compressed_frame_passes_through_untouched() {
    let ctx = TestContext::new();
    let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());
    let payload = deterministic_payload(300);

    let encoded = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, rsv::RSV1 | rsv::RSV3, true, &payload),
    );
    assert_eq!(encoded.rsv, rsv::RSV1 | rsv::RSV3);
    assert_eq!(encoded.content.to_vec().expect("内容"), payload);
    assert!(encoded.release().expect("释放"));
}

#[test]
fn fragmented_message_shares_one_deflate_stream() {
    let ctx = TestContext::new();
    let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());
    let payload = deterministic_payload(300);

    let first = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, rsv::RSV3, false, &payload[..100]),
    );
    let second = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Continuation, rsv::RSV3, false, &payload[100..200]),
    );
    let third = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Continuation, rsv::RSV3, true, &payload[200..]),
    );

    // RSV1 只落在起始帧；后续分片保持输入 RSV。
    assert_eq!(first.rsv, rsv::RSV1 | rsv::RSV3);
    assert_eq!(second.rsv, rsv::RSV3);
    assert_eq!(third.rsv, rsv::RSV3);

    // 三段输出属于同一条流：拼接后补回尾部即可整体还原。
    let mut wire = first.content.to_vec().expect("分片一");
    wire.extend_from_slice(&second.content.to_vec().expect("分片二"));
    wire.extend_from_slice(&third.content.to_vec().expect("分片三"));
    wire.extend_from_slice(&FRAME_TAIL);
    assert_eq!(inflate_all(&wire), payload);

    assert!(first.release().expect("释放"));
    assert!(second.release().expect("释放"));
    assert!(third.release().expect("释放"));
}

#[test]
fn empty_final_text_frame_becomes_canonical_empty_block() {
    let ctx = TestContext::new();
    let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());
    let encoded = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Text, 0, true, b""),
    );
    assert_eq!(encoded.rsv, rsv::RSV1);
    assert_eq!(encoded.content.to_vec().expect("内容"), vec![0x00]);
    assert!(encoded.release().expect("释放"));
}

#[test]
fn empty_non_final_frame_is_a_codec_error() {
    let ctx = TestContext::new();
    let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());
    let mut out = Vec::new();
    let err = encoder
        .encode(&ctx, make_frame(&ctx, Opcode::Text, 0, false, b""), &mut out)
        .expect_err("消息中段的空帧必须失败");
    assert_eq!(err.code(), codes::CODEC_PROTOCOL_VIOLATION);
    assert!(out.is_empty());
}

#[test]
fn control_frame_on_encoder_is_a_codec_error() {
    let ctx = TestContext::new();
    let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());
    let mut out = Vec::new();
    let err = encoder
        .encode(
            &ctx,
            make_frame(&ctx, Opcode::Ping, 0, true, b"ping"),
            &mut out,
        )
        .expect_err("控制帧不应进入压缩路径");
    assert_eq!(err.code(), codes::CODEC_PROTOCOL_VIOLATION);
}

#[test]
fn non_continuation_inside_fragmented_message_is_rejected() {
    let ctx = TestContext::new();
    let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());
    let opening = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, false, b"fragment"),
    );
    assert!(opening.release().expect("释放"));

    let mut out = Vec::new();
    let err = encoder
        .encode(
            &ctx,
            make_frame(&ctx, Opcode::Text, 0, true, b"interloper"),
            &mut out,
        )
        .expect_err("分片中段的新消息必须失败");
    assert_eq!(err.code(), codes::CODEC_PROTOCOL_VIOLATION);
}

/// 小文本跳过、二进制压缩的选择性策略。
struct SmallTextSkip;

impl SkipFilter for SmallTextSkip {
    fn must_skip(&self, frame: &WsFrame) -> bool {
        frame.opcode == Opcode::Text && frame.content.readable_bytes() < 100
    }
}

#[test]
fn selective_filter_skips_small_text_and_compresses_binary() {
    let ctx = TestContext::new();
    let mut encoder =
        DeflateFrameEncoder::with_filter(DeflateConfig::default(), Box::new(SmallTextSkip));

    let text = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Text, 0, true, b"small text frame"),
    );
    assert_eq!(text.rsv, 0);
    assert_eq!(text.content.to_vec().expect("文本"), b"small text frame");
    assert!(text.release().expect("释放"));

    let payload = deterministic_payload(300);
    let binary = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    assert_eq!(binary.rsv, rsv::RSV1);
    let mut wire = binary.content.to_vec().expect("压缩内容");
    wire.extend_from_slice(&FRAME_TAIL);
    assert_eq!(inflate_all(&wire), payload);
    assert!(binary.release().expect("释放"));
}

#[test]
fn uncompressed_message_continuations_pass_through() {
    let ctx = TestContext::new();
    let mut encoder =
        DeflateFrameEncoder::with_filter(DeflateConfig::default(), Box::new(SmallTextSkip));

    // 起始帧被跳过策略放行：整条消息以未压缩形态开场。
    let opening = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Text, 0, false, b"skipped opener"),
    );
    assert_eq!(opening.rsv, 0);
    assert_eq!(opening.content.to_vec().expect("起始帧"), b"skipped opener");
    assert!(opening.release().expect("释放"));

    // 后续分片不再咨询跳过策略或压缩路径：超过阈值的续帧同样原样透传，
    // 中途压缩会让对端的充气机与 RSV 语义脱轨。
    let big_tail = deterministic_payload(300);
    let middle = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Continuation, 0, false, &big_tail),
    );
    assert_eq!(middle.rsv, 0);
    assert_eq!(middle.content.to_vec().expect("续帧"), big_tail);
    assert!(middle.release().expect("释放"));

    let closing = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Continuation, 0, true, b"plain tail"),
    );
    assert_eq!(closing.rsv, 0);
    assert_eq!(closing.content.to_vec().expect("终帧"), b"plain tail");
    assert!(closing.release().expect("释放"));

    // 透传的分片不得污染编码器状态：下一条可压缩消息照常工作。
    let payload = deterministic_payload(300);
    let compressed = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    assert_eq!(compressed.rsv, rsv::RSV1);
    let mut wire = compressed.content.to_vec().expect("压缩内容");
    wire.extend_from_slice(&FRAME_TAIL);
    assert_eq!(inflate_all(&wire), payload);
    assert!(compressed.release().expect("释放"));
}

#[test]
fn pre_compressed_message_continuations_pass_through() {
    let ctx = TestContext::new();
    let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());

    // 起始帧已带 RSV1（上游预压缩）：透传且不进入分片状态机。
    let opening = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, rsv::RSV1 | rsv::RSV3, false, b"pre-compressed"),
    );
    assert_eq!(opening.rsv, rsv::RSV1 | rsv::RSV3);
    assert_eq!(
        opening.content.to_vec().expect("起始帧"),
        b"pre-compressed"
    );
    assert!(opening.release().expect("释放"));

    let closing = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Continuation, rsv::RSV3, true, b"raw continuation"),
    );
    assert_eq!(closing.rsv, rsv::RSV3, "续帧 RSV 保持输入原样");
    assert_eq!(
        closing.content.to_vec().expect("终帧"),
        b"raw continuation"
    );
    assert!(closing.release().expect("释放"));

    let payload = deterministic_payload(300);
    let compressed = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    assert_eq!(compressed.rsv, rsv::RSV1);
    let mut wire = compressed.content.to_vec().expect("压缩内容");
    wire.extend_from_slice(&FRAME_TAIL);
    assert_eq!(inflate_all(&wire), payload);
    assert!(compressed.release().expect("释放"));
}

#[test]
fn decoder_restores_fragments_and_clears_rsv1() {
    let ctx = TestContext::new();
    let config = DeflateConfig::default();
    let mut encoder = DeflateFrameEncoder::new(config);
    let mut decoder = DeflateFrameDecoder::new(config);
    let payload = deterministic_payload(50_000);

    let splits = [0, 20_000, 35_000, payload.len()];
    let mut restored = Vec::new();
    for window in 0..3 {
        let (from, to) = (splits[window], splits[window + 1]);
        let opcode = if window == 0 {
            Opcode::Binary
        } else {
            Opcode::Continuation
        };
        let encoded = encode_one(
            &mut encoder,
            &ctx,
            make_frame(&ctx, opcode, rsv::RSV3, window == 2, &payload[from..to]),
        );
        let decoded = decode_one(&mut decoder, &ctx, encoded);
        assert_eq!(decoded.rsv & rsv::RSV1, 0, "RSV1 必须被清除");
        assert_eq!(decoded.rsv & rsv::RSV3, rsv::RSV3, "其余 RSV 保留");
        restored.extend_from_slice(&decoded.decoded_content());
        assert!(decoded.release().expect("释放"));
    }
    assert_eq!(restored, payload);
}

#[test]
fn shared_context_survives_across_messages_when_enabled() {
    let ctx = TestContext::new();
    let config = DeflateConfig::default();
    let mut encoder = DeflateFrameEncoder::new(config);
    let mut decoder = DeflateFrameDecoder::new(config);
    let payload = deterministic_payload(8_192);

    // 同一上下文连续编解码多条消息，滑动窗口跨消息复用。
    for _ in 0..4 {
        let encoded = encode_one(
            &mut encoder,
            &ctx,
            make_frame(&ctx, Opcode::Binary, 0, true, &payload),
        );
        let decoded = decode_one(&mut decoder, &ctx, encoded);
        assert_eq!(decoded.decoded_content(), payload);
        assert!(decoded.release().expect("释放"));
    }
}

#[test]
fn no_context_mode_makes_messages_order_independent() {
    let ctx = TestContext::new();
    let config = DeflateConfig::new(6, 15, true).expect("合法参数");
    let mut encoder = DeflateFrameEncoder::new(config);
    let payload = deterministic_payload(4_096);

    let first = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    let second = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    // 每条消息以全新滑动窗口起步：相同输入产出逐字节相同的输出。
    assert_eq!(
        first.content.to_vec().expect("消息一"),
        second.content.to_vec().expect("消息二")
    );
    assert!(first.release().expect("释放"));
    assert!(second.release().expect("释放"));

    let mut decoder = DeflateFrameDecoder::new(config);
    let reencoded = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    let decoded = decode_one(&mut decoder, &ctx, reencoded);
    assert_eq!(decoded.decoded_content(), payload);
    assert!(decoded.release().expect("释放"));
}

#[test]
fn handler_removed_disposes_the_stream() {
    let ctx = TestContext::new();
    let config = DeflateConfig::default();
    let payload = deterministic_payload(2_048);

    let mut warmed = DeflateFrameEncoder::new(config);
    let opening = encode_one(
        &mut warmed,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    assert!(opening.release().expect("释放"));
    warmed.handler_removed(&ctx).expect("移除钩子");

    // 移除后再编码，输出应与全新编码器一致：旧上下文确实被销毁。
    let after_removal = encode_one(
        &mut warmed,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    let mut fresh = DeflateFrameEncoder::new(config);
    let from_fresh = encode_one(
        &mut fresh,
        &ctx,
        make_frame(&ctx, Opcode::Binary, 0, true, &payload),
    );
    assert_eq!(
        after_removal.content.to_vec().expect("移除后输出"),
        from_fresh.content.to_vec().expect("新编码器输出")
    );
    assert!(after_removal.release().expect("释放"));
    assert!(from_fresh.release().expect("释放"));
}

#[test]
fn decoder_rejects_orphan_compressed_continuation() {
    let ctx = TestContext::new();
    let mut decoder = DeflateFrameDecoder::new(DeflateConfig::default());
    let mut out = Vec::new();
    let err = decoder
        .decode(
            &ctx,
            make_frame(&ctx, Opcode::Continuation, rsv::RSV1, true, b"stray"),
            &mut out,
        )
        .expect_err("无起始帧的压缩续帧必须失败");
    assert_eq!(err.code(), codes::CODEC_PROTOCOL_VIOLATION);
}

#[test]
fn decoder_reports_corrupt_stream_as_invalid_data() {
    let ctx = TestContext::new();
    let mut decoder = DeflateFrameDecoder::new(DeflateConfig::default());
    let mut out = Vec::new();
    let err = decoder
        .decode(
            &ctx,
            make_frame(&ctx, Opcode::Binary, rsv::RSV1, true, &[0xFF; 64]),
            &mut out,
        )
        .expect_err("损坏的压缩流必须失败");
    assert_eq!(err.code(), codes::CODEC_INVALID_DATA);
}

#[test]
fn decoder_passes_control_frames_and_plain_frames_through() {
    let ctx = TestContext::new();
    let mut decoder = DeflateFrameDecoder::new(DeflateConfig::default());

    let ping = decode_one(
        &mut decoder,
        &ctx,
        make_frame(&ctx, Opcode::Ping, 0, true, b"keepalive"),
    );
    assert_eq!(ping.content.to_vec().expect("ping"), b"keepalive");
    assert!(ping.release().expect("释放"));

    let plain = decode_one(
        &mut decoder,
        &ctx,
        make_frame(&ctx, Opcode::Text, rsv::RSV3, true, b"plain"),
    );
    assert_eq!(plain.rsv, rsv::RSV3);
    assert_eq!(plain.content.to_vec().expect("明文"), b"plain");
    assert!(plain.release().expect("释放"));
}

#[test]
fn empty_final_frame_roundtrips_through_decoder() {
    let ctx = TestContext::new();
    let config = DeflateConfig::default();
    let mut encoder = DeflateFrameEncoder::new(config);
    let mut decoder = DeflateFrameDecoder::new(config);

    let encoded = encode_one(
        &mut encoder,
        &ctx,
        make_frame(&ctx, Opcode::Text, 0, true, b""),
    );
    let decoded = decode_one(&mut decoder, &ctx, encoded);
    assert_eq!(decoded.content.readable_bytes(), 0);
    assert_eq!(decoded.rsv & rsv::RSV1, 0);
    assert!(decoded.release().expect("释放"));
}

trait DecodedContent {
    fn decoded_content(&self) -> Vec<u8>;
}

impl DecodedContent for WsFrame {
    fn decoded_content(&self) -> Vec<u8> {
        self.content.to_vec().expect("读取解码内容")
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// 任意负载的单帧往返：独立充气机读回编码输出（补尾后）必须逐字节一致。
    #[test]
    fn single_frame_deflate_roundtrip_holds(payload in proptest::collection::vec(any::<u8>(), 1..65_536)) {
        let ctx = TestContext::new();
        let mut encoder = DeflateFrameEncoder::new(DeflateConfig::default());
        let encoded = encode_one(
            &mut encoder,
            &ctx,
            make_frame(&ctx, Opcode::Binary, 0, true, &payload),
        );
        let mut wire = encoded.content.to_vec().expect("压缩内容");
        wire.extend_from_slice(&FRAME_TAIL);
        prop_assert_eq!(inflate_all(&wire), payload);
        prop_assert!(encoded.release().expect("释放"));
    }
}
