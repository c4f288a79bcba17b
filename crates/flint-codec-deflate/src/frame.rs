//! WebSocket 帧模型：操作码、RSV 保留位与承载内容的缓冲。

use flint_buffer::ByteBuf;
use flint_core::Result;

/// RSV 保留位在三比特 RSV 域中的取值。
pub mod rsv {
    /// RSV1：permessage-deflate 压缩标志位。
    pub const RSV1: u8 = 0x4;
    /// RSV2：保留。
    pub const RSV2: u8 = 0x2;
    /// RSV3：保留。
    pub const RSV3: u8 = 0x1;
}

/// WebSocket 帧操作码。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// 分片消息的后续帧。
    Continuation,
    /// 文本帧。
    Text,
    /// 二进制帧。
    Binary,
    /// 关闭帧。
    Close,
    /// Ping 帧。
    Ping,
    /// Pong 帧。
    Pong,
}

impl Opcode {
    /// 数据帧：可参与压缩与分片。
    pub fn is_data(&self) -> bool {
        matches!(self, Opcode::Continuation | Opcode::Text | Opcode::Binary)
    }

    /// 控制帧：永不压缩、不可分片。
    pub fn is_control(&self) -> bool {
        !self.is_data()
    }
}

/// `WsFrame` 是帧层与编解码器之间流动的帧记录。
///
/// # 契约说明（What）
/// - `rsv` 仅低三位有效，RSV1 表示内容已按 permessage-deflate 压缩；
/// - `content` 的引用计数随帧移交：消费帧的一方负责 release 或继续传递；
/// - `final_fragment == false` 表示消息尚有后续分片。
#[derive(Debug)]
pub struct WsFrame {
    /// 操作码。
    pub opcode: Opcode,
    /// RSV 保留位（低三位）。
    pub rsv: u8,
    /// 是否为消息的最终分片。
    pub final_fragment: bool,
    /// 帧内容。
    pub content: ByteBuf,
}

impl WsFrame {
    /// 构造单帧消息：`final_fragment = true`，RSV 全零。
    pub fn new(opcode: Opcode, content: ByteBuf) -> Self {
        Self {
            opcode,
            rsv: 0,
            final_fragment: true,
            content,
        }
    }

    /// 按完整标志位构造帧。
    pub fn with_flags(opcode: Opcode, rsv: u8, final_fragment: bool, content: ByteBuf) -> Self {
        Self {
            opcode,
            rsv,
            final_fragment,
            content,
        }
    }

    /// 内容是否为空。
    pub fn is_empty(&self) -> bool {
        self.content.readable_bytes() == 0
    }

    /// 对内容 retain 一次。
    pub fn retain(&self) -> Result<()> {
        self.content.retain()
    }

    /// 对内容 release 一次。
    pub fn release(&self) -> Result<bool> {
        self.content.release()
    }
}
