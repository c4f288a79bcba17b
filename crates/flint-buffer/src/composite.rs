//! 组合缓冲：把有序组件序列呈现为一个逻辑字节区间，读写按偏移路由。

use std::sync::Arc;

use spin::Mutex;

use flint_core::{CoreError, Result, codes};

use crate::array_pool::ArrayPool;
use crate::byte_buf::{ByteBuf, NodeStorage};

/// 组合缓冲的共享存储：组件列表与后备池句柄。
///
/// # 设计背景（Why）
/// - 编码器把若干压缩输出块拼成一帧内容时不应拷贝；组合缓冲以组件列表
///   承载这些块，并在整体释放时逐一归还每个组件的引用；
/// - 组件的贡献区间在加入时定格为"当时的可读窗口"，此后组件游标的变化
///   不影响组合的寻址，保持路由表稳定。
///
/// # 契约说明（What）
/// - 组合容量 = 各组件区间长度之和；
/// - 读写按绝对偏移线性路由到所在组件，跨组件区间自动分段；
/// - 组合节点计数归零时，对每个组件恰好执行一次 release。
pub(crate) struct CompositeStorage {
    pub(crate) parts: Mutex<Vec<Component>>,
    pub(crate) pool: Arc<ArrayPool>,
}

/// 单个组件及其在组合中的贡献区间。
pub(crate) struct Component {
    pub(crate) buf: ByteBuf,
    /// 区间在组件自身索引空间内的起点（加入时的读游标）。
    pub(crate) start: usize,
    /// 区间长度（加入时的可读字节数，或追加组件的整段容量）。
    pub(crate) len: usize,
}

pub(crate) fn total_len(storage: &CompositeStorage) -> usize {
    storage.parts.lock().iter().map(|c| c.len).sum()
}

pub(crate) fn read_at(storage: &CompositeStorage, mut offset: usize, dst: &mut [u8]) -> Result<()> {
    if dst.is_empty() {
        return Ok(());
    }
    let parts = storage.parts.lock();
    let mut filled = 0;
    for comp in parts.iter() {
        if offset >= comp.len {
            offset -= comp.len;
            continue;
        }
        let take = (comp.len - offset).min(dst.len() - filled);
        comp.buf
            .get_bytes(comp.start + offset, &mut dst[filled..filled + take])?;
        filled += take;
        offset = 0;
        if filled == dst.len() {
            return Ok(());
        }
    }
    Err(CoreError::new(
        codes::BUFFER_INDEX_OUT_OF_RANGE,
        format!("composite read short by {} bytes", dst.len() - filled),
    ))
}

pub(crate) fn write_at(storage: &CompositeStorage, mut offset: usize, src: &[u8]) -> Result<()> {
    if src.is_empty() {
        return Ok(());
    }
    let mut parts = storage.parts.lock();
    let mut consumed = 0;
    for comp in parts.iter_mut() {
        if offset >= comp.len {
            offset -= comp.len;
            continue;
        }
        let take = (comp.len - offset).min(src.len() - consumed);
        comp.buf
            .set_bytes(comp.start + offset, &src[consumed..consumed + take])?;
        consumed += take;
        offset = 0;
        if consumed == src.len() {
            return Ok(());
        }
    }
    Err(CoreError::new(
        codes::BUFFER_INDEX_OUT_OF_RANGE,
        format!("composite write short by {} bytes", src.len() - consumed),
    ))
}

/// 追加一块新的池化组件，使组合容量至少增长 `deficit` 字节。
pub(crate) fn extend(storage: &CompositeStorage, deficit: usize) -> Result<()> {
    let len = ArrayPool::normalize(deficit, usize::MAX);
    let fresh = ByteBuf::new_pooled(&storage.pool, len, usize::MAX)?;
    let span = fresh.capacity();
    storage.parts.lock().push(Component {
        buf: fresh,
        start: 0,
        len: span,
    });
    Ok(())
}

/// 去分配钩子：逐一释放组件；出错时继续释放其余组件，返回首个错误。
pub(crate) fn release_components(storage: &CompositeStorage) -> Result<()> {
    let drained: Vec<Component> = storage.parts.lock().drain(..).collect();
    let mut first_error = None;
    for comp in drained {
        if let Err(err) = comp.buf.release() {
            first_error.get_or_insert(err);
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

impl ByteBuf {
    /// 该句柄是否指向组合缓冲。
    pub fn is_composite(&self) -> bool {
        matches!(self.node.backing().storage, NodeStorage::Composite(_))
    }

    fn composite_storage(&self) -> Result<&CompositeStorage> {
        if self.window_len.is_some() {
            return Err(CoreError::new(
                codes::BUFFER_UNSUPPORTED,
                "composite structure is only editable through the owning handle",
            ));
        }
        match &self.node.backing().storage {
            NodeStorage::Composite(storage) => Ok(storage),
            _ => Err(CoreError::new(
                codes::BUFFER_UNSUPPORTED,
                "not a composite buffer",
            )),
        }
    }

    /// 追加组件，转移调用方持有的那一份引用。
    ///
    /// `advance_writer` 为真时，组合的写游标按组件的可读字节数前移，
    /// 使新内容立即进入可读窗口。
    pub fn add_component(&mut self, component: ByteBuf, advance_writer: bool) -> Result<()> {
        self.node.refs.ensure_live()?;
        component.node.refs.ensure_live()?;
        let start = component.reader_index;
        let len = component.readable_bytes();
        self.composite_storage()?.parts.lock().push(Component {
            buf: component,
            start,
            len,
        });
        if advance_writer {
            self.writer_index += len;
        }
        Ok(())
    }

    /// 追加组件但不转移调用方引用：内部保留一个独立视图。
    pub fn add_component_retained(
        &mut self,
        component: &ByteBuf,
        advance_writer: bool,
    ) -> Result<()> {
        let view = component.retained_duplicate()?;
        self.add_component(view, advance_writer)
    }

    /// 移除第 `index` 个组件并释放其引用；游标被裁剪进缩小后的容量。
    pub fn remove_component(&mut self, index: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        let removed = {
            let storage = self.composite_storage()?;
            let mut parts = storage.parts.lock();
            if index >= parts.len() {
                return Err(CoreError::new(
                    codes::BUFFER_INDEX_OUT_OF_RANGE,
                    format!("component index {index} beyond count {}", parts.len()),
                ));
            }
            parts.remove(index)
        };
        removed.buf.release()?;
        let capacity = self.capacity();
        if self.writer_index > capacity {
            self.writer_index = capacity;
        }
        if self.reader_index > self.writer_index {
            self.reader_index = self.writer_index;
        }
        Ok(())
    }

    /// 当前组件数量。
    pub fn component_count(&self) -> Result<usize> {
        self.node.refs.ensure_live()?;
        match &self.node.backing().storage {
            NodeStorage::Composite(storage) => Ok(storage.parts.lock().len()),
            _ => Err(CoreError::new(
                codes::BUFFER_UNSUPPORTED,
                "not a composite buffer",
            )),
        }
    }
}
