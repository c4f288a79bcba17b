//! 带读写游标与显式引用计数的字节缓冲：持有者、切片、复制视图共享同一存储节点。

use core::cmp::Ordering as CmpOrdering;
use core::fmt;
use core::mem;
use core::ops::{Deref, DerefMut};
use std::sync::Arc;

use spin::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use flint_core::{CoreError, Result, codes};

use crate::array_pool::ArrayPool;
use crate::composite;
use crate::recycler;
use crate::refcount::RefCounter;

/// 存储节点：引用计数与去分配行为的共享载体。
///
/// # 角色定位（Why）
/// - 同一块存储可能被多个句柄引用（切片、复制视图共享父缓冲的计数；
///   保留视图则持有自己的计数并钉住来源）。计数与存储必须放进一个
///   跨句柄共享的节点，才能让"最后一次 release"唯一地触发回收；
/// - `Arc` 只负责节点内存的存活，逻辑生命周期完全由 [`RefCounter`] 决定：
///   计数归零后节点可能仍被悬垂句柄指着，但任何操作都会确定性失败。
///
/// # 结构设计（How）
/// - `Array`：持有后备数组与来源池，归零时数组回池；
/// - `View`：保留视图的计数节点，归零时对来源节点执行一次 release；
/// - `Composite`：组件列表，归零时逐一 release 每个组件。
pub(crate) struct BufNode {
    pub(crate) refs: RefCounter,
    pub(crate) storage: NodeStorage,
}

pub(crate) enum NodeStorage {
    Array(ArrayStorage),
    View(ViewStorage),
    Composite(composite::CompositeStorage),
}

pub(crate) struct ArrayStorage {
    pub(crate) bytes: RwLock<Box<[u8]>>,
    pub(crate) pool: Arc<ArrayPool>,
}

pub(crate) struct ViewStorage {
    pub(crate) origin: Arc<BufNode>,
}

impl BufNode {
    /// 穿透保留视图链，返回真正承载数据的节点（Array 或 Composite）。
    pub(crate) fn backing(&self) -> &BufNode {
        match &self.storage {
            NodeStorage::View(view) => view.origin.backing(),
            _ => self,
        }
    }

    fn root_capacity(&self) -> usize {
        match &self.backing().storage {
            NodeStorage::Array(array) => array.bytes.read().len(),
            NodeStorage::Composite(parts) => composite::total_len(parts),
            NodeStorage::View(_) => unreachable!("backing 已穿透视图链"),
        }
    }

    fn pool(&self) -> &Arc<ArrayPool> {
        match &self.backing().storage {
            NodeStorage::Array(array) => &array.pool,
            NodeStorage::Composite(parts) => &parts.pool,
            NodeStorage::View(_) => unreachable!("backing 已穿透视图链"),
        }
    }
}

/// 对节点执行一次逻辑释放；归零时运行去分配钩子并返回 `true`。
pub(crate) fn release_node(node: &Arc<BufNode>) -> Result<bool> {
    if node.refs.release()? {
        deallocate(node)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn deallocate(node: &Arc<BufNode>) -> Result<()> {
    match &node.storage {
        NodeStorage::Array(array) => {
            let recycled = {
                let mut guard = array.bytes.write();
                mem::take(&mut *guard)
            };
            array.pool.give_back(recycled);
            Ok(())
        }
        NodeStorage::View(view) => release_node(&view.origin).map(|_| ()),
        NodeStorage::Composite(parts) => composite::release_components(parts),
    }
}

/// `ByteBuf` 是框架内唯一的公开缓冲句柄。
///
/// # 设计背景（Why）
/// - 协议编解码需要一个同时具备读写游标、绝对索引访问、切片/复制视图与
///   组合能力的字节容器，且生命周期由显式引用计数驱动，以便池化存储
///   在最后一个持有者离开时确定性归还；
/// - 视图与持有者共享存储节点，写入互相可见，游标彼此独立，
///   与主流反应器框架的缓冲语义对齐。
///
/// # 架构关系（How）
/// - `node` 为共享存储节点；`origin_offset`/`window_len` 将句柄的索引空间
///   平移到根存储的绝对区间；
/// - 所有公开操作先检查引用计数为正，再校验
///   `0 <= reader_index <= writer_index <= capacity <= max_capacity`；
/// - 扩容策略：所需容量向上取 2 的幂，受 `max_capacity` 封顶；
/// - 数据面通过节点内的 `RwLock` 访问，零拷贝窗口以守卫类型暴露，
///   在不引入 `unsafe` 的情况下保持跨句柄写入可见。
///
/// # 契约说明（What）
/// - **后置条件**：任何返回 `Ok` 的公开操作维持上述索引不变式；
/// - 释放后的句柄调用任何读写操作均返回 `buffer.illegal_refcount`；
/// - 读取推进 `reader_index`，写入推进 `writer_index`；`get_*`/`set_*`
///   接受绝对索引且不移动游标。
///
/// # 风险提示（Trade-offs）
/// - 游标不是线程安全的：缓冲跨线程传递时，同一时刻至多一个线程可以
///   对其执行变更操作，计数本身保持原子；
/// - 切片窗口在父缓冲缩容后可能越界，数据面会返回越界错误而非 panic。
pub struct ByteBuf {
    pub(crate) node: Arc<BufNode>,
    pub(crate) origin_offset: usize,
    pub(crate) window_len: Option<usize>,
    pub(crate) max_capacity: usize,
    pub(crate) reader_index: usize,
    pub(crate) writer_index: usize,
    pub(crate) marked_reader: usize,
    pub(crate) marked_writer: usize,
}

impl ByteBuf {
    /// 从池租借一个后备数组并装配句柄；计数置 1，游标与标记归零。
    pub(crate) fn new_pooled(pool: &Arc<ArrayPool>, initial: usize, max: usize) -> Result<Self> {
        if initial > max {
            return Err(CoreError::new(
                codes::BUFFER_CAPACITY_EXCEEDED,
                format!("initial capacity {initial} exceeds max capacity {max}"),
            ));
        }
        let len = ArrayPool::normalize(initial, max);
        let array = pool.rent(len);
        let node = match recycler::claim(pool) {
            Some(node) => {
                if let NodeStorage::Array(storage) = &node.storage {
                    *storage.bytes.write() = array;
                }
                node.refs.reset();
                node
            }
            None => Arc::new(BufNode {
                refs: RefCounter::new(),
                storage: NodeStorage::Array(ArrayStorage {
                    bytes: RwLock::new(array),
                    pool: Arc::clone(pool),
                }),
            }),
        };
        Ok(Self::owner(node, max))
    }

    /// 直通分配：后备数组不经池租借，容量精确等于请求值。
    ///
    /// 释放路径仍会尝试把数组交还给池；非档位长度会被池静默丢弃。
    pub(crate) fn new_unpooled(pool: &Arc<ArrayPool>, initial: usize, max: usize) -> Result<Self> {
        if initial > max {
            return Err(CoreError::new(
                codes::BUFFER_CAPACITY_EXCEEDED,
                format!("initial capacity {initial} exceeds max capacity {max}"),
            ));
        }
        let node = Arc::new(BufNode {
            refs: RefCounter::new(),
            storage: NodeStorage::Array(ArrayStorage {
                bytes: RwLock::new(vec![0u8; initial].into_boxed_slice()),
                pool: Arc::clone(pool),
            }),
        });
        Ok(Self::owner(node, max))
    }

    /// 创建空组合缓冲。
    pub(crate) fn new_composite(pool: &Arc<ArrayPool>) -> Self {
        let node = Arc::new(BufNode {
            refs: RefCounter::new(),
            storage: NodeStorage::Composite(composite::CompositeStorage {
                parts: Mutex::new(Vec::new()),
                pool: Arc::clone(pool),
            }),
        });
        Self::owner(node, usize::MAX)
    }

    fn owner(node: Arc<BufNode>, max: usize) -> Self {
        Self {
            node,
            origin_offset: 0,
            window_len: None,
            max_capacity: max,
            reader_index: 0,
            writer_index: 0,
            marked_reader: 0,
            marked_writer: 0,
        }
    }

    // ---- 容量与游标访问器 ----

    /// 当前已分配的后备容量；可能小于 [`ByteBuf::max_capacity`]。
    pub fn capacity(&self) -> usize {
        match self.window_len {
            Some(len) => len,
            None => self.node.root_capacity(),
        }
    }

    /// 容量硬上限，扩容不得越过。
    pub fn max_capacity(&self) -> usize {
        self.max_capacity
    }

    /// 读游标。
    pub fn reader_index(&self) -> usize {
        self.reader_index
    }

    /// 写游标。
    pub fn writer_index(&self) -> usize {
        self.writer_index
    }

    /// 可读字节数：`writer_index - reader_index`。
    pub fn readable_bytes(&self) -> usize {
        self.writer_index - self.reader_index
    }

    /// 不触发扩容即可写入的字节数。
    pub fn writable_bytes(&self) -> usize {
        self.capacity() - self.writer_index
    }

    /// 允许扩容时的最大可写字节数。
    pub fn max_writable_bytes(&self) -> usize {
        self.max_capacity - self.writer_index
    }

    /// 设置读游标；违反索引不变式时失败。
    pub fn set_reader_index(&mut self, index: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        if index > self.writer_index {
            return Err(CoreError::new(
                codes::BUFFER_INDEX_OUT_OF_RANGE,
                format!(
                    "reader index {index} beyond writer index {}",
                    self.writer_index
                ),
            ));
        }
        self.reader_index = index;
        Ok(())
    }

    /// 设置写游标；违反索引不变式时失败。
    pub fn set_writer_index(&mut self, index: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        if index < self.reader_index || index > self.capacity() {
            return Err(CoreError::new(
                codes::BUFFER_INDEX_OUT_OF_RANGE,
                format!(
                    "writer index {index} outside [{}, {}]",
                    self.reader_index,
                    self.capacity()
                ),
            ));
        }
        self.writer_index = index;
        Ok(())
    }

    /// 一次性设置两个游标。
    pub fn set_index(&mut self, reader: usize, writer: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        if reader > writer || writer > self.capacity() {
            return Err(CoreError::new(
                codes::BUFFER_INDEX_OUT_OF_RANGE,
                format!(
                    "index pair ({reader}, {writer}) violates 0 <= reader <= writer <= {}",
                    self.capacity()
                ),
            ));
        }
        self.reader_index = reader;
        self.writer_index = writer;
        Ok(())
    }

    /// 游标双双归零；不清除数据。
    pub fn clear(&mut self) {
        self.reader_index = 0;
        self.writer_index = 0;
    }

    /// 记录当前读游标为存档点。
    pub fn mark_reader_index(&mut self) {
        self.marked_reader = self.reader_index;
    }

    /// 回退到读存档点。
    pub fn reset_reader_index(&mut self) -> Result<()> {
        let marked = self.marked_reader;
        self.set_reader_index(marked)
    }

    /// 记录当前写游标为存档点。
    pub fn mark_writer_index(&mut self) {
        self.marked_writer = self.writer_index;
    }

    /// 回退到写存档点。
    pub fn reset_writer_index(&mut self) -> Result<()> {
        let marked = self.marked_writer;
        self.set_writer_index(marked)
    }

    // ---- 扩容 ----

    /// 保证至少还有 `needed` 字节可写，必要时扩容。
    ///
    /// 扩容目标取"所需总量向上取 2 的幂"，并受 `max_capacity` 封顶；
    /// 所需总量超过上限即失败，不做部分扩容。切片视图的窗口定长，
    /// 任何触发增长的请求返回 `buffer.unsupported`。
    pub fn ensure_writable(&mut self, needed: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        if self.writable_bytes() >= needed {
            return Ok(());
        }
        // 窗口判定先于容量判定：切片的 max_capacity 即窗口长度，
        // 后判会把"不支持增长"误报为容量超限。
        if self.window_len.is_some() {
            return Err(CoreError::new(
                codes::BUFFER_UNSUPPORTED,
                "sliced view cannot grow its window",
            ));
        }
        let required = self.writer_index.checked_add(needed).ok_or_else(|| {
            CoreError::new(codes::BUFFER_CAPACITY_EXCEEDED, "requested capacity overflows")
        })?;
        if required > self.max_capacity {
            return Err(CoreError::new(
                codes::BUFFER_CAPACITY_EXCEEDED,
                format!(
                    "required capacity {required} exceeds max capacity {}",
                    self.max_capacity
                ),
            ));
        }
        match &self.node.backing().storage {
            NodeStorage::Array(array) => {
                let target = ArrayPool::normalize(required, self.max_capacity);
                grow_array(array, target);
                Ok(())
            }
            NodeStorage::Composite(parts) => {
                let deficit = required - self.capacity();
                composite::extend(parts, deficit)
            }
            NodeStorage::View(_) => unreachable!("backing 已穿透视图链"),
        }
    }

    /// 将容量调整为精确的 `new_capacity`。
    ///
    /// 缩容时把游标裁剪进新区间；数据拷贝 `min(old, new)` 字节，
    /// 旧数组交还池。仅数组持有者（及其复制视图）可调整。
    pub fn adjust_capacity(&mut self, new_capacity: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        if new_capacity > self.max_capacity {
            return Err(CoreError::new(
                codes::BUFFER_CAPACITY_EXCEEDED,
                format!(
                    "new capacity {new_capacity} exceeds max capacity {}",
                    self.max_capacity
                ),
            ));
        }
        if self.window_len.is_some() {
            return Err(CoreError::new(
                codes::BUFFER_UNSUPPORTED,
                "sliced view cannot adjust capacity",
            ));
        }
        let NodeStorage::Array(array) = &self.node.backing().storage else {
            return Err(CoreError::new(
                codes::BUFFER_UNSUPPORTED,
                "only array-backed buffers can adjust capacity",
            ));
        };
        {
            let mut guard = array.bytes.write();
            if guard.len() != new_capacity {
                let mut fresh = array.pool.rent(new_capacity);
                let keep = guard.len().min(new_capacity);
                fresh[..keep].copy_from_slice(&guard[..keep]);
                let old = mem::replace(&mut *guard, fresh);
                array.pool.give_back(old);
            }
        }
        if self.writer_index > new_capacity {
            self.writer_index = new_capacity;
        }
        if self.reader_index > self.writer_index {
            self.reader_index = self.writer_index;
        }
        Ok(())
    }

    // ---- 数据面基础操作 ----

    fn abs(&self, index: usize) -> usize {
        self.origin_offset + index
    }

    fn check_abs(&self, index: usize, len: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        let end = index.checked_add(len).ok_or_else(|| {
            CoreError::new(codes::BUFFER_INDEX_OUT_OF_RANGE, "index range overflows")
        })?;
        if end > self.capacity() {
            return Err(CoreError::new(
                codes::BUFFER_INDEX_OUT_OF_RANGE,
                format!("range [{index}, {end}) beyond capacity {}", self.capacity()),
            ));
        }
        Ok(())
    }

    fn check_readable(&self, len: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        if self.readable_bytes() < len {
            return Err(CoreError::new(
                codes::BUFFER_INDEX_OUT_OF_RANGE,
                format!(
                    "read of {len} bytes exceeds readable window {}",
                    self.readable_bytes()
                ),
            ));
        }
        Ok(())
    }

    fn raw_get(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        let start = self.abs(index);
        match &self.node.backing().storage {
            NodeStorage::Array(array) => {
                let guard = array.bytes.read();
                let end = start + dst.len();
                if end > guard.len() {
                    return Err(CoreError::new(
                        codes::BUFFER_INDEX_OUT_OF_RANGE,
                        format!("window [{start}, {end}) beyond backing array {}", guard.len()),
                    ));
                }
                dst.copy_from_slice(&guard[start..end]);
                Ok(())
            }
            NodeStorage::Composite(parts) => composite::read_at(parts, start, dst),
            NodeStorage::View(_) => unreachable!("backing 已穿透视图链"),
        }
    }

    fn raw_set(&mut self, index: usize, src: &[u8]) -> Result<()> {
        let start = self.abs(index);
        match &self.node.backing().storage {
            NodeStorage::Array(array) => {
                let mut guard = array.bytes.write();
                let end = start + src.len();
                if end > guard.len() {
                    return Err(CoreError::new(
                        codes::BUFFER_INDEX_OUT_OF_RANGE,
                        format!("window [{start}, {end}) beyond backing array {}", guard.len()),
                    ));
                }
                guard[start..end].copy_from_slice(src);
                Ok(())
            }
            NodeStorage::Composite(parts) => composite::write_at(parts, start, src),
            NodeStorage::View(_) => unreachable!("backing 已穿透视图链"),
        }
    }

    // ---- 字节切片访问 ----

    /// 绝对位置读取，不移动游标。
    pub fn get_bytes(&self, index: usize, dst: &mut [u8]) -> Result<()> {
        self.check_abs(index, dst.len())?;
        self.raw_get(index, dst)
    }

    /// 绝对位置写入，不移动游标。
    pub fn set_bytes(&mut self, index: usize, src: &[u8]) -> Result<()> {
        self.check_abs(index, src.len())?;
        self.raw_set(index, src)
    }

    /// 从读游标读取并推进。
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.check_readable(dst.len())?;
        let reader = self.reader_index;
        self.raw_get(reader, dst)?;
        self.reader_index += dst.len();
        Ok(())
    }

    /// 读取 `len` 字节到一个新的池化缓冲并推进读游标。
    pub fn read_bytes_buf(&mut self, len: usize) -> Result<ByteBuf> {
        self.check_readable(len)?;
        let out = self.copy(self.reader_index, len)?;
        self.reader_index += len;
        Ok(out)
    }

    /// 在写游标处追加并推进；空间不足时按扩容策略增长。
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        self.ensure_writable(src.len())?;
        let writer = self.writer_index;
        self.raw_set(writer, src)?;
        self.writer_index += src.len();
        Ok(())
    }

    /// 跳过 `len` 个可读字节。
    pub fn skip_bytes(&mut self, len: usize) -> Result<()> {
        self.check_readable(len)?;
        self.reader_index += len;
        Ok(())
    }

    /// 可读区间的堆快照，供比较、搜索与测试使用。
    pub fn to_vec(&self) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.readable_bytes()];
        let reader = self.reader_index;
        self.check_abs(reader, out.len())?;
        self.raw_get(reader, &mut out)?;
        Ok(out)
    }

    // ---- 视图与深拷贝 ----

    /// 非保留切片：与父缓冲共享存储**与引用计数**，游标独立。
    ///
    /// 对切片执行 `release` 等价于对父缓冲执行一次 `release`。
    pub fn slice(&self, index: usize, len: usize) -> Result<ByteBuf> {
        self.check_abs(index, len)?;
        Ok(ByteBuf {
            node: Arc::clone(&self.node),
            origin_offset: self.abs(index),
            window_len: Some(len),
            max_capacity: len,
            reader_index: 0,
            writer_index: len,
            marked_reader: 0,
            marked_writer: 0,
        })
    }

    /// 保留切片：持有独立计数，构造时 retain 来源一次，归零时释放来源。
    pub fn retained_slice(&self, index: usize, len: usize) -> Result<ByteBuf> {
        self.check_abs(index, len)?;
        self.node.refs.retain()?;
        let node = Arc::new(BufNode {
            refs: RefCounter::new(),
            storage: NodeStorage::View(ViewStorage {
                origin: Arc::clone(&self.node),
            }),
        });
        Ok(ByteBuf {
            node,
            origin_offset: self.abs(index),
            window_len: Some(len),
            max_capacity: len,
            reader_index: 0,
            writer_index: len,
            marked_reader: 0,
            marked_writer: 0,
        })
    }

    /// 非保留复制视图：覆盖整个存储，游标独立，计数共享。
    pub fn duplicate(&self) -> Result<ByteBuf> {
        self.node.refs.ensure_live()?;
        Ok(ByteBuf {
            node: Arc::clone(&self.node),
            origin_offset: self.origin_offset,
            window_len: self.window_len,
            max_capacity: self.max_capacity,
            reader_index: self.reader_index,
            writer_index: self.writer_index,
            marked_reader: 0,
            marked_writer: 0,
        })
    }

    /// 保留复制视图：独立计数版本的 [`ByteBuf::duplicate`]。
    pub fn retained_duplicate(&self) -> Result<ByteBuf> {
        self.node.refs.ensure_live()?;
        self.node.refs.retain()?;
        let node = Arc::new(BufNode {
            refs: RefCounter::new(),
            storage: NodeStorage::View(ViewStorage {
                origin: Arc::clone(&self.node),
            }),
        });
        Ok(ByteBuf {
            node,
            origin_offset: self.origin_offset,
            window_len: self.window_len,
            max_capacity: self.max_capacity,
            reader_index: self.reader_index,
            writer_index: self.writer_index,
            marked_reader: 0,
            marked_writer: 0,
        })
    }

    /// 深拷贝 `[index, index + len)` 到新分配的池化缓冲。
    pub fn copy(&self, index: usize, len: usize) -> Result<ByteBuf> {
        self.check_abs(index, len)?;
        let mut tmp = vec![0u8; len];
        self.raw_get(index, &mut tmp)?;
        let mut out = ByteBuf::new_pooled(self.node.pool(), len, usize::MAX)?;
        out.write_bytes(&tmp)?;
        Ok(out)
    }

    // ---- 搜索与比较 ----

    /// 在可读区间内搜索字节序列。
    ///
    /// 命中时返回以缓冲绝对索引表示的位置（从读游标起扫描）；
    /// 未命中返回 `None`，承载与来源实现中 −1 相同的信息。
    pub fn index_of(&self, needle: &[u8]) -> Result<Option<usize>> {
        self.node.refs.ensure_live()?;
        if needle.is_empty() {
            return Ok(Some(self.reader_index));
        }
        let haystack = self.to_vec()?;
        Ok(haystack
            .windows(needle.len())
            .position(|window| window == needle)
            .map(|pos| pos + self.reader_index))
    }

    /// 可读区间的字节序比较。
    pub fn compare_to(&self, other: &ByteBuf) -> Result<CmpOrdering> {
        Ok(self.to_vec()?.cmp(&other.to_vec()?))
    }

    // ---- 零拷贝窗口 ----

    /// 返回 `[index, index + len)` 的只读零拷贝窗口。
    ///
    /// 窗口存活期间持有存储读锁：其它句柄的读取并行不受影响，
    /// 写入与扩容会被推迟到窗口释放之后。组合缓冲的跨组件区间
    /// 不连续，返回 `buffer.unsupported`。
    pub fn readable_span(&self, index: usize, len: usize) -> Result<ReadableSpan<'_>> {
        self.check_abs(index, len)?;
        let start = self.abs(index);
        match &self.node.backing().storage {
            NodeStorage::Array(array) => {
                let guard = array.bytes.read();
                if start + len > guard.len() {
                    return Err(CoreError::new(
                        codes::BUFFER_INDEX_OUT_OF_RANGE,
                        format!(
                            "span [{start}, {}) beyond backing array {}",
                            start + len,
                            guard.len()
                        ),
                    ));
                }
                Ok(ReadableSpan { guard, start, len })
            }
            NodeStorage::Composite(_) => Err(CoreError::new(
                codes::BUFFER_UNSUPPORTED,
                "composite buffer cannot expose a contiguous span",
            )),
            NodeStorage::View(_) => unreachable!("backing 已穿透视图链"),
        }
    }

    /// 在写游标处开出 `len` 字节的可写窗口，配合 [`ByteBuf::advance_writer`] 使用。
    ///
    /// 调用前自动按扩容策略保证空间。窗口存活期间持有存储写锁。
    pub fn writable_span(&mut self, len: usize) -> Result<WritableSpan<'_>> {
        self.ensure_writable(len)?;
        let start = self.abs(self.writer_index);
        match &self.node.backing().storage {
            NodeStorage::Array(array) => {
                let guard = array.bytes.write();
                if start + len > guard.len() {
                    return Err(CoreError::new(
                        codes::BUFFER_INDEX_OUT_OF_RANGE,
                        format!(
                            "span [{start}, {}) beyond backing array {}",
                            start + len,
                            guard.len()
                        ),
                    ));
                }
                Ok(WritableSpan { guard, start, len })
            }
            NodeStorage::Composite(_) => Err(CoreError::new(
                codes::BUFFER_UNSUPPORTED,
                "composite buffer cannot expose a contiguous span",
            )),
            NodeStorage::View(_) => unreachable!("backing 已穿透视图链"),
        }
    }

    /// 声明已通过可写窗口填充 `len` 字节，推进写游标。
    pub fn advance_writer(&mut self, len: usize) -> Result<()> {
        self.node.refs.ensure_live()?;
        if self.writer_index + len > self.capacity() {
            return Err(CoreError::new(
                codes::BUFFER_INDEX_OUT_OF_RANGE,
                format!(
                    "advance of {len} beyond capacity {} at writer {}",
                    self.capacity(),
                    self.writer_index
                ),
            ));
        }
        self.writer_index += len;
        Ok(())
    }

    // ---- 生命周期 ----

    /// 计数加一。
    pub fn retain(&self) -> Result<()> {
        self.node.refs.retain()
    }

    /// 计数加 `n`。
    pub fn retain_n(&self, n: u32) -> Result<()> {
        self.node.refs.retain_n(n)
    }

    /// 计数减一；归零时存储立即归还池，返回 `true`。
    pub fn release(&self) -> Result<bool> {
        release_node(&self.node)
    }

    /// 计数减 `n`。
    pub fn release_n(&self, n: u32) -> Result<bool> {
        if self.node.refs.release_n(n)? {
            deallocate(&self.node)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// 当前引用计数。
    pub fn reference_count(&self) -> u32 {
        self.node.refs.count()
    }

    /// 调试钩子：记录缓冲流经的位置，默认不产生任何行为。
    pub fn touch(&self, _hint: &str) -> &Self {
        self
    }
}

/// 持有者与视图共享的扩容入口；并发下后到者观察到已增长则直接返回。
fn grow_array(array: &ArrayStorage, target: usize) {
    let mut guard = array.bytes.write();
    if guard.len() >= target {
        return;
    }
    let mut fresh = array.pool.rent(target);
    fresh[..guard.len()].copy_from_slice(&guard);
    let old = mem::replace(&mut *guard, fresh);
    array.pool.give_back(old);
}

impl Drop for ByteBuf {
    fn drop(&mut self) {
        // 最后一个指向已死数组节点的句柄离开时，把节点壳交给线程本地槽复用。
        if self.node.refs.count() == 0
            && matches!(self.node.storage, NodeStorage::Array(_))
            && Arc::strong_count(&self.node) == 1
        {
            recycler::offer(Arc::clone(&self.node));
        }
    }
}

impl PartialEq for ByteBuf {
    fn eq(&self, other: &Self) -> bool {
        match (self.to_vec(), other.to_vec()) {
            (Ok(lhs), Ok(rhs)) => lhs == rhs,
            _ => false,
        }
    }
}

impl fmt::Debug for ByteBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuf")
            .field("reader_index", &self.reader_index)
            .field("writer_index", &self.writer_index)
            .field("capacity", &self.capacity())
            .field("refs", &self.reference_count())
            .finish()
    }
}

/// 只读零拷贝窗口；`Deref` 到目标字节区间。
pub struct ReadableSpan<'a> {
    guard: RwLockReadGuard<'a, Box<[u8]>>,
    start: usize,
    len: usize,
}

impl Deref for ReadableSpan<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.start..self.start + self.len]
    }
}

/// 可写零拷贝窗口；`DerefMut` 到目标字节区间。
pub struct WritableSpan<'a> {
    guard: RwLockWriteGuard<'a, Box<[u8]>>,
    start: usize,
    len: usize,
}

impl Deref for WritableSpan<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.guard[self.start..self.start + self.len]
    }
}

impl DerefMut for WritableSpan<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.guard[self.start..self.start + self.len]
    }
}

// ---- 数值访问器 ----

macro_rules! wide_accessors {
    ($ty:ty, $bytes:literal, $get:ident, $get_le:ident, $set:ident, $set_le:ident,
     $read:ident, $read_le:ident, $write:ident, $write_le:ident) => {
        impl ByteBuf {
            #[doc = concat!("以大端序读取绝对位置 `index` 的 `", stringify!($ty), "`。")]
            pub fn $get(&self, index: usize) -> Result<$ty> {
                let mut raw = [0u8; $bytes];
                self.get_bytes(index, &mut raw)?;
                Ok(<$ty>::from_be_bytes(raw))
            }

            #[doc = concat!("以小端序读取绝对位置 `index` 的 `", stringify!($ty), "`。")]
            pub fn $get_le(&self, index: usize) -> Result<$ty> {
                let mut raw = [0u8; $bytes];
                self.get_bytes(index, &mut raw)?;
                Ok(<$ty>::from_le_bytes(raw))
            }

            #[doc = concat!("以大端序写入绝对位置 `index`，不移动游标。")]
            pub fn $set(&mut self, index: usize, value: $ty) -> Result<()> {
                self.set_bytes(index, &value.to_be_bytes())
            }

            #[doc = concat!("以小端序写入绝对位置 `index`，不移动游标。")]
            pub fn $set_le(&mut self, index: usize, value: $ty) -> Result<()> {
                self.set_bytes(index, &value.to_le_bytes())
            }

            #[doc = concat!("从读游标以大端序读取 `", stringify!($ty), "` 并推进。")]
            pub fn $read(&mut self) -> Result<$ty> {
                self.check_readable($bytes)?;
                let value = self.$get(self.reader_index)?;
                self.reader_index += $bytes;
                Ok(value)
            }

            #[doc = concat!("从读游标以小端序读取 `", stringify!($ty), "` 并推进。")]
            pub fn $read_le(&mut self) -> Result<$ty> {
                self.check_readable($bytes)?;
                let value = self.$get_le(self.reader_index)?;
                self.reader_index += $bytes;
                Ok(value)
            }

            #[doc = concat!("在写游标以大端序追加 `", stringify!($ty), "` 并推进。")]
            pub fn $write(&mut self, value: $ty) -> Result<()> {
                self.ensure_writable($bytes)?;
                let writer = self.writer_index;
                self.$set(writer, value)?;
                self.writer_index += $bytes;
                Ok(())
            }

            #[doc = concat!("在写游标以小端序追加 `", stringify!($ty), "` 并推进。")]
            pub fn $write_le(&mut self, value: $ty) -> Result<()> {
                self.ensure_writable($bytes)?;
                let writer = self.writer_index;
                self.$set_le(writer, value)?;
                self.writer_index += $bytes;
                Ok(())
            }
        }
    };
}

macro_rules! byte_accessors {
    ($ty:ty, $get:ident, $set:ident, $read:ident, $write:ident) => {
        impl ByteBuf {
            #[doc = concat!("读取绝对位置 `index` 的 `", stringify!($ty), "`。")]
            pub fn $get(&self, index: usize) -> Result<$ty> {
                let mut raw = [0u8; 1];
                self.get_bytes(index, &mut raw)?;
                Ok(raw[0] as $ty)
            }

            #[doc = concat!("写入绝对位置 `index`，不移动游标。")]
            pub fn $set(&mut self, index: usize, value: $ty) -> Result<()> {
                self.set_bytes(index, &[value as u8])
            }

            #[doc = concat!("从读游标读取 `", stringify!($ty), "` 并推进。")]
            pub fn $read(&mut self) -> Result<$ty> {
                self.check_readable(1)?;
                let value = self.$get(self.reader_index)?;
                self.reader_index += 1;
                Ok(value)
            }

            #[doc = concat!("在写游标追加 `", stringify!($ty), "` 并推进。")]
            pub fn $write(&mut self, value: $ty) -> Result<()> {
                self.ensure_writable(1)?;
                let writer = self.writer_index;
                self.$set(writer, value)?;
                self.writer_index += 1;
                Ok(())
            }
        }
    };
}

byte_accessors!(u8, get_u8, set_u8, read_u8, write_u8);
byte_accessors!(i8, get_i8, set_i8, read_i8, write_i8);
wide_accessors!(u16, 2, get_u16, get_u16_le, set_u16, set_u16_le, read_u16, read_u16_le, write_u16, write_u16_le);
wide_accessors!(i16, 2, get_i16, get_i16_le, set_i16, set_i16_le, read_i16, read_i16_le, write_i16, write_i16_le);
wide_accessors!(u32, 4, get_u32, get_u32_le, set_u32, set_u32_le, read_u32, read_u32_le, write_u32, write_u32_le);
wide_accessors!(i32, 4, get_i32, get_i32_le, set_i32, set_i32_le, read_i32, read_i32_le, write_i32, write_i32_le);
wide_accessors!(u64, 8, get_u64, get_u64_le, set_u64, set_u64_le, read_u64, read_u64_le, write_u64, write_u64_le);
wide_accessors!(i64, 8, get_i64, get_i64_le, set_i64, set_i64_le, read_i64, read_i64_le, write_i64, write_i64_le);
wide_accessors!(f32, 4, get_f32, get_f32_le, set_f32, set_f32_le, read_f32, read_f32_le, write_f32, write_f32_le);
wide_accessors!(f64, 8, get_f64, get_f64_le, set_f64, set_f64_le, read_f64, read_f64_le, write_f64, write_f64_le);
