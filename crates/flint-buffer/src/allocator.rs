//! 缓冲分配门面：统一池化、直通与组合缓冲的获取入口。

use std::sync::Arc;

use flint_core::Result;

use crate::array_pool::ArrayPool;
use crate::byte_buf::ByteBuf;

/// `BufferAllocator` 是流水线组件租借缓冲的对象安全契约。
///
/// # 设计背景（Why）
/// - 编解码器不应关心缓冲来自哪个池、是否池化；通过分配器接口注入，
///   测试可以替换为探针实现，运行时可以按通道定制池策略。
///
/// # 契约说明（What）
/// - `buffer`/`buffer_with_max` 返回池化缓冲，初始容量向上归一到池档位；
/// - `heap_buffer` 返回容量精确等于请求值的直通缓冲；
/// - `composite_buffer` 返回空组合缓冲；
/// - 所有返回值的引用计数为 1，游标与标记归零，由调用方负责 release。
pub trait BufferAllocator: Send + Sync {
    /// 租借一个池化缓冲，容量上限取默认值（不设实际限制）。
    fn buffer(&self, initial: usize) -> Result<ByteBuf>;

    /// 租借一个池化缓冲并指定容量硬上限。
    fn buffer_with_max(&self, initial: usize, max: usize) -> Result<ByteBuf>;

    /// 直通分配：容量精确、不经池档位归一。
    fn heap_buffer(&self, initial: usize) -> Result<ByteBuf>;

    /// 创建空组合缓冲。
    fn composite_buffer(&self) -> Result<ByteBuf>;
}

/// 默认分配器：进程级数组池 + 线程本地对象槽的两级复用。
///
/// 两级结构分别摊平两类成本：数组池消除后备内存分配，线程本地槽消除
/// 缓冲对象头分配；线程本地槽不跨线程共享，租借路径上没有锁竞争。
#[derive(Clone)]
pub struct PooledBufferAllocator {
    pool: Arc<ArrayPool>,
}

impl PooledBufferAllocator {
    /// 绑定指定数组池。测试常以独立池隔离统计。
    pub fn new(pool: Arc<ArrayPool>) -> Self {
        Self { pool }
    }

    /// 绑定进程级共享池。
    pub fn with_global_pool() -> Self {
        Self::new(Arc::clone(ArrayPool::global()))
    }

    /// 当前绑定的数组池。
    pub fn pool(&self) -> &Arc<ArrayPool> {
        &self.pool
    }
}

impl Default for PooledBufferAllocator {
    fn default() -> Self {
        Self::with_global_pool()
    }
}

impl BufferAllocator for PooledBufferAllocator {
    fn buffer(&self, initial: usize) -> Result<ByteBuf> {
        ByteBuf::new_pooled(&self.pool, initial, usize::MAX)
    }

    fn buffer_with_max(&self, initial: usize, max: usize) -> Result<ByteBuf> {
        ByteBuf::new_pooled(&self.pool, initial, max)
    }

    fn heap_buffer(&self, initial: usize) -> Result<ByteBuf> {
        ByteBuf::new_unpooled(&self.pool, initial, usize::MAX)
    }

    fn composite_buffer(&self) -> Result<ByteBuf> {
        Ok(ByteBuf::new_composite(&self.pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pooled_buffer_starts_reset() {
        let allocator = PooledBufferAllocator::new(Arc::new(ArrayPool::new()));
        let buf = allocator.buffer(100).expect("租借缓冲");
        assert_eq!(buf.reference_count(), 1);
        assert_eq!(buf.reader_index(), 0);
        assert_eq!(buf.writer_index(), 0);
        // 池化路径归一到 2 的幂档位。
        assert_eq!(buf.capacity(), 128);
        assert!(buf.release().expect("释放"));
    }

    #[test]
    fn heap_buffer_keeps_exact_capacity() {
        let allocator = PooledBufferAllocator::new(Arc::new(ArrayPool::new()));
        let buf = allocator.heap_buffer(100).expect("直通分配");
        assert_eq!(buf.capacity(), 100);
        assert!(buf.release().expect("释放"));
    }
}
