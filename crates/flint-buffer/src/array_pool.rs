//! 进程级字节数组池：按 2 的幂容量档位维护有界自由链表。

use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;
use tracing::debug;

/// 最小档位：64 字节。再小的请求向上取整，避免档位爆炸。
const MIN_CLASS_SHIFT: u32 = 6;
/// 最大档位：4 MiB。超过该容量的数组走直通分配，不进入池。
const MAX_CLASS_SHIFT: u32 = 22;
const CLASS_COUNT: usize = (MAX_CLASS_SHIFT - MIN_CLASS_SHIFT + 1) as usize;
/// 每档自由链表的槽位上限，溢出即丢弃归还的数组。
const PER_CLASS_CAP: usize = 64;

/// `ArrayPool` 是进程范围共享的后备数组池。
///
/// # 模块角色（Why）
/// - 缓冲对象的热路径开销有两块：对象头分配与后备数组分配。本池消除后者，
///   将容量归一到 2 的幂档位后复用，命中时租借仅是一次自由链表弹出；
/// - 池必须进程级共享且线程安全：缓冲可以跨线程释放，线程本地的对象槽
///   归还的数组要能被任意线程再次租走。
///
/// # 核心机制（How）
/// - 每个档位一条 `spin::Mutex<Vec<Box<[u8]>>>` 自由链表，锁粒度按档位拆分，
///   不同容量的租借互不竞争；
/// - 租借时先按档位弹出，未命中则分配全新零填充数组并计入 miss；
/// - 归还时仅接受长度恰为档位值的数组；其余（直通分配、外来数组）静默丢弃，
///   只更新计数，绝不报错。
///
/// # 契约说明（What）
/// - `rent(len)` 返回长度**恰好**为 `len` 的数组；`len` 命中档位则可能是复用内存
///   （内容为上一任租户的残留，调用方以读写游标自行界定有效区）；
/// - `give_back` 对任何数组都不会失败；
/// - `purge` 清空全部档位，作为测试与停机阶段的显式回收钩子。
///
/// # 设计权衡（Trade-offs）
/// - 采用自旋锁而非系统互斥量：临界区只有一次 `Vec` 弹出/压入，
///   自旋代价低于陷入内核；
/// - 归还外来数组选择静默容忍而非断言：包装调用方自有内存的缓冲
///   同样会走到释放路径，池不应因此拖垮通道。
pub struct ArrayPool {
    classes: [Mutex<Vec<Box<[u8]>>>; CLASS_COUNT],
    metrics: PoolMetrics,
}

/// 池运行指标的一致性快照。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// 历史累计向系统申请的字节数。
    pub allocated_bytes: usize,
    /// 当前滞留在自由链表中的字节数。
    pub pooled_bytes: usize,
    /// 当前在外未归还的数组数量。
    pub rented_arrays: usize,
    /// 租借未命中（触发全新分配）的次数。
    pub pool_misses: u64,
    /// 收到的外来/直通数组归还次数（被静默丢弃）。
    pub foreign_returns: u64,
}

impl ArrayPool {
    /// 创建空池。常规代码应优先使用 [`ArrayPool::global`]。
    pub fn new() -> Self {
        Self {
            classes: core::array::from_fn(|_| Mutex::new(Vec::new())),
            metrics: PoolMetrics::default(),
        }
    }

    /// 返回进程级单例。
    ///
    /// 池没有隐式后台任务，单例仅是共享自由链表；测试如需隔离可自建实例。
    pub fn global() -> &'static Arc<ArrayPool> {
        static GLOBAL: OnceLock<Arc<ArrayPool>> = OnceLock::new();
        GLOBAL.get_or_init(|| Arc::new(ArrayPool::new()))
    }

    /// 将请求容量归一化到可租借长度：2 的幂档位，且不超过 `ceiling`。
    ///
    /// `ceiling` 通常是缓冲的 `max_capacity`；当档位值越过上限时退回
    /// 精确长度（走直通分配），保证缓冲容量永不超过上限。
    pub(crate) fn normalize(requested: usize, ceiling: usize) -> usize {
        let floor = requested.max(1 << MIN_CLASS_SHIFT);
        let rounded = floor.checked_next_power_of_two().unwrap_or(requested);
        if rounded <= ceiling { rounded } else { ceiling.max(requested) }
    }

    /// 租借长度恰为 `len` 的数组。
    pub fn rent(&self, len: usize) -> Box<[u8]> {
        if let Some(idx) = class_index(len) {
            let reused = self.classes[idx].lock().pop();
            if let Some(array) = reused {
                self.metrics.on_pooled_rent(len);
                return array;
            }
            self.metrics.on_miss(len);
        } else {
            self.metrics.on_passthrough(len);
        }
        vec![0u8; len].into_boxed_slice()
    }

    /// 归还数组；外来长度被静默丢弃。
    pub fn give_back(&self, array: Box<[u8]>) {
        let len = array.len();
        match class_index(len) {
            Some(idx) => {
                let mut list = self.classes[idx].lock();
                if list.len() < PER_CLASS_CAP {
                    list.push(array);
                    drop(list);
                    self.metrics.on_pooled_return(len);
                } else {
                    drop(list);
                    self.metrics.on_overflow_drop(len);
                }
            }
            None => {
                // 直通分配或调用方自有内存：只记账，不报错。
                self.metrics.on_foreign_return();
            }
        }
    }

    /// 清空全部档位，返回被释放的字节数。测试与停机使用。
    pub fn purge(&self) -> usize {
        let mut reclaimed = 0;
        for class in &self.classes {
            let mut list = class.lock();
            reclaimed += list.iter().map(|a| a.len()).sum::<usize>();
            list.clear();
        }
        self.metrics.on_purge(reclaimed);
        debug!(reclaimed_bytes = reclaimed, "array pool purged");
        reclaimed
    }

    /// 读取指标快照。
    pub fn stats(&self) -> PoolStats {
        self.metrics.snapshot()
    }
}

impl Default for ArrayPool {
    fn default() -> Self {
        Self::new()
    }
}

/// `len` 对应的档位下标；非档位长度返回 `None`。
fn class_index(len: usize) -> Option<usize> {
    if !len.is_power_of_two() {
        return None;
    }
    let shift = len.trailing_zeros();
    if (MIN_CLASS_SHIFT..=MAX_CLASS_SHIFT).contains(&shift) {
        Some((shift - MIN_CLASS_SHIFT) as usize)
    } else {
        None
    }
}

#[derive(Default)]
struct PoolMetrics {
    allocated_bytes: AtomicUsize,
    pooled_bytes: AtomicUsize,
    rented_arrays: AtomicUsize,
    pool_misses: AtomicU64,
    foreign_returns: AtomicU64,
}

impl PoolMetrics {
    fn on_pooled_rent(&self, len: usize) {
        saturating_sub(&self.pooled_bytes, len);
        self.rented_arrays.fetch_add(1, Ordering::Relaxed);
    }

    fn on_miss(&self, len: usize) {
        self.allocated_bytes.fetch_add(len, Ordering::Relaxed);
        self.rented_arrays.fetch_add(1, Ordering::Relaxed);
        self.pool_misses.fetch_add(1, Ordering::Relaxed);
    }

    fn on_passthrough(&self, len: usize) {
        self.allocated_bytes.fetch_add(len, Ordering::Relaxed);
        self.rented_arrays.fetch_add(1, Ordering::Relaxed);
    }

    fn on_pooled_return(&self, len: usize) {
        self.pooled_bytes.fetch_add(len, Ordering::Relaxed);
        saturating_sub_one(&self.rented_arrays);
    }

    fn on_overflow_drop(&self, len: usize) {
        saturating_sub(&self.allocated_bytes, len);
        saturating_sub_one(&self.rented_arrays);
    }

    fn on_foreign_return(&self) {
        self.foreign_returns.fetch_add(1, Ordering::Relaxed);
        saturating_sub_one(&self.rented_arrays);
    }

    fn on_purge(&self, reclaimed: usize) {
        saturating_sub(&self.pooled_bytes, reclaimed);
        saturating_sub(&self.allocated_bytes, reclaimed);
    }

    fn snapshot(&self) -> PoolStats {
        PoolStats {
            allocated_bytes: self.allocated_bytes.load(Ordering::Relaxed),
            pooled_bytes: self.pooled_bytes.load(Ordering::Relaxed),
            rented_arrays: self.rented_arrays.load(Ordering::Relaxed),
            pool_misses: self.pool_misses.load(Ordering::Relaxed),
            foreign_returns: self.foreign_returns.load(Ordering::Relaxed),
        }
    }
}

fn saturating_sub(target: &AtomicUsize, value: usize) {
    let _ = target.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
        Some(current.saturating_sub(value))
    });
}

fn saturating_sub_one(target: &AtomicUsize) {
    saturating_sub(target, 1);
}
