//! 线程本地的缓冲对象槽：复用已死的数组节点，摊平对象头分配成本。

use std::cell::RefCell;
use std::sync::Arc;

use crate::array_pool::ArrayPool;
use crate::byte_buf::{BufNode, NodeStorage};

/// 每线程槽位上限；溢出直接丢弃，节点随 `Arc` 正常析构。
const SLOT_CAPACITY: usize = 32;

thread_local! {
    static SLOT: RefCell<Vec<Arc<BufNode>>> = const { RefCell::new(Vec::new()) };
}

/// 收留一个计数已归零的数组节点。
///
/// 调用方（句柄的析构路径）保证：节点存储为数组变体、逻辑计数为 0、
/// 自身持有最后一个 `Arc`。槽满时静默丢弃。回收发生在释放缓冲的线程上，
/// 这是刻意为之：后备数组池是进程级线程安全的，节点壳留在本线程即可。
pub(crate) fn offer(node: Arc<BufNode>) {
    SLOT.with(|slot| {
        let mut ring = slot.borrow_mut();
        if ring.len() < SLOT_CAPACITY {
            ring.push(node);
        }
    });
}

/// 认领一个可复用节点：要求独占所有权、计数为 0、且来源池一致。
///
/// 不满足条件的候选直接丢弃而非放回，避免槽里淤积永远无法复用的节点。
pub(crate) fn claim(pool: &Arc<ArrayPool>) -> Option<Arc<BufNode>> {
    SLOT.with(|slot| {
        let mut ring = slot.borrow_mut();
        while let Some(node) = ring.pop() {
            if Arc::strong_count(&node) != 1 || node.refs.count() != 0 {
                continue;
            }
            match &node.storage {
                NodeStorage::Array(storage) if Arc::ptr_eq(&storage.pool, pool) => {
                    return Some(node);
                }
                _ => continue,
            }
        }
        None
    })
}

#[cfg(test)]
pub(crate) fn slot_depth() -> usize {
    SLOT.with(|slot| slot.borrow().len())
}
