//! 原子引用计数原语：retain/release 语义与非法状态检测。

use core::sync::atomic::{AtomicU32, Ordering, fence};

use flint_core::{CoreError, Result, codes};

/// `RefCounter` 是缓冲生命周期的原子计数原语。
///
/// # 设计背景（Why）
/// - 池化缓冲的归还时机不能依赖语言层的作用域结束：同一块存储可能被切片、
///   复制视图与组合缓冲共同引用，只有显式计数归零才意味着"最后一个持有者离开"；
/// - 对已释放对象的任何操作都必须确定性失败，否则池内存会被复用者踩踏，
///   产生难以定位的串数据事故。
///
/// # 核心机制（How）
/// - 内部为单个 `AtomicU32`，初值 1；
/// - `retain`/`release` 均走 CAS 循环：先读取当前值并校验合法性，再以
///   `compare_exchange_weak` 提交，失败则重读重试；
/// - 递减采用 `Release` 序，观察到归零的线程再执行一次 `Acquire` 栅栏，
///   与 `Arc` 的经典协议一致，保证释放前的全部写入对回收方可见。
///
/// # 契约说明（What）
/// - **前置条件**：计数为 0 后不允许任何 retain/release；
/// - **后置条件**：`release` 返回 `true` 当且仅当本次调用使计数到达 0，
///   且全进程范围内恰好有一个调用者观察到该转变，由它执行去分配钩子。
///
/// # 风险提示（Trade-offs）
/// - 计数宽度取 32 位：节约缓冲对象头，同时通过溢出检查拒绝超过
///   `u32::MAX` 的持有者数量，这一上限在实际部署中不可能触及。
#[derive(Debug)]
pub struct RefCounter {
    count: AtomicU32,
}

impl RefCounter {
    /// 创建初值为 1 的计数器。
    pub fn new() -> Self {
        Self {
            count: AtomicU32::new(1),
        }
    }

    /// 读取当前计数，仅用于诊断与断言，不构成同步依据。
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    /// 计数加一。
    pub fn retain(&self) -> Result<()> {
        self.retain_n(1)
    }

    /// 计数加 `n`。
    ///
    /// # 契约说明
    /// - `n` 必须为正数；
    /// - 对计数为 0 的对象 retain 会返回 `buffer.illegal_refcount`，
    ///   这是使用方持有悬垂句柄的确定性信号。
    pub fn retain_n(&self, n: u32) -> Result<()> {
        if n == 0 {
            return Err(CoreError::new(
                codes::BUFFER_ILLEGAL_REFCOUNT,
                "retain increment must be positive",
            ));
        }
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current == 0 {
                return Err(CoreError::new(
                    codes::BUFFER_ILLEGAL_REFCOUNT,
                    "retain on an object whose reference count already reached zero",
                ));
            }
            let next = current.checked_add(n).ok_or_else(|| {
                CoreError::new(
                    codes::BUFFER_ILLEGAL_REFCOUNT,
                    "retain would overflow the reference count",
                )
            })?;
            match self
                .count
                .compare_exchange_weak(current, next, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }

    /// 计数减一；返回 `true` 表示计数归零，调用方必须执行去分配钩子。
    pub fn release(&self) -> Result<bool> {
        self.release_n(1)
    }

    /// 计数减 `n`。
    ///
    /// # 契约说明
    /// - 递减量超过当前计数即为非法释放，返回 `buffer.illegal_refcount`；
    /// - 返回 `Ok(true)` 的调用方获得独占回收权：归零后其余线程的任何
    ///   操作都会失败，因此去分配钩子恰好执行一次。
    pub fn release_n(&self, n: u32) -> Result<bool> {
        if n == 0 {
            return Err(CoreError::new(
                codes::BUFFER_ILLEGAL_REFCOUNT,
                "release decrement must be positive",
            ));
        }
        let mut current = self.count.load(Ordering::Relaxed);
        loop {
            if current < n {
                return Err(CoreError::new(
                    codes::BUFFER_ILLEGAL_REFCOUNT,
                    format!("release {n} exceeds current reference count {current}"),
                ));
            }
            match self.count.compare_exchange_weak(
                current,
                current - n,
                Ordering::Release,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    if current == n {
                        // 归零路径：与其它线程的 Release 递减建立 happens-before。
                        fence(Ordering::Acquire);
                        return Ok(true);
                    }
                    return Ok(false);
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// 重新武装为 1，仅供池在确认独占所有权后复用对象时调用。
    pub(crate) fn reset(&self) {
        self.count.store(1, Ordering::Release);
    }

    /// 校验计数为正，供所有公开缓冲操作作为第一道防线。
    pub(crate) fn ensure_live(&self) -> Result<()> {
        if self.count.load(Ordering::Acquire) == 0 {
            return Err(CoreError::new(
                codes::BUFFER_ILLEGAL_REFCOUNT,
                "operation on a released buffer",
            ));
        }
        Ok(())
    }
}

impl Default for RefCounter {
    fn default() -> Self {
        Self::new()
    }
}
