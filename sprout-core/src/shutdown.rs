//! 停止等待回调
//!
//! 驱动器在 Running 阶段阻塞在唯一的停止等待回调上，回调返回即开始停止阶段

use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

/// 阻塞直到收到 Ctrl-C / SIGINT
///
/// 每次调用都在当前线程上创建单线程 tokio 运行时等待信号。
/// 无法创建运行时或监听信号失败时记录错误并立即返回，应用随即进入停止阶段
pub fn ctrl_c_stop_waiter() -> impl Fn() + Send + Sync + 'static {
    || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                tracing::error!("Failed to build signal runtime: {}", e);
                return;
            }
        };

        match runtime.block_on(tokio::signal::ctrl_c()) {
            Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
    }
}

/// 可由代码触发的停止信号
///
/// 克隆的句柄共享同一个信号，适合测试或由后台任务主动结束应用
#[derive(Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发停止，唤醒所有等待者
    pub fn trigger(&self) {
        let (triggered, condvar) = &*self.inner;
        *triggered.lock() = true;
        condvar.notify_all();
        tracing::debug!("Stop signal triggered");
    }

    pub fn is_triggered(&self) -> bool {
        *self.inner.0.lock()
    }

    /// 阻塞直到信号被触发，已经触发时立即返回
    pub fn wait(&self) {
        let (triggered, condvar) = &*self.inner;
        let mut guard = triggered.lock();
        while !*guard {
            condvar.wait(&mut guard);
        }
    }

    /// 转换为停止等待回调
    pub fn waiter(&self) -> impl Fn() + Send + Sync + 'static {
        let signal = self.clone();
        move || signal.wait()
    }
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
