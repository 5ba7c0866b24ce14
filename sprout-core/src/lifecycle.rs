//! 生命周期能力与启动/停止排序
//!
//! Bean 通过 `BeanDefinition` 的 `.startable()` / `.stoppable()` 等方法显式声明能力，
//! 注册时即完成分类，不做运行时探测

use std::sync::Arc;

use crate::bean_factory::{BeanFactory, BeanRegistry};
use crate::container::Container;

/// 启动回调
///
/// 在两个注入阶段完成后，按 `start_order` 升序依次同步调用。
/// 需要长期运行的工作应在 `start` 中自行派生后台线程并尽快返回
pub trait Startable: Send + Sync {
    /// 启动顺序（数字越小越先启动）
    fn start_order(&self) -> i32;

    fn start(&self);
}

/// 停止回调
///
/// 停止等待回调返回后，按 `stop_order` 升序依次调用。
/// 即使对应的 `start` 没有成功执行，`stop` 也可能被调用
pub trait Stoppable: Send + Sync {
    /// 停止顺序（数字越小越先停止）
    fn stop_order(&self) -> i32;

    fn stop(&self);
}

/// 先期注入
///
/// 在所有其他回调之前执行一次，用于基础设施的引导：
/// 读取配置、打开连接，并把派生出的 Bean 注册回容器。
///
/// 返回错误会终止启动。各 PreInjectable 之间的执行顺序不保证，
/// 回调只应依赖普通注册的 Bean（配置、日志），不要依赖同阶段其他回调产生的 Bean
pub trait PreInjectable: Send + Sync {
    fn pre_inject(&self, registry: &BeanRegistry) -> anyhow::Result<()>;
}

/// 一般注入（函数风格）
///
/// 在所有 PreInjectable 之后执行一次，可以读取先期注入阶段注册的 Bean。
/// 返回错误只记录日志，不影响其他 Bean 的装配
pub trait Injectable: Send + Sync {
    fn inject(&self, factory: &dyn BeanFactory) -> anyhow::Result<()>;
}

/// 一般注入（门面风格）
///
/// 与 `Injectable` 同一阶段执行，接收只读的 `Container` 门面
pub trait ContainerAware: Send + Sync {
    fn inject_container(&self, container: &Container<'_>) -> anyhow::Result<()>;
}

/// 启动/停止列表
///
/// 注册时追加，驱动器读取时按顺序值做稳定排序，相同顺序值保持注册顺序
#[derive(Clone, Default)]
pub struct LifecycleOrdering {
    startables: Vec<(String, Arc<dyn Startable>)>,
    stoppables: Vec<(String, Arc<dyn Stoppable>)>,
}

impl LifecycleOrdering {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_startable(&mut self, name: impl Into<String>, bean: Arc<dyn Startable>) {
        self.startables.push((name.into(), bean));
    }

    pub fn add_stoppable(&mut self, name: impl Into<String>, bean: Arc<dyn Stoppable>) {
        self.stoppables.push((name.into(), bean));
    }

    pub fn startable_count(&self) -> usize {
        self.startables.len()
    }

    pub fn stoppable_count(&self) -> usize {
        self.stoppables.len()
    }

    /// 按启动顺序排列的 Bean 名称
    pub fn start_sequence(&self) -> Vec<String> {
        self.sorted_startables()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// 按停止顺序排列的 Bean 名称
    pub fn stop_sequence(&self) -> Vec<String> {
        self.sorted_stoppables()
            .into_iter()
            .map(|(name, _)| name)
            .collect()
    }

    /// 依次调用所有启动回调
    pub fn start_all(&self) {
        let startables = self.sorted_startables();
        tracing::info!("Starting {} startable bean(s)", startables.len());

        for (name, bean) in startables {
            tracing::debug!("  ├─ Starting bean '{}' (order {})", name, bean.start_order());
            bean.start();
        }
    }

    /// 依次调用所有停止回调
    pub fn stop_all(&self) {
        let stoppables = self.sorted_stoppables();
        tracing::info!("Stopping {} stoppable bean(s)", stoppables.len());

        for (name, bean) in stoppables {
            tracing::debug!("  ├─ Stopping bean '{}' (order {})", name, bean.stop_order());
            bean.stop();
        }
    }

    fn sorted_startables(&self) -> Vec<(String, Arc<dyn Startable>)> {
        let mut startables = self.startables.clone();
        // sort_by_key 是稳定排序
        startables.sort_by_key(|(_, bean)| bean.start_order());
        startables
    }

    fn sorted_stoppables(&self) -> Vec<(String, Arc<dyn Stoppable>)> {
        let mut stoppables = self.stoppables.clone();
        stoppables.sort_by_key(|(_, bean)| bean.stop_order());
        stoppables
    }
}

impl std::fmt::Debug for LifecycleOrdering {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleOrdering")
            .field("startables", &self.start_sequence())
            .field("stoppables", &self.stop_sequence())
            .finish()
    }
}
