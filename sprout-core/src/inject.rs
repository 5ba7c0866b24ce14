//! 两阶段注入引擎
//!
//! 1. 先期注入：调用所有 PreInjectable，失败即终止（关键基础设施）
//! 2. 一般注入：依次执行可调用 Bean、Injectable/ContainerAware 回调和字段绑定，
//!    失败只记录日志并继续（尽力而为的功能装配）
//!
//! 同一阶段内各 Bean 的执行顺序不保证（注册表基于 HashMap），
//! 回调之间不应存在未声明的顺序依赖

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    bean::BeanInstance,
    bean_factory::{BeanFactory, BeanRegistry},
    container::Container,
    error::{BeanError, BeanResult},
};

/// 按名称注入的字段
///
/// 字段在一般注入阶段由容器赋值；名称不存在或类型不符时保持未绑定
///
/// ```rust,ignore
/// #[derive(BindFields)]
/// struct UserService {
///     #[inject("DB")]
///     db: Autowired<DbPool>,
/// }
/// ```
pub struct Autowired<T> {
    slot: RwLock<Option<Arc<T>>>,
}

impl<T> Autowired<T> {
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(None),
        }
    }

    /// 获取已注入的 Bean
    pub fn get(&self) -> Option<Arc<T>> {
        self.slot.read().clone()
    }

    pub fn is_bound(&self) -> bool {
        self.slot.read().is_some()
    }

    /// 手动赋值（测试或非容器场景）
    pub fn set(&self, bean: Arc<T>) {
        *self.slot.write() = Some(bean);
    }
}

impl<T> Default for Autowired<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Autowired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Autowired")
            .field("type_name", &std::any::type_name::<T>())
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// 可接收 Bean 的字段槽
pub trait BindSlot: Send + Sync {
    /// 尝试绑定，类型不符时原样返回实例
    fn bind(&self, bean: BeanInstance) -> Result<(), BeanInstance>;

    /// 字段期望的类型名称
    fn expected_type(&self) -> &'static str;
}

impl<T: Any + Send + Sync> BindSlot for Autowired<T> {
    fn bind(&self, bean: BeanInstance) -> Result<(), BeanInstance> {
        let typed = bean.downcast::<T>()?;
        self.set(typed);
        Ok(())
    }

    fn expected_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// 单个字段绑定请求
pub struct FieldBinding<'a> {
    /// 要注入的 Bean 名称
    pub bean_name: &'static str,

    /// 字段名称（用于日志）
    pub field: &'static str,

    pub slot: &'a dyn BindSlot,
}

impl<'a> FieldBinding<'a> {
    pub fn new(bean_name: &'static str, field: &'static str, slot: &'a dyn BindSlot) -> Self {
        Self {
            bean_name,
            field,
            slot,
        }
    }
}

/// 声明式字段绑定
///
/// 通常通过 `#[derive(BindFields)]` 实现，列出所有带 `#[inject("name")]` 的字段
pub trait BindFields: Send + Sync {
    fn field_bindings(&self) -> Vec<FieldBinding<'_>>;
}

/// 一般注入阶段的软错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SoftError {
    #[error("bean '{bean}' field '{field}': no bean named '{target}' is registered")]
    MissingBean {
        bean: String,
        field: &'static str,
        target: String,
    },

    #[error("bean '{bean}' field '{field}': bean '{target}' is '{found}', expected '{expected}'")]
    TypeMismatch {
        bean: String,
        field: &'static str,
        target: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("injection callback of bean '{bean}' failed: {message}")]
    InjectFailed { bean: String, message: String },
}

/// 一般注入阶段的结果统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InjectionReport {
    /// 执行的先期注入回调数
    pub pre_injected: usize,

    /// 执行的可调用 Bean 数
    pub callables_invoked: usize,

    /// 执行的一般注入回调数（两种风格合计）
    pub injected: usize,

    /// 成功绑定的字段数
    pub fields_bound: usize,

    /// 记录下来的软错误
    pub soft_errors: Vec<SoftError>,
}

impl InjectionReport {
    pub fn is_clean(&self) -> bool {
        self.soft_errors.is_empty()
    }
}

/// 注入引擎
pub struct InjectionEngine<'a> {
    registry: &'a BeanRegistry,
}

impl<'a> InjectionEngine<'a> {
    pub fn new(registry: &'a BeanRegistry) -> Self {
        Self { registry }
    }

    /// 先期注入阶段
    ///
    /// 在进入阶段时对 PreInjectable 做快照；回调中新注册的 Bean 不会在本阶段被先期注入，
    /// 但会参与后续的一般注入和启动/停止
    pub fn pre_inject(&self) -> BeanResult<usize> {
        let pre_injectables: Vec<_> = self
            .registry
            .capabilities_snapshot()
            .into_iter()
            .filter_map(|(name, caps)| caps.pre_injectable.map(|bean| (name, bean)))
            .collect();

        tracing::info!(
            "Pre-injecting {} bean(s), registry holds {} bean(s)",
            pre_injectables.len(),
            self.registry.len()
        );

        for (name, bean) in &pre_injectables {
            tracing::debug!("  ├─ Pre-injecting bean '{}'", name);

            bean.pre_inject(self.registry).map_err(|e| {
                tracing::error!("Pre-injection of bean '{}' failed: {:#}", name, e);
                BeanError::PreInjectionFailed {
                    bean: name.clone(),
                    source: e,
                }
            })?;
        }

        tracing::info!(
            "Pre-injection completed, registry now holds {} bean(s)",
            self.registry.len()
        );
        Ok(pre_injectables.len())
    }

    /// 一般注入阶段
    ///
    /// 先执行所有可调用 Bean，再对其余 Bean 执行注入回调和字段绑定。
    /// 所有失败都记录在返回的报告中，不会中断装配
    pub fn inject(&self) -> InjectionReport {
        let snapshot = self.registry.capabilities_snapshot();
        let mut report = InjectionReport::default();

        tracing::info!("Injecting dependencies into {} bean(s)", snapshot.len());

        for (name, caps) in &snapshot {
            if let Some(callable) = &caps.callable {
                tracing::debug!("  ├─ Invoking callable bean '{}'", name);
                callable.call(self.registry);
                report.callables_invoked += 1;
            }
        }

        let container = Container::new(self.registry);

        for (name, caps) in &snapshot {
            if caps.callable.is_some() {
                continue;
            }

            if let Some(bean) = &caps.injectable {
                tracing::debug!("  ├─ Injecting bean '{}'", name);
                report.injected += 1;
                if let Err(e) = bean.inject(self.registry) {
                    self.record_callback_failure(&mut report, name, e);
                }
            }

            if let Some(bean) = &caps.container_aware {
                tracing::debug!("  ├─ Injecting container into bean '{}'", name);
                report.injected += 1;
                if let Err(e) = bean.inject_container(&container) {
                    self.record_callback_failure(&mut report, name, e);
                }
            }

            if let Some(binder) = &caps.field_binder {
                self.bind_fields(name, binder.as_ref(), &mut report);
            }
        }

        if report.is_clean() {
            tracing::info!(
                "Injection completed: {} callable(s), {} callback(s), {} field(s) bound",
                report.callables_invoked,
                report.injected,
                report.fields_bound
            );
        } else {
            tracing::warn!(
                "Injection completed with {} soft error(s): {} callable(s), {} callback(s), {} field(s) bound",
                report.soft_errors.len(),
                report.callables_invoked,
                report.injected,
                report.fields_bound
            );
        }
        report
    }

    fn bind_fields(&self, name: &str, binder: &dyn BindFields, report: &mut InjectionReport) {
        for binding in binder.field_bindings() {
            let Some(target) = self.registry.get_bean(binding.bean_name) else {
                let error = SoftError::MissingBean {
                    bean: name.to_string(),
                    field: binding.field,
                    target: binding.bean_name.to_string(),
                };
                tracing::error!("Field binding skipped: {}", error);
                report.soft_errors.push(error);
                continue;
            };

            match binding.slot.bind(target) {
                Ok(()) => {
                    tracing::trace!(
                        "  │  ├─ Bound '{}' into {}.{}",
                        binding.bean_name,
                        name,
                        binding.field
                    );
                    report.fields_bound += 1;
                }
                Err(_) => {
                    let error = SoftError::TypeMismatch {
                        bean: name.to_string(),
                        field: binding.field,
                        target: binding.bean_name.to_string(),
                        expected: binding.slot.expected_type(),
                        found: self
                            .registry
                            .type_name_of(binding.bean_name)
                            .unwrap_or("unknown"),
                    };
                    tracing::error!("Field binding skipped: {}", error);
                    report.soft_errors.push(error);
                }
            }
        }
    }

    fn record_callback_failure(
        &self,
        report: &mut InjectionReport,
        name: &str,
        error: anyhow::Error,
    ) {
        let error = SoftError::InjectFailed {
            bean: name.to_string(),
            message: format!("{:#}", error),
        };
        tracing::error!("{}", error);
        report.soft_errors.push(error);
    }
}
