use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::bean_factory::BeanFactory;
use crate::inject::BindFields;
use crate::lifecycle::{ContainerAware, Injectable, PreInjectable, Startable, Stoppable};

/// 容器中保存的 Bean 实例
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// 可调用 Bean
///
/// Bean 本身就是一个 `Fn(&dyn BeanFactory)` 回调，在一般注入阶段最先执行。
/// 用于组合横切的初始化逻辑（例如给 HTTP 路由安装过滤器链），不需要长期存在的身份
pub struct CallableBean {
    callback: Box<dyn Fn(&dyn BeanFactory) + Send + Sync>,
}

impl CallableBean {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&dyn BeanFactory) + Send + Sync + 'static,
    {
        Self {
            callback: Box::new(callback),
        }
    }

    pub fn call(&self, factory: &dyn BeanFactory) {
        (self.callback)(factory)
    }
}

impl fmt::Debug for CallableBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallableBean")
    }
}

/// 停止等待回调
///
/// 以保留名称 `generalStopWaiter` 注册，驱动器在 Running 阶段调用并阻塞在其上
pub struct StopWaiter {
    waiter: Box<dyn Fn() + Send + Sync>,
}

impl StopWaiter {
    pub fn new<F>(waiter: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            waiter: Box::new(waiter),
        }
    }

    /// 阻塞直到外部发出停止信号
    pub fn wait(&self) {
        (self.waiter)()
    }
}

impl fmt::Debug for StopWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StopWaiter")
    }
}

/// 注册时声明的能力集合（类型擦除后）
#[derive(Clone, Default)]
pub(crate) struct Capabilities {
    pub startable: Option<Arc<dyn Startable>>,
    pub stoppable: Option<Arc<dyn Stoppable>>,
    pub pre_injectable: Option<Arc<dyn PreInjectable>>,
    pub injectable: Option<Arc<dyn Injectable>>,
    pub container_aware: Option<Arc<dyn ContainerAware>>,
    pub field_binder: Option<Arc<dyn BindFields>>,
    pub callable: Option<Arc<CallableBean>>,
}

impl Capabilities {
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.startable.is_some() {
            labels.push("startable");
        }
        if self.stoppable.is_some() {
            labels.push("stoppable");
        }
        if self.pre_injectable.is_some() {
            labels.push("pre-injectable");
        }
        if self.injectable.is_some() {
            labels.push("injectable");
        }
        if self.container_aware.is_some() {
            labels.push("container-aware");
        }
        if self.field_binder.is_some() {
            labels.push("field-binding");
        }
        if self.callable.is_some() {
            labels.push("callable");
        }
        labels
    }
}

/// Bean 定义 - 描述一个 Bean 实例以及它声明的能力
///
/// 能力通过构建方法显式声明，每个方法都要求 Bean 类型实现对应的 trait，
/// 因此分类在编译期确定：
///
/// ```rust,ignore
/// registry.register(
///     BeanDefinition::new("dbCloser", Database::default())
///         .pre_injectable()
///         .stoppable(),
/// )?;
/// ```
pub struct BeanDefinition<T> {
    name: String,
    instance: Arc<T>,
    capabilities: Capabilities,
}

impl<T: Any + Send + Sync> BeanDefinition<T> {
    /// 创建新的 Bean 定义
    pub fn new(name: impl Into<String>, bean: T) -> Self {
        Self::from_arc(name, Arc::new(bean))
    }

    /// 使用已有的 `Arc` 创建 Bean 定义，容器中保存的就是这个 `Arc`
    pub fn from_arc(name: impl Into<String>, instance: Arc<T>) -> Self {
        Self {
            name: name.into(),
            instance,
            capabilities: Capabilities::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &Arc<T> {
        &self.instance
    }

    /// 声明启动能力
    pub fn startable(mut self) -> Self
    where
        T: Startable,
    {
        let bean: Arc<dyn Startable> = self.instance.clone();
        self.capabilities.startable = Some(bean);
        self
    }

    /// 声明停止能力
    pub fn stoppable(mut self) -> Self
    where
        T: Stoppable,
    {
        let bean: Arc<dyn Stoppable> = self.instance.clone();
        self.capabilities.stoppable = Some(bean);
        self
    }

    /// 声明先期注入回调
    pub fn pre_injectable(mut self) -> Self
    where
        T: PreInjectable,
    {
        let bean: Arc<dyn PreInjectable> = self.instance.clone();
        self.capabilities.pre_injectable = Some(bean);
        self
    }

    /// 声明一般注入回调（函数风格）
    pub fn injectable(mut self) -> Self
    where
        T: Injectable,
    {
        let bean: Arc<dyn Injectable> = self.instance.clone();
        self.capabilities.injectable = Some(bean);
        self
    }

    /// 声明一般注入回调（Container 门面风格）
    pub fn container_aware(mut self) -> Self
    where
        T: ContainerAware,
    {
        let bean: Arc<dyn ContainerAware> = self.instance.clone();
        self.capabilities.container_aware = Some(bean);
        self
    }

    /// 声明字段绑定（通常由 `#[derive(BindFields)]` 实现）
    pub fn bind_fields(mut self) -> Self
    where
        T: BindFields,
    {
        let bean: Arc<dyn BindFields> = self.instance.clone();
        self.capabilities.field_binder = Some(bean);
        self
    }

    pub(crate) fn into_parts(self) -> (String, BeanInstance, &'static str, Capabilities) {
        let instance: BeanInstance = self.instance;
        (
            self.name,
            instance,
            std::any::type_name::<T>(),
            self.capabilities,
        )
    }
}

impl<T> fmt::Debug for BeanDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("type_name", &std::any::type_name::<T>())
            .field("capabilities", &self.capabilities.labels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Worker;

    impl Startable for Worker {
        fn start_order(&self) -> i32 {
            2
        }

        fn start(&self) {}
    }

    impl Stoppable for Worker {
        fn stop_order(&self) -> i32 {
            2
        }

        fn stop(&self) {}
    }

    #[test]
    fn test_plain_definition_has_no_capabilities() {
        let definition = BeanDefinition::new("cfg", String::from("value"));
        assert_eq!(definition.name(), "cfg");
        assert!(definition.capabilities.labels().is_empty());
    }

    #[test]
    fn test_capabilities_share_the_instance() {
        let definition = BeanDefinition::new("worker", Worker).startable().stoppable();
        assert_eq!(definition.capabilities.labels(), vec!["startable", "stoppable"]);

        let instance = Arc::clone(definition.instance());
        let (name, erased, type_name, capabilities) = definition.into_parts();

        assert_eq!(name, "worker");
        assert!(type_name.ends_with("Worker"));
        assert!(capabilities.startable.is_some());

        let erased = erased.downcast::<Worker>().unwrap();
        assert!(Arc::ptr_eq(&erased, &instance));
    }

    #[test]
    fn test_debug_lists_capabilities() {
        let definition = BeanDefinition::new("worker", Worker).startable();
        let debug = format!("{:?}", definition);
        assert!(debug.contains("worker"));
        assert!(debug.contains("startable"));
    }
}
