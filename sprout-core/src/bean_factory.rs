//! Bean 注册表 - 核心容器接口
//!
//! 名称到 Bean 实例的映射：只负责存储和校验，注入与生命周期都建立在它之上

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    bean::{BeanDefinition, BeanInstance, CallableBean, Capabilities, StopWaiter},
    constants::{self, STOP_WAITER_BEAN_NAME},
    error::{BeanError, BeanResult},
    lifecycle::LifecycleOrdering,
};

/// BeanFactory - 最基础的查找接口
///
/// 查找从不失败，不存在时返回 `None`，由调用方判断。
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean
    fn get_bean(&self, name: &str) -> Option<BeanInstance>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool {
        self.get_bean(name).is_some()
    }
}

/// 函数风格的查找：任何 `Fn(&str) -> Option<BeanInstance>` 都可以充当 BeanFactory
impl<F> BeanFactory for F
where
    F: Fn(&str) -> Option<BeanInstance> + Send + Sync,
{
    fn get_bean(&self, name: &str) -> Option<BeanInstance> {
        self(name)
    }
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 通过名称获取指定类型的 Bean，不存在或类型不符都返回 `None`
    fn get_bean_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get_bean(name)?.downcast::<T>().ok()
    }

    /// 获取必需的 Bean
    ///
    /// 供先期注入回调使用：缺失或类型不符时返回带 Bean 名称的错误
    fn require_bean<T: Any + Send + Sync>(&self, name: &str) -> anyhow::Result<Arc<T>> {
        let bean = self
            .get_bean(name)
            .ok_or_else(|| anyhow::anyhow!("required bean '{}' is not registered", name))?;

        bean.downcast::<T>().map_err(|_| {
            anyhow::anyhow!(
                "required bean '{}' is not of type '{}'",
                name,
                std::any::type_name::<T>()
            )
        })
    }
}

impl<F: BeanFactory + ?Sized> BeanFactoryExt for F {}

/// 注册表中的一条记录
struct BeanEntry {
    instance: BeanInstance,
    type_name: &'static str,
    capabilities: Capabilities,
}

/// BeanRegistry - 名称到 Bean 的注册表
///
/// 由 `ApplicationContext` 持有，也可以在测试中单独创建多个互不影响的实例。
///
/// 注册只应发生在单线程的引导阶段（包括先期注入回调内部）。
/// 读写锁只保证 `&self` 注册在回调中是安全的，不支持并发注册；
/// 引导完成后注册表按约定只读，后台任务可以并发查找
pub struct BeanRegistry {
    /// Bean 存储，迭代顺序不保证
    beans: RwLock<HashMap<String, BeanEntry>>,

    /// 启动/停止列表，注册时即完成分类
    ordering: RwLock<LifecycleOrdering>,
}

impl BeanRegistry {
    /// 创建空的注册表
    pub fn new() -> Self {
        Self {
            beans: RwLock::new(HashMap::new()),
            ordering: RwLock::new(LifecycleOrdering::new()),
        }
    }

    /// 注册 Bean
    ///
    /// 名称为空或重复时返回错误，这类错误属于配置错误，调用方应直接终止启动
    pub fn register<T: Any + Send + Sync>(&self, definition: BeanDefinition<T>) -> BeanResult<()> {
        let (name, instance, type_name, capabilities) = definition.into_parts();
        self.insert(
            name,
            BeanEntry {
                instance,
                type_name,
                capabilities,
            },
        )
    }

    /// 注册一个已类型擦除的普通 Bean（没有任何能力）
    ///
    /// `None` 表示缺失的实例，会被拒绝
    pub fn register_instance(
        &self,
        name: impl Into<String>,
        instance: Option<BeanInstance>,
    ) -> BeanResult<()> {
        let name = name.into();
        let Some(instance) = instance else {
            tracing::error!("Bean '{}' registration failed: instance is absent", name);
            return Err(BeanError::AbsentBean(name));
        };

        self.insert(
            name,
            BeanEntry {
                instance,
                type_name: "dyn Any",
                capabilities: Capabilities::default(),
            },
        )
    }

    /// 注册可调用 Bean
    pub fn register_fn<F>(&self, name: impl Into<String>, callback: F) -> BeanResult<()>
    where
        F: Fn(&dyn BeanFactory) + Send + Sync + 'static,
    {
        let callable = Arc::new(CallableBean::new(callback));
        let instance: BeanInstance = callable.clone();

        self.insert(
            name.into(),
            BeanEntry {
                instance,
                type_name: std::any::type_name::<CallableBean>(),
                capabilities: Capabilities {
                    callable: Some(callable),
                    ..Capabilities::default()
                },
            },
        )
    }

    /// 注册停止等待回调
    ///
    /// 使用保留名称注册，第二次注册与普通重名一样返回 `BeanAlreadyExists`
    pub fn register_stop_waiter<F>(&self, waiter: F) -> BeanResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(BeanDefinition::new(STOP_WAITER_BEAN_NAME, StopWaiter::new(waiter)))
    }

    fn insert(&self, name: String, mut entry: BeanEntry) -> BeanResult<()> {
        if name.is_empty() {
            tracing::error!(
                "Bean registration failed: name must not be empty (type '{}')",
                entry.type_name
            );
            return Err(BeanError::EmptyName);
        }

        tracing::trace!(
            "Attempting to register bean: name='{}', type='{}', capabilities={:?}",
            name,
            entry.type_name,
            entry.capabilities.labels()
        );

        // 直接注册的 CallableBean 实例同样归类为可调用 Bean
        if entry.capabilities.callable.is_none() {
            if let Ok(callable) = Arc::clone(&entry.instance).downcast::<CallableBean>() {
                entry.capabilities.callable = Some(callable);
            }
        }

        let capabilities = entry.capabilities.clone();

        {
            let mut beans = self.beans.write();
            if beans.contains_key(&name) {
                tracing::error!("Bean '{}' already exists, registration failed", name);
                return Err(BeanError::BeanAlreadyExists(name));
            }
            beans.insert(name.clone(), entry);
        }

        // 注册时完成启动/停止分类
        {
            let mut ordering = self.ordering.write();
            if let Some(startable) = capabilities.startable {
                ordering.add_startable(name.clone(), startable);
            }
            if let Some(stoppable) = capabilities.stoppable {
                ordering.add_stoppable(name.clone(), stoppable);
            }
        }

        if constants::is_reserved_bean_name(&name) {
            tracing::debug!("Reserved bean registered: '{}'", name);
        } else {
            tracing::debug!("Bean registered successfully: '{}'", name);
        }
        Ok(())
    }

    /// 获取 Bean 注册时的类型名称
    pub fn type_name_of(&self, name: &str) -> Option<&'static str> {
        self.beans.read().get(name).map(|entry| entry.type_name)
    }

    /// 获取所有 Bean 的名称（顺序不保证）
    pub fn bean_names(&self) -> Vec<String> {
        self.beans.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.beans.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.beans.read().is_empty()
    }

    /// 当前启动/停止列表的快照
    pub fn ordering(&self) -> LifecycleOrdering {
        self.ordering.read().clone()
    }

    /// 所有 Bean 能力的快照
    ///
    /// 注入引擎在快照上迭代，回调执行期间不持有锁，因此回调可以继续注册 Bean
    pub(crate) fn capabilities_snapshot(&self) -> Vec<(String, Capabilities)> {
        self.beans
            .read()
            .iter()
            .map(|(name, entry)| (name.clone(), entry.capabilities.clone()))
            .collect()
    }
}

impl Default for BeanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanFactory for BeanRegistry {
    fn get_bean(&self, name: &str) -> Option<BeanInstance> {
        let bean = self
            .beans
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.instance));

        if bean.is_none() {
            tracing::trace!("Bean '{}' not found in registry", name);
        }
        bean
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.beans.read().contains_key(name)
    }
}

impl std::fmt::Debug for BeanRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeanRegistry")
            .field("beans", &self.bean_names())
            .field("ordering", &*self.ordering.read())
            .finish()
    }
}
