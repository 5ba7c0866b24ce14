use std::any::Any;
use std::sync::Arc;

use crate::bean::BeanInstance;
use crate::bean_factory::{BeanFactory, BeanFactoryExt};
use crate::constants::DB_BEAN_NAME;

/// 容器门面 - 只读的便捷视图
///
/// 给偏好小对象而非裸查找函数的组件使用。
/// 每次调用都直接委托给底层 BeanFactory，不缓存任何结果
#[derive(Clone, Copy)]
pub struct Container<'a> {
    factory: &'a dyn BeanFactory,
}

impl<'a> Container<'a> {
    pub fn new(factory: &'a dyn BeanFactory) -> Self {
        Self { factory }
    }

    /// 通过名称获取 Bean
    pub fn get_bean(&self, name: &str) -> Option<BeanInstance> {
        self.factory.get_bean(name)
    }

    /// 通过名称获取指定类型的 Bean
    pub fn get_bean_as<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.factory.get_bean_as::<T>(name)
    }

    /// 检查是否包含指定名称的 Bean
    pub fn contains_bean(&self, name: &str) -> bool {
        self.factory.contains_bean(name)
    }

    /// 获取数据库句柄（保留名称 `DB`）
    pub fn get_db(&self) -> Option<BeanInstance> {
        self.factory.get_bean(DB_BEAN_NAME)
    }

    /// 获取指定类型的数据库句柄
    pub fn get_db_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.factory.get_bean_as::<T>(DB_BEAN_NAME)
    }
}

impl std::fmt::Debug for Container<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container").finish_non_exhaustive()
    }
}
