// sprout-core: 组件注册表与生命周期运行时
//
// 提供：
// - 按名称注册的 Bean 容器
// - 两阶段注入（先期注入 / 一般注入）
// - 按顺序启动与停止
// - 配置环境与日志初始化

pub mod app;
pub mod bean;
pub mod bean_factory;
pub mod config;
pub mod constants;
pub mod container;
pub mod context;
pub mod error;
pub mod inject;
pub mod lifecycle;
pub mod logging;
pub mod module;
pub mod shutdown;

// 重新导出常用类型
pub use app::SproutApplication;
pub use bean::{BeanDefinition, BeanInstance, CallableBean, StopWaiter};
pub use bean_factory::{BeanFactory, BeanFactoryExt, BeanRegistry};
pub use config::{
    ConfigValue, Environment, EnvironmentPropertySource, MapPropertySource, PropertySource,
    TomlPropertySource,
};
pub use constants::*;
pub use container::Container;
pub use context::{ApplicationContext, LifecycleState};
pub use error::{ApplicationError, ApplicationResult, BeanError, BeanResult, Result};
pub use inject::{
    Autowired, BindFields, BindSlot, FieldBinding, InjectionEngine, InjectionReport, SoftError,
};
pub use lifecycle::{ContainerAware, Injectable, LifecycleOrdering, PreInjectable, Startable, Stoppable};
pub use logging::{LogFormat, LogLevel, LogOutput, LoggingConfig};
pub use module::{ModuleRegistrar, ModuleRegistration};
pub use shutdown::{ctrl_c_stop_waiter, StopSignal};

// 导出 inventory，供 submit_module! 使用
pub use inventory;

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::app::SproutApplication;
    pub use crate::bean::{BeanDefinition, BeanInstance};
    pub use crate::bean_factory::{BeanFactory, BeanFactoryExt, BeanRegistry};
    pub use crate::config::{ConfigValue, Environment};
    pub use crate::container::Container;
    pub use crate::context::{ApplicationContext, LifecycleState};
    pub use crate::error::{ApplicationResult, BeanError, BeanResult, Result};
    pub use crate::inject::{Autowired, BindFields, FieldBinding};
    pub use crate::lifecycle::{ContainerAware, Injectable, PreInjectable, Startable, Stoppable};
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::shutdown::{ctrl_c_stop_waiter, StopSignal};
    pub use crate::submit_module;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
