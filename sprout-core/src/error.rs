/// 统一的错误处理类型
///
/// 容器自身的错误使用 `BeanError`（thiserror），
/// 用户回调（pre_inject / inject）返回 `anyhow::Result`，通过 `.context()` 添加上下文。
///
/// # 示例
///
/// ```rust,ignore
/// use anyhow::Context;
///
/// fn pre_inject(&self, registry: &BeanRegistry) -> Result<()> {
///     let config = registry
///         .require_bean::<DatabaseConfig>("database")
///         .context("database module cannot start without its config")?;
///     Ok(())
/// }
/// ```
pub use anyhow::Result;

use crate::context::LifecycleState;

/// 容器错误
///
/// 除 `PreInjectionFailed` 外都属于配置错误，在注册时立即返回
#[derive(Debug, thiserror::Error)]
pub enum BeanError {
    #[error("failed to register bean: name must not be empty")]
    EmptyName,

    #[error("failed to register bean '{0}': bean instance is absent")]
    AbsentBean(String),

    #[error("failed to register bean '{0}': name already exists")]
    BeanAlreadyExists(String),

    #[error("pre-injection of bean '{bean}' failed: {source:#}")]
    PreInjectionFailed {
        bean: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("module '{module}' failed to register its beans: {source:#}")]
    ModuleRegistrationFailed {
        module: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("application context cannot be started twice (current state: {0})")]
    AlreadyStarted(LifecycleState),
}

pub type BeanResult<T> = std::result::Result<T, BeanError>;

/// 应用启动错误
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Bean(#[from] BeanError),

    #[error("failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("failed to load configuration: {0}")]
    ConfigLoadFailed(String),
}

pub type ApplicationResult<T> = std::result::Result<T, ApplicationError>;
