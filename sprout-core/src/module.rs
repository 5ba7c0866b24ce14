//! 模块自注册
//!
//! 各业务模块彼此独立，通过 `submit_module!` 在链接期提交自己的注册函数，
//! 由 `ApplicationContext::scan_modules()` 统一执行：
//!
//! ```rust,ignore
//! fn register_database(registry: &BeanRegistry) -> anyhow::Result<()> {
//!     registry.register(BeanDefinition::new("databaseModule", DatabaseModule::default()).pre_injectable())?;
//!     Ok(())
//! }
//!
//! sprout_core::submit_module!("database", register_database);
//! ```

use crate::bean_factory::BeanRegistry;
use crate::error::{BeanError, BeanResult};

/// 模块注册函数类型
///
/// 注册期间的任何错误（重名、配置段缺失等）都会终止启动
pub type ModuleRegistrar = fn(&BeanRegistry) -> anyhow::Result<()>;

/// 模块注册项 - 用于 inventory 收集
pub struct ModuleRegistration {
    pub name: &'static str,
    pub registrar: ModuleRegistrar,
}

inventory::collect!(ModuleRegistration);

/// 提交模块注册函数
#[macro_export]
macro_rules! submit_module {
    ($name:expr, $registrar:path) => {
        $crate::inventory::submit! {
            $crate::module::ModuleRegistration {
                name: $name,
                registrar: $registrar,
            }
        }
    };
}

/// 执行所有已提交的模块注册函数，返回执行的模块数
pub(crate) fn register_all(registry: &BeanRegistry) -> BeanResult<usize> {
    let modules: Vec<&ModuleRegistration> = inventory::iter::<ModuleRegistration>().collect();
    register_modules(registry, modules)
}

fn register_modules(
    registry: &BeanRegistry,
    mut modules: Vec<&ModuleRegistration>,
) -> BeanResult<usize> {
    if modules.is_empty() {
        tracing::debug!("No modules submitted");
        return Ok(0);
    }

    // 链接顺序不固定，按名称排序让日志可复现
    modules.sort_by_key(|module| module.name);

    tracing::info!("Starting module scan, found {} module(s)", modules.len());

    for module in &modules {
        tracing::debug!("  ├─ Registering module: {}", module.name);

        (module.registrar)(registry).map_err(|e| {
            tracing::error!("  └─ Module '{}' failed to register: {:#}", module.name, e);
            BeanError::ModuleRegistrationFailed {
                module: module.name,
                source: e,
            }
        })?;
    }

    tracing::info!(
        "Module scan completed, registered {} module(s), {} bean(s) in total",
        modules.len(),
        registry.len()
    );
    Ok(modules.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean::BeanDefinition;
    use crate::bean_factory::BeanFactory;

    fn register_probe(registry: &BeanRegistry) -> anyhow::Result<()> {
        registry.register(BeanDefinition::new("moduleProbe", "probe".to_string()))?;
        Ok(())
    }

    fn register_duplicate(registry: &BeanRegistry) -> anyhow::Result<()> {
        registry.register(BeanDefinition::new("shared", 1_u8))?;
        registry.register(BeanDefinition::new("shared", 2_u8))?;
        Ok(())
    }

    crate::submit_module!("probe", register_probe);

    #[test]
    fn test_submitted_module_is_registered() {
        let registry = BeanRegistry::new();

        let count = register_all(&registry).unwrap();

        assert!(count >= 1);
        assert!(registry.contains_bean("moduleProbe"));
    }

    #[test]
    fn test_failing_module_is_named() {
        let registry = BeanRegistry::new();
        let ok = ModuleRegistration {
            name: "config",
            registrar: register_probe,
        };
        let broken = ModuleRegistration {
            name: "web",
            registrar: register_duplicate,
        };

        let err = register_modules(&registry, vec![&broken, &ok]).unwrap_err();

        match &err {
            BeanError::ModuleRegistrationFailed { module, source } => {
                assert_eq!(*module, "web");
                assert!(matches!(
                    source.downcast_ref::<BeanError>(),
                    Some(BeanError::BeanAlreadyExists(name)) if name == "shared"
                ));
            }
            other => panic!("Expected ModuleRegistrationFailed, got {:?}", other),
        }
        // 按名称排序后 config 先执行
        assert!(registry.contains_bean("moduleProbe"));
    }
}
