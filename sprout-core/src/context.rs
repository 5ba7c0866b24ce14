use std::any::Any;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{
    bean::{BeanDefinition, BeanInstance, StopWaiter},
    bean_factory::{BeanFactory, BeanFactoryExt, BeanRegistry},
    config::Environment,
    constants::{ENVIRONMENT_BEAN_NAME, STOP_WAITER_BEAN_NAME},
    error::{BeanError, BeanResult},
    inject::{InjectionEngine, InjectionReport},
    module,
};

/// 运行阶段
///
/// 只能单向推进：`Idle → PreInjecting → Injecting → Starting → Running → Stopping → Terminated`。
/// 没有注册停止等待回调时，从 `Starting` 直接进入 `Terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Idle,
    PreInjecting,
    Injecting,
    Starting,
    Running,
    Stopping,
    Terminated,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::PreInjecting => "pre-injecting",
            LifecycleState::Injecting => "injecting",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 应用上下文 - 持有注册表并驱动整个生命周期
///
/// 初始化期间各模块调用 `register*` 发布组件，之后调用一次 `start()`：
/// 先期注入 → 一般注入 → 按序启动 → 阻塞在停止等待回调上 → 按序停止
pub struct ApplicationContext {
    /// Bean 注册表
    registry: BeanRegistry,

    /// 当前运行阶段
    state: RwLock<LifecycleState>,

    /// 应用名称（用于日志）
    app_name: RwLock<Option<String>>,
}

impl ApplicationContext {
    pub fn new() -> Self {
        Self {
            registry: BeanRegistry::new(),
            state: RwLock::new(LifecycleState::Idle),
            app_name: RwLock::new(None),
        }
    }

    /// 设置应用名称
    pub fn set_app_name(&self, name: impl Into<String>) {
        *self.app_name.write() = Some(name.into());
    }

    /// 获取应用名称
    pub fn app_name(&self) -> Option<String> {
        self.app_name.read().clone()
    }

    /// 获取内部的注册表
    pub fn registry(&self) -> &BeanRegistry {
        &self.registry
    }

    /// 当前运行阶段
    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    /// 注册 Bean
    pub fn register<T: Any + Send + Sync>(&self, definition: BeanDefinition<T>) -> BeanResult<()> {
        self.registry.register(definition)
    }

    /// 注册已类型擦除的普通 Bean
    pub fn register_instance(
        &self,
        name: impl Into<String>,
        instance: Option<BeanInstance>,
    ) -> BeanResult<()> {
        self.registry.register_instance(name, instance)
    }

    /// 注册可调用 Bean
    pub fn register_fn<F>(&self, name: impl Into<String>, callback: F) -> BeanResult<()>
    where
        F: Fn(&dyn BeanFactory) + Send + Sync + 'static,
    {
        self.registry.register_fn(name, callback)
    }

    /// 注册停止等待回调（全局唯一）
    pub fn register_stop_waiter<F>(&self, waiter: F) -> BeanResult<()>
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.registry.register_stop_waiter(waiter)
    }

    /// 获取配置环境（由 `SproutApplication` 以保留名称 `environment` 注册）
    pub fn environment(&self) -> Option<Arc<Environment>> {
        self.registry.get_bean_as::<Environment>(ENVIRONMENT_BEAN_NAME)
    }

    /// 运行所有通过 `submit_module!` 提交的模块注册函数
    ///
    /// 第一个失败的模块会终止扫描，错误中带有模块名称
    pub fn scan_modules(&self) -> BeanResult<usize> {
        module::register_all(&self.registry)
    }

    /// 驱动整个生命周期，只能调用一次
    ///
    /// 注册了停止等待回调时，此方法会一直阻塞到回调返回并完成停止阶段。
    /// 先期注入失败时返回错误，此时不会执行任何启动回调
    pub fn start(&self) -> BeanResult<InjectionReport> {
        {
            let mut state = self.state.write();
            if *state != LifecycleState::Idle {
                tracing::error!("Application context already started (state: {})", *state);
                return Err(BeanError::AlreadyStarted(*state));
            }
            *state = LifecycleState::PreInjecting;
        }

        let app_name = self
            .app_name()
            .unwrap_or_else(|| "Application".to_string());
        tracing::info!(
            "Starting {} with {} registered bean(s)",
            app_name,
            self.registry.len()
        );

        let engine = InjectionEngine::new(&self.registry);
        let pre_injected = engine.pre_inject().inspect_err(|e| {
            tracing::error!("{} failed to start: {}", app_name, e);
        })?;

        self.transition(LifecycleState::Injecting);
        let mut report = engine.inject();
        report.pre_injected = pre_injected;

        // 两个注入阶段结束后才读取启动/停止列表，先期注入期间注册的 Bean 也会被包含
        let ordering = self.registry.ordering();

        self.transition(LifecycleState::Starting);
        ordering.start_all();

        let Some(waiter) = self.stop_waiter() else {
            tracing::info!(
                "No stop waiter registered, {} terminates after start",
                app_name
            );
            self.transition(LifecycleState::Terminated);
            return Ok(report);
        };

        self.transition(LifecycleState::Running);
        tracing::info!("{} is running, waiting for stop signal", app_name);
        waiter.wait();

        self.transition(LifecycleState::Stopping);
        ordering.stop_all();

        self.transition(LifecycleState::Terminated);
        tracing::info!("{} stopped", app_name);
        Ok(report)
    }

    fn stop_waiter(&self) -> Option<Arc<StopWaiter>> {
        let bean = self.registry.get_bean(STOP_WAITER_BEAN_NAME)?;
        match bean.downcast::<StopWaiter>() {
            Ok(waiter) => Some(waiter),
            Err(_) => {
                tracing::warn!(
                    "Bean '{}' is '{}', not a stop waiter; ignoring it",
                    STOP_WAITER_BEAN_NAME,
                    self.registry
                        .type_name_of(STOP_WAITER_BEAN_NAME)
                        .unwrap_or("unknown")
                );
                None
            }
        }
    }

    fn transition(&self, next: LifecycleState) {
        let mut state = self.state.write();
        tracing::debug!("Lifecycle state: {} -> {}", *state, next);
        *state = next;
    }
}

impl Default for ApplicationContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BeanFactory for ApplicationContext {
    fn get_bean(&self, name: &str) -> Option<BeanInstance> {
        self.registry.get_bean(name)
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.registry.contains_bean(name)
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("app_name", &self.app_name())
            .field("state", &self.state())
            .field("registry", &self.registry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inject::{Autowired, BindFields, FieldBinding};
    use crate::lifecycle::{Injectable, PreInjectable, Startable, Stoppable};
    use parking_lot::Mutex;
    use std::sync::mpsc;
    use std::time::Duration;

    type Log = Arc<Mutex<Vec<String>>>;

    struct Step {
        name: &'static str,
        order: i32,
        log: Log,
    }

    impl Startable for Step {
        fn start_order(&self) -> i32 {
            self.order
        }

        fn start(&self) {
            self.log.lock().push(format!("start:{}", self.name));
        }
    }

    impl Stoppable for Step {
        fn stop_order(&self) -> i32 {
            self.order
        }

        fn stop(&self) {
            self.log.lock().push(format!("stop:{}", self.name));
        }
    }

    fn register_steps(context: &ApplicationContext, log: &Log) {
        for (name, order) in [("three", 3), ("one", 1), ("two", 2)] {
            context
                .register(
                    BeanDefinition::new(
                        name,
                        Step {
                            name,
                            order,
                            log: Arc::clone(log),
                        },
                    )
                    .startable()
                    .stoppable(),
                )
                .unwrap();
        }
    }

    #[test]
    fn test_start_without_waiter_skips_stop() {
        let log = Log::default();
        let context = ApplicationContext::new();
        register_steps(&context, &log);

        assert_eq!(context.state(), LifecycleState::Idle);
        context.start().unwrap();

        assert_eq!(*log.lock(), vec!["start:one", "start:two", "start:three"]);
        assert_eq!(context.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_stop_runs_after_waiter_returns() {
        let log = Log::default();
        let context = ApplicationContext::new();
        register_steps(&context, &log);

        let waiter_log = Arc::clone(&log);
        context
            .register_stop_waiter(move || waiter_log.lock().push("wait".to_string()))
            .unwrap();

        context.start().unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                "start:one",
                "start:two",
                "start:three",
                "wait",
                "stop:one",
                "stop:two",
                "stop:three",
            ]
        );
        assert_eq!(context.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_waiter_blocks_until_signalled() {
        let log = Log::default();
        let context = Arc::new(ApplicationContext::new());
        register_steps(&context, &log);

        let (tx, rx) = mpsc::channel::<()>();
        let rx = Mutex::new(rx);
        context
            .register_stop_waiter(move || {
                let _ = rx.lock().recv();
            })
            .unwrap();

        let driver = {
            let context = Arc::clone(&context);
            std::thread::spawn(move || context.start())
        };

        // 等待驱动器进入 Running
        let mut waited = Duration::ZERO;
        while context.state() != LifecycleState::Running && waited < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(10));
            waited += Duration::from_millis(10);
        }
        assert_eq!(context.state(), LifecycleState::Running);
        assert!(!log.lock().iter().any(|e| e.starts_with("stop:")));

        tx.send(()).unwrap();
        driver.join().unwrap().unwrap();

        assert_eq!(context.state(), LifecycleState::Terminated);
        assert_eq!(log.lock().last().map(String::as_str), Some("stop:three"));
    }

    #[test]
    fn test_second_stop_waiter_is_rejected() {
        let context = ApplicationContext::new();
        context.register_stop_waiter(|| {}).unwrap();

        let err = context.register_stop_waiter(|| {}).unwrap_err();
        assert!(matches!(err, BeanError::BeanAlreadyExists(name) if name == STOP_WAITER_BEAN_NAME));
    }

    #[test]
    fn test_start_twice_fails() {
        let context = ApplicationContext::new();
        context.start().unwrap();

        let err = context.start().unwrap_err();
        assert!(matches!(
            err,
            BeanError::AlreadyStarted(LifecycleState::Terminated)
        ));
    }

    struct FailingBootstrap;

    impl PreInjectable for FailingBootstrap {
        fn pre_inject(&self, _registry: &BeanRegistry) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn test_pre_injection_failure_aborts_start() {
        let log = Log::default();
        let context = ApplicationContext::new();
        register_steps(&context, &log);
        context
            .register(BeanDefinition::new("dbBootstrap", FailingBootstrap).pre_injectable())
            .unwrap();

        let err = context.start().unwrap_err();

        let message = err.to_string();
        assert!(message.contains("dbBootstrap"));
        assert!(message.contains("pre-injection"));
        assert!(message.contains("connection refused"));
        assert!(log.lock().is_empty());
        assert_eq!(context.state(), LifecycleState::PreInjecting);
    }

    struct LateRegistrar {
        log: Log,
    }

    impl PreInjectable for LateRegistrar {
        fn pre_inject(&self, registry: &BeanRegistry) -> anyhow::Result<()> {
            registry.register(
                BeanDefinition::new(
                    "httpServer",
                    Step {
                        name: "http",
                        order: 0,
                        log: Arc::clone(&self.log),
                    },
                )
                .startable()
                .stoppable(),
            )?;
            Ok(())
        }
    }

    #[test]
    fn test_beans_registered_during_pre_injection_are_started() {
        let log = Log::default();
        let context = ApplicationContext::new();
        register_steps(&context, &log);
        context
            .register(
                BeanDefinition::new(
                    "lifecycle",
                    LateRegistrar {
                        log: Arc::clone(&log),
                    },
                )
                .pre_injectable(),
            )
            .unwrap();
        context.register_stop_waiter(|| {}).unwrap();

        let report = context.start().unwrap();

        assert_eq!(report.pre_injected, 1);
        let entries = log.lock().clone();
        assert_eq!(entries.first().map(String::as_str), Some("start:http"));
        assert!(entries.contains(&"stop:http".to_string()));
    }

    struct DbConfig {
        dsn: String,
    }

    struct DbHandle {
        dsn: String,
    }

    struct DbModule;

    impl PreInjectable for DbModule {
        fn pre_inject(&self, registry: &BeanRegistry) -> anyhow::Result<()> {
            let cfg = registry.require_bean::<DbConfig>("cfg")?;
            registry.register(BeanDefinition::new(
                "db-handle",
                DbHandle {
                    dsn: cfg.dsn.clone(),
                },
            ))?;
            Ok(())
        }
    }

    struct Service {
        db: Autowired<DbHandle>,
        injected: Mutex<bool>,
    }

    impl BindFields for Service {
        fn field_bindings(&self) -> Vec<FieldBinding<'_>> {
            vec![FieldBinding::new("db-handle", "db", &self.db)]
        }
    }

    impl Injectable for Service {
        fn inject(&self, factory: &dyn BeanFactory) -> anyhow::Result<()> {
            *self.injected.lock() = factory.contains_bean("db-handle");
            Ok(())
        }
    }

    #[test]
    fn test_end_to_end_field_receives_derived_bean() {
        let context = ApplicationContext::new();
        context
            .register(BeanDefinition::new(
                "cfg",
                DbConfig {
                    dsn: "mysql://localhost/devops".to_string(),
                },
            ))
            .unwrap();
        context
            .register(BeanDefinition::new("db", DbModule).pre_injectable())
            .unwrap();
        let service = Arc::new(Service {
            db: Autowired::new(),
            injected: Mutex::new(false),
        });
        context
            .register(
                BeanDefinition::from_arc("svc", Arc::clone(&service))
                    .injectable()
                    .bind_fields(),
            )
            .unwrap();

        let report = context.start().unwrap();

        let handle = context.get_bean_as::<DbHandle>("db-handle").unwrap();
        assert!(Arc::ptr_eq(&service.db.get().unwrap(), &handle));
        assert_eq!(handle.dsn, "mysql://localhost/devops");
        assert!(*service.injected.lock());
        assert!(report.is_clean());
        assert_eq!(report.fields_bound, 1);
    }

    #[test]
    fn test_wrongly_typed_stop_waiter_is_ignored() {
        let context = ApplicationContext::new();
        context
            .register_instance(STOP_WAITER_BEAN_NAME, Some(Arc::new(42_u32) as BeanInstance))
            .unwrap();

        context.start().unwrap();
        assert_eq!(context.state(), LifecycleState::Terminated);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(LifecycleState::PreInjecting.to_string(), "pre-injecting");
        assert_eq!(
            BeanError::AlreadyStarted(LifecycleState::Running).to_string(),
            "application context cannot be started twice (current state: running)"
        );
    }
}
