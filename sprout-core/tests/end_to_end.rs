use std::sync::Arc;

use parking_lot::Mutex;
use sprout_core::prelude::*;
use sprout_core::{STOP_WAITER_BEAN_NAME, DB_BEAN_NAME};
use sprout_core_macros::BindFields;

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, serde::Deserialize)]
struct DatabaseConfig {
    url: String,
}

/// 数据库句柄的替身
struct Database {
    url: String,
    closed: Mutex<bool>,
}

/// 读取配置、打开连接并注册 `DB`
struct DatabaseModule {
    log: Log,
}

impl PreInjectable for DatabaseModule {
    fn pre_inject(&self, registry: &BeanRegistry) -> anyhow::Result<()> {
        let config = registry
            .require_bean::<DatabaseConfig>("database")
            .context("database module needs its config")?;

        self.log.lock().push("pre:database".to_string());
        registry.register(
            BeanDefinition::new(
                DB_BEAN_NAME,
                Database {
                    url: config.url.clone(),
                    closed: Mutex::new(false),
                },
            ),
        )?;
        Ok(())
    }
}

impl Stoppable for DatabaseModule {
    fn stop_order(&self) -> i32 {
        1
    }

    fn stop(&self) {
        self.log.lock().push("stop:database".to_string());
    }
}

/// 启动时派生后台工作的服务
#[derive(BindFields)]
struct HttpServer {
    #[inject("DB")]
    db: Autowired<Database>,
    log: Log,
}

impl Startable for HttpServer {
    fn start_order(&self) -> i32 {
        0
    }

    fn start(&self) {
        let bound = self.db.is_bound();
        self.log.lock().push(format!("start:http(db={})", bound));
    }
}

impl Stoppable for HttpServer {
    fn stop_order(&self) -> i32 {
        0
    }

    fn stop(&self) {
        self.log.lock().push("stop:http".to_string());
    }
}

struct Repository {
    url: Mutex<Option<String>>,
}

impl ContainerAware for Repository {
    fn inject_container(&self, container: &Container<'_>) -> anyhow::Result<()> {
        let db = container
            .get_db_as::<Database>()
            .ok_or_else(|| anyhow!("DB is not registered"))?;
        *self.url.lock() = Some(db.url.clone());
        Ok(())
    }
}

#[test]
fn platform_bootstrap_runs_every_phase_in_order() {
    let log = Log::default();
    let context = ApplicationContext::new();

    let environment = Environment::new();
    environment.add_property_source(Box::new(
        sprout_core::TomlPropertySource::parse(
            "[database]\nurl = \"mysql://root@localhost:3306/devops\"\n",
            "test.toml",
        )
        .unwrap(),
    ));
    let database_config: DatabaseConfig = environment.bind("database").unwrap();
    context
        .register(BeanDefinition::new("database", database_config))
        .unwrap();

    context
        .register(
            BeanDefinition::new(
                "databaseModule",
                DatabaseModule {
                    log: Arc::clone(&log),
                },
            )
            .pre_injectable()
            .stoppable(),
        )
        .unwrap();

    let server = Arc::new(HttpServer {
        db: Autowired::new(),
        log: Arc::clone(&log),
    });
    context
        .register(
            BeanDefinition::from_arc("httpServer", Arc::clone(&server))
                .bind_fields()
                .startable()
                .stoppable(),
        )
        .unwrap();

    let repository = Arc::new(Repository {
        url: Mutex::new(None),
    });
    context
        .register(BeanDefinition::from_arc("repository", Arc::clone(&repository)).container_aware())
        .unwrap();

    let filter_log = Arc::clone(&log);
    context
        .register_fn("authenticationFilter", move |factory| {
            let has_server = factory.contains_bean("httpServer");
            filter_log
                .lock()
                .push(format!("callable:filters(server={})", has_server));
        })
        .unwrap();

    let waiter_log = Arc::clone(&log);
    context
        .register_stop_waiter(move || waiter_log.lock().push("wait".to_string()))
        .unwrap();

    let report = context.start().unwrap();

    assert!(report.is_clean(), "unexpected soft errors: {:?}", report.soft_errors);
    assert_eq!(report.pre_injected, 1);
    assert_eq!(report.callables_invoked, 1);
    assert_eq!(report.fields_bound, 1);

    assert_eq!(
        *log.lock(),
        vec![
            "pre:database",
            "callable:filters(server=true)",
            "start:http(db=true)",
            "wait",
            "stop:http",
            "stop:database",
        ]
    );

    let db = context.get_bean_as::<Database>(DB_BEAN_NAME).unwrap();
    assert!(Arc::ptr_eq(&server.db.get().unwrap(), &db));
    assert!(!*db.closed.lock());
    assert_eq!(
        repository.url.lock().as_deref(),
        Some("mysql://root@localhost:3306/devops")
    );
    assert!(context.contains_bean(STOP_WAITER_BEAN_NAME));
    assert_eq!(context.state(), LifecycleState::Terminated);
}

#[test]
fn missing_config_aborts_before_any_start() {
    let log = Log::default();
    let context = ApplicationContext::new();
    context
        .register(
            BeanDefinition::new(
                "databaseModule",
                DatabaseModule {
                    log: Arc::clone(&log),
                },
            )
            .pre_injectable(),
        )
        .unwrap();
    context
        .register(
            BeanDefinition::new(
                "httpServer",
                HttpServer {
                    db: Autowired::new(),
                    log: Arc::clone(&log),
                },
            )
            .startable(),
        )
        .unwrap();

    let err = context.start().unwrap_err();

    assert!(matches!(&err, BeanError::PreInjectionFailed { bean, .. } if bean == "databaseModule"));
    assert!(err.to_string().contains("database module needs its config"));
    assert!(log.lock().is_empty());
}

#[test]
fn registration_errors_are_fatal_and_named() {
    let context = ApplicationContext::new();
    context
        .register(BeanDefinition::new("database", 1_u8))
        .unwrap();

    assert!(matches!(
        context.register(BeanDefinition::new("database", 2_u8)),
        Err(BeanError::BeanAlreadyExists(name)) if name == "database"
    ));
    assert!(matches!(
        context.register(BeanDefinition::new("", 3_u8)),
        Err(BeanError::EmptyName)
    ));
    assert!(matches!(
        context.register_instance("ghost", None),
        Err(BeanError::AbsentBean(name)) if name == "ghost"
    ));
    assert_eq!(*context.get_bean_as::<u8>("database").unwrap(), 1);
    assert!(context.get_bean("unknown").is_none());
}
