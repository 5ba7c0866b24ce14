use std::path::Path;
use std::sync::Arc;

use crate::bean::BeanDefinition;
use crate::config::{Environment, EnvironmentPropertySource, TomlPropertySource};
use crate::constants::ENVIRONMENT_BEAN_NAME;
use crate::context::ApplicationContext;
use crate::error::{ApplicationError, ApplicationResult};
use crate::logging::LoggingConfig;

/// 默认配置文件
pub const DEFAULT_CONFIG_FILE: &str = "application.toml";

type Initializer = Box<dyn Fn(&ApplicationContext) -> ApplicationResult<()> + Send + Sync>;

/// Sprout 应用程序
///
/// 提供便捷的应用启动方式：
///
/// ```rust,ignore
/// fn main() -> anyhow::Result<()> {
///     SproutApplication::new("platform")
///         .initializer(|context| {
///             context.register_stop_waiter(ctrl_c_stop_waiter())?;
///             Ok(())
///         })
///         .run()?;
///     Ok(())
/// }
/// ```
pub struct SproutApplication {
    /// 应用名称
    name: String,

    /// 显式指定的配置文件路径
    config_file: Option<String>,

    /// 环境变量前缀
    env_prefix: String,

    /// 是否显示 banner
    show_banner: bool,

    /// 是否安装全局日志订阅者
    init_logging: bool,

    /// 日志配置
    logging_config: Option<LoggingConfig>,

    /// 自定义初始化函数（在模块扫描之前执行）
    initializers: Vec<Initializer>,
}

impl SproutApplication {
    /// 创建新的应用
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config_file: None,
            env_prefix: "APP_".to_string(),
            show_banner: true,
            init_logging: true,
            logging_config: None,
            initializers: Vec::new(),
        }
    }

    /// 设置配置文件路径
    ///
    /// 环境变量 `<PREFIX>CONFIG_PATH` 优先于此设置
    pub fn config_file(mut self, path: impl Into<String>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// 设置环境变量前缀
    pub fn env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// 设置是否显示 banner
    pub fn banner(mut self, show: bool) -> Self {
        self.show_banner = show;
        self
    }

    /// 设置是否初始化日志系统（宿主程序已经安装订阅者时关闭）
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// 设置日志配置
    ///
    /// 作为基础值，配置文件中的 `log.*` 键仍会覆盖它
    pub fn logging(mut self, config: LoggingConfig) -> Self {
        self.logging_config = Some(config);
        self
    }

    /// 添加初始化器
    pub fn initializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&ApplicationContext) -> ApplicationResult<()> + Send + Sync + 'static,
    {
        self.initializers.push(Box::new(f));
        self
    }

    /// 构建应用上下文：加载配置、初始化日志、注册环境、执行初始化器并扫描模块
    ///
    /// 返回的上下文尚未启动
    pub fn prepare(&self) -> ApplicationResult<Arc<ApplicationContext>> {
        let environment = Arc::new(self.build_environment()?);

        if self.init_logging {
            self.resolve_logging_config(&environment).init()?;
        }

        if self.show_banner {
            self.print_banner();
        }

        tracing::info!("Starting {} application", self.name);
        tracing::debug!(
            "Property sources: {:?}",
            environment.property_source_names()
        );

        let context = Arc::new(ApplicationContext::new());
        context.set_app_name(self.name.clone());
        context.register(BeanDefinition::from_arc(
            ENVIRONMENT_BEAN_NAME,
            environment,
        ))?;

        for initializer in &self.initializers {
            initializer(&context)?;
        }

        context.scan_modules()?;
        tracing::info!(
            "ApplicationContext prepared with {} bean(s)",
            context.registry().len()
        );

        Ok(context)
    }

    /// 最终的日志配置
    ///
    /// 基础值取构建器设置的配置，没有设置时取 `LOG_*` 环境变量；
    /// 再用配置环境中的 `log.*` 键（包括 `<PREFIX>LOG_*` 覆盖）合并
    fn resolve_logging_config(&self, environment: &Environment) -> LoggingConfig {
        self.logging_config
            .clone()
            .unwrap_or_else(LoggingConfig::from_env)
            .merge_environment(environment)
    }

    /// 运行应用
    ///
    /// 注册了停止等待回调时一直阻塞到停止阶段结束
    pub fn run(self) -> ApplicationResult<Arc<ApplicationContext>> {
        let start_time = std::time::Instant::now();
        let context = self.prepare()?;

        tracing::info!(
            "Prepared {} in {}ms",
            self.name,
            start_time.elapsed().as_millis()
        );

        let report = context.start()?;
        if !report.is_clean() {
            tracing::warn!(
                "{} ran with {} injection error(s)",
                self.name,
                report.soft_errors.len()
            );
        }

        Ok(context)
    }

    /// 便捷方法：使用默认配置运行
    pub fn run_with_defaults(name: impl Into<String>) -> ApplicationResult<Arc<ApplicationContext>> {
        Self::new(name).run()
    }

    /// 构建配置环境
    ///
    /// 优先级：环境变量 > 配置文件
    fn build_environment(&self) -> ApplicationResult<Environment> {
        let environment = Environment::new();

        let env_path = std::env::var(format!("{}CONFIG_PATH", self.env_prefix)).ok();
        let (path, required) = match env_path.or_else(|| self.config_file.clone()) {
            Some(path) => (path, true),
            None => (DEFAULT_CONFIG_FILE.to_string(), false),
        };

        if Path::new(&path).exists() {
            environment.add_property_source(Box::new(TomlPropertySource::from_file(&path)?));
        } else if required {
            return Err(ApplicationError::ConfigLoadFailed(format!(
                "configuration file not found: {}",
                path
            )));
        }

        // 环境变量配置源（优先级最高）
        environment.add_property_source(Box::new(EnvironmentPropertySource::new(
            &self.env_prefix,
        )));

        Ok(environment)
    }

    /// 打印 banner
    fn print_banner(&self) {
        println!();
        println!(r"  ____                         _   ");
        println!(r" / ___| _ __  _ __ ___  _   _| |_ ");
        println!(r" \___ \| '_ \| '__/ _ \| | | | __|");
        println!(r"  ___) | |_) | | | (_) | |_| | |_ ");
        println!(r" |____/| .__/|_|  \___/ \__,_|\__|");
        println!(r"       |_|                        ");
        println!();
        println!("  :: Sprout ::        (v{})", env!("CARGO_PKG_VERSION"));
        println!();
    }
}

impl Default for SproutApplication {
    fn default() -> Self {
        Self::new("SproutApplication")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bean_factory::BeanFactoryExt;
    use crate::context::LifecycleState;
    use crate::error::BeanError;
    use crate::logging::{LogFormat, LogLevel};
    use std::io::Write;

    fn quiet(name: &str) -> SproutApplication {
        SproutApplication::new(name)
            .banner(false)
            .init_logging(false)
            .env_prefix("SPROUT_APP_TEST_")
    }

    #[test]
    fn test_run_registers_environment() {
        let mut file = temp_config_file("app-run.toml");
        writeln!(file.1, "[server]\nport = 9090").unwrap();

        let context = quiet("demo")
            .config_file(file.0.to_string_lossy().to_string())
            .run()
            .unwrap();

        assert_eq!(context.state(), LifecycleState::Terminated);
        assert_eq!(context.app_name().as_deref(), Some("demo"));
        let environment = context
            .get_bean_as::<Environment>(ENVIRONMENT_BEAN_NAME)
            .unwrap();
        assert_eq!(environment.get_i64("server.port"), Some(9090));
        let _ = std::fs::remove_file(&file.0);
    }

    #[test]
    fn test_missing_explicit_config_is_error() {
        let result = quiet("demo")
            .config_file("/definitely/not/here/application.toml")
            .prepare();

        assert!(matches!(result, Err(ApplicationError::ConfigLoadFailed(_))));
    }

    #[test]
    fn test_initializer_errors_propagate() {
        let result = quiet("demo")
            .initializer(|context| {
                context.register(BeanDefinition::new(ENVIRONMENT_BEAN_NAME, 1_u8))?;
                Ok(())
            })
            .prepare();

        assert!(matches!(
            result,
            Err(ApplicationError::Bean(BeanError::BeanAlreadyExists(name))) if name == ENVIRONMENT_BEAN_NAME
        ));
    }

    #[test]
    fn test_builder_logging_config_is_merged_with_log_keys() {
        let environment = Environment::new();
        environment.add_property_source(Box::new(
            TomlPropertySource::parse("[log]\nformat = \"json\"\n", "application.toml").unwrap(),
        ));

        let config = quiet("demo")
            .logging(
                LoggingConfig::new()
                    .level(LogLevel::Warn)
                    .show_thread_ids(true),
            )
            .resolve_logging_config(&environment);

        assert_eq!(config.format, LogFormat::Json);
        assert_eq!(config.level, LogLevel::Warn);
        assert!(config.show_thread_ids);
    }

    #[test]
    fn test_log_keys_override_builder_values() {
        let environment = Environment::new();
        environment.add_property_source(Box::new(
            TomlPropertySource::parse("[log]\nlevel = \"debug\"\n", "application.toml").unwrap(),
        ));

        let config = quiet("demo")
            .logging(LoggingConfig::new().level(LogLevel::Error))
            .resolve_logging_config(&environment);

        assert_eq!(config.level, LogLevel::Debug);
        assert_eq!(config.format, LogFormat::Compact);
    }

    fn temp_config_file(name: &str) -> (std::path::PathBuf, std::fs::File) {
        let path = std::env::temp_dir().join(format!("sprout-{}-{}", std::process::id(), name));
        let file = std::fs::File::create(&path).unwrap();
        (path, file)
    }
}
