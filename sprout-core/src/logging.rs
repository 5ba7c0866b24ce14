//! 日志初始化
//!
//! 基于 `tracing-subscriber`：配置可以来自代码、`LOG_*` 环境变量或配置文件中的 `log.*` 键

use std::fmt;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::{
    fmt::MakeWriter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::Environment;
use crate::error::{ApplicationError, ApplicationResult};

/// 默认日志文件路径
pub const DEFAULT_LOG_FILE: &str = "./app.log";

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const NAMES: [(&'static str, LogLevel); 6] = [
        ("trace", LogLevel::Trace),
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("warning", LogLevel::Warn),
        ("error", LogLevel::Error),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        lookup(&Self::NAMES, s).ok_or_else(|| format!("unknown log level '{}'", s))
    }
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// 单行紧凑格式（默认）
    Compact,
    /// 完整格式，配置文件中的 `text` 也映射到这里
    Full,
    Json,
    /// 多行格式，适合本地开发
    Pretty,
}

impl LogFormat {
    const NAMES: [(&'static str, LogFormat); 5] = [
        ("compact", LogFormat::Compact),
        ("full", LogFormat::Full),
        ("text", LogFormat::Full),
        ("json", LogFormat::Json),
        ("pretty", LogFormat::Pretty),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Compact => "compact",
            LogFormat::Full => "full",
            LogFormat::Json => "json",
            LogFormat::Pretty => "pretty",
        }
    }
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        lookup(&Self::NAMES, s).ok_or_else(|| format!("unknown log format '{}'", s))
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn lookup<T: Copy>(names: &[(&str, T)], name: &str) -> Option<T> {
    let name = name.trim();
    names
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, value)| *value)
}

/// 日志输出目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    /// 追加写入文件
    File(PathBuf),
}

impl LogOutput {
    /// `stdout`/`console` 或 `file`，后者写入 `file_path`
    pub fn from_name(name: &str, file_path: impl Into<PathBuf>) -> Result<Self, String> {
        if name.eq_ignore_ascii_case("stdout") || name.eq_ignore_ascii_case("console") {
            Ok(LogOutput::Stdout)
        } else if name.eq_ignore_ascii_case("file") {
            Ok(LogOutput::File(file_path.into()))
        } else {
            Err(format!("unknown log output '{}'", name))
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,

    /// 是否输出模块路径
    pub show_target: bool,

    pub show_thread_ids: bool,

    /// `EnvFilter` 指令，设置后优先于 `level`，例如 `"sprout_core=debug,platform_demo=info"`
    pub filter: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            show_target: false,
            show_thread_ids: false,
            filter: None,
        }
    }
}

impl LoggingConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn show_target(mut self, show: bool) -> Self {
        self.show_target = show;
        self
    }

    pub fn show_thread_ids(mut self, show: bool) -> Self {
        self.show_thread_ids = show;
        self
    }

    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// 读取 `RUST_LOG`、`LOG_LEVEL`、`LOG_FORMAT`、`LOG_OUTPUT`、`LOG_FILE`
    ///
    /// 无法解析的值被忽略
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self {
            filter: var("RUST_LOG"),
            ..Self::default()
        };

        if let Some(level) = var("LOG_LEVEL").and_then(|v| v.parse().ok()) {
            config.level = level;
        }
        if let Some(format) = var("LOG_FORMAT").and_then(|v| v.parse().ok()) {
            config.format = format;
        }

        let file = var("LOG_FILE").unwrap_or_else(|| DEFAULT_LOG_FILE.to_string());
        if let Some(output) = var("LOG_OUTPUT").and_then(|v| LogOutput::from_name(&v, file).ok()) {
            config.output = output;
        }

        config
    }

    /// 用配置环境中的 `log.*` 键覆盖当前值
    ///
    /// 键：`level`、`format`（或 `formatter`）、`output`、`file_path`、
    /// `show_target`、`show_thread_ids`、`filter`
    pub fn merge_environment(mut self, environment: &Environment) -> Self {
        let format = environment
            .get_string("log.format")
            .or_else(|| environment.get_string("log.formatter"));

        if let Some(level) = environment.get_string("log.level").and_then(|v| v.parse().ok()) {
            self.level = level;
        }
        if let Some(format) = format.and_then(|v| v.parse().ok()) {
            self.format = format;
        }
        if let Some(name) = environment.get_string("log.output") {
            let file = environment.get_string_or("log.file_path", DEFAULT_LOG_FILE);
            match LogOutput::from_name(&name, file) {
                Ok(output) => self.output = output,
                // 订阅者尚未安装
                Err(e) => eprintln!("log.output ignored: {}", e),
            }
        }

        self.show_target = environment.get_bool_or("log.show_target", self.show_target);
        self.show_thread_ids = environment.get_bool_or("log.show_thread_ids", self.show_thread_ids);
        if let Some(filter) = environment.get_string("log.filter") {
            self.filter = Some(filter);
        }

        self
    }

    /// 默认值加上 `log.*` 键
    pub fn from_environment(environment: &Environment) -> Self {
        Self::default().merge_environment(environment)
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.level.as_str());
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }

    /// 安装全局订阅者
    ///
    /// 每个进程只能成功一次，之后的调用返回 `LoggingInitFailed`
    pub fn init(self) -> ApplicationResult<()> {
        match &self.output {
            LogOutput::Stdout => self.install(std::io::stdout, true),
            LogOutput::File(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|e| {
                        ApplicationError::LoggingInitFailed(format!(
                            "cannot open log file {}: {}",
                            path.display(),
                            e
                        ))
                    })?;
                self.install(Mutex::<File>::new(file), false)
            }
        }
    }

    fn install<W>(&self, writer: W, ansi: bool) -> ApplicationResult<()>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let base = tracing_subscriber::fmt::layer()
            .with_writer(writer)
            .with_ansi(ansi)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids);

        let layer: Box<dyn Layer<Registry> + Send + Sync> = match self.format {
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Full => base.boxed(),
            LogFormat::Json => base.json().boxed(),
            LogFormat::Pretty => base.pretty().boxed(),
        };

        tracing_subscriber::registry()
            .with(layer)
            .with(self.env_filter())
            .try_init()
            .map_err(|e| ApplicationError::LoggingInitFailed(e.to_string()))
    }
}
