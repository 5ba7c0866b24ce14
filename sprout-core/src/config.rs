//! 配置环境
//!
//! 多个配置源按优先级叠加，键统一为点分形式（`database.host`）。
//! 模块通常不逐个读取键，而是用 `Environment::bind` 把整个配置段反序列化为结构体

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;

use crate::error::{ApplicationError, ApplicationResult};

/// 环境变量配置源的默认优先级
pub const ENVIRONMENT_SOURCE_PRIORITY: i32 = 100;

/// 内存配置源的默认优先级
pub const MAP_SOURCE_PRIORITY: i32 = 50;

/// 配置文件的默认优先级
pub const FILE_SOURCE_PRIORITY: i32 = 0;

/// 配置值
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    pub fn as_str(&self) -> Option<&str> {
        if let ConfigValue::String(text) = self {
            Some(text.as_str())
        } else {
            None
        }
    }

    /// 整数，字符串会尝试解析
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(value) => Some(*value),
            ConfigValue::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// 浮点数，整数和字符串都会转换
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(value) => Some(*value),
            ConfigValue::Int(value) => Some(*value as f64),
            ConfigValue::String(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// 布尔值，字符串接受 true/false、yes/no、on/off、1/0
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(value) => Some(*value),
            ConfigValue::String(text) => parse_flag(text),
            _ => None,
        }
    }

    fn to_toml(&self) -> toml::Value {
        match self {
            ConfigValue::String(text) => toml::Value::String(text.clone()),
            ConfigValue::Int(value) => toml::Value::Integer(*value),
            ConfigValue::Float(value) => toml::Value::Float(*value),
            ConfigValue::Bool(value) => toml::Value::Boolean(*value),
            ConfigValue::Array(items) => {
                toml::Value::Array(items.iter().map(ConfigValue::to_toml).collect())
            }
            ConfigValue::Object(entries) => toml::Value::Table(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_toml()))
                    .collect(),
            ),
        }
    }

    /// 按被覆盖值的类型转换
    ///
    /// 环境变量只能提供字符串，`APP_DATABASE_PORT=3307` 覆盖整数端口时需要还原成整数
    fn coerce_like(&self, existing: &toml::Value) -> toml::Value {
        if !matches!(self, ConfigValue::String(_)) {
            return self.to_toml();
        }

        let coerced = match existing {
            toml::Value::Integer(_) => self.as_i64().map(toml::Value::Integer),
            toml::Value::Float(_) => self.as_f64().map(toml::Value::Float),
            toml::Value::Boolean(_) => self.as_bool().map(toml::Value::Boolean),
            _ => None,
        };
        coerced.unwrap_or_else(|| self.to_toml())
    }
}

impl From<&toml::Value> for ConfigValue {
    fn from(value: &toml::Value) -> Self {
        match value {
            toml::Value::String(text) => ConfigValue::String(text.clone()),
            toml::Value::Integer(value) => ConfigValue::Int(*value),
            toml::Value::Float(value) => ConfigValue::Float(*value),
            toml::Value::Boolean(value) => ConfigValue::Bool(*value),
            toml::Value::Datetime(datetime) => ConfigValue::String(datetime.to_string()),
            toml::Value::Array(items) => {
                ConfigValue::Array(items.iter().map(ConfigValue::from).collect())
            }
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(key, value)| (key.clone(), ConfigValue::from(value)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(text: &str) -> Self {
        ConfigValue::String(text.to_string())
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

fn parse_flag(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// 配置源
pub trait PropertySource: Send + Sync {
    fn name(&self) -> &str;

    /// 按点分键查找
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 该配置源提供的全部键
    fn keys(&self) -> Vec<String>;

    /// 数字越大越优先
    fn priority(&self) -> i32 {
        FILE_SOURCE_PRIORITY
    }
}

/// Environment - 配置环境
///
/// 启动时以保留名称 `environment` 注册为 Bean，各模块在注册阶段或先期注入阶段读取
pub struct Environment {
    /// 按优先级降序排列，相同优先级先添加的在前
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        tracing::debug!(
            "  ├─ Property source '{}' added (priority {})",
            source.name(),
            source.priority()
        );
        let mut sources = self.sources.write();
        let position = sources
            .iter()
            .position(|existing| existing.priority() < source.priority())
            .unwrap_or(sources.len());
        sources.insert(position, source);
    }

    /// 配置源名称，优先级高的在前
    pub fn property_source_names(&self) -> Vec<String> {
        self.sources
            .read()
            .iter()
            .map(|source| source.name().to_string())
            .collect()
    }

    /// 从优先级最高的配置源开始查找
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        let found = sources
            .iter()
            .find_map(|source| source.get(key).map(|value| (source.name(), value)));

        match found {
            Some((source, value)) => {
                tracing::trace!("Config '{}' resolved from '{}'", key, source);
                Some(value)
            }
            None => {
                tracing::trace!("Config '{}' is not set", key);
                None
            }
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key)?.as_str().map(str::to_string)
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key)?.as_i64()
    }

    pub fn get_i64_or(&self, key: &str, default: i64) -> i64 {
        self.get_i64(key).unwrap_or(default)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_f64()
    }

    pub fn get_f64_or(&self, key: &str, default: f64) -> f64 {
        self.get_f64(key).unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get_bool(key).unwrap_or(default)
    }

    /// 字符串列表
    ///
    /// 配置文件中写成数组，环境变量中写成逗号分隔：`APP_APP_ADMINS=alice,bob`
    pub fn get_string_array(&self, key: &str) -> Option<Vec<String>> {
        let items = match self.get(key)? {
            ConfigValue::Array(items) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            ConfigValue::String(text) => text
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
            _ => return None,
        };
        Some(items)
    }

    /// 合并所有配置源中 `prefix.` 下的键，得到完整的配置段
    pub fn section(&self, prefix: &str) -> Option<toml::Table> {
        let section_prefix = format!("{}.", prefix);
        let mut table = toml::Table::new();

        {
            let sources = self.sources.read();
            // 从低优先级开始写入，后写入的覆盖先写入的
            for source in sources.iter().rev() {
                let mut keys: Vec<String> = source
                    .keys()
                    .into_iter()
                    .filter(|key| key.starts_with(&section_prefix))
                    .collect();
                keys.sort();

                for key in keys {
                    let Some(value) = source.get(&key) else {
                        continue;
                    };
                    let path: Vec<&str> = key[section_prefix.len()..].split('.').collect();
                    if !insert_path(&mut table, &path, &value) {
                        tracing::trace!(
                            "Config '{}' from '{}' collides with a nested table, skipped",
                            key,
                            source.name()
                        );
                    }
                }
            }
        }

        // 环境变量名中的下划线无法区分层级和键名，按已知的键再解析一次
        self.resolve_leaves(&mut table, prefix);

        (!table.is_empty()).then_some(table)
    }

    fn resolve_leaves(&self, table: &mut toml::Table, prefix: &str) {
        for (key, value) in table.iter_mut() {
            let full_key = format!("{}.{}", prefix, key);
            if let toml::Value::Table(nested) = value {
                self.resolve_leaves(nested, &full_key);
            } else if let Some(resolved) = self.get(&full_key) {
                *value = resolved.coerce_like(value);
            }
        }
    }

    /// 把配置段反序列化为结构体
    ///
    /// ```rust,ignore
    /// #[derive(Deserialize)]
    /// struct DatabaseConfig { host: String, port: u16 }
    ///
    /// let database: DatabaseConfig = environment.bind("database")?;
    /// ```
    pub fn bind<T: DeserializeOwned>(&self, prefix: &str) -> anyhow::Result<T> {
        let table = self
            .section(prefix)
            .ok_or_else(|| anyhow::anyhow!("configuration section '{}' not found", prefix))?;

        toml::Value::Table(table)
            .try_into::<T>()
            .map_err(|e| anyhow::anyhow!("failed to bind configuration section '{}': {}", prefix, e))
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("sources", &self.property_source_names())
            .finish()
    }
}

/// 按路径写入嵌套表，路径经过非表值或落在表上时返回 false
fn insert_path(table: &mut toml::Table, path: &[&str], value: &ConfigValue) -> bool {
    let Some((leaf, parents)) = path.split_last() else {
        return false;
    };

    let mut current = table;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert(toml::Value::Table(toml::Table::new()));
        let toml::Value::Table(next) = entry else {
            return false;
        };
        current = next;
    }

    let converted = match current.get(*leaf) {
        Some(toml::Value::Table(_)) => return false,
        Some(existing) => value.coerce_like(existing),
        None => value.to_toml(),
    };
    current.insert(leaf.to_string(), converted);
    true
}

/// 环境变量配置源
///
/// `APP_DATABASE_HOST` 对应键 `database.host`
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: ENVIRONMENT_SOURCE_PRIORITY,
        }
    }

    fn variable_for(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key.replace('.', "_").to_uppercase())
    }

    fn key_for(&self, variable: &str) -> Option<String> {
        let rest = variable.strip_prefix(&self.prefix)?;
        Some(rest.to_lowercase().replace('_', "."))
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.variable_for(key))
            .ok()
            .map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter_map(|(variable, _)| self.key_for(&variable))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 配置源
///
/// 加载时展平为点分键：`[database] host = "x"` 得到 `database.host`
pub struct TomlPropertySource {
    name: String,
    properties: BTreeMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    /// 读取配置文件
    pub fn from_file(path: impl AsRef<Path>) -> ApplicationResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ApplicationError::ConfigLoadFailed(format!(
                "failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::parse(&content, path.display().to_string())
    }

    /// 解析 TOML 文本，`name` 用于日志和错误信息
    pub fn parse(content: &str, name: impl Into<String>) -> ApplicationResult<Self> {
        let name = name.into();
        let document: toml::Table = content.parse().map_err(|e| {
            ApplicationError::ConfigLoadFailed(format!("failed to parse TOML in {}: {}", name, e))
        })?;

        let mut properties = BTreeMap::new();
        flatten_into(&mut properties, "", &document);
        tracing::debug!("Loaded {} key(s) from {}", properties.len(), name);

        Ok(Self {
            name,
            properties,
            priority: FILE_SOURCE_PRIORITY,
        })
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

fn flatten_into(properties: &mut BTreeMap<String, ConfigValue>, prefix: &str, table: &toml::Table) {
    for (key, value) in table {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", prefix, key)
        };

        if let toml::Value::Table(nested) = value {
            flatten_into(properties, &path, nested);
        } else {
            properties.insert(path, ConfigValue::from(value));
        }
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源，测试或运行时覆盖用
pub struct MapPropertySource {
    name: String,
    properties: BTreeMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
            priority: MAP_SOURCE_PRIORITY,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}
