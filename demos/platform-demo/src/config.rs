//! 配置模块：把配置文件中的各个段注册为 Bean

use serde::Deserialize;
use sprout_core::prelude::*;
use sprout_core::ENVIRONMENT_BEAN_NAME;

pub const BEAN_APP: &str = "app";
pub const BEAN_DATABASE: &str = "database";

pub const ENV_PROD: &str = "prod";

/// `[app]` 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub name: String,
    pub addr: String,
    pub env: String,

    /// 允许访问 `/api` 的用户
    #[serde(default)]
    pub admins: Vec<String>,
}

impl AppConfig {
    pub fn is_prod(&self) -> bool {
        self.env == ENV_PROD
    }
}

/// `[database]` 段
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db: String,
    pub max_idle: u32,
    pub max_open: u32,
}

impl DatabaseConfig {
    pub fn data_source_name(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}?charset=utf8mb4",
            self.user, self.password, self.host, self.port, self.db
        )
    }
}

fn register_config(registry: &BeanRegistry) -> anyhow::Result<()> {
    let environment = registry.require_bean::<Environment>(ENVIRONMENT_BEAN_NAME)?;

    let app: AppConfig = environment.bind(BEAN_APP)?;
    let database: DatabaseConfig = environment.bind(BEAN_DATABASE)?;
    tracing::info!("Loaded configuration for '{}' (env: {})", app.name, app.env);

    registry.register(BeanDefinition::new(BEAN_APP, app))?;
    registry.register(BeanDefinition::new(BEAN_DATABASE, database))?;
    Ok(())
}

submit_module!("config", register_config);
