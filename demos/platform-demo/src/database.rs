//! 数据库模块
//!
//! 先期注入阶段读取 `database` 配置、建立连接池并以保留名称 `DB` 注册，
//! 停止阶段关闭连接池

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use sprout_core::prelude::*;
use sprout_core::DB_BEAN_NAME;

use crate::config::{DatabaseConfig, BEAN_DATABASE};

pub const BEAN_DATABASE_MODULE: &str = "databaseModule";

/// 进程内的连接池替身
#[derive(Debug)]
pub struct DatabasePool {
    dsn: String,
    max_idle: u32,
    max_open: u32,
    open: AtomicBool,
    executed: AtomicU64,
}

impl DatabasePool {
    pub fn connect(config: &DatabaseConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            config.max_idle <= config.max_open,
            "max_idle ({}) must not exceed max_open ({})",
            config.max_idle,
            config.max_open
        );

        let pool = Self {
            dsn: config.data_source_name(),
            max_idle: config.max_idle,
            max_open: config.max_open,
            open: AtomicBool::new(true),
            executed: AtomicU64::new(0),
        };
        tracing::info!(
            host = %config.host,
            port = config.port,
            db = %config.db,
            max_idle = pool.max_idle,
            max_open = pool.max_open,
            "Database pool opened"
        );
        Ok(pool)
    }

    /// 不含账号信息的连接目标，例如 `127.0.0.1:3306/devops`
    pub fn endpoint(&self) -> &str {
        let target = self.dsn.rsplit_once('@').map_or(self.dsn.as_str(), |(_, rest)| rest);
        target.split_once('?').map_or(target, |(endpoint, _)| endpoint)
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// 执行语句，返回连接池累计执行的语句数
    pub fn execute(&self, statement: &str) -> anyhow::Result<u64> {
        anyhow::ensure!(self.is_open(), "database pool is closed");
        tracing::debug!("Executing on {}: {}", self.endpoint(), statement);
        Ok(self.executed.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            tracing::info!("Database pool for {} closed", self.endpoint());
        }
    }
}

#[derive(Default)]
pub struct DatabaseModule {
    pool: Mutex<Option<Arc<DatabasePool>>>,
}

impl PreInjectable for DatabaseModule {
    fn pre_inject(&self, registry: &BeanRegistry) -> anyhow::Result<()> {
        let config = registry
            .require_bean::<DatabaseConfig>(BEAN_DATABASE)
            .context("database module cannot start without its config")?;

        let pool = Arc::new(DatabasePool::connect(&config)?);
        registry.register(BeanDefinition::from_arc(DB_BEAN_NAME, Arc::clone(&pool)))?;
        *self.pool.lock() = Some(pool);
        Ok(())
    }
}

impl Stoppable for DatabaseModule {
    fn stop_order(&self) -> i32 {
        // 在 HTTP 服务器之后关闭
        1
    }

    fn stop(&self) {
        if let Some(pool) = self.pool.lock().take() {
            pool.close();
        }
    }
}

fn register_database(registry: &BeanRegistry) -> anyhow::Result<()> {
    registry.register(
        BeanDefinition::new(BEAN_DATABASE_MODULE, DatabaseModule::default())
            .pre_injectable()
            .stoppable(),
    )?;
    Ok(())
}

submit_module!("database", register_database);
