//! 健康检查

use axum::{routing::get, Json};
use serde_json::{json, Value};
use sprout_core::prelude::*;

use crate::database::DatabasePool;
use crate::web::{WebEngine, BEAN_WEB_ENGINE};

pub const BEAN_HEALTH_CHECK: &str = "healthCheck";

#[derive(Default)]
pub struct HealthCheck;

pub fn health_status(pool: Option<&DatabasePool>) -> Value {
    let database_up = pool.is_some_and(DatabasePool::is_open);
    json!({
        "status": if database_up { "UP" } else { "DOWN" },
        "database": database_up,
    })
}

impl ContainerAware for HealthCheck {
    fn inject_container(&self, container: &Container<'_>) -> anyhow::Result<()> {
        let engine = container
            .get_bean_as::<WebEngine>(BEAN_WEB_ENGINE)
            .ok_or_else(|| anyhow!("bean '{}' is not registered", BEAN_WEB_ENGINE))?;
        let pool = container.get_db_as::<DatabasePool>();

        engine.route(
            "/health",
            get(move || {
                let pool = pool.clone();
                async move { Json(health_status(pool.as_deref())) }
            }),
        )
    }
}

fn register_health(registry: &BeanRegistry) -> anyhow::Result<()> {
    registry.register(BeanDefinition::new(BEAN_HEALTH_CHECK, HealthCheck).container_aware())?;
    Ok(())
}

submit_module!("health", register_health);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[test]
    fn test_status_follows_pool() {
        assert_eq!(health_status(None)["status"], "DOWN");

        let pool = DatabasePool::connect(&DatabaseConfig {
            host: "localhost".to_string(),
            port: 3306,
            user: "root".to_string(),
            password: String::new(),
            db: "devops".to_string(),
            max_idle: 1,
            max_open: 2,
        })
        .unwrap();
        assert_eq!(health_status(Some(&pool))["status"], "UP");

        pool.close();
        assert_eq!(health_status(Some(&pool))["database"], false);
    }

    #[test]
    fn test_missing_engine_is_reported() {
        let registry = BeanRegistry::new();
        let container = Container::new(&registry);
        assert!(HealthCheck.inject_container(&container).is_err());
    }
}
