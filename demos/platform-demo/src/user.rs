//! 用户模块
//!
//! `UserRepository` 通过字段绑定拿到 `DB`，`UserController` 在一般注入阶段注册路由

use std::sync::Arc;

use axum::{http::StatusCode, routing::get, Json};
use serde_json::json;
use sprout_core::prelude::*;
use sprout_core_macros::BindFields;

use crate::database::DatabasePool;
use crate::web::{WebEngine, BEAN_WEB_ENGINE};

pub const BEAN_USER_REPOSITORY: &str = "userRepository";
pub const BEAN_USER_CONTROLLER: &str = "userController";

#[derive(BindFields, Default)]
pub struct UserRepository {
    #[inject("DB")]
    db: Autowired<DatabasePool>,
}

impl UserRepository {
    pub fn count(&self) -> anyhow::Result<u64> {
        let db = self.db.get().ok_or_else(|| anyhow!("DB is not bound"))?;
        db.execute("SELECT COUNT(*) FROM users")
    }
}

#[derive(Default)]
pub struct UserController;

impl Injectable for UserController {
    fn inject(&self, factory: &dyn BeanFactory) -> anyhow::Result<()> {
        let engine = factory.require_bean::<WebEngine>(BEAN_WEB_ENGINE)?;
        let repository = factory.require_bean::<UserRepository>(BEAN_USER_REPOSITORY)?;

        engine.route(
            "/api/users/count",
            get(move || {
                let repository = Arc::clone(&repository);
                async move {
                    match repository.count() {
                        Ok(count) => (StatusCode::OK, Json(json!({ "count": count }))),
                        Err(e) => {
                            tracing::error!("Failed to count users: {:#}", e);
                            (
                                StatusCode::INTERNAL_SERVER_ERROR,
                                Json(json!({ "error": e.to_string() })),
                            )
                        }
                    }
                }
            }),
        )
    }
}

fn register_user(registry: &BeanRegistry) -> anyhow::Result<()> {
    registry.register(
        BeanDefinition::new(BEAN_USER_REPOSITORY, UserRepository::default()).bind_fields(),
    )?;
    registry.register(BeanDefinition::new(BEAN_USER_CONTROLLER, UserController).injectable())?;
    Ok(())
}

submit_module!("user", register_user);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_repository_fails() {
        assert!(UserRepository::default().count().is_err());
    }

    #[test]
    fn test_controller_requires_engine() {
        let registry = BeanRegistry::new();
        registry
            .register(BeanDefinition::new(BEAN_USER_REPOSITORY, UserRepository::default()))
            .unwrap();

        let err = UserController.inject(&registry).unwrap_err();
        assert!(err.to_string().contains(BEAN_WEB_ENGINE));
    }
}
