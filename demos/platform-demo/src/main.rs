//! 运维平台示例
//!
//! 配置、数据库、HTTP 服务、鉴权过滤器和业务模块各自通过 `submit_module!`
//! 注册到容器，`main` 只负责启动应用并等待 Ctrl-C

mod config;
mod database;
mod health;
mod user;
mod web;

use sprout_core::prelude::*;

fn main() -> anyhow::Result<()> {
    SproutApplication::new("devops-platform")
        .initializer(|context| {
            context.register_stop_waiter(ctrl_c_stop_waiter())?;
            Ok(())
        })
        .run()?;

    Ok(())
}
