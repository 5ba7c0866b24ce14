//! 保留的 Bean 名称
//!
//! 容器和 Container 门面按固定名称访问这些 Bean

/// 停止等待回调（全局唯一，重复注册与普通重名同样报错）
pub const STOP_WAITER_BEAN_NAME: &str = "generalStopWaiter";

/// 数据库句柄，`Container::get_db` 的快捷入口
pub const DB_BEAN_NAME: &str = "DB";

/// 启动时由 `SproutApplication` 注册的配置环境
pub const ENVIRONMENT_BEAN_NAME: &str = "environment";

/// 所有保留名称
pub const RESERVED_BEAN_NAMES: &[&str] =
    &[STOP_WAITER_BEAN_NAME, DB_BEAN_NAME, ENVIRONMENT_BEAN_NAME];

/// 检查名称是否为保留名称
///
/// # Example
/// ```
/// use sprout_core::constants::is_reserved_bean_name;
///
/// assert!(is_reserved_bean_name("generalStopWaiter"));
/// assert!(is_reserved_bean_name("DB"));
/// assert!(!is_reserved_bean_name("userService"));
/// ```
pub fn is_reserved_bean_name(name: &str) -> bool {
    RESERVED_BEAN_NAMES.contains(&name)
}
