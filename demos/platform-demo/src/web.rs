//! HTTP 服务
//!
//! - `HttpServerLifecycle` 在先期注入阶段创建 `WebEngine` 并注册，启动时在后台线程运行 axum
//! - 其他模块在一般注入阶段向 `WebEngine` 添加路由和过滤器
//! - `authenticationVerify` 是一个可调用 Bean，负责安装鉴权过滤器

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
    Router,
};
use parking_lot::Mutex;
use sprout_core::prelude::*;
use tokio::sync::oneshot;

use crate::config::{AppConfig, BEAN_APP};

pub const BEAN_WEB_ENGINE: &str = "webEngine";
pub const BEAN_HTTP_SERVER_LIFECYCLE: &str = "httpServerLifecycle";
pub const BEAN_AUTHENTICATION_VERIFY: &str = "authenticationVerify";

/// 受保护的路径前缀
pub const API_PREFIX: &str = "/api/";

/// 过滤器：返回错误状态码时请求被拦截
pub type Filter = Arc<dyn Fn(&Request) -> Result<(), StatusCode> + Send + Sync>;

#[derive(Clone)]
struct FilterChain(Arc<Vec<Filter>>);

/// 路由与过滤器的收集器
///
/// 服务器启动时取出路由，之后不能再添加
pub struct WebEngine {
    router: Mutex<Option<Router>>,
    filters: Mutex<Vec<Filter>>,
}

impl WebEngine {
    pub fn new() -> Self {
        Self {
            router: Mutex::new(Some(Router::new())),
            filters: Mutex::new(Vec::new()),
        }
    }

    /// 添加路由
    pub fn route(&self, path: &str, method_router: MethodRouter) -> anyhow::Result<()> {
        let mut slot = self.router.lock();
        let router = slot
            .take()
            .ok_or_else(|| anyhow!("cannot add route '{}': server already started", path))?;
        *slot = Some(router.route(path, method_router));
        tracing::debug!("  ├─ Route registered: {}", path);
        Ok(())
    }

    /// 追加过滤器，按添加顺序执行
    pub fn add_filter(&self, filter: Filter) {
        self.filters.lock().push(filter);
    }

    pub fn filter_count(&self) -> usize {
        self.filters.lock().len()
    }

    /// 取出最终的路由（过滤器链 + 请求日志），只能取一次
    fn build(&self) -> Option<Router> {
        let router = self.router.lock().take()?;
        let chain = FilterChain(Arc::new(self.filters.lock().clone()));

        Some(
            router
                .layer(middleware::from_fn_with_state(chain, run_filters))
                .layer(middleware::from_fn(request_logging)),
        )
    }
}

impl Default for WebEngine {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_filters(State(chain): State<FilterChain>, request: Request, next: Next) -> Response {
    for filter in chain.0.iter() {
        if let Err(status) = filter(&request) {
            tracing::debug!("Request {} rejected with {}", request.uri(), status);
            return status.into_response();
        }
    }
    next.run(request).await
}

async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let response = next.run(request).await;

    let status = response.status();
    let elapsed = start.elapsed();
    if status.is_server_error() {
        tracing::error!(%method, %uri, status = status.as_u16(), ?elapsed, "Request completed");
    } else if status.is_client_error() {
        tracing::warn!(%method, %uri, status = status.as_u16(), ?elapsed, "Request completed");
    } else {
        tracing::debug!(%method, %uri, status = status.as_u16(), ?elapsed, "Request completed");
    }
    response
}

struct RunningServer {
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// HTTP 服务器生命周期
#[derive(Default)]
pub struct HttpServerLifecycle {
    engine: Mutex<Option<Arc<WebEngine>>>,
    addr: Mutex<Option<String>>,
    running: Mutex<Option<RunningServer>>,
}

impl PreInjectable for HttpServerLifecycle {
    fn pre_inject(&self, registry: &BeanRegistry) -> anyhow::Result<()> {
        let app = registry
            .require_bean::<AppConfig>(BEAN_APP)
            .context("http server needs the app config")?;

        if app.is_prod() {
            tracing::info!("Running in production mode");
        }

        let engine = Arc::new(WebEngine::new());
        registry.register(BeanDefinition::from_arc(BEAN_WEB_ENGINE, Arc::clone(&engine)))?;

        *self.engine.lock() = Some(engine);
        *self.addr.lock() = Some(app.addr.clone());
        Ok(())
    }
}

impl Startable for HttpServerLifecycle {
    fn start_order(&self) -> i32 {
        0
    }

    fn start(&self) {
        let Some(engine) = self.engine.lock().clone() else {
            tracing::error!("HTTP server was not prepared, skipping start");
            return;
        };
        let Some(router) = engine.build() else {
            tracing::error!("HTTP routes were already taken, skipping start");
            return;
        };
        let Some(addr) = self.addr.lock().clone() else {
            tracing::error!("HTTP server address is not configured, skipping start");
            return;
        };

        tracing::info!(
            server_address = %addr,
            filters = engine.filter_count(),
            "Starting HTTP server"
        );
        let (shutdown, signal) = oneshot::channel::<()>();

        let spawned = std::thread::Builder::new()
            .name("http-server".to_string())
            .spawn(move || serve(addr, router, signal));

        match spawned {
            Ok(handle) => *self.running.lock() = Some(RunningServer { shutdown, handle }),
            Err(e) => tracing::error!("Failed to spawn HTTP server thread: {}", e),
        }
    }
}

impl Stoppable for HttpServerLifecycle {
    fn stop_order(&self) -> i32 {
        0
    }

    fn stop(&self) {
        let Some(server) = self.running.lock().take() else {
            tracing::debug!("HTTP server is not running");
            return;
        };

        tracing::info!("Stopping HTTP server");
        // 接收端已退出说明服务器已经结束
        let _ = server.shutdown.send(());
        if server.handle.join().is_err() {
            tracing::error!("HTTP server thread panicked");
        }
    }
}

fn serve(addr: String, router: Router, signal: oneshot::Receiver<()>) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!("Failed to build HTTP runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(server_address = %addr, "Failed to bind HTTP server: {}", e);
                return;
            }
        };
        tracing::info!("Server listening on http://{}", addr);

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = signal.await;
            })
            .await;

        match result {
            Ok(()) => tracing::info!("HTTP server stopped"),
            Err(e) => tracing::error!(server_address = %addr, "HTTP server error: {}", e),
        }
    });
}

/// 校验 `Authorization: Bearer <user>`，只拦截 `/api/` 下的路径
pub fn authorize(path: &str, headers: &HeaderMap, admins: &[String]) -> Result<(), StatusCode> {
    if !path.starts_with(API_PREFIX) {
        return Ok(());
    }

    let user = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if admins.iter().any(|admin| admin == user) {
        Ok(())
    } else {
        Err(StatusCode::FORBIDDEN)
    }
}

/// 可调用 Bean：在一般注入阶段最先执行，给 WebEngine 安装鉴权过滤器
fn install_authentication(factory: &dyn BeanFactory) {
    let Some(engine) = factory.get_bean_as::<WebEngine>(BEAN_WEB_ENGINE) else {
        tracing::error!("Bean '{}' not found, authentication is disabled", BEAN_WEB_ENGINE);
        return;
    };
    let admins: Arc<[String]> = factory
        .get_bean_as::<AppConfig>(BEAN_APP)
        .map(|app| app.admins.clone().into())
        .unwrap_or_else(|| Arc::from(Vec::new()));

    tracing::debug!("Installing authentication filter for {} admin(s)", admins.len());
    engine.add_filter(Arc::new(move |request: &Request| {
        authorize(request.uri().path(), request.headers(), &admins)
    }));
}

fn register_web(registry: &BeanRegistry) -> anyhow::Result<()> {
    registry.register(
        BeanDefinition::new(BEAN_HTTP_SERVER_LIFECYCLE, HttpServerLifecycle::default())
            .pre_injectable()
            .startable()
            .stoppable(),
    )?;
    registry.register_fn(BEAN_AUTHENTICATION_VERIFY, install_authentication)?;
    Ok(())
}

submit_module!("web", register_web);
