use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use family_tracker::{
    AppState, build_router,
    config::Config,
    middleware::RateLimiter,
    store::{MemoryStore, PgStore, Store},
};
use sqlx::Executor;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 加载配置
    let config = Config::from_env().expect("Failed to load configuration");

    // 存储：memory:// 用于本地调试，其余按 Postgres 连接
    let store: Arc<dyn Store> = if config.uses_memory_store() {
        tracing::warn!("Using in-memory store, data is lost on restart");
        Arc::new(MemoryStore::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(config.db_max_connections)
            .acquire_timeout(config.db_acquire_timeout())
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET application_name = 'family_tracker';")
                        .await?;
                    Ok(())
                })
            })
            .connect(&config.database_url)
            .await
            .expect("Failed to connect to Postgres");

        let store = PgStore::new(pool);
        store.migrate().await.expect("Failed to run migrations");
        Arc::new(store)
    };

    // 设置限流器，未配置 Redis 时不限流
    let rate_limiter = config.redis_url.as_deref().map(|url| {
        let client = redis::Client::open(url).expect("Failed to create Redis client");
        Arc::new(RateLimiter::new(client, Arc::new(config.clone())))
    });
    if rate_limiter.is_none() {
        tracing::info!("REDIS_URL not set, rate limiting disabled");
    }

    let state = AppState::new(store, config.clone());
    let router = build_router(state, rate_limiter);

    // 开发模式允许所有来源，生产模式只允许配置的来源
    #[cfg(debug_assertions)]
    let router = {
        tracing::debug!("Adding CORS layer for development mode");
        router.layer(CorsLayer::permissive())
    };

    #[cfg(not(debug_assertions))]
    let router = match config
        .cors_origin
        .as_deref()
        .and_then(|origin| origin.parse::<axum::http::HeaderValue>().ok())
    {
        Some(origin) => router.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        ),
        None => router,
    };

    // 启动服务器
    let addr = SocketAddr::new(
        config.server_host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid server_host, falling back to dual-stack default");
            IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
        }),
        config.server_port,
    );
    tracing::info!("Server listening on {}", addr);
    axum::serve(
        tokio::net::TcpListener::bind(&addr)
            .await
            .expect("Failed to bind"),
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Failed to start server");
}
