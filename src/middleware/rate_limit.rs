use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::Request,
    middleware::Next,
    response::Response,
};
use redis::AsyncCommands;

use crate::{config::Config, error::AppError};

/// 基于 Redis 的固定窗口限流，按客户端 IP 计数
#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<redis::Client>,
    config: Arc<Config>,
}

impl RateLimiter {
    pub fn new(redis: redis::Client, config: Arc<Config>) -> Self {
        Self {
            redis: Arc::new(redis),
            config,
        }
    }

    /// 超限返回 `true`；Redis 不可用时放行
    async fn exceeded(&self, ip: &str) -> bool {
        match self.count(ip).await {
            Ok(count) => count > u64::from(self.config.rate_limit_requests),
            Err(e) => {
                tracing::warn!("rate limiter unavailable, allowing request: {e}");
                false
            }
        }
    }

    async fn count(&self, ip: &str) -> redis::RedisResult<u64> {
        let key = format!("rate_limit:{ip}");
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        // INCR + EXPIRE 实现计数窗口
        let count: u64 = conn.incr(&key, 1).await?;
        if count == 1 {
            let window = self.config.rate_limit_window().as_secs() as i64;
            let _: () = conn.expire(&key, window).await?;
        }
        Ok(count)
    }
}

/// 优先取代理头，其次取连接地址
pub fn client_ip<B>(req: &Request<B>) -> String {
    let headers = req.headers();
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| {
            headers
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').map(str::trim).find(|ip| !ip.is_empty()))
                .map(str::to_string)
        })
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
        })
        .map(|ip| ip.trim().to_string())
        .unwrap_or_else(|| "unknown".into())
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let ip = client_ip(&req);
    if limiter.exceeded(&ip).await {
        tracing::info!(%ip, "rate limit exceeded");
        return Err(AppError::RateLimited(format!(
            "Too many requests, retry in {} seconds",
            limiter.config.rate_limit_window().as_secs()
        )));
    }

    Ok(next.run(req).await)
}
