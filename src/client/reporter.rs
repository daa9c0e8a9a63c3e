// 定时位置上报
// 状态：Idle -> Sampling -> (Success | Failed)，失败从不终止定时器

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::{
    ClientError, GeoError, Geolocator, OfflineCache, OfflineSample, Position, PositionOptions,
};

/// 位置上报目标，一般为 `ApiClient`
#[async_trait]
pub trait LocationSink: Send + Sync {
    async fn push_location(
        &self,
        user_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), ClientError>;
}

#[derive(Debug, Clone)]
pub struct ReporterConfig {
    pub user_id: i64,
    pub interval: Duration,
    /// 两次成功定位的触发时刻之间的最小间隔
    pub min_gap: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl ReporterConfig {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            interval: Duration::from_secs(60),
            min_gap: Duration::from_secs(60),
            request_timeout: Duration::from_secs(20),
            max_retries: 2,
            retry_delay: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReporterState {
    Idle,
    Sampling,
    Success,
    Failed,
}

/// 给用户的临时提示
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    LocationUpdated,
    StoredOffline,
    GeolocationFailed(GeoError),
    GeolocationUnsupported,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// 距上次成功定位不足 `min_gap`
    Skipped,
    Updated { position: Position, pushed: bool },
    /// 设备定位放弃后改用离线样本，没有样本时 `sample` 为 `None`
    FellBack {
        sample: Option<OfflineSample>,
        pushed: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub outcome: TickOutcome,
    pub notices: Vec<Notice>,
}

pub struct LocationReporter<G, S, C> {
    config: ReporterConfig,
    geolocator: G,
    sink: S,
    cache: C,
    state: ReporterState,
    retry_count: u32,
    last_update: Option<Instant>,
    last_known: Option<Position>,
}

impl<G, S, C> LocationReporter<G, S, C>
where
    G: Geolocator,
    S: LocationSink,
    C: OfflineCache,
{
    pub fn new(config: ReporterConfig, geolocator: G, sink: S, cache: C) -> Self {
        Self {
            config,
            geolocator,
            sink,
            cache,
            state: ReporterState::Idle,
            retry_count: 0,
            last_update: None,
            last_known: None,
        }
    }

    pub fn state(&self) -> ReporterState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn last_known(&self) -> Option<Position> {
        self.last_known
    }

    pub fn geolocator(&self) -> &G {
        &self.geolocator
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// 用于展示的位置：内存中的最后定位，其次是离线样本
    pub async fn display_position(&self) -> Option<Position> {
        if let Some(position) = self.last_known {
            return Some(position);
        }
        match self.cache.load(self.config.user_id).await {
            Ok(sample) => sample.map(|s| Position::new(s.latitude, s.longitude)),
            Err(e) => {
                tracing::warn!("failed to read offline sample: {e}");
                None
            }
        }
    }

    /// 定时器触发一次
    pub async fn tick(&mut self) -> TickReport {
        let mut notices = Vec::new();
        // 以本次触发时刻为准，设备耗时不计入间隔
        let started = Instant::now();

        if let Some(last) = self.last_update {
            if last.elapsed() < self.config.min_gap {
                return TickReport {
                    outcome: TickOutcome::Skipped,
                    notices,
                };
            }
        }

        loop {
            self.state = ReporterState::Sampling;
            match self.sample().await {
                Ok(position) => {
                    self.state = ReporterState::Success;
                    self.last_known = Some(position);
                    self.last_update = Some(started);
                    let pushed = self.push(position, &mut notices).await;
                    return TickReport {
                        outcome: TickOutcome::Updated { position, pushed },
                        notices,
                    };
                }
                Err(e) => {
                    self.state = ReporterState::Failed;
                    tracing::warn!(retry = self.retry_count, "geolocation failed: {e}");
                    notices.push(match &e {
                        GeoError::Unsupported => Notice::GeolocationUnsupported,
                        other => Notice::GeolocationFailed(other.clone()),
                    });

                    if e.is_timeout() && self.retry_count < self.config.max_retries {
                        self.retry_count += 1;
                        tokio::time::sleep(self.config.retry_delay).await;
                        continue;
                    }

                    let outcome = self.fall_back(&mut notices).await;
                    self.retry_count = 0;
                    return TickReport { outcome, notices };
                }
            }
        }
    }

    async fn sample(&self) -> Result<Position, GeoError> {
        // 重试时放宽精度
        let options = PositionOptions {
            high_accuracy: self.retry_count == 0,
            timeout: self.config.request_timeout,
            maximum_age: Duration::ZERO,
        };
        match tokio::time::timeout(
            self.config.request_timeout,
            self.geolocator.current_position(options),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(GeoError::Timeout),
        }
    }

    /// 上报成功清除离线样本并重置重试计数；失败则写入离线样本
    async fn push(&mut self, position: Position, notices: &mut Vec<Notice>) -> bool {
        let user_id = self.config.user_id;
        match self
            .sink
            .push_location(user_id, position.latitude, position.longitude)
            .await
        {
            Ok(()) => {
                if let Err(e) = self.cache.clear(user_id).await {
                    tracing::warn!(user_id, "failed to clear offline sample: {e}");
                }
                self.retry_count = 0;
                notices.push(Notice::LocationUpdated);
                true
            }
            Err(e) => {
                tracing::warn!(user_id, "location push failed: {e}");
                let sample = OfflineSample {
                    user_id,
                    latitude: position.latitude,
                    longitude: position.longitude,
                    timestamp: Utc::now(),
                };
                if let Err(e) = self.cache.store(&sample).await {
                    tracing::warn!(user_id, "failed to store offline sample: {e}");
                }
                notices.push(Notice::StoredOffline);
                false
            }
        }
    }

    async fn fall_back(&mut self, notices: &mut Vec<Notice>) -> TickOutcome {
        let sample = match self.cache.load(self.config.user_id).await {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!("failed to read offline sample: {e}");
                None
            }
        };

        let Some(sample) = sample else {
            return TickOutcome::FellBack {
                sample: None,
                pushed: false,
            };
        };

        let position = Position::new(sample.latitude, sample.longitude);
        self.last_known = Some(position);
        let pushed = self.push(position, notices).await;
        TickOutcome::FellBack {
            sample: Some(sample),
            pushed,
        }
    }

    /// 按固定周期运行直到 `shutdown` 变为 `true`；进行中的一次上报不会被打断
    pub async fn run(
        mut self,
        mut shutdown: watch::Receiver<bool>,
        reports: mpsc::Sender<TickReport>,
    ) -> Self {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.tick().await;
                    self.state = ReporterState::Idle;
                    if report.outcome != TickOutcome::Skipped {
                        // 没人读取时丢弃
                        let _ = reports.try_send(report);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(user_id = self.config.user_id, "location reporter stopped");
        self
    }
}

impl<G, S, C> LocationReporter<G, S, C>
where
    G: Geolocator + 'static,
    S: LocationSink + 'static,
    C: OfflineCache + 'static,
{
    pub fn spawn(self) -> ReporterHandle<G, S, C> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (report_tx, report_rx) = mpsc::channel(16);
        let task = tokio::spawn(self.run(shutdown_rx, report_tx));
        ReporterHandle {
            shutdown: shutdown_tx,
            reports: report_rx,
            task,
        }
    }
}

/// 会话结束时调用 `stop`，清除定时器
pub struct ReporterHandle<G, S, C> {
    shutdown: watch::Sender<bool>,
    reports: mpsc::Receiver<TickReport>,
    task: JoinHandle<LocationReporter<G, S, C>>,
}

impl<G, S, C> ReporterHandle<G, S, C> {
    pub async fn next_report(&mut self) -> Option<TickReport> {
        self.reports.recv().await
    }

    pub async fn stop(self) -> Option<LocationReporter<G, S, C>> {
        let _ = self.shutdown.send(true);
        match self.task.await {
            Ok(reporter) => Some(reporter),
            Err(e) => {
                tracing::error!("location reporter task failed: {e}");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MemoryCache;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// 按脚本返回结果；脚本耗尽后一直挂起
    #[derive(Default)]
    struct ScriptedGeo {
        script: Mutex<VecDeque<Result<Position, GeoError>>>,
        calls: Mutex<Vec<PositionOptions>>,
    }

    impl ScriptedGeo {
        fn with(results: Vec<Result<Position, GeoError>>) -> Self {
            Self {
                script: Mutex::new(results.into()),
                calls: Mutex::default(),
            }
        }

        fn calls(&self) -> Vec<PositionOptions> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Geolocator for ScriptedGeo {
        async fn current_position(&self, options: PositionOptions) -> Result<Position, GeoError> {
            self.calls.lock().unwrap().push(options);
            let next = self.script.lock().unwrap().pop_front();
            match next {
                Some(result) => result,
                None => std::future::pending().await,
            }
        }
    }

    #[derive(Default)]
    struct FakeSink {
        offline: AtomicBool,
        pushed: Mutex<Vec<(f64, f64)>>,
    }

    #[async_trait]
    impl LocationSink for FakeSink {
        async fn push_location(
            &self,
            _: i64,
            latitude: f64,
            longitude: f64,
        ) -> Result<(), ClientError> {
            if self.offline.load(Ordering::SeqCst) {
                return Err(ClientError::Network("connection refused".into()));
            }
            self.pushed.lock().unwrap().push((latitude, longitude));
            Ok(())
        }
    }

    fn reporter(geo: ScriptedGeo) -> LocationReporter<ScriptedGeo, FakeSink, MemoryCache> {
        LocationReporter::new(ReporterConfig::new(7), geo, FakeSink::default(), MemoryCache::new())
    }

    #[tokio::test(start_paused = true)]
    async fn success_pushes_and_clears_cache() {
        let mut r = reporter(ScriptedGeo::with(vec![Ok(Position::new(1.0, 2.0))]));
        r.cache()
            .store(&OfflineSample {
                user_id: 7,
                latitude: 0.0,
                longitude: 0.0,
                timestamp: Utc::now(),
            })
            .await
            .unwrap();

        let report = r.tick().await;
        assert_eq!(
            report.outcome,
            TickOutcome::Updated {
                position: Position::new(1.0, 2.0),
                pushed: true
            }
        );
        assert_eq!(report.notices, vec![Notice::LocationUpdated]);
        assert_eq!(r.state(), ReporterState::Success);
        assert!(r.cache().load(7).await.unwrap().is_none());
        assert!(r.geolocator().calls()[0].high_accuracy);
    }

    #[tokio::test(start_paused = true)]
    async fn push_failure_caches_then_later_success_clears() {
        let mut r = reporter(ScriptedGeo::with(vec![
            Ok(Position::new(1.0, 2.0)),
            Ok(Position::new(3.0, 4.0)),
        ]));
        r.sink().offline.store(true, Ordering::SeqCst);

        let report = r.tick().await;
        assert_eq!(report.notices, vec![Notice::StoredOffline]);
        let cached = r.cache().load(7).await.unwrap().unwrap();
        assert_eq!((cached.latitude, cached.longitude), (1.0, 2.0));
        assert_eq!(r.display_position().await, Some(Position::new(1.0, 2.0)));

        r.sink().offline.store(false, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(60)).await;
        let report = r.tick().await;
        assert_eq!(report.notices, vec![Notice::LocationUpdated]);
        assert!(r.cache().load(7).await.unwrap().is_none());
        assert_eq!(*r.sink().pushed.lock().unwrap(), vec![(3.0, 4.0)]);
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_inside_min_gap_are_skipped() {
        let mut r = reporter(ScriptedGeo::with(vec![
            Ok(Position::new(1.0, 2.0)),
            Ok(Position::new(3.0, 4.0)),
        ]));
        r.tick().await;

        tokio::time::advance(Duration::from_secs(30)).await;
        assert_eq!(r.tick().await.outcome, TickOutcome::Skipped);
        assert_eq!(r.geolocator().calls().len(), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(matches!(r.tick().await.outcome, TickOutcome::Updated { .. }));
    }

    /// 每次定位耗时 1 秒
    struct SlowGeo;

    #[async_trait]
    impl Geolocator for SlowGeo {
        async fn current_position(&self, _: PositionOptions) -> Result<Position, GeoError> {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(Position::new(1.0, 2.0))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn device_latency_does_not_skip_next_tick() {
        let mut r = LocationReporter::new(
            ReporterConfig::new(7),
            SlowGeo,
            FakeSink::default(),
            MemoryCache::new(),
        );
        for _ in 0..5 {
            let started = Instant::now();
            assert!(matches!(r.tick().await.outcome, TickOutcome::Updated { .. }));
            tokio::time::advance(Duration::from_secs(60) - started.elapsed()).await;
        }
        assert_eq!(r.sink().pushed.lock().unwrap().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn timeouts_retry_twice_with_relaxed_accuracy() {
        let mut r = reporter(ScriptedGeo::with(vec![
            Err(GeoError::Timeout),
            Err(GeoError::Timeout),
            Ok(Position::new(5.0, 6.0)),
        ]));
        let started = Instant::now();

        let report = r.tick().await;
        assert!(matches!(report.outcome, TickOutcome::Updated { pushed: true, .. }));
        assert_eq!(started.elapsed(), Duration::from_secs(4));

        let accuracy: Vec<bool> = r.geolocator().calls().iter().map(|o| o.high_accuracy).collect();
        assert_eq!(accuracy, vec![true, false, false]);
        assert_eq!(r.retry_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_fall_back_to_cached_sample() {
        // 脚本为空：每次请求都挂起直到 20 秒超时
        let mut r = reporter(ScriptedGeo::default());
        let sample = OfflineSample {
            user_id: 7,
            latitude: 8.0,
            longitude: 9.0,
            timestamp: Utc::now(),
        };
        r.cache().store(&sample).await.unwrap();
        let started = Instant::now();

        let report = r.tick().await;
        assert_eq!(
            report.outcome,
            TickOutcome::FellBack {
                sample: Some(sample),
                pushed: true
            }
        );
        // 3 次 20 秒超时加 2 次 2 秒间隔
        assert_eq!(started.elapsed(), Duration::from_secs(64));
        assert_eq!(r.geolocator().calls().len(), 3);
        assert_eq!(r.retry_count(), 0);
        assert_eq!(r.last_known(), Some(Position::new(8.0, 9.0)));
        assert!(r.cache().load(7).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn non_timeout_error_falls_back_immediately() {
        let mut r = reporter(ScriptedGeo::with(vec![Err(GeoError::PermissionDenied)]));
        let report = r.tick().await;
        assert_eq!(
            report.outcome,
            TickOutcome::FellBack {
                sample: None,
                pushed: false
            }
        );
        assert_eq!(
            report.notices,
            vec![Notice::GeolocationFailed(GeoError::PermissionDenied)]
        );
        assert_eq!(r.geolocator().calls().len(), 1);
        assert_eq!(r.state(), ReporterState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn unsupported_device_notice() {
        let mut r = reporter(ScriptedGeo::with(vec![Err(GeoError::Unsupported)]));
        let report = r.tick().await;
        assert_eq!(report.notices, vec![Notice::GeolocationUnsupported]);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_reporter_keeps_cadence_until_stopped() {
        let r = reporter(ScriptedGeo::with(vec![
            Ok(Position::new(1.0, 1.0)),
            Err(GeoError::Unavailable),
            Ok(Position::new(2.0, 2.0)),
        ]));
        let mut handle = r.spawn();

        let first = handle.next_report().await.unwrap();
        assert!(matches!(first.outcome, TickOutcome::Updated { .. }));
        let second = handle.next_report().await.unwrap();
        assert!(matches!(second.outcome, TickOutcome::FellBack { .. }));
        let third = handle.next_report().await.unwrap();
        assert!(matches!(third.outcome, TickOutcome::Updated { .. }));

        let r = handle.stop().await.unwrap();
        assert_eq!(r.state(), ReporterState::Idle);
        assert_eq!(r.sink().pushed.lock().unwrap().len(), 2);
    }
}
