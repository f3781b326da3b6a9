//! Pipeline orchestration
//!
//! One concurrent unit per feed or poller; suspension happens only at I/O
//! boundaries. Once a bar closes, the detect -> fuse -> score -> persist
//! sequence for that symbol runs to completion without suspension between
//! state mutations, so symbols can only interleave between bars, never
//! within one.

use crate::aggregate::{Bar, BarAggregator};
use crate::alert::{Notifier, WebhookNotifier, WickAlert};
use crate::analysis::VoidWallDetector;
use crate::book::BookCache;
use crate::config::Config;
use crate::features::{self, FeatureRegistry};
use crate::feed::{
    BookFeed, CoinalyzeClient, FundingSnapshot, LiquidationEvent, MacroMonitor, MacroState,
    OiSnapshot, OkxBookFeed, OkxTradeFeed, Trade, TradeFeed,
};
use crate::score::WickScorer;
use crate::storage::{EmbeddedBook, EventRecord, JsonlWriter, StatusSnapshot, StatusWriter, SymbolStatus};
use crate::wick::{self, WickOccurrence};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, RwLock};
use uuid::Uuid;

/// Liquidation lookback per poll cycle, minutes
const LIQUIDATION_POLL_LOOKBACK_MIN: i64 = 5;
/// Status snapshot cadence
const STATUS_INTERVAL: Duration = Duration::from_secs(5);
/// Periodic stats log cadence
const STATS_INTERVAL: Duration = Duration::from_secs(300);

/// Typed update from the derivatives poller into the pipeline
#[derive(Debug)]
pub enum DerivsUpdate {
    Oi(OiSnapshot),
    Funding(FundingSnapshot),
    Liquidation(LiquidationEvent),
}

/// Last-activity tracking per feed, shared across tasks
#[derive(Default)]
pub struct FeedHealth {
    inner: std::sync::Mutex<HashMap<String, DateTime<Utc>>>,
}

impl FeedHealth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record activity on a feed
    pub fn mark(&self, feed: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.insert(feed.to_string(), Utc::now());
        }
    }

    /// Age in seconds per feed; -1 for feeds that never produced data
    pub fn ages(&self, feeds: &[&str], now: DateTime<Utc>) -> BTreeMap<String, i64> {
        let inner = self.inner.lock().map(|g| g.clone()).unwrap_or_default();
        feeds
            .iter()
            .map(|feed| {
                let age = inner
                    .get(*feed)
                    .map(|last| (now - *last).num_seconds())
                    .unwrap_or(-1);
                (feed.to_string(), age)
            })
            .collect()
    }
}

#[derive(Debug, Default)]
struct Counters {
    bars_closed: u64,
    wicks_detected: u64,
    events_written: u64,
    write_failures: u64,
    alerts_sent: u64,
}

/// The main engine coordinating feeds, detection and persistence
pub struct WickEngine {
    config: Config,
    aggregators: HashMap<String, BarAggregator>,
    registry: FeatureRegistry,
    scorer: WickScorer,
    micro: VoidWallDetector,
    book_cache: Arc<BookCache>,
    writer: JsonlWriter,
    status_writer: StatusWriter,
    notifier: Option<WebhookNotifier>,
    macro_monitor: Option<MacroMonitor>,
    macro_state: Arc<RwLock<MacroState>>,
    health: Arc<FeedHealth>,
    counters: Counters,
    symbol_status: BTreeMap<String, SymbolStatus>,
    started_at: Instant,
    timeframe: String,
    alert_ratio: f64,
}

impl WickEngine {
    /// Build an engine from configuration
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let aggregators = config
            .feed
            .symbols
            .iter()
            .map(|s| (s.clone(), BarAggregator::new(config.engine.bar_interval_secs)))
            .collect();

        let writer = JsonlWriter::new(
            config.storage.output_dir.clone(),
            config.storage.file_rotation_mb,
        )?;
        let status_writer = StatusWriter::new(&config.storage.output_dir);

        let notifier = match &config.alert {
            Some(alert) => Some(WebhookNotifier::new(
                alert.webhook_url.clone(),
                alert.cooldown_secs,
            )?),
            None => None,
        };

        let macro_monitor = MacroMonitor::new(
            config.coingecko.api_key.clone(),
            Duration::from_secs(config.coingecko.poll_interval_secs),
        )?;
        let macro_state = macro_monitor.state_handle();

        let timeframe = timeframe_label(config.engine.bar_interval_secs);
        let alert_ratio = features::dec_f64(config.engine.alert_ratio);

        Ok(Self {
            micro: VoidWallDetector::new(config.micro.clone()),
            aggregators,
            registry: FeatureRegistry::new(),
            scorer: WickScorer::new(),
            book_cache: Arc::new(BookCache::new()),
            writer,
            status_writer,
            notifier,
            macro_monitor: Some(macro_monitor),
            macro_state,
            health: Arc::new(FeedHealth::new()),
            counters: Counters::default(),
            symbol_status: BTreeMap::new(),
            started_at: Instant::now(),
            timeframe,
            alert_ratio,
            config,
        })
    }

    /// Run until shutdown
    pub async fn run(mut self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Signal handler flips the shared shutdown flag
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested");
                let _ = shutdown_tx.send(true);
            }
        });

        let symbols = self.config.feed.symbols.clone();

        // Trade feed
        let trade_feed = OkxTradeFeed::new(self.config.feed.ws_url.clone(), symbols.clone());
        let mut trade_rx = trade_feed.subscribe(shutdown_rx.clone()).await?;

        // Book feed writes straight into the shared cache
        let book_feed = OkxBookFeed::new(self.config.feed.ws_url.clone(), symbols.clone());
        let mut book_rx = book_feed.subscribe(shutdown_rx.clone()).await?;
        {
            let cache = self.book_cache.clone();
            let health = self.health.clone();
            tokio::spawn(async move {
                while let Some(snapshot) = book_rx.recv().await {
                    health.mark("orderbook");
                    cache.insert(snapshot).await;
                }
                tracing::warn!("Book feed channel closed");
            });
        }

        // Derivatives poller feeds typed updates into the main loop
        let (derivs_tx, mut derivs_rx) = mpsc::channel(256);
        let coinalyze = CoinalyzeClient::new(self.config.coinalyze.api_key.clone())?;
        tokio::spawn(poll_derivatives(
            coinalyze,
            symbols.clone(),
            Duration::from_secs(self.config.coinalyze.poll_interval_secs),
            derivs_tx,
            shutdown_rx.clone(),
        ));

        // Macro monitor maintains its shared state on its own cadence
        if let Some(monitor) = self.macro_monitor.take() {
            tokio::spawn(monitor.run(shutdown_rx.clone()));
        }

        let mut status_interval = tokio::time::interval(STATUS_INTERVAL);
        status_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut stats_interval = tokio::time::interval(STATS_INTERVAL);
        stats_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut shutdown = shutdown_rx;
        let mut trade_feed_alive = true;

        tracing::info!(symbols = ?symbols, timeframe = %self.timeframe, "Engine running");

        loop {
            tokio::select! {
                maybe_trade = trade_rx.recv(), if trade_feed_alive => {
                    match maybe_trade {
                        Some(trade) => {
                            self.health.mark("trades");
                            self.on_trade(trade).await;
                        }
                        None => {
                            // Fatal for this feed only; remaining feeds keep
                            // running and the staleness age makes it visible
                            trade_feed_alive = false;
                            tracing::error!("Trade feed terminated");
                        }
                    }
                }

                Some(update) = derivs_rx.recv() => {
                    self.health.mark("derivatives");
                    match update {
                        DerivsUpdate::Oi(snapshot) => self.registry.register_oi(snapshot),
                        DerivsUpdate::Funding(snapshot) => self.registry.register_funding(snapshot),
                        DerivsUpdate::Liquidation(event) => self.registry.register_liquidation(event),
                    }
                }

                _ = status_interval.tick() => {
                    self.write_status(true).await;
                }

                _ = stats_interval.tick() => {
                    tracing::info!(
                        bars_closed = self.counters.bars_closed,
                        wicks_detected = self.counters.wicks_detected,
                        events_written = self.counters.events_written,
                        alerts_sent = self.counters.alerts_sent,
                        "Engine stats"
                    );
                }

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        self.write_status(false).await;
        tracing::info!("Engine stopped");
        Ok(())
    }

    /// Route one trade through its symbol's aggregator
    async fn on_trade(&mut self, trade: Trade) {
        let Some(aggregator) = self.aggregators.get_mut(&trade.symbol) else {
            tracing::debug!(symbol = %trade.symbol, "Trade for unconfigured symbol ignored");
            return;
        };

        if let Some(bar) = aggregator.process(&trade) {
            self.counters.bars_closed += 1;
            tracing::info!(
                symbol = %bar.symbol,
                open = %bar.open,
                high = %bar.high,
                low = %bar.low,
                close = %bar.close,
                volume = %bar.volume,
                "Bar closed"
            );
            self.on_bar_close(bar).await;
        }
    }

    /// Detect wicks on a finalized bar and process each occurrence
    async fn on_bar_close(&mut self, bar: Bar) {
        let occurrences = wick::detect(&bar, self.config.engine.capture_ratio);
        for occurrence in &occurrences {
            self.process_wick(&bar, occurrence).await;
        }

        self.symbol_status
            .entry(bar.symbol.clone())
            .or_default()
            .last_bar_ts = Some(bar.end_ts);
    }

    /// Fuse, score, persist and (optionally) alert on one wick
    async fn process_wick(&mut self, bar: &Bar, occurrence: &WickOccurrence) {
        self.counters.wicks_detected += 1;
        tracing::info!(symbol = %bar.symbol, side = occurrence.side.as_str(), "Wick detected");

        let book = self.book_cache.latest(&bar.symbol).await;
        let macro_state = self.macro_state.read().await.clone();

        let features = self
            .registry
            .fuse(bar, occurrence, book.as_deref(), Some(&macro_state));
        let score = self.scorer.score(&features, occurrence.side);

        tracing::info!(
            symbol = %bar.symbol,
            magnet_score = score.magnet_score,
            confidence = score.confidence,
            ratio = features.wick_to_body_ratio,
            "Wick scored"
        );

        // Inline microstructure pass keeps the calibration histories warm
        if let Some(snapshot) = book.as_deref() {
            let report = self.micro.analyze(snapshot);
            if report.has_void || report.has_stack {
                tracing::debug!(
                    symbol = %bar.symbol,
                    voids_above = report.voids_above.len(),
                    voids_below = report.voids_below.len(),
                    bid_walls = report.bid_walls.len(),
                    ask_walls = report.ask_walls.len(),
                    "Microstructure report"
                );
            }
        }

        let record = EventRecord {
            event_id: Uuid::new_v4(),
            ts: bar.end_ts,
            symbol: bar.symbol.clone(),
            timeframe: self.timeframe.clone(),
            wick_side: occurrence.side,
            wick_high: occurrence.high,
            wick_low: occurrence.low,
            features: features.clone(),
            score: score.clone(),
            orderbook: book.as_deref().map(EmbeddedBook::from_snapshot),
        };

        match self.writer.write_event(&record).await {
            Ok(()) => self.counters.events_written += 1,
            Err(e) => {
                // Never silent: loudly logged and counted in status output
                self.counters.write_failures += 1;
                tracing::error!(error = %e, symbol = %bar.symbol, "Failed to persist event");
            }
        }

        {
            let status = self.symbol_status.entry(bar.symbol.clone()).or_default();
            status.last_bar_ts = Some(bar.end_ts);
            status.last_wick_side = Some(occurrence.side);
            status.last_score = score.magnet_score;
        }

        if let Some(notifier) = &self.notifier {
            if features.wick_to_body_ratio >= self.alert_ratio {
                let alert = WickAlert {
                    symbol: bar.symbol.clone(),
                    side: occurrence.side,
                    high: features::dec_f64(occurrence.high),
                    low: features::dec_f64(occurrence.low),
                    magnet_score: score.magnet_score,
                    confidence: score.confidence,
                    breakdown: score.breakdown.clone(),
                    wick_ratio: features.wick_to_body_ratio,
                    delta: features.delta_at_wick,
                    depth_imbalance: features.depth_imbalance,
                    funding_rate: features.funding_rate_now,
                };
                if notifier.notify(&alert).await {
                    self.counters.alerts_sent += 1;
                }
            }
        }
    }

    /// Write the atomic status snapshot
    async fn write_status(&self, running: bool) {
        let now = Utc::now();
        let mut feed_age_secs = self
            .health
            .ages(&["trades", "orderbook", "derivatives"], now);

        let macro_state = self.macro_state.read().await;
        let macro_age = macro_state
            .last_update
            .map(|ts| (now - ts).num_seconds())
            .unwrap_or(-1);
        feed_age_secs.insert("macro".to_string(), macro_age);

        let snapshot = StatusSnapshot {
            timestamp: now,
            uptime_seconds: self.started_at.elapsed().as_secs(),
            running,
            bars_closed: self.counters.bars_closed,
            wicks_detected: self.counters.wicks_detected,
            events_written: self.counters.events_written,
            write_failures: self.counters.write_failures,
            alerts_sent: self.counters.alerts_sent,
            usdt_dominance: macro_state.usdt_dominance,
            feed_age_secs,
            symbols: self.symbol_status.clone(),
        };
        drop(macro_state);

        if let Err(e) = self.status_writer.write(&snapshot) {
            tracing::warn!(error = %e, "Failed to write status snapshot");
        }
    }
}

/// Poll derivatives data for every symbol on a fixed cadence
async fn poll_derivatives(
    client: CoinalyzeClient,
    symbols: Vec<String>,
    interval: Duration,
    tx: mpsc::Sender<DerivsUpdate>,
    mut shutdown: watch::Receiver<bool>,
) {
    tracing::info!(symbols = ?symbols, "Derivatives poller started");
    loop {
        for symbol in &symbols {
            if *shutdown.borrow() {
                return;
            }

            if let Some(oi) = client.fetch_open_interest(symbol).await {
                if tx.send(DerivsUpdate::Oi(oi)).await.is_err() {
                    return;
                }
            }
            if let Some(funding) = client.fetch_funding_rate(symbol).await {
                if tx.send(DerivsUpdate::Funding(funding)).await.is_err() {
                    return;
                }
            }
            for event in client
                .fetch_liquidations(symbol, LIQUIDATION_POLL_LOOKBACK_MIN)
                .await
            {
                if tx.send(DerivsUpdate::Liquidation(event)).await.is_err() {
                    return;
                }
            }

            // Spread the per-symbol requests out a little
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Human-readable label for a bar interval
fn timeframe_label(interval_secs: u64) -> String {
    match interval_secs {
        60 => "1m".to_string(),
        300 => "5m".to_string(),
        900 => "15m".to_string(),
        3600 => "1h".to_string(),
        s => format!("{}s", s),
    }
}
