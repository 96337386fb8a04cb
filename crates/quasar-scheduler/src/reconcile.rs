//! Subscription Scheduler (§4.E): reconciles the DB subscription view against a live
//! job set keyed by `JobKey`, adding/updating/removing jobs under a single-writer
//! discipline.

use crate::job::{run_guarded, JobKey};
use crate::{historical, live};
use quasar_core::bar::ProviderType;
use quasar_core::registration::ClassType;
use quasar_db::subscriptions::AggregatedSubscription;
use quasar_db::DbPool;
use quasar_loader::{ProviderCache, RegistrationLookup};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default offset for Live jobs: wake `DEFAULT_LIVE_OFFSET` seconds before the cron
/// fire time to collect the closing bar.
pub const DEFAULT_LIVE_OFFSET_SECONDS: i64 = 30;
const LIVE_SAFETY_MARGIN_SECONDS: u64 = 30;
const DEFAULT_HISTORICAL_TIMEOUT_SECONDS: u64 = 300;

/// A running job's mutable state: the current symbol set, rebindable without
/// disturbing the job's already-scheduled next fire.
struct RunningJob {
    handle: JoinHandle<()>,
    symbols_tx: watch::Sender<Vec<String>>,
}

/// Database-backed lookup used by the loader; delegates straight to `quasar-db`.
pub struct DbRegistrationLookup {
    pub db: Arc<DbPool>,
}

#[async_trait::async_trait]
impl RegistrationLookup for DbRegistrationLookup {
    async fn lookup(&self, class_name: &str) -> Option<quasar_core::registration::ProviderRegistration> {
        quasar_db::registry::lookup(&self.db, class_name, ClassType::Provider)
            .await
            .ok()
            .flatten()
    }
}

/// Owns the provider cache and the live job table. The reconciler itself is invoked
/// periodically (e.g. every 30s) by the caller's own scheduling loop.
pub struct Scheduler {
    db: Arc<DbPool>,
    providers: Arc<ProviderCache>,
    registry_lookup: Arc<DbRegistrationLookup>,
    jobs: HashMap<JobKey, RunningJob>,
    invalid_providers: HashSet<String>,
}

impl Scheduler {
    pub fn new(db: Arc<DbPool>, providers: Arc<ProviderCache>) -> Self {
        let registry_lookup = Arc::new(DbRegistrationLookup { db: db.clone() });
        Self {
            db,
            providers,
            registry_lookup,
            jobs: HashMap::new(),
            invalid_providers: HashSet::new(),
        }
    }

    /// One reconciliation pass. Mirrors `datahub/core.py`'s `_refresh_subscriptions`.
    pub async fn reconcile(&mut self) -> Result<(), quasar_db::DbError> {
        let rows = quasar_db::subscriptions::fetch_subscriptions(&self.db).await?;

        // A job's task can only end by aborting (`handle.abort()` below) or by
        // `run_guarded` returning after catching an error/panic and looping back around
        // — so a finished handle here means something escaped `run_guarded` (or the
        // loop returned early, e.g. an invalid cron). Drop it so the desired-keys pass
        // below treats it as unscheduled and respawns it, keeping the job set at its
        // fixed point instead of leaving a dead entry that blocks rescheduling forever.
        let dead: Vec<JobKey> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.handle.is_finished())
            .map(|(key, _)| key.clone())
            .collect();
        for key in dead {
            tracing::warn!(%key, "scheduled job task ended unexpectedly, respawning");
            self.jobs.remove(&key);
        }

        let current_providers: HashSet<String> =
            self.providers.names_loaded().await.into_iter().collect();
        let seen_providers: HashSet<String> =
            rows.iter().map(|r| r.provider.clone()).collect();

        self.invalid_providers.clear();
        for name in seen_providers.difference(&current_providers) {
            if let Err(e) = self.providers.load(name, self.registry_lookup.as_ref()).await {
                tracing::warn!(provider = %name, error = %e, "provider failed to load, excluding from scheduling");
                self.invalid_providers.insert(name.clone());
            }
        }

        for obsolete in current_providers.difference(&seen_providers) {
            tracing::info!(provider = %obsolete, "removing obsolete provider from registry");
            self.providers.unload(obsolete).await;
        }

        let mut desired_keys = HashSet::new();
        for row in &rows {
            if self.invalid_providers.contains(&row.provider) {
                continue;
            }
            let key = JobKey::new(&row.provider, row.interval.as_str(), &row.cron);
            desired_keys.insert(key.clone());

            if let Some(job) = self.jobs.get(&key) {
                tracing::debug!(%key, "updating scheduled job symbols");
                let _ = job.symbols_tx.send(row.symbols.clone());
            } else {
                tracing::debug!(%key, "scheduling new job");
                self.spawn_job(key, row.clone());
            }
        }

        let gone: Vec<JobKey> = self
            .jobs
            .keys()
            .filter(|k| !desired_keys.contains(*k))
            .cloned()
            .collect();
        for key in gone {
            tracing::info!(%key, "removing scheduled job");
            if let Some(job) = self.jobs.remove(&key) {
                job.handle.abort();
            }
        }

        Ok(())
    }

    fn spawn_job(&mut self, key: JobKey, row: AggregatedSubscription) {
        let (symbols_tx, symbols_rx) = watch::channel(row.symbols.clone());
        let db = self.db.clone();
        let providers = self.providers.clone();
        let registry_lookup = self.registry_lookup.clone();
        let provider_name = row.provider.clone();
        let interval = row.interval;
        let cron = row.cron.clone();
        let job_label = key.to_string();

        let handle = tokio::spawn(async move {
            run_job_loop(
                db,
                providers,
                registry_lookup,
                provider_name,
                interval,
                cron,
                symbols_rx,
                job_label,
            )
            .await;
        });

        self.jobs.insert(key, RunningJob { handle, symbols_tx });
    }
}

/// Reads the preferences JSON stored on a provider's registration, defaulting to an
/// empty object if the provider isn't registered under this class type (e.g. a
/// `broker`) so preference lookups fall back to their CONFIGURABLE schema defaults.
async fn preferences_for(
    registry_lookup: &DbRegistrationLookup,
    provider_name: &str,
) -> serde_json::Value {
    registry_lookup
        .lookup(provider_name)
        .await
        .map(|r| r.preferences)
        .unwrap_or_else(|| serde_json::json!({}))
}

async fn run_job_loop(
    db: Arc<DbPool>,
    providers: Arc<ProviderCache>,
    registry_lookup: Arc<DbRegistrationLookup>,
    provider_name: String,
    interval: quasar_core::bar::Interval,
    cron: String,
    mut symbols_rx: watch::Receiver<Vec<String>>,
    job_label: String,
) {
    loop {
        let provider_type = providers
            .with_handle(&provider_name, |h| h.provider_type())
            .await;
        let Some(provider_type) = provider_type else {
            tracing::warn!(job = %job_label, "provider no longer loaded, stopping job loop");
            return;
        };

        let preferences = preferences_for(&registry_lookup, &provider_name).await;

        let offset = match provider_type {
            ProviderType::Historical => {
                quasar_core::registration::pref_i64(&preferences, "scheduling", "delay_hours", 0) * 3600
            }
            ProviderType::Realtime => {
                -quasar_core::registration::pref_i64(
                    &preferences,
                    "scheduling",
                    "pre_close_seconds",
                    DEFAULT_LIVE_OFFSET_SECONDS,
                )
            }
            ProviderType::Index => 0,
        };
        let Ok(trigger) = quasar_cron::OffsetCron::from_crontab(&cron, offset) else {
            tracing::error!(job = %job_label, cron = %cron, "invalid cron expression, stopping job loop");
            return;
        };
        let Some(next_fire) = trigger.next(chrono::Utc::now()) else {
            tracing::info!(job = %job_label, "cron has no further firings, stopping job loop");
            return;
        };
        let delay = (next_fire - chrono::Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        tokio::time::sleep(delay).await;

        let symbols = symbols_rx.borrow_and_update().clone();
        let job_name = format!("{job_label}@{}", chrono::Utc::now());

        run_guarded(
            &job_name,
            fire(&db, &providers, &provider_name, provider_type, interval, symbols, &preferences),
        )
        .await;
    }
}

async fn fire(
    db: &DbPool,
    providers: &ProviderCache,
    provider_name: &str,
    provider_type: ProviderType,
    interval: quasar_core::bar::Interval,
    symbols: Vec<String>,
    preferences: &serde_json::Value,
) -> Result<(), FireError> {
    match provider_type {
        ProviderType::Historical | ProviderType::Index => {
            let provider = providers
                .with_handle(provider_name, |h| match h {
                    quasar_core::provider::ProviderHandle::Historical(p) => Some(p.clone()),
                    _ => None,
                })
                .await
                .flatten()
                .ok_or(FireError::WrongVariant)?;
            let lookback = quasar_core::registration::pref_i64(
                preferences,
                "data",
                "lookback_days",
                quasar_db::bars::DEFAULT_LOOKBACK_DAYS,
            )
            .clamp(1, quasar_db::bars::DEFAULT_LOOKBACK_DAYS);
            let inserted = tokio::time::timeout(
                std::time::Duration::from_secs(DEFAULT_HISTORICAL_TIMEOUT_SECONDS),
                historical::run_historical_job(db, provider, interval, &symbols, lookback),
            )
            .await
            .map_err(|_| FireError::Timeout)??;
            tracing::info!(provider_name, inserted, "historical job completed");
            Ok(())
        }
        ProviderType::Realtime => {
            let live = providers
                .with_handle(provider_name, |h| match h {
                    quasar_core::provider::ProviderHandle::Live(p) => Some(p.clone()),
                    _ => None,
                })
                .await
                .flatten()
                .ok_or(FireError::WrongVariant)?;
            let pre_close = quasar_core::registration::pref_i64(
                preferences,
                "scheduling",
                "pre_close_seconds",
                DEFAULT_LIVE_OFFSET_SECONDS,
            )
            .max(0) as u64;
            let post_close = quasar_core::registration::pref_i64(
                preferences,
                "scheduling",
                "post_close_seconds",
                live.close_buffer_seconds() as i64,
            )
            .max(0) as u64;
            let timeout = pre_close + post_close + LIVE_SAFETY_MARGIN_SECONDS;
            let bars = live::run_live_job(live, interval, symbols, post_close, timeout).await?;
            let inserted =
                quasar_db::bars::insert_bars(db, ProviderType::Realtime, &bars).await?;
            tracing::info!(provider_name, inserted, "live job completed");
            Ok(())
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum FireError {
    #[error("provider instance is not the expected variant")]
    WrongVariant,
    #[error("job timed out")]
    Timeout,
    #[error(transparent)]
    Historical(#[from] historical::HistoricalJobError),
    #[error(transparent)]
    Live(#[from] live::LiveJobError),
    #[error(transparent)]
    Db(#[from] quasar_db::DbError),
}
