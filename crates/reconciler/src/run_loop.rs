//! The periodic refresh loop: ingest the configured query matrix,
//! reconcile the buffer, and occasionally run the pattern suggester.
//! One cooperative worker; concurrent deployments coordinate through
//! the dedup-key constraint and the KV locks, not through this loop.

use {
    crate::{
        arguments::{Arguments, build_queries},
        database::Postgres,
        ingest,
        reconcile::Reconciler,
        suggest::{SuggestParams, Suggester},
    },
    shopping_api::ShoppingApi,
    std::{
        sync::{Arc, RwLock},
        time::{Duration, Instant},
    },
    tracing::Instrument,
};

pub struct Liveness {
    max_pass_age: Duration,
    last_pass_time: RwLock<Instant>,
}

#[async_trait::async_trait]
impl observe::metrics::LivenessChecking for Liveness {
    async fn is_alive(&self) -> bool {
        let last_pass_time = self.last_pass_time.read().unwrap();
        last_pass_time.elapsed() <= self.max_pass_age
    }
}

impl Liveness {
    pub fn new(max_pass_age: Duration) -> Self {
        Self {
            max_pass_age,
            last_pass_time: RwLock::new(Instant::now()),
        }
    }

    fn pass_completed(&self) {
        *self.last_pass_time.write().unwrap() = Instant::now();
    }
}

pub struct RunLoop {
    pub db: Postgres,
    pub shopping: Arc<dyn ShoppingApi>,
    pub reconciler: Reconciler,
    pub suggester: Option<Suggester>,
    pub liveness: Arc<Liveness>,
    pub queries: Vec<String>,
    pub countries: Vec<String>,
    pub refresh_interval: Duration,
    pub suggest_interval: Duration,
    pub reconcile_limit: i64,
    pub suggest_sample_limit: usize,
    pub dry_run: bool,
}

impl RunLoop {
    pub fn new(
        args: &Arguments,
        db: Postgres,
        shopping: Arc<dyn ShoppingApi>,
        reconciler: Reconciler,
        suggester: Option<Suggester>,
        liveness: Arc<Liveness>,
    ) -> Self {
        Self {
            db,
            shopping,
            reconciler,
            suggester,
            liveness,
            queries: build_queries(&args.refresh_models, &args.refresh_storages),
            countries: args.refresh_countries.clone(),
            refresh_interval: args.refresh_interval,
            suggest_interval: args.suggest_interval,
            reconcile_limit: args.reconcile_limit,
            suggest_sample_limit: args.suggest_sample_limit,
            dry_run: args.dry_run,
        }
    }

    pub async fn run_forever(self) -> ! {
        let mut last_suggest: Option<Instant> = None;
        loop {
            self.single_pass()
                .instrument(tracing::info_span!("refresh_pass"))
                .await;
            self.liveness.pass_completed();

            let suggest_due = last_suggest
                .is_none_or(|instant| instant.elapsed() >= self.suggest_interval);
            if self.suggester.is_some() && suggest_due {
                self.suggest_pass()
                    .instrument(tracing::info_span!("suggest_pass"))
                    .await;
                last_suggest = Some(Instant::now());
            }

            tokio::time::sleep(self.refresh_interval).await;
        }
    }

    /// One ingest sweep over the query matrix followed by one
    /// reconcile pass. Failures are logged per step; the loop never
    /// dies.
    pub async fn single_pass(&self) {
        for country in &self.countries {
            for query in &self.queries {
                match ingest::ingest_raw(self.shopping.as_ref(), &self.db, query, country, "en", None)
                    .await
                {
                    Ok(stats) => {
                        tracing::debug!(query, country, ?stats, "ingested");
                    }
                    Err(error) => {
                        tracing::warn!(query, country, ?error, "ingest failed");
                    }
                }
            }
        }

        match self
            .reconciler
            .reconcile(&self.db, self.reconcile_limit, None, self.dry_run)
            .await
        {
            Ok((stats, reconcile_debug)) => {
                tracing::info!(?stats, sample = ?reconcile_debug.sample_reason_codes, "reconciled");
            }
            Err(error) => {
                tracing::error!(?error, "reconcile pass failed");
            }
        }
    }

    async fn suggest_pass(&self) {
        let Some(suggester) = &self.suggester else {
            return;
        };
        let params = SuggestParams {
            sample_limit: self.suggest_sample_limit,
            ..Default::default()
        };
        match suggester.suggest_patterns(&self.db, params).await {
            Ok(result) => {
                tracing::info!(
                    cached = result.cached,
                    llm_calls = result.llm_calls,
                    sample_size = result.sample_size,
                    "pattern suggestions refreshed"
                );
            }
            Err(error) => {
                tracing::warn!(?error, "pattern suggest failed");
            }
        }
    }
}
