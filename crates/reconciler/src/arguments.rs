use {
    std::{net::SocketAddr, time::Duration},
    tracing_subscriber::filter::LevelFilter,
    url::Url,
};

#[derive(clap::Parser)]
pub struct Arguments {
    #[clap(flatten)]
    pub shopping: shopping_api::Arguments,

    #[clap(flatten)]
    pub fx: fx::Arguments,

    #[clap(flatten)]
    pub llm: llm_api::Arguments,

    #[clap(
        long,
        env,
        default_value = "warn,reconciler=debug,shopping_api=debug,fx=debug,llm_api=debug"
    )]
    pub log_filter: String,

    #[clap(long, env, default_value = "error")]
    pub log_stderr_threshold: LevelFilter,

    #[clap(long, env, default_value = "0.0.0.0:9589")]
    pub metrics_address: SocketAddr,

    /// Url of the Postgres database. By default connects to locally
    /// running postgres.
    #[clap(long, env, default_value = "postgresql://")]
    pub db_url: Url,

    /// Countries the refresh loop queries, as ISO alpha-2 codes.
    #[clap(
        long,
        env,
        default_value = "US,JP,DE,FR,HK,AE,GB,SG,KR,AU,CA",
        use_value_delimiter = true
    )]
    pub refresh_countries: Vec<String>,

    /// Model slugs the refresh loop builds queries from.
    #[clap(
        long,
        env,
        default_value = "iphone-16-pro,iphone-16-pro-max,iphone-17-pro",
        use_value_delimiter = true
    )]
    pub refresh_models: Vec<String>,

    /// Storage sizes combined with each model slug.
    #[clap(long, env, default_value = "256gb,512gb", use_value_delimiter = true)]
    pub refresh_storages: Vec<String>,

    /// Time between ingest+reconcile passes.
    #[clap(long, env, default_value = "21600", value_parser = duration_from_seconds)]
    pub refresh_interval: Duration,

    /// Minimum time between two pattern-suggest runs.
    #[clap(long, env, default_value = "86400", value_parser = duration_from_seconds)]
    pub suggest_interval: Duration,

    /// Raw rows scanned per reconcile invocation.
    #[clap(long, env, default_value = "500")]
    pub reconcile_limit: i64,

    /// Absolute ceiling of LLM matcher calls per reconcile invocation.
    #[clap(long, env, default_value = "50")]
    pub llm_max_calls_per_reconcile: usize,

    /// Matcher call ceiling as a fraction of the reconcile limit.
    #[clap(long, env, default_value = "0.2")]
    pub llm_max_fraction_per_reconcile: f64,

    /// Concurrent LLM requests of one pattern-suggest run (1..=8).
    #[clap(long, env, default_value = "2")]
    pub pattern_suggest_max_concurrency: usize,

    /// Raw rows sampled per pattern-suggest run.
    #[clap(long, env, default_value = "1000")]
    pub suggest_sample_limit: usize,

    /// If the run loop hasn't completed a pass in this time the
    /// liveness check fails. Expects a value in seconds.
    #[clap(long, env, default_value = "43200", value_parser = duration_from_seconds)]
    pub max_pass_age: Duration,

    /// Run a single ingest+reconcile pass and exit.
    #[clap(long, env)]
    pub run_once: bool,

    /// Compute reconcile stats but roll back all writes.
    #[clap(long, env)]
    pub dry_run: bool,
}

pub fn duration_from_seconds(s: &str) -> Result<Duration, std::num::ParseFloatError> {
    Ok(Duration::from_secs_f64(s.parse()?))
}

impl std::fmt::Display for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.shopping)?;
        write!(f, "{}", self.fx)?;
        write!(f, "{}", self.llm)?;
        writeln!(f, "log_filter: {}", self.log_filter)?;
        writeln!(f, "log_stderr_threshold: {}", self.log_stderr_threshold)?;
        writeln!(f, "metrics_address: {}", self.metrics_address)?;
        writeln!(f, "db_url: SECRET")?;
        writeln!(f, "refresh_countries: {:?}", self.refresh_countries)?;
        writeln!(f, "refresh_models: {:?}", self.refresh_models)?;
        writeln!(f, "refresh_storages: {:?}", self.refresh_storages)?;
        writeln!(f, "refresh_interval: {:?}", self.refresh_interval)?;
        writeln!(f, "suggest_interval: {:?}", self.suggest_interval)?;
        writeln!(f, "reconcile_limit: {}", self.reconcile_limit)?;
        writeln!(
            f,
            "llm_max_calls_per_reconcile: {}",
            self.llm_max_calls_per_reconcile
        )?;
        writeln!(
            f,
            "llm_max_fraction_per_reconcile: {}",
            self.llm_max_fraction_per_reconcile
        )?;
        writeln!(
            f,
            "pattern_suggest_max_concurrency: {}",
            self.pattern_suggest_max_concurrency
        )?;
        writeln!(f, "suggest_sample_limit: {}", self.suggest_sample_limit)?;
        writeln!(f, "max_pass_age: {:?}", self.max_pass_age)?;
        writeln!(f, "run_once: {}", self.run_once)?;
        writeln!(f, "dry_run: {}", self.dry_run)?;
        Ok(())
    }
}

/// Queries the refresh loop runs, e.g. `iphone-16-pro` × `256gb` →
/// `"iPhone 16 Pro 256GB"`.
pub fn build_queries(models: &[String], storages: &[String]) -> Vec<String> {
    let mut queries = Vec::with_capacity(models.len() * storages.len());
    for model in models {
        let spelled = spell_model(model);
        for storage in storages {
            queries.push(format!("{spelled} {}", storage.to_uppercase()));
        }
    }
    queries
}

fn spell_model(slug: &str) -> String {
    slug.split('-')
        .map(|part| {
            if part == "iphone" {
                "iPhone".to_string()
            } else if part.chars().all(|c| c.is_ascii_digit()) {
                part.to_string()
            } else {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_provider_queries_from_slugs() {
        let queries = build_queries(
            &["iphone-16-pro".to_string(), "iphone-17".to_string()],
            &["256gb".to_string(), "1tb".to_string()],
        );
        assert_eq!(
            queries,
            vec![
                "iPhone 16 Pro 256GB",
                "iPhone 16 Pro 1TB",
                "iPhone 17 256GB",
                "iPhone 17 1TB",
            ]
        );
    }

    #[test]
    fn parses_durations_from_seconds() {
        assert_eq!(duration_from_seconds("600").unwrap(), Duration::from_secs(600));
        assert_eq!(
            duration_from_seconds("0.5").unwrap(),
            Duration::from_millis(500)
        );
    }
}
