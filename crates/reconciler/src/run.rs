use {
    crate::{
        arguments::Arguments,
        database::{self, Postgres},
        reconcile::Reconciler,
        run_loop::{Liveness, RunLoop},
        suggest::Suggester,
    },
    clap::Parser,
    fx::FxService,
    kv_store::Store,
    llm_api::LlmClient,
    shopping_api::DefaultShoppingApi,
    std::sync::Arc,
};

pub async fn start(args: impl Iterator<Item = String>) {
    let args = Arguments::parse_from(args);
    observe::tracing::initialize(&args.log_filter, args.log_stderr_threshold);
    observe::panic_hook::install();
    observe::metrics::setup_registry(Some("market_compass_reconciler".into()), None);
    tracing::info!("running reconciler with validated arguments:\n{}", args);
    run(args).await
}

pub async fn run(args: Arguments) {
    let db = Postgres::new(args.db_url.as_str())
        .await
        .expect("database connection");
    let store = Store::new(db.0.clone());
    let client = reqwest::Client::new();

    let shopping = Arc::new(DefaultShoppingApi::new(
        client.clone(),
        &args.shopping,
        store.clone(),
    ));
    let fx = FxService::new(client.clone(), &args.fx, store.clone());
    let llm = args
        .llm
        .usable()
        .then(|| LlmClient::new(client.clone(), &args.llm));
    if llm.is_none() {
        tracing::info!("llm disabled, candidate matching and suggestions are off");
    }

    let reconciler = Reconciler::new(
        fx,
        store.clone(),
        llm.clone(),
        args.llm_max_calls_per_reconcile,
        args.llm_max_fraction_per_reconcile,
    );
    let suggester = llm.map(|llm| {
        Suggester::new(llm, store.clone(), args.pattern_suggest_max_concurrency)
    });

    let liveness = Arc::new(Liveness::new(args.max_pass_age));
    let serve_metrics =
        observe::metrics::serve_metrics(liveness.clone(), args.metrics_address);
    let db_metrics = database::database_metrics(db.clone());

    let run_loop = RunLoop::new(&args, db, shopping, reconciler, suggester, liveness);
    if args.run_once {
        run_loop.single_pass().await;
        return;
    }

    tokio::select! {
        result = serve_metrics => tracing::error!(?result, "serve_metrics exited"),
        _ = db_metrics => unreachable!(),
        _ = run_loop.run_forever() => unreachable!(),
        _ = shutdown_signal() => tracing::info!("shutting down"),
    };
}

async fn shutdown_signal() {
    // The run loop's per-row writes are self-contained; interrupting
    // between them leaves the database valid.
    tokio::signal::ctrl_c().await.expect("listen for ctrl-c");
}
