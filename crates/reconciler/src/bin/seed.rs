//! Seeds the curated Golden SKU catalog for the iPhone 16 and 17
//! families. Idempotent: upserts by `sku_key`. Ingestion never creates
//! catalog entries; this tool (and admin actions) are the only
//! writers.

use {clap::Parser, sqlx::PgPool, url::Url};

#[derive(clap::Parser)]
struct Arguments {
    #[clap(long, env, default_value = "postgresql://")]
    db_url: Url,

    #[clap(long, env, default_value = "info")]
    log_filter: String,
}

const CONDITIONS: &[&str] = &["new", "refurbished", "used"];

struct Family {
    model: &'static str,
    display: &'static str,
    storages: &'static [&'static str],
    colors: &'static [&'static str],
}

const FAMILIES: &[Family] = &[
    Family {
        model: "iphone-16",
        display: "iPhone 16",
        storages: &["128gb", "256gb", "512gb"],
        colors: &["black", "white", "pink", "teal", "ultramarine"],
    },
    Family {
        model: "iphone-16-plus",
        display: "iPhone 16 Plus",
        storages: &["128gb", "256gb", "512gb"],
        colors: &["black", "white", "pink", "teal", "ultramarine"],
    },
    Family {
        model: "iphone-16-pro",
        display: "iPhone 16 Pro",
        storages: &["128gb", "256gb", "512gb", "1tb"],
        colors: &["black", "white", "natural", "desert"],
    },
    Family {
        model: "iphone-16-pro-max",
        display: "iPhone 16 Pro Max",
        storages: &["256gb", "512gb", "1tb"],
        colors: &["black", "white", "natural", "desert"],
    },
    Family {
        model: "iphone-16e",
        display: "iPhone 16e",
        storages: &["128gb", "256gb", "512gb"],
        colors: &["black", "white"],
    },
    Family {
        model: "iphone-17",
        display: "iPhone 17",
        storages: &["256gb", "512gb"],
        colors: &["black", "white", "mist-blue", "sage", "lavender"],
    },
    Family {
        model: "iphone-17-air",
        display: "iPhone 17 Air",
        storages: &["256gb", "512gb", "1tb"],
        colors: &["space-black", "cloud-white", "sky-blue", "light-gold"],
    },
    Family {
        model: "iphone-17-pro",
        display: "iPhone 17 Pro",
        storages: &["256gb", "512gb", "1tb"],
        colors: &["silver", "cosmic-orange", "deep-blue"],
    },
    Family {
        model: "iphone-17-pro-max",
        display: "iPhone 17 Pro Max",
        storages: &["256gb", "512gb", "1tb", "2tb"],
        colors: &["silver", "cosmic-orange", "deep-blue"],
    },
];

fn display_color(color: &str) -> String {
    match color {
        "natural" => "Natural Titanium".to_string(),
        "desert" => "Desert Titanium".to_string(),
        other => other
            .split('-')
            .map(|part| {
                let mut chars = part.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" "),
    }
}

#[tokio::main]
async fn main() {
    let args = Arguments::parse();
    observe::tracing::initialize(&args.log_filter, tracing_subscriber::filter::LevelFilter::ERROR);

    let pool = PgPool::connect(args.db_url.as_str())
        .await
        .expect("database connection");
    let mut tx = pool.begin().await.expect("begin transaction");

    let mut upserted = 0usize;
    for family in FAMILIES {
        for storage in family.storages {
            for color in family.colors {
                for condition in CONDITIONS {
                    let sku_key = sku_keys::compose_sku_key(&sku_keys::SkuAttributes {
                        model: family.model.to_string(),
                        storage: storage.to_string(),
                        color: color.to_string(),
                        condition: condition.to_string(),
                        ..Default::default()
                    });
                    let display_name = format!(
                        "{} {} {} ({condition})",
                        family.display,
                        storage.to_uppercase(),
                        display_color(color),
                    );
                    database::golden_skus::upsert(
                        &mut tx,
                        &database::golden_skus::NewGoldenSku {
                            sku_key,
                            model: family.model.to_string(),
                            storage: storage.to_string(),
                            color: color.to_string(),
                            condition: condition.to_string(),
                            display_name,
                            msrp_usd: None,
                            ..Default::default()
                        },
                    )
                    .await
                    .expect("upsert golden sku");
                    upserted += 1;
                }
            }
        }
    }

    tx.commit().await.expect("commit seed");
    tracing::info!(upserted, "golden sku catalog seeded");
}
