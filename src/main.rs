use anyhow::Context;
use tracing::{info, Level};
use tracing_subscriber::filter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use blogpost_lib::config::Config;
use blogpost_lib::http::{self, ApiContext};
use blogpost_lib::storage::FileStorage;
use blogpost_lib::store::BlogStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = Config::parse();

    let tracing_layer = tracing_subscriber::fmt::layer();
    let filter = filter::Targets::new()
        .with_target("tower_http::trace::on_response", Level::DEBUG)
        .with_target("tower_http::trace::make_span", Level::DEBUG)
        .with_default(config.log.level);
    tracing_subscriber::registry()
        .with(tracing_layer)
        .with(filter)
        .init();
    info!("{:?}", &config);

    let storage = FileStorage::open(&config.db.database_path).await
        .with_context(|| format!("failed to open {}", config.db.database_path.display()))?;
    let store = BlogStore::open(Box::new(storage)).await
        .context("failed to load document store")?;

    let ctx = ApiContext::new(config, store);
    let served = http::serve(ctx.clone()).await;
    ctx.store.write().await.close().await?;
    served
}
