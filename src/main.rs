use std::{process, sync::Arc};

use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use vitrine::{
    application::{
        error::AppError,
        price_service::{PriceService, PricingError},
        pricing::PromotionResolver,
        repos::PromotionsRepo,
    },
    cache::{
        CacheConfig, InvalidationCoordinator, InvalidationReport, MemoryRemoteStore, RemoteStore,
        TieredCache,
    },
    config::{self, Command, InvalidateTarget},
    domain::{ProductId, PromotionId, VariationId},
    infra::{db::PostgresRepositories, error::InfraError, redis::RedisStore, telemetry},
    util::{clock::SystemClock, timezone::CivilTime},
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    let chain = error.messages().join(": ");
    if dispatcher::has_been_set() {
        error!(error = %chain, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %chain, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    let cache = Arc::new(build_cache(&settings).await?);

    match cli_args.command {
        Command::Price { variation_id } => {
            run_price(&settings, cache, VariationId(variation_id)).await
        }
        Command::Invalidate(InvalidateTarget::Promotion { id }) => {
            run_invalidate_promotion(&settings, cache, PromotionId(id)).await
        }
        Command::Invalidate(InvalidateTarget::Product { id }) => {
            let coordinator = InvalidationCoordinator::new(cache);
            ensure_complete(coordinator.on_product_mutated(ProductId(id)).await)
        }
        Command::ClearCache => {
            let coordinator = InvalidationCoordinator::new(cache);
            ensure_complete(coordinator.clear_all().await)
        }
    }
}

async fn build_cache(settings: &config::Settings) -> Result<TieredCache, AppError> {
    let config = CacheConfig::from(&settings.cache);

    let remote: Arc<dyn RemoteStore> = match settings.redis.url.as_deref() {
        Some(url) => {
            let store = RedisStore::open(url).map_err(InfraError::from)?;
            if config.enable_remote_tier {
                check_remote(&store, &config).await;
            }
            Arc::new(store)
        }
        None => {
            if config.enable_remote_tier {
                warn!("redis.url is not configured; remote tier is process-local");
            }
            Arc::new(MemoryRemoteStore::new())
        }
    };

    Ok(TieredCache::new(config, Some(remote)))
}

/// An unreachable remote tier is not fatal: lookups degrade and
/// invalidations report it.
async fn check_remote(store: &RedisStore, config: &CacheConfig) {
    match tokio::time::timeout(config.remote_timeout(), store.ping()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(error = %err, "Remote cache is unreachable; continuing degraded"),
        Err(_) => warn!(
            timeout_ms = config.remote_timeout_ms,
            "Remote cache did not answer PING; continuing degraded"
        ),
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

async fn run_price(
    settings: &config::Settings,
    cache: Arc<TieredCache>,
    variation_id: VariationId,
) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;
    let resolver = PromotionResolver::new(
        CivilTime::new(settings.pricing.timezone),
        settings.pricing.currency_scale,
    );
    let service = PriceService::new(cache, repositories, Arc::new(SystemClock), resolver);

    let price = service.lookup_by_id(variation_id).await?;
    let rendered = serde_json::to_string_pretty(&price)
        .map_err(|err| AppError::unexpected(format!("failed to encode price: {err}")))?;
    println!("{rendered}");
    Ok(())
}

async fn run_invalidate_promotion(
    settings: &config::Settings,
    cache: Arc<TieredCache>,
    promotion_id: PromotionId,
) -> Result<(), AppError> {
    let repositories = init_repositories(settings).await?;
    let promotion = repositories
        .find_promotion(promotion_id)
        .await
        .map_err(PricingError::from)?
        .ok_or_else(|| AppError::validation(format!("promotion {promotion_id} not found")))?;

    let coordinator = InvalidationCoordinator::new(cache);
    ensure_complete(coordinator.on_promotion_mutated(&promotion).await)
}

fn ensure_complete(report: InvalidationReport) -> Result<(), AppError> {
    if report.requires_manual_clear() {
        return Err(AppError::invalidation_incomplete(format!(
            "local: {}, remote: {}",
            report.local, report.remote
        )));
    }

    info!(
        event_id = %report.event_id,
        tags = report.tags.len(),
        cleared_namespace = report.cleared_namespace,
        "Invalidation complete"
    );
    Ok(())
}
