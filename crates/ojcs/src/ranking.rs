//! The periodic full ranking recompute.

use std::sync::Arc;

use ojstats_lib::hybrid::HybridRankingService;
use ojstats_lib::{Database, ranking};

/// Recomputes the rankings of every platform, then invalidates the in-process ranking
/// cache so the next reads repopulate from the fresh rows.
pub async fn run(db: Database, hybrid: Arc<HybridRankingService>) -> anyhow::Result<()> {
    let rows = ranking::update_all_platforms(&db).await;
    hybrid.invalidate_all();
    tracing::info!("ranking recompute done: {rows} rows written");
    Ok(())
}
