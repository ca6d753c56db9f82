use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::{Engine, EngineError};

const CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Compact once more than `threshold` events were appended since the last
/// compaction. Returns the snapshot length when a compaction ran.
pub async fn compact_if_due(engine: &Engine, threshold: u64) -> Result<Option<usize>, EngineError> {
    let appended = engine.appends_since_compact().await;
    if appended <= threshold {
        return Ok(None);
    }
    info!("compacting after {appended} appends");
    engine.compact().await.map(Some)
}

/// Background task keeping the store from growing without bound.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    loop {
        interval.tick().await;
        if let Err(e) = compact_if_due(&engine, threshold).await {
            warn!("compaction failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use ulid::Ulid;

    #[tokio::test]
    async fn compacts_only_past_threshold() {
        let store = Arc::new(MemoryStore::new());
        let engine = Engine::open(store.clone()).await.unwrap();

        let room = Ulid::new();
        engine.create_room(room, "101".into(), 100).await.unwrap();
        for rate in 101..104 {
            engine.update_room(room, "101".into(), rate).await.unwrap();
        }
        assert_eq!(compact_if_due(&engine, 4).await.unwrap(), None);

        engine.update_room(room, "101".into(), 200).await.unwrap();
        assert_eq!(compact_if_due(&engine, 4).await.unwrap(), Some(1));
        assert_eq!(engine.appends_since_compact().await, 0);
        assert_eq!(store.events().await.len(), 1);
    }
}
