use logpulse_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use logpulse_server::hub::ChannelHubs;
use logpulse_server::router::EventRouter;
use logpulse_server::AppState;
use logpulse_store::SqliteStore;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestServer {
    pub state: AppState,
    pub router: EventRouter,
    pub pool: DbPool,
    // Held so the database file outlives the test.
    _dir: TempDir,
}

/// Migrated file-backed pool, hubs, router and state wired together.
pub fn setup(keepalive: Duration) -> TestServer {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("logpulse.db");
    let pool = create_pool(path.to_str().expect("utf-8 path"), DbRuntimeSettings::default())
        .expect("failed to create pool");
    {
        let conn = pool.get().expect("connection");
        run_migrations(&conn).expect("migrations");
    }

    let hubs = ChannelHubs::new(16);
    let router = EventRouter::new(Arc::new(SqliteStore::new(pool.clone())), hubs.clone());
    let state = AppState::new(pool.clone(), hubs, keepalive);

    TestServer {
        state,
        router,
        pool,
        _dir: dir,
    }
}
