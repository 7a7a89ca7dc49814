use std::sync::Arc;

use sqlx::postgres::PgPool;

use stacks_core::CirculationPolicy;
use stacks_infra::{
    AcquisitionStore, BorrowerDirectory, CatalogStore, CirculationStore, FineStore, InMemoryStore,
    PostgresStore,
};

/// Store handles for every domain area.
///
/// Both backends implement all five traits on one store value, so the
/// handles here are clones of a single `Arc` and operations issued through
/// different handles still see one consistent state.
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<dyn CatalogStore>,
    pub circulation: Arc<dyn CirculationStore>,
    pub fines: Arc<dyn FineStore>,
    pub acquisitions: Arc<dyn AcquisitionStore>,
    pub borrowers: Arc<dyn BorrowerDirectory>,
}

/// Build services from the environment (used by `main.rs`).
pub async fn build_services() -> AppServices {
    let policy = policy_from_env();

    let use_persistent = std::env::var("USE_PERSISTENT_STORE")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    if use_persistent {
        return build_postgres_services(policy).await;
    }
    in_memory_services(policy)
}

/// Circulation policy from the environment, with standing defaults.
pub fn policy_from_env() -> CirculationPolicy {
    let defaults = CirculationPolicy::default();

    let fine_per_day_cents = std::env::var("FINE_PER_DAY_CENTS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(defaults.fine_per_day_cents);

    let renewal_extension_days = std::env::var("RENEWAL_EXTENSION_DAYS")
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(defaults.renewal_extension_days);

    CirculationPolicy {
        fine_per_day_cents,
        renewal_extension_days,
    }
}

/// In-memory wiring (dev/test).
pub fn in_memory_services(policy: CirculationPolicy) -> AppServices {
    let store = Arc::new(InMemoryStore::new(policy));
    AppServices {
        catalog: store.clone(),
        circulation: store.clone(),
        fines: store.clone(),
        acquisitions: store.clone(),
        borrowers: store,
    }
}

async fn build_postgres_services(policy: CirculationPolicy) -> AppServices {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set when USE_PERSISTENT_STORE=true");

    let pool = PgPool::connect(&database_url)
        .await
        .expect("failed to connect to Postgres");

    let store = PostgresStore::new(pool, policy);
    store
        .ensure_schema()
        .await
        .expect("failed to bootstrap the schema");

    let store = Arc::new(store);
    AppServices {
        catalog: store.clone(),
        circulation: store.clone(),
        fines: store.clone(),
        acquisitions: store.clone(),
        borrowers: store,
    }
}
