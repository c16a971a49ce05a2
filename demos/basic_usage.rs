//! Basic tagged-cache walkthrough: tagged writes, tag invalidation, counters,
//! and the fault-containing policy layer.
//!
//! Run with: cargo run --example basic_usage
//! Add `--features redis` to also try a local Redis store.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tagged_cache::{CacheConfig, Enforcer, Result, StoreConfig, StoreManager, Ttl};

#[derive(Clone, Debug, Serialize, Deserialize)]
struct Employment {
    id: String,
    employer_name: String,
    salary: f64,
}

fn load_employment(id: &str) -> Option<Employment> {
    match id {
        "emp_001" => Some(Employment {
            id: id.to_string(),
            employer_name: "Acme Corp".to_string(),
            salary: 75000.0,
        }),
        _ => None,
    }
}

async fn demonstrate_store(manager: &Arc<StoreManager>, store: &str) -> Result<()> {
    println!("\n--- Store [{}] ---", store);

    let mut work = manager.begin(store)?;

    // 1. Tagged write
    if let Some(emp) = load_employment("emp_001") {
        work.tag(["employment", "acme"]).set("emp_001", &emp, Ttl::Default).await?;
        println!("  ✓ Cached {} under tags employment, acme", emp.id);
    }
    println!("  ✓ Tag members: {:?}", work.tag_items("acme").await?);

    // 2. Read back
    if let Some(emp) = work.get::<Employment>("emp_001").await? {
        println!("  ✓ Got from cache: {} (${:.2})", emp.employer_name, emp.salary);
    }

    // 3. Counters
    work.inc("visits", 1).await?;
    let visits = work.inc("visits", 1).await?;
    println!("  ✓ Visits counter: {:?}", visits);

    // 4. Tag invalidation
    work.tag(["acme"]).clear().await?;
    println!("  ✓ After clearing [acme], emp_001 cached: {}", work.has("emp_001").await?);

    work.delete("visits").await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Tagged Cache - Basic Example ===");

    let mut config = CacheConfig::new("local")
        .with_store("local", StoreConfig::new("memory").with_prefix("demo:"));
    if cfg!(feature = "redis") {
        config = config.with_store("redis", StoreConfig::new("redis").with_prefix("demo:"));
    }
    let manager = Arc::new(StoreManager::new(config));

    demonstrate_store(&manager, "local").await?;

    #[cfg(feature = "redis")]
    if let Err(e) = demonstrate_store(&manager, "redis").await {
        println!("\n✗ Redis store unavailable: {} (Make sure Redis is running)", e);
    }

    // Policy layer: faults never reach the caller
    println!("\n--- Enforcer ---");
    let enforcer = Enforcer::new(Arc::clone(&manager));
    let salary: f64 = enforcer.get("salary:emp_001", 75000.0, Some(60), ["payroll"]).await;
    println!("  ✓ Computed and cached salary {:.2}", salary);
    println!("  ✓ Cached: {}", enforcer.has("salary:emp_001").await);
    enforcer.clear(["payroll"]).await;
    println!("  ✓ After clearing [payroll]: {}", enforcer.has("salary:emp_001").await);

    let broken = Enforcer::for_store(Arc::clone(&manager), "missing");
    let fallback: String = broken.get("k", "fallback".to_string(), None, Vec::<String>::new()).await;
    println!("  ✓ Unknown store contained, got [{}]", fallback);

    Ok(())
}
