use granary::{
    create_cache_binding, BindingConfig, CacheContext, ContextPointer, FetchFn, Readiness,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Users {
    ids: Vec<u32>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::init();

    let ctx: ContextPointer<Users> = CacheContext::new();

    let fetcher = Arc::new(FetchFn(|filters: Value| async move {
        println!("fetching users with filters {filters}");
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, granary::Error>(Users { ids: vec![1, 2, 3] })
    }));

    // Example 1: two bindings with order-swapped filters share one entry.
    println!("=== Deduplicated fetch ===");
    let first = create_cache_binding(
        &ctx,
        BindingConfig::new("users", fetcher.clone())
            .with_filters(|| Some(json!({ "status": "active", "page": 1 })))
            .with_dev_log(true),
    );
    let second = create_cache_binding(
        &ctx,
        BindingConfig::new("users", fetcher.clone())
            .with_filters(|| Some(json!({ "page": 1, "status": "active" }))),
    );
    println!("canonical key: {}", first.key());

    let start = std::time::Instant::now();
    let (a, b) = futures::join!(first.refetch(), second.refetch());
    println!("both resolved in {:?}: {:?} / {:?}", start.elapsed(), a?, b?);

    // Second pass hits the warm entry without fetching.
    let start = std::time::Instant::now();
    if second.tick().await.is_none() {
        println!("warm read took {:?}: {:?}", start.elapsed(), second.data());
    }

    // Example 2: a readiness-gated binding.
    println!("\n=== Readiness gating ===");
    let gated = create_cache_binding(
        &ctx,
        BindingConfig::new("users", fetcher.clone())
            .with_filters(|| Some(json!({ "status": "archived" })))
            .with_readiness(Readiness::sync(|| Ok(false))),
    );
    match gated.tick().await {
        Some(_) => println!("unexpected fetch"),
        None => println!("not ready, fetch skipped"),
    }

    // Example 3: gated mutation after the data is in.
    println!("\n=== Mutation ===");
    first.mutate(|users| users.ids.push(4));
    println!("after mutate: {:?}", first.data());
    first
        .mutate_async(|entry, mut users, _filters| async move {
            users.ids.retain(|id| id % 2 == 0);
            entry.set_data(users);
            Ok(())
        })
        .await?;
    println!("after mutate_async: {:?}", first.data());

    println!("\ncontext stats: {:?}", ctx.stats());

    Ok(())
}
