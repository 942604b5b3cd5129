use anyhow::Result;
use homestock_lib::categories;
use homestock_lib::household::{initialize_household, DefaultDataset, SeedOutcome};
use homestock_lib::realtime::{ChangeFeed, Row, RowChange};
use homestock_lib::supplies::{self, SupplyStatus};
#[path = "util.rs"]
mod util;

#[tokio::test]
async fn seeds_an_empty_household_once() -> Result<()> {
    let pool = util::temp_pool().await;
    let feed = ChangeFeed::new();
    let dataset = DefaultDataset::bundled()?;

    let first = initialize_household(&pool, &feed, "h1", &dataset).await?;
    let SeedOutcome::Seeded { categories: seeded_categories, supplies: seeded_supplies } = first
    else {
        panic!("expected a seed, got {first:?}");
    };
    assert_eq!(seeded_categories, 4);
    assert!(seeded_supplies > 0);
    assert_eq!(categories::count(&pool, "h1").await?, 4);
    assert_eq!(supplies::count(&pool, "h1").await? as u64, seeded_supplies);

    let second = initialize_household(&pool, &feed, "h1", &dataset).await?;
    assert_eq!(second, SeedOutcome::Skipped);
    assert_eq!(categories::count(&pool, "h1").await?, 4);
    Ok(())
}

#[tokio::test]
async fn any_existing_supply_skips_seeding() -> Result<()> {
    let pool = util::temp_pool().await;
    let feed = ChangeFeed::new();
    // A supply whose category was never created still counts as set up.
    util::add_supply(&pool, &feed, "h1", "orphan", "Matches", SupplyStatus::Low).await;

    let outcome = initialize_household(&pool, &feed, "h1", &DefaultDataset::bundled()?).await?;
    assert_eq!(outcome, SeedOutcome::Skipped);
    assert_eq!(categories::count(&pool, "h1").await?, 0);
    Ok(())
}

#[tokio::test]
async fn custom_categories_alone_skip_seeding() -> Result<()> {
    let pool = util::temp_pool().await;
    let feed = ChangeFeed::new();
    util::add_category(&pool, &feed, "h1", "garage", "Garage").await;

    let outcome = initialize_household(&pool, &feed, "h1", &DefaultDataset::bundled()?).await?;
    assert_eq!(outcome, SeedOutcome::Skipped);
    assert_eq!(categories::count(&pool, "h1").await?, 1);
    assert_eq!(supplies::count(&pool, "h1").await?, 0);
    Ok(())
}

#[tokio::test]
async fn seeding_is_scoped_to_the_household() -> Result<()> {
    let pool = util::temp_pool().await;
    let feed = ChangeFeed::new();
    util::add_category(&pool, &feed, "h1", "garage", "Garage").await;

    let outcome = initialize_household(&pool, &feed, "h2", &DefaultDataset::bundled()?).await?;
    assert!(matches!(outcome, SeedOutcome::Seeded { .. }));
    assert_eq!(categories::count(&pool, "h1").await?, 1);
    let pepper = supplies::get(&pool, "h2", "spices-black-pepper").await?;
    assert_eq!(pepper.category, "spices");
    assert_eq!(pepper.status, SupplyStatus::Available);
    Ok(())
}

#[tokio::test]
async fn seeding_publishes_inserts() -> Result<()> {
    let pool = util::temp_pool().await;
    let feed = ChangeFeed::new();
    let mut changes = feed.subscribe("h1");
    let dataset = DefaultDataset::from_json(
        r#"{"categories":[{"id":"c","name":"Snacks"}],
            "supplies":[{"category":"c","name":"Nuts","status":"low"}]}"#,
    )?;

    initialize_household(&pool, &feed, "h1", &dataset).await?;

    match changes.recv().await {
        Some(RowChange::Inserted(Row::Category(category))) => assert_eq!(category.id, "snacks"),
        other => panic!("unexpected first change: {other:?}"),
    }
    match changes.recv().await {
        Some(RowChange::Inserted(Row::Supply(supply))) => {
            assert_eq!(supply.id, "snacks-nuts");
            assert_eq!(supply.status, SupplyStatus::Low);
        }
        other => panic!("unexpected second change: {other:?}"),
    }
    Ok(())
}

#[test]
fn malformed_dataset_is_reported() {
    let err = DefaultDataset::from_json("{ not json").unwrap_err();
    assert_eq!(err.code(), "HOUSEHOLD/DATASET");
}
