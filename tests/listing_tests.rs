#![cfg(feature = "inmem-store")]

mod common;

use std::sync::Arc;

use common::{sample_property, FailingRepo, MockImageStore};
use nicoya::filters::{RawFilters, SortOrder};
use nicoya::listing::ListingService;
use nicoya::models::NewPropertyImage;
use nicoya::repo::inmem::InMemRepo;
use nicoya::repo::{PropertyImageRepo, PropertyRepo, Repo};
use nicoya::storage::ImageStore;
use uuid::Uuid;

fn service() -> (Arc<InMemRepo>, Arc<MockImageStore>, ListingService) {
    let repo = Arc::new(InMemRepo::new());
    let store = Arc::new(MockImageStore::new());
    let svc = ListingService::new(
        repo.clone() as Arc<dyn Repo>,
        store.clone() as Arc<dyn ImageStore>,
    );
    (repo, store, svc)
}

async fn add_table_url(repo: &InMemRepo, property_id: Uuid, url: &str) {
    repo.add_property_images(
        property_id,
        &[NewPropertyImage { image_url: url.into(), alt_text: None, caption: None }],
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn reconciliation_unions_sources_with_storage_first() {
    let (repo, store, svc) = service();
    // row has no cached images, 2 blob files, 1 side-table row overlapping one blob URL
    let p = repo.create_property(sample_property("Casa", "Cabuya", 100_000.0, 1)).await.unwrap();
    store.put_objects(p.id, &["a.jpg", "b.jpg"]);
    let overlap = store.public_url(p.id, "a.jpg");
    add_table_url(&repo, p.id, &overlap).await;

    let got = svc.get_by_id(p.id).await.unwrap();
    assert_eq!(
        got.images,
        vec![store.public_url(p.id, "a.jpg"), store.public_url(p.id, "b.jpg")]
    );
    assert_eq!(got.images.len(), 2); // overlap deduplicated
}

#[tokio::test]
async fn reconciliation_is_idempotent() {
    let (repo, store, svc) = service();
    let p = repo.create_property(sample_property("Casa", "Cabuya", 100_000.0, 1)).await.unwrap();
    store.put_objects(p.id, &["1.jpg", "2.jpg"]);
    add_table_url(&repo, p.id, &store.public_url(p.id, "3.jpg")).await;

    let first = svc.get_by_id(p.id).await.unwrap().images;
    let second = svc.get_by_id(p.id).await.unwrap().images;
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
}

#[tokio::test]
async fn reconciliation_falls_back_to_cached_column() {
    let (repo, _store, svc) = service();
    let mut new = sample_property("Cached Only", "Cabuya", 100_000.0, 1);
    new.images = vec!["https://legacy.example.com/old.jpg".into()];
    let p = repo.create_property(new).await.unwrap();

    // no blob objects, no side-table rows: the cache column wins
    let got = svc.get_by_id(p.id).await.unwrap();
    assert_eq!(got.images, vec!["https://legacy.example.com/old.jpg".to_string()]);
}

#[tokio::test]
async fn storage_outage_degrades_to_side_table_only() {
    let (repo, store, svc) = service();
    let p = repo.create_property(sample_property("Casa", "Cabuya", 100_000.0, 1)).await.unwrap();
    store.put_objects(p.id, &["lost.jpg"]);
    store.fail_for(p.id);
    add_table_url(&repo, p.id, "https://cdn.test/fallback.jpg").await;

    let got = svc.get_by_id(p.id).await.unwrap();
    assert_eq!(got.images, vec!["https://cdn.test/fallback.jpg".to_string()]);
}

#[tokio::test]
async fn one_rows_failure_does_not_break_the_page() {
    let (repo, store, svc) = service();
    let ok = repo.create_property(sample_property("Healthy", "Cabuya", 100_000.0, 1)).await.unwrap();
    let broken = repo.create_property(sample_property("Broken", "Cabuya", 200_000.0, 1)).await.unwrap();
    store.put_objects(ok.id, &["fine.jpg"]);
    store.fail_for(broken.id);

    let page = svc.list(&RawFilters::default().normalize()).await;
    assert_eq!(page.total, 2);
    let healthy = page.properties.iter().find(|p| p.id == ok.id).unwrap();
    let failed = page.properties.iter().find(|p| p.id == broken.id).unwrap();
    assert_eq!(healthy.images, vec![store.public_url(ok.id, "fine.jpg")]);
    assert!(failed.images.is_empty());
}

#[tokio::test]
async fn list_envelope_arithmetic() {
    let (repo, _store, svc) = service();
    for i in 0..25 {
        repo.create_property(sample_property(&format!("P{i}"), "Cabuya", 100_000.0, 1))
            .await
            .unwrap();
    }

    let page = svc.list(&RawFilters::default().normalize()).await;
    assert_eq!(page.total, 25);
    assert_eq!(page.page, 1);
    assert_eq!(page.total_pages, 3); // ceil(25 / 12)
    assert_eq!(page.properties.len(), 12);

    let mut f = RawFilters::default().normalize();
    f.page = 3;
    let last = svc.list(&f).await;
    assert_eq!(last.properties.len(), 1);

    // zero results: empty vec, total_pages 0, no error
    let mut none = RawFilters::default().normalize();
    none.query = Some("no such term anywhere".into());
    let empty = svc.list(&none).await;
    assert!(empty.properties.is_empty());
    assert_eq!(empty.total, 0);
    assert_eq!(empty.total_pages, 0);
}

#[tokio::test]
async fn sorted_page_is_monotonic_through_the_facade() {
    let (repo, _store, svc) = service();
    for price in [700_000.0, 200_000.0, 450_000.0] {
        repo.create_property(sample_property(&format!("P{price}"), "Cabuya", price, 1))
            .await
            .unwrap();
    }
    let mut f = RawFilters::default().normalize();
    f.sort = SortOrder::PriceLow;
    let page = svc.list(&f).await;
    assert!(page.properties.windows(2).all(|w| w[0].price <= w[1].price));
}

#[tokio::test]
async fn search_is_a_query_shorthand() {
    let (repo, _store, svc) = service();
    repo.create_property(sample_property("Oceanview Villa", "Santa Teresa", 900_000.0, 3))
        .await
        .unwrap();
    repo.create_property(sample_property("Jungle Retreat", "Montezuma", 400_000.0, 2))
        .await
        .unwrap();

    let hits = svc.search("oceanview", 5).await;
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].title, "Oceanview Villa");
    assert!(svc.search("no such term", 5).await.is_empty());
}

#[tokio::test]
async fn featured_respects_limit() {
    let (repo, _store, svc) = service();
    for i in 0..8 {
        let mut p = sample_property(&format!("Featured {i}"), "Cabuya", 100_000.0, 1);
        p.featured = true;
        repo.create_property(p).await.unwrap();
    }
    repo.create_property(sample_property("Plain", "Cabuya", 100_000.0, 1)).await.unwrap();

    let featured = svc.get_featured(6).await;
    assert_eq!(featured.len(), 6);
    assert!(featured.iter().all(|p| p.featured));
}

#[tokio::test]
async fn related_backfills_to_requested_length() {
    // 2 Montezuma properties besides the current one, 10 elsewhere, limit 6:
    // both Montezuma matches plus 4 recent others.
    let (repo, _store, svc) = service();
    let current = repo
        .create_property(sample_property("Current", "Montezuma", 500_000.0, 2))
        .await
        .unwrap();
    let mut montezuma_ids = Vec::new();
    for i in 0..2 {
        let p = repo
            .create_property(sample_property(&format!("Neighbor {i}"), "Montezuma", 400_000.0, 2))
            .await
            .unwrap();
        montezuma_ids.push(p.id);
    }
    for i in 0..10 {
        repo.create_property(sample_property(&format!("Far {i}"), "Santa Teresa", 300_000.0, 2))
            .await
            .unwrap();
    }

    let related = svc.get_related(current.id, "Montezuma", 6).await;
    assert_eq!(related.len(), 6);
    assert!(related.iter().all(|p| p.id != current.id));
    // the true matches come first, backfill after
    assert!(montezuma_ids.contains(&related[0].id));
    assert!(montezuma_ids.contains(&related[1].id));
    assert!(related[2..].iter().all(|p| p.location == "Santa Teresa"));
    // no duplicates
    let mut ids: Vec<Uuid> = related.iter().map(|p| p.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn repo_failure_degrades_instead_of_erroring() {
    let svc = ListingService::new(
        Arc::new(FailingRepo) as Arc<dyn Repo>,
        Arc::new(MockImageStore::new()) as Arc<dyn ImageStore>,
    );

    let page = svc.list(&RawFilters::default().normalize()).await;
    assert!(page.properties.is_empty());
    assert_eq!(page.total, 0);
    assert_eq!(page.total_pages, 0);
    assert_eq!(page.page, 1);

    assert!(svc.get_by_id(Uuid::new_v4()).await.is_none());
    assert!(svc.get_by_slug("casa-del-mar").await.is_none());
    assert!(svc.get_related(Uuid::new_v4(), "Montezuma", 4).await.is_empty());
    assert!(svc.get_featured(6).await.is_empty());
}

#[tokio::test]
async fn missing_lookups_are_none_not_errors() {
    let (_repo, _store, svc) = service();
    assert!(svc.get_by_id(Uuid::new_v4()).await.is_none());
    assert!(svc.get_by_slug("nope").await.is_none());
}

#[tokio::test]
async fn sync_writes_canonical_list_into_cache_column() {
    let (repo, store, svc) = service();
    let p = repo.create_property(sample_property("Casa", "Cabuya", 100_000.0, 1)).await.unwrap();
    store.put_objects(p.id, &["a.jpg"]);
    add_table_url(&repo, p.id, "https://cdn.test/extra.jpg").await;

    let canonical = svc.sync_images(p.id).await.unwrap();
    assert_eq!(canonical, vec![store.public_url(p.id, "a.jpg"), "https://cdn.test/extra.jpg".to_string()]);

    // the row now caches exactly the canonical set
    let row = repo.get_property(p.id).await.unwrap();
    assert_eq!(row.images, canonical);
}

#[tokio::test]
async fn migration_copies_cache_into_side_table_once() {
    let (repo, _store, svc) = service();
    let mut new = sample_property("Legacy", "Cabuya", 100_000.0, 1);
    new.images = vec![
        "https://legacy.example.com/1.jpg".into(),
        "https://legacy.example.com/2.jpg".into(),
    ];
    let p = repo.create_property(new).await.unwrap();
    // one URL already normalized
    add_table_url(&repo, p.id, "https://legacy.example.com/1.jpg").await;

    let report = svc.migrate_images().await;
    assert_eq!(report.processed, 1);
    assert!(report.errors.is_empty());
    let rows = repo.list_property_images(p.id).await.unwrap();
    assert_eq!(rows.len(), 2); // only the missing URL was added

    // second run finds nothing to do
    let again = svc.migrate_images().await;
    assert_eq!(again.processed, 0);
    assert_eq!(repo.list_property_images(p.id).await.unwrap().len(), 2);
}
