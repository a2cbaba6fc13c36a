use std::collections::HashSet;
use std::sync::Arc;

use futures_util::future::join_all;
use log::{error, warn};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::filters::{ListingFilters, PAGE_SIZE};
use crate::models::{NewPropertyImage, Property, PropertyPage};
use crate::repo::{Repo, RepoError, RepoResult};
use crate::storage::ImageStore;

/// Stable set-union of the two image sources: blob-storage URLs first, then
/// side-table URLs, deduplicated by exact URL string keeping the first
/// occurrence. Pure; idempotent by construction.
pub fn reconcile(storage_urls: &[String], table_urls: &[String], cached: &[String]) -> Vec<String> {
    fn dedup_union<'a>(sources: impl Iterator<Item = &'a String>) -> Vec<String> {
        let mut seen = HashSet::new();
        sources
            .filter(|url| seen.insert(url.as_str()))
            .cloned()
            .collect()
    }
    let canonical = dedup_union(storage_urls.iter().chain(table_urls.iter()));
    if canonical.is_empty() {
        // Both live sources empty: fall back to whatever the row has cached.
        return dedup_union(cached.iter());
    }
    canonical
}

/// Outcome of the one-shot cache-column → side-table migration.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct MigrationReport {
    pub processed: usize,
    pub errors: Vec<String>,
}

/// Single entry point for everything the presentation layer reads.
/// Takes its collaborators by injection so tests can swap in fakes.
#[derive(Clone)]
pub struct ListingService {
    repo: Arc<dyn Repo>,
    images: Arc<dyn ImageStore>,
}

impl ListingService {
    pub fn new(repo: Arc<dyn Repo>, images: Arc<dyn ImageStore>) -> Self {
        Self { repo, images }
    }

    /// Canonical image list for one property. Either source failing is logged
    /// and treated as empty; a partial list beats a blocked page.
    pub async fn reconcile_images(&self, property: &Property) -> Vec<String> {
        let storage_urls = match self.images.list_urls(property.id).await {
            Ok(urls) => urls,
            Err(e) => {
                warn!("image listing failed for property {}: {e}", property.id);
                Vec::new()
            }
        };
        let table_urls = match self.repo.list_property_images(property.id).await {
            Ok(rows) => rows.into_iter().map(|r| r.image_url).collect(),
            Err(e) => {
                warn!("image side-table fetch failed for property {}: {e}", property.id);
                Vec::new()
            }
        };
        reconcile(&storage_urls, &table_urls, &property.images)
    }

    /// Resolve images for a page of rows concurrently. Per-row failures are
    /// already absorbed inside `reconcile_images`, so one slow or broken row
    /// never takes down its neighbors.
    async fn with_images(&self, rows: Vec<Property>) -> Vec<Property> {
        let resolved = join_all(rows.iter().map(|p| self.reconcile_images(p))).await;
        rows.into_iter()
            .zip(resolved)
            .map(|(mut p, images)| {
                p.images = images;
                p
            })
            .collect()
    }

    /// Paged, filtered, sorted listing. Never errors: a failed read degrades
    /// to an empty page so the caller can still render.
    pub async fn list(&self, filters: &ListingFilters) -> PropertyPage {
        let (rows, total) = match self.repo.search_properties(filters).await {
            Ok(r) => r,
            Err(e) => {
                error!("property search failed: {e}");
                return PropertyPage::empty(filters.page);
            }
        };
        let total_pages = (total as u64).div_ceil(PAGE_SIZE as u64) as u32;
        PropertyPage {
            properties: self.with_images(rows).await,
            total,
            page: filters.page,
            total_pages,
        }
    }

    pub async fn get_by_id(&self, id: Uuid) -> Option<Property> {
        match self.repo.get_property(id).await {
            Ok(mut p) => {
                p.images = self.reconcile_images(&p).await;
                Some(p)
            }
            Err(RepoError::NotFound) => None,
            Err(e) => {
                error!("property fetch failed for {id}: {e}");
                None
            }
        }
    }

    pub async fn get_by_slug(&self, slug: &str) -> Option<Property> {
        match self.repo.get_property_by_slug(slug).await {
            Ok(mut p) => {
                p.images = self.reconcile_images(&p).await;
                Some(p)
            }
            Err(RepoError::NotFound) => None,
            Err(e) => {
                error!("property fetch failed for slug {slug}: {e}");
                None
            }
        }
    }

    pub async fn get_featured(&self, limit: i64) -> Vec<Property> {
        let filters = ListingFilters {
            featured: Some(true),
            page: 1,
            limit: Some(limit),
            ..Default::default()
        };
        self.list(&filters).await.properties
    }

    /// Free-text search convenience over `list`.
    pub async fn search(&self, term: &str, limit: i64) -> Vec<Property> {
        let filters = ListingFilters {
            query: Some(term.to_string()),
            page: 1,
            limit: Some(limit),
            ..Default::default()
        };
        self.list(&filters).await.properties
    }

    /// Same-location properties, newest first, excluding the current one.
    /// When fewer than `limit` match, backfill with recent properties so the
    /// rail is always full, soft relevance on purpose.
    pub async fn get_related(&self, current_id: Uuid, location: &str, limit: i64) -> Vec<Property> {
        let mut related = match self.repo.related_properties(current_id, location, limit).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("related lookup failed for {current_id}: {e}");
                Vec::new()
            }
        };
        if (related.len() as i64) < limit {
            let mut exclude: Vec<Uuid> = related.iter().map(|p| p.id).collect();
            exclude.push(current_id);
            let missing = limit - related.len() as i64;
            match self.repo.recent_properties(&exclude, missing).await {
                Ok(filler) => related.extend(filler),
                Err(e) => warn!("related backfill failed for {current_id}: {e}"),
            }
        }
        self.with_images(related).await
    }

    /// Write the reconciled canonical list back into the property row's
    /// `images` cache column. This is the explicit sync that closes the
    /// documented inconsistency window between the two representations.
    pub async fn sync_images(&self, property_id: Uuid) -> RepoResult<Vec<String>> {
        let property = self.repo.get_property(property_id).await?;
        let canonical = self.reconcile_images(&property).await;
        self.repo.set_property_images(property_id, &canonical).await?;
        Ok(canonical)
    }

    /// One-shot migration: copy cache-column URLs missing from the side table
    /// into it. Per-property failures are collected, not fatal.
    pub async fn migrate_images(&self) -> MigrationReport {
        let refs = match self.repo.cached_image_refs().await {
            Ok(r) => r,
            Err(e) => {
                return MigrationReport {
                    processed: 0,
                    errors: vec![format!("listing properties failed: {e}")],
                }
            }
        };
        let mut report = MigrationReport::default();
        for (property_id, cached) in refs {
            let existing: HashSet<String> = match self.repo.list_property_images(property_id).await {
                Ok(rows) => rows.into_iter().map(|r| r.image_url).collect(),
                Err(e) => {
                    report.errors.push(format!("property {property_id}: {e}"));
                    continue;
                }
            };
            let missing: Vec<NewPropertyImage> = cached
                .into_iter()
                .filter(|url| !existing.contains(url))
                .map(|url| NewPropertyImage { image_url: url, alt_text: None, caption: None })
                .collect();
            if missing.is_empty() {
                continue;
            }
            match self.repo.add_property_images(property_id, &missing).await {
                Ok(_) => report.processed += 1,
                Err(e) => report.errors.push(format!("property {property_id}: {e}")),
            }
        }
        report
    }
}
