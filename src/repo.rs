use async_trait::async_trait;
use uuid::Uuid;

use crate::filters::ListingFilters;
use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait PropertyRepo: Send + Sync {
    /// One composed query: all active predicates AND-ed, sorted, windowed.
    /// Returns the page of rows plus the total matching-row count (the count
    /// reflects every predicate but not the pagination window).
    async fn search_properties(&self, filters: &ListingFilters) -> RepoResult<(Vec<Property>, i64)>;
    async fn get_property(&self, id: Uuid) -> RepoResult<Property>;
    async fn get_property_by_slug(&self, slug: &str) -> RepoResult<Property>;
    /// Properties whose location substring-matches `location`, newest first,
    /// excluding `exclude`.
    async fn related_properties(&self, exclude: Uuid, location: &str, limit: i64) -> RepoResult<Vec<Property>>;
    /// Most recent properties not in `exclude`; used to backfill short
    /// related-property lists.
    async fn recent_properties(&self, exclude: &[Uuid], limit: i64) -> RepoResult<Vec<Property>>;
    async fn create_property(&self, new: NewProperty) -> RepoResult<Property>;
    async fn update_property(&self, id: Uuid, upd: UpdateProperty) -> RepoResult<Property>;
    async fn delete_property(&self, id: Uuid) -> RepoResult<()>;
    /// Overwrite the denormalized `images` cache column and bump `updated_at`.
    async fn set_property_images(&self, id: Uuid, urls: &[String]) -> RepoResult<()>;
    /// `(id, images)` for every property with a non-empty cache column;
    /// feeds the one-shot side-table migration.
    async fn cached_image_refs(&self) -> RepoResult<Vec<(Uuid, Vec<String>)>>;
}

#[async_trait]
pub trait PropertyImageRepo: Send + Sync {
    async fn list_property_images(&self, property_id: Uuid) -> RepoResult<Vec<PropertyImage>>;
    async fn add_property_images(&self, property_id: Uuid, images: &[NewPropertyImage]) -> RepoResult<Vec<PropertyImage>>;
    /// Removes rows matching any of `urls`; returns how many went away.
    async fn remove_property_images(&self, property_id: Uuid, urls: &[String]) -> RepoResult<u64>;
    /// Unsets every primary flag for the property then sets the one matching
    /// `url`. At most one primary per property is this operation's invariant,
    /// not the schema's.
    async fn set_primary_image(&self, property_id: Uuid, url: &str) -> RepoResult<()>;
    async fn get_primary_image(&self, property_id: Uuid) -> RepoResult<Option<PropertyImage>>;
}

#[async_trait]
pub trait InquiryRepo: Send + Sync {
    async fn create_inquiry(&self, new: NewInquiry) -> RepoResult<ContactInquiry>;
    async fn list_inquiries(&self) -> RepoResult<Vec<ContactInquiry>>;
}

#[async_trait]
pub trait ProfileRepo: Send + Sync {
    async fn get_profile(&self, user_id: &str) -> RepoResult<UserProfile>;
    /// Fetch the profile, creating it with the default role on first touch.
    async fn ensure_profile(&self, user_id: &str, email: &str) -> RepoResult<UserProfile>;
    async fn set_profile_role(&self, user_id: &str, role: &str) -> RepoResult<()>;
}

pub trait Repo: PropertyRepo + PropertyImageRepo + InquiryRepo + ProfileRepo {}

impl<T> Repo for T where T: PropertyRepo + PropertyImageRepo + InquiryRepo + ProfileRepo {}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use crate::filters::SortOrder;
    use chrono::{DateTime, Duration, Utc};
    use std::collections::HashMap;
    use std::sync::{Arc, RwLock};

    #[derive(Default)]
    struct State {
        properties: HashMap<Uuid, Property>,
        images: HashMap<RowId, PropertyImage>,
        inquiries: HashMap<RowId, ContactInquiry>,
        profiles: HashMap<String, UserProfile>,
        next_row_id: RowId,
        last_created: Option<DateTime<Utc>>,
    }

    /// In-memory backend. Primarily the injectable fake for tests and local
    /// development; implements the full `Repo` contract.
    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
    }

    impl InMemRepo {
        pub fn new() -> Self {
            Self::default()
        }

        fn next_row_id(state: &mut State) -> RowId {
            state.next_row_id += 1;
            state.next_row_id
        }

        // Rapid consecutive inserts can land on the same clock tick; nudge
        // forward so newest-first ordering stays deterministic.
        fn next_timestamp(state: &mut State) -> DateTime<Utc> {
            let mut now = Utc::now();
            if let Some(last) = state.last_created {
                if now <= last {
                    now = last + Duration::microseconds(1);
                }
            }
            state.last_created = Some(now);
            now
        }

        fn unique_slug(state: &State, base: &str, exclude: Option<Uuid>) -> String {
            let taken = |candidate: &str| {
                state
                    .properties
                    .values()
                    .any(|p| p.slug == candidate && Some(p.id) != exclude)
            };
            if !taken(base) {
                return base.to_string();
            }
            let mut n = 2;
            loop {
                let candidate = format!("{base}-{n}");
                if !taken(&candidate) {
                    return candidate;
                }
                n += 1;
            }
        }

        fn matches(p: &Property, f: &ListingFilters) -> bool {
            fn contains_ci(haystack: &str, needle: &str) -> bool {
                haystack.to_lowercase().contains(&needle.to_lowercase())
            }
            if let Some(q) = &f.query {
                if !(contains_ci(&p.title, q)
                    || contains_ci(&p.description, q)
                    || contains_ci(&p.location, q))
                {
                    return false;
                }
            }
            if let Some(loc) = &f.location {
                if !contains_ci(&p.location, loc) {
                    return false;
                }
            }
            // No property-type column exists; the type filter matches titles.
            if let Some(ty) = &f.property_type {
                if !contains_ci(&p.title, ty) {
                    return false;
                }
            }
            if let Some(min) = f.min_price {
                if p.price < min {
                    return false;
                }
            }
            if let Some(max) = f.max_price {
                if p.price > max {
                    return false;
                }
            }
            if let Some(beds) = f.bedrooms {
                if p.bedrooms < beds {
                    return false;
                }
            }
            if let Some(featured) = f.featured {
                if p.featured != featured {
                    return false;
                }
            }
            true
        }

        fn order(rows: &mut [Property], sort: SortOrder) {
            match sort {
                SortOrder::Newest => rows.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
                SortOrder::Oldest => rows.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
                SortOrder::PriceLow => rows.sort_by(|a, b| a.price.total_cmp(&b.price)),
                SortOrder::PriceHigh => rows.sort_by(|a, b| b.price.total_cmp(&a.price)),
                SortOrder::Bedrooms => rows.sort_by(|a, b| b.bedrooms.cmp(&a.bedrooms)),
            }
        }
    }

    #[async_trait]
    impl PropertyRepo for InMemRepo {
        async fn search_properties(&self, filters: &ListingFilters) -> RepoResult<(Vec<Property>, i64)> {
            let s = self.state.read().unwrap();
            let mut rows: Vec<Property> = s
                .properties
                .values()
                .filter(|p| Self::matches(p, filters))
                .cloned()
                .collect();
            let total = rows.len() as i64;
            Self::order(&mut rows, filters.sort);
            let offset = filters.offset().max(0) as usize;
            let page: Vec<Property> = rows
                .into_iter()
                .skip(offset)
                .take(filters.page_size().max(0) as usize)
                .collect();
            Ok((page, total))
        }

        async fn get_property(&self, id: Uuid) -> RepoResult<Property> {
            let s = self.state.read().unwrap();
            s.properties.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_property_by_slug(&self, slug: &str) -> RepoResult<Property> {
            let s = self.state.read().unwrap();
            s.properties
                .values()
                .find(|p| p.slug == slug)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn related_properties(&self, exclude: Uuid, location: &str, limit: i64) -> RepoResult<Vec<Property>> {
            let s = self.state.read().unwrap();
            let needle = location.to_lowercase();
            let mut rows: Vec<Property> = s
                .properties
                .values()
                .filter(|p| p.id != exclude && p.location.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows.truncate(limit.max(0) as usize);
            Ok(rows)
        }

        async fn recent_properties(&self, exclude: &[Uuid], limit: i64) -> RepoResult<Vec<Property>> {
            let s = self.state.read().unwrap();
            let mut rows: Vec<Property> = s
                .properties
                .values()
                .filter(|p| !exclude.contains(&p.id))
                .cloned()
                .collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            rows.truncate(limit.max(0) as usize);
            Ok(rows)
        }

        async fn create_property(&self, new: NewProperty) -> RepoResult<Property> {
            let mut s = self.state.write().unwrap();
            let slug = Self::unique_slug(&s, &slugify(&new.title), None);
            let now = Self::next_timestamp(&mut s);
            let property = Property {
                id: Uuid::new_v4(),
                title: new.title,
                price: new.price,
                location: new.location,
                lot_size: new.lot_size,
                construction_size: new.construction_size,
                bedrooms: new.bedrooms,
                bathrooms: new.bathrooms,
                description: new.description,
                amenities: new.amenities,
                images: new.images,
                slug,
                featured: new.featured,
                created_at: now,
                updated_at: now,
            };
            s.properties.insert(property.id, property.clone());
            Ok(property)
        }

        async fn update_property(&self, id: Uuid, upd: UpdateProperty) -> RepoResult<Property> {
            let mut s = self.state.write().unwrap();
            let current = s.properties.get(&id).cloned().ok_or(RepoError::NotFound)?;
            // A new title regenerates the slug (kept unique with a suffix).
            let slug = match &upd.title {
                Some(title) if *title != current.title => {
                    Self::unique_slug(&s, &slugify(title), Some(id))
                }
                _ => current.slug.clone(),
            };
            let p = s.properties.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title { p.title = title; }
            if let Some(price) = upd.price { p.price = price; }
            if let Some(location) = upd.location { p.location = location; }
            if let Some(lot_size) = upd.lot_size { p.lot_size = lot_size; }
            if let Some(cs) = upd.construction_size { p.construction_size = cs; }
            if let Some(bedrooms) = upd.bedrooms { p.bedrooms = bedrooms; }
            if let Some(bathrooms) = upd.bathrooms { p.bathrooms = bathrooms; }
            if let Some(description) = upd.description { p.description = description; }
            if let Some(amenities) = upd.amenities { p.amenities = amenities; }
            if let Some(images) = upd.images { p.images = images; }
            if let Some(featured) = upd.featured { p.featured = featured; }
            p.slug = slug;
            p.updated_at = Utc::now();
            Ok(p.clone())
        }

        async fn delete_property(&self, id: Uuid) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.properties.remove(&id).ok_or(RepoError::NotFound)?;
            // cascade to side-table rows
            s.images.retain(|_, img| img.property_id != id);
            Ok(())
        }

        async fn set_property_images(&self, id: Uuid, urls: &[String]) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let p = s.properties.get_mut(&id).ok_or(RepoError::NotFound)?;
            p.images = urls.to_vec();
            p.updated_at = Utc::now();
            Ok(())
        }

        async fn cached_image_refs(&self) -> RepoResult<Vec<(Uuid, Vec<String>)>> {
            let s = self.state.read().unwrap();
            Ok(s.properties
                .values()
                .filter(|p| !p.images.is_empty())
                .map(|p| (p.id, p.images.clone()))
                .collect())
        }
    }

    #[async_trait]
    impl PropertyImageRepo for InMemRepo {
        async fn list_property_images(&self, property_id: Uuid) -> RepoResult<Vec<PropertyImage>> {
            let s = self.state.read().unwrap();
            let mut rows: Vec<PropertyImage> = s
                .images
                .values()
                .filter(|img| img.property_id == property_id)
                .cloned()
                .collect();
            rows.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
            Ok(rows)
        }

        async fn add_property_images(&self, property_id: Uuid, images: &[NewPropertyImage]) -> RepoResult<Vec<PropertyImage>> {
            let mut s = self.state.write().unwrap();
            if !s.properties.contains_key(&property_id) {
                return Err(RepoError::NotFound);
            }
            let mut created = Vec::with_capacity(images.len());
            for img in images {
                let id = Self::next_row_id(&mut s);
                let now = Self::next_timestamp(&mut s);
                let row = PropertyImage {
                    id,
                    property_id,
                    image_url: img.image_url.clone(),
                    alt_text: img.alt_text.clone(),
                    caption: img.caption.clone(),
                    is_primary: false,
                    created_at: now,
                };
                s.images.insert(id, row.clone());
                created.push(row);
            }
            Ok(created)
        }

        async fn remove_property_images(&self, property_id: Uuid, urls: &[String]) -> RepoResult<u64> {
            let mut s = self.state.write().unwrap();
            let before = s.images.len();
            s.images
                .retain(|_, img| !(img.property_id == property_id && urls.contains(&img.image_url)));
            Ok((before - s.images.len()) as u64)
        }

        async fn set_primary_image(&self, property_id: Uuid, url: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            // Verify the target exists before touching any flag: a failed
            // set-primary must leave the previous primary in place.
            if !s
                .images
                .values()
                .any(|i| i.property_id == property_id && i.image_url == url)
            {
                return Err(RepoError::NotFound);
            }
            for img in s.images.values_mut().filter(|i| i.property_id == property_id) {
                img.is_primary = img.image_url == url;
            }
            Ok(())
        }

        async fn get_primary_image(&self, property_id: Uuid) -> RepoResult<Option<PropertyImage>> {
            let s = self.state.read().unwrap();
            Ok(s.images
                .values()
                .find(|i| i.property_id == property_id && i.is_primary)
                .cloned())
        }
    }

    #[async_trait]
    impl InquiryRepo for InMemRepo {
        async fn create_inquiry(&self, new: NewInquiry) -> RepoResult<ContactInquiry> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_row_id(&mut s);
            let now = Self::next_timestamp(&mut s);
            let inquiry = ContactInquiry {
                id,
                property_id: new.property_id,
                name: new.name,
                email: new.email,
                message: new.message,
                created_at: now,
            };
            s.inquiries.insert(id, inquiry.clone());
            Ok(inquiry)
        }

        async fn list_inquiries(&self) -> RepoResult<Vec<ContactInquiry>> {
            let s = self.state.read().unwrap();
            let mut rows: Vec<ContactInquiry> = s.inquiries.values().cloned().collect();
            rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            Ok(rows)
        }
    }

    #[async_trait]
    impl ProfileRepo for InMemRepo {
        async fn get_profile(&self, user_id: &str) -> RepoResult<UserProfile> {
            let s = self.state.read().unwrap();
            s.profiles.get(user_id).cloned().ok_or(RepoError::NotFound)
        }

        async fn ensure_profile(&self, user_id: &str, email: &str) -> RepoResult<UserProfile> {
            let mut s = self.state.write().unwrap();
            if let Some(existing) = s.profiles.get(user_id) {
                return Ok(existing.clone());
            }
            let now = Utc::now();
            let profile = UserProfile {
                id: user_id.to_string(),
                email: email.to_string(),
                role: DEFAULT_ROLE.to_string(),
                full_name: None,
                created_at: now,
                updated_at: now,
            };
            s.profiles.insert(user_id.to_string(), profile.clone());
            Ok(profile)
        }

        async fn set_profile_role(&self, user_id: &str, role: &str) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let profile = s.profiles.get_mut(user_id).ok_or(RepoError::NotFound)?;
            profile.role = role.to_string();
            profile.updated_at = Utc::now();
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::filters::SortOrder;
    use sqlx::{Pool, Postgres, QueryBuilder};

    const PROPERTY_COLS: &str = "id, title, price, location, lot_size, construction_size, \
        bedrooms, bathrooms, description, amenities, images, slug, featured, created_at, updated_at";

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }
    }

    fn internal(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            other => RepoError::Internal(other.to_string()),
        }
    }

    /// Append the conjunctive filter predicates; shared by the page query and
    /// the count query so the total always reflects the same predicate set.
    fn push_predicates(qb: &mut QueryBuilder<'_, Postgres>, f: &ListingFilters) {
        if let Some(q) = &f.query {
            let pattern = format!("%{q}%");
            qb.push(" AND (title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR location ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        if let Some(loc) = &f.location {
            qb.push(" AND location ILIKE ").push_bind(format!("%{loc}%"));
        }
        // Title stands in for a property-type column; see filters::ListingFilters.
        if let Some(ty) = &f.property_type {
            qb.push(" AND title ILIKE ").push_bind(format!("%{ty}%"));
        }
        if let Some(min) = f.min_price {
            qb.push(" AND price >= ").push_bind(min);
        }
        if let Some(max) = f.max_price {
            qb.push(" AND price <= ").push_bind(max);
        }
        if let Some(beds) = f.bedrooms {
            qb.push(" AND bedrooms >= ").push_bind(beds);
        }
        if let Some(featured) = f.featured {
            qb.push(" AND featured = ").push_bind(featured);
        }
    }

    fn order_clause(sort: SortOrder) -> &'static str {
        match sort {
            SortOrder::Newest => " ORDER BY created_at DESC",
            SortOrder::Oldest => " ORDER BY created_at ASC",
            SortOrder::PriceLow => " ORDER BY price ASC",
            SortOrder::PriceHigh => " ORDER BY price DESC",
            SortOrder::Bedrooms => " ORDER BY bedrooms DESC",
        }
    }

    async fn unique_slug(pool: &Pool<Postgres>, base: &str, exclude: Option<Uuid>) -> RepoResult<String> {
        let taken: Vec<String> = sqlx::query_scalar(
            "SELECT slug FROM properties WHERE (slug = $1 OR slug LIKE $1 || '-%') AND ($2::uuid IS NULL OR id <> $2)",
        )
        .bind(base)
        .bind(exclude)
        .fetch_all(pool)
        .await
        .map_err(internal)?;
        if !taken.iter().any(|s| s == base) {
            return Ok(base.to_string());
        }
        let mut n = 2;
        loop {
            let candidate = format!("{base}-{n}");
            if !taken.iter().any(|s| *s == candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }

    #[async_trait]
    impl PropertyRepo for PgRepo {
        async fn search_properties(&self, filters: &ListingFilters) -> RepoResult<(Vec<Property>, i64)> {
            let mut count_qb = QueryBuilder::new("SELECT COUNT(*) FROM properties WHERE TRUE");
            push_predicates(&mut count_qb, filters);
            let total: i64 = count_qb
                .build_query_scalar()
                .fetch_one(&self.pool)
                .await
                .map_err(internal)?;

            let mut qb = QueryBuilder::new(format!("SELECT {PROPERTY_COLS} FROM properties WHERE TRUE"));
            push_predicates(&mut qb, filters);
            qb.push(order_clause(filters.sort));
            qb.push(" LIMIT ").push_bind(filters.page_size());
            qb.push(" OFFSET ").push_bind(filters.offset());
            let rows = qb
                .build_query_as::<Property>()
                .fetch_all(&self.pool)
                .await
                .map_err(internal)?;
            Ok((rows, total))
        }

        async fn get_property(&self, id: Uuid) -> RepoResult<Property> {
            sqlx::query_as::<_, Property>(&format!(
                "SELECT {PROPERTY_COLS} FROM properties WHERE id = $1"
            ))
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn get_property_by_slug(&self, slug: &str) -> RepoResult<Property> {
            sqlx::query_as::<_, Property>(&format!(
                "SELECT {PROPERTY_COLS} FROM properties WHERE slug = $1"
            ))
            .bind(slug)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn related_properties(&self, exclude: Uuid, location: &str, limit: i64) -> RepoResult<Vec<Property>> {
            sqlx::query_as::<_, Property>(&format!(
                "SELECT {PROPERTY_COLS} FROM properties \
                 WHERE location ILIKE $1 AND id <> $2 \
                 ORDER BY created_at DESC LIMIT $3"
            ))
            .bind(format!("%{location}%"))
            .bind(exclude)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn recent_properties(&self, exclude: &[Uuid], limit: i64) -> RepoResult<Vec<Property>> {
            sqlx::query_as::<_, Property>(&format!(
                "SELECT {PROPERTY_COLS} FROM properties \
                 WHERE id <> ALL($1) ORDER BY created_at DESC LIMIT $2"
            ))
            .bind(exclude.to_vec())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn create_property(&self, new: NewProperty) -> RepoResult<Property> {
            let slug = unique_slug(&self.pool, &slugify(&new.title), None).await?;
            sqlx::query_as::<_, Property>(&format!(
                "INSERT INTO properties \
                 (title, price, location, lot_size, construction_size, bedrooms, bathrooms, \
                  description, amenities, images, slug, featured) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12) \
                 RETURNING {PROPERTY_COLS}"
            ))
            .bind(&new.title)
            .bind(new.price)
            .bind(&new.location)
            .bind(new.lot_size)
            .bind(new.construction_size)
            .bind(new.bedrooms)
            .bind(new.bathrooms)
            .bind(&new.description)
            .bind(&new.amenities)
            .bind(&new.images)
            .bind(&slug)
            .bind(new.featured)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => RepoError::Conflict,
                other => internal(other),
            })
        }

        async fn update_property(&self, id: Uuid, upd: UpdateProperty) -> RepoResult<Property> {
            // Read-modify-write: the slug depends on the (possibly new) title,
            // so resolve the full row first. No transaction, per the accepted
            // single-statement write model.
            let current = self.get_property(id).await?;
            let slug = match &upd.title {
                Some(title) if *title != current.title => {
                    unique_slug(&self.pool, &slugify(title), Some(id)).await?
                }
                _ => current.slug.clone(),
            };
            sqlx::query_as::<_, Property>(&format!(
                "UPDATE properties SET \
                 title = $2, price = $3, location = $4, lot_size = $5, construction_size = $6, \
                 bedrooms = $7, bathrooms = $8, description = $9, amenities = $10, images = $11, \
                 slug = $12, featured = $13, updated_at = now() \
                 WHERE id = $1 RETURNING {PROPERTY_COLS}"
            ))
            .bind(id)
            .bind(upd.title.unwrap_or(current.title))
            .bind(upd.price.unwrap_or(current.price))
            .bind(upd.location.unwrap_or(current.location))
            .bind(upd.lot_size.unwrap_or(current.lot_size))
            .bind(upd.construction_size.unwrap_or(current.construction_size))
            .bind(upd.bedrooms.unwrap_or(current.bedrooms))
            .bind(upd.bathrooms.unwrap_or(current.bathrooms))
            .bind(upd.description.unwrap_or(current.description))
            .bind(upd.amenities.unwrap_or(current.amenities))
            .bind(upd.images.unwrap_or(current.images))
            .bind(&slug)
            .bind(upd.featured.unwrap_or(current.featured))
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn delete_property(&self, id: Uuid) -> RepoResult<()> {
            // property_images rows go with it via ON DELETE CASCADE
            let res = sqlx::query("DELETE FROM properties WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn set_property_images(&self, id: Uuid, urls: &[String]) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE properties SET images = $2, updated_at = now() WHERE id = $1",
            )
            .bind(id)
            .bind(urls)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn cached_image_refs(&self) -> RepoResult<Vec<(Uuid, Vec<String>)>> {
            sqlx::query_as::<_, (Uuid, Vec<String>)>(
                "SELECT id, images FROM properties WHERE cardinality(images) > 0",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }
    }

    #[async_trait]
    impl PropertyImageRepo for PgRepo {
        async fn list_property_images(&self, property_id: Uuid) -> RepoResult<Vec<PropertyImage>> {
            sqlx::query_as::<_, PropertyImage>(
                "SELECT id, property_id, image_url, alt_text, caption, is_primary, created_at \
                 FROM property_images WHERE property_id = $1 ORDER BY created_at ASC, id ASC",
            )
            .bind(property_id)
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }

        async fn add_property_images(&self, property_id: Uuid, images: &[NewPropertyImage]) -> RepoResult<Vec<PropertyImage>> {
            let mut created = Vec::with_capacity(images.len());
            for img in images {
                let row = sqlx::query_as::<_, PropertyImage>(
                    "INSERT INTO property_images (property_id, image_url, alt_text, caption, is_primary) \
                     VALUES ($1,$2,$3,$4,FALSE) \
                     RETURNING id, property_id, image_url, alt_text, caption, is_primary, created_at",
                )
                .bind(property_id)
                .bind(&img.image_url)
                .bind(&img.alt_text)
                .bind(&img.caption)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| match e {
                    sqlx::Error::Database(db) if db.is_foreign_key_violation() => RepoError::NotFound,
                    other => internal(other),
                })?;
                created.push(row);
            }
            Ok(created)
        }

        async fn remove_property_images(&self, property_id: Uuid, urls: &[String]) -> RepoResult<u64> {
            let res = sqlx::query(
                "DELETE FROM property_images WHERE property_id = $1 AND image_url = ANY($2)",
            )
            .bind(property_id)
            .bind(urls)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(res.rows_affected())
        }

        async fn set_primary_image(&self, property_id: Uuid, url: &str) -> RepoResult<()> {
            // Check the target exists first; the flag flip below is one
            // atomic statement, so a missing URL mutates nothing.
            let matched: Option<(i64,)> = sqlx::query_as(
                "SELECT id FROM property_images WHERE property_id = $1 AND image_url = $2 LIMIT 1",
            )
            .bind(property_id)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;
            if matched.is_none() {
                return Err(RepoError::NotFound);
            }
            sqlx::query(
                "UPDATE property_images SET is_primary = (image_url = $2) \
                 WHERE property_id = $1",
            )
            .bind(property_id)
            .bind(url)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            Ok(())
        }

        async fn get_primary_image(&self, property_id: Uuid) -> RepoResult<Option<PropertyImage>> {
            sqlx::query_as::<_, PropertyImage>(
                "SELECT id, property_id, image_url, alt_text, caption, is_primary, created_at \
                 FROM property_images WHERE property_id = $1 AND is_primary LIMIT 1",
            )
            .bind(property_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)
        }
    }

    #[async_trait]
    impl InquiryRepo for PgRepo {
        async fn create_inquiry(&self, new: NewInquiry) -> RepoResult<ContactInquiry> {
            sqlx::query_as::<_, ContactInquiry>(
                "INSERT INTO contact_inquiries (property_id, name, email, message) \
                 VALUES ($1,$2,$3,$4) \
                 RETURNING id, property_id, name, email, message, created_at",
            )
            .bind(new.property_id)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.message)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn list_inquiries(&self) -> RepoResult<Vec<ContactInquiry>> {
            sqlx::query_as::<_, ContactInquiry>(
                "SELECT id, property_id, name, email, message, created_at \
                 FROM contact_inquiries ORDER BY created_at DESC, id DESC",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(internal)
        }
    }

    #[async_trait]
    impl ProfileRepo for PgRepo {
        async fn get_profile(&self, user_id: &str) -> RepoResult<UserProfile> {
            sqlx::query_as::<_, UserProfile>(
                "SELECT id, email, role, full_name, created_at, updated_at \
                 FROM user_profiles WHERE id = $1",
            )
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(internal)
        }

        async fn ensure_profile(&self, user_id: &str, email: &str) -> RepoResult<UserProfile> {
            sqlx::query(
                "INSERT INTO user_profiles (id, email, role) VALUES ($1,$2,$3) \
                 ON CONFLICT (id) DO NOTHING",
            )
            .bind(user_id)
            .bind(email)
            .bind(DEFAULT_ROLE)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            self.get_profile(user_id).await
        }

        async fn set_profile_role(&self, user_id: &str, role: &str) -> RepoResult<()> {
            let res = sqlx::query(
                "UPDATE user_profiles SET role = $2, updated_at = now() WHERE id = $1",
            )
            .bind(user_id)
            .bind(role)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }
}
