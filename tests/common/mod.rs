#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

use nicoya::filters::ListingFilters;
use nicoya::models::{
    ContactInquiry, NewInquiry, NewProperty, NewPropertyImage, Property, PropertyImage,
    UserProfile,
};
use nicoya::repo::{
    InquiryRepo, ProfileRepo, PropertyImageRepo, PropertyRepo, RepoError, RepoResult,
};
use nicoya::storage::{ImageStore, ImageStoreError};

/// Test double for blob storage: per-property URL lists held in memory,
/// with an optional per-property failure switch.
#[derive(Default)]
pub struct MockImageStore {
    objects: Mutex<HashMap<Uuid, Vec<String>>>,
    failing: Mutex<HashSet<Uuid>>,
}

impl MockImageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_objects(&self, property_id: Uuid, names: &[&str]) {
        let urls = names
            .iter()
            .map(|n| self.public_url(property_id, n))
            .collect();
        self.objects.lock().unwrap().insert(property_id, urls);
    }

    pub fn fail_for(&self, property_id: Uuid) {
        self.failing.lock().unwrap().insert(property_id);
    }
}

#[async_trait]
impl ImageStore for MockImageStore {
    async fn list_urls(&self, property_id: Uuid) -> Result<Vec<String>, ImageStoreError> {
        if self.failing.lock().unwrap().contains(&property_id) {
            return Err(ImageStoreError::Other("simulated outage".into()));
        }
        Ok(self
            .objects
            .lock()
            .unwrap()
            .get(&property_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, property_id: Uuid, file_name: &str, _bytes: &[u8]) -> Result<String, ImageStoreError> {
        let url = self.public_url(property_id, file_name);
        self.objects
            .lock()
            .unwrap()
            .entry(property_id)
            .or_default()
            .push(url.clone());
        Ok(url)
    }

    async fn delete(&self, property_id: Uuid, file_name: &str) -> Result<(), ImageStoreError> {
        let url = self.public_url(property_id, file_name);
        if let Some(urls) = self.objects.lock().unwrap().get_mut(&property_id) {
            urls.retain(|u| *u != url);
        }
        Ok(())
    }

    async fn delete_all(&self, property_id: Uuid) -> Result<(), ImageStoreError> {
        self.objects.lock().unwrap().remove(&property_id);
        Ok(())
    }

    fn public_url(&self, property_id: Uuid, file_name: &str) -> String {
        format!("https://cdn.test/property-images/{property_id}/{file_name}")
    }
}

/// Repository double where every call fails, for the read-path degradation
/// contract (list pages render empty, lookups come back `None`).
pub struct FailingRepo;

fn down<T>() -> RepoResult<T> {
    Err(RepoError::Internal("database unavailable".into()))
}

#[async_trait]
impl PropertyRepo for FailingRepo {
    async fn search_properties(&self, _filters: &ListingFilters) -> RepoResult<(Vec<Property>, i64)> {
        down()
    }
    async fn get_property(&self, _id: Uuid) -> RepoResult<Property> {
        down()
    }
    async fn get_property_by_slug(&self, _slug: &str) -> RepoResult<Property> {
        down()
    }
    async fn related_properties(&self, _exclude: Uuid, _location: &str, _limit: i64) -> RepoResult<Vec<Property>> {
        down()
    }
    async fn recent_properties(&self, _exclude: &[Uuid], _limit: i64) -> RepoResult<Vec<Property>> {
        down()
    }
    async fn create_property(&self, _new: NewProperty) -> RepoResult<Property> {
        down()
    }
    async fn update_property(&self, _id: Uuid, _upd: nicoya::models::UpdateProperty) -> RepoResult<Property> {
        down()
    }
    async fn delete_property(&self, _id: Uuid) -> RepoResult<()> {
        down()
    }
    async fn set_property_images(&self, _id: Uuid, _urls: &[String]) -> RepoResult<()> {
        down()
    }
    async fn cached_image_refs(&self) -> RepoResult<Vec<(Uuid, Vec<String>)>> {
        down()
    }
}

#[async_trait]
impl PropertyImageRepo for FailingRepo {
    async fn list_property_images(&self, _property_id: Uuid) -> RepoResult<Vec<PropertyImage>> {
        down()
    }
    async fn add_property_images(&self, _property_id: Uuid, _images: &[NewPropertyImage]) -> RepoResult<Vec<PropertyImage>> {
        down()
    }
    async fn remove_property_images(&self, _property_id: Uuid, _urls: &[String]) -> RepoResult<u64> {
        down()
    }
    async fn set_primary_image(&self, _property_id: Uuid, _url: &str) -> RepoResult<()> {
        down()
    }
    async fn get_primary_image(&self, _property_id: Uuid) -> RepoResult<Option<PropertyImage>> {
        down()
    }
}

#[async_trait]
impl InquiryRepo for FailingRepo {
    async fn create_inquiry(&self, _new: NewInquiry) -> RepoResult<ContactInquiry> {
        down()
    }
    async fn list_inquiries(&self) -> RepoResult<Vec<ContactInquiry>> {
        down()
    }
}

#[async_trait]
impl ProfileRepo for FailingRepo {
    async fn get_profile(&self, _user_id: &str) -> RepoResult<UserProfile> {
        down()
    }
    async fn ensure_profile(&self, _user_id: &str, _email: &str) -> RepoResult<UserProfile> {
        down()
    }
    async fn set_profile_role(&self, _user_id: &str, _role: &str) -> RepoResult<()> {
        down()
    }
}

/// Minimal valid property payload; tweak fields per test.
pub fn sample_property(title: &str, location: &str, price: f64, bedrooms: i32) -> NewProperty {
    NewProperty {
        title: title.into(),
        price,
        location: location.into(),
        lot_size: 1000,
        construction_size: None,
        bedrooms,
        bathrooms: bedrooms.max(1),
        description: format!("{title} in {location}"),
        amenities: vec![],
        images: vec![],
        featured: false,
    }
}
