use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Numeric id used by side-table rows (images, inquiries).
pub type RowId = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Property {
    pub id: Uuid,
    pub title: String,
    pub price: f64,
    pub location: String,
    pub lot_size: i64,
    pub construction_size: Option<i64>,
    pub bedrooms: i32,
    pub bathrooms: i32,
    pub description: String,
    pub amenities: Vec<String>,
    /// Denormalized cache of the canonical image set; the side table and blob
    /// storage may run ahead of it until `sync_images` runs.
    pub images: Vec<String>,
    pub slug: String,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewProperty {
    pub title: String,
    pub price: f64,
    pub location: String,
    pub lot_size: i64,
    pub construction_size: Option<i64>,
    #[serde(default)]
    pub bedrooms: i32,
    #[serde(default)]
    pub bathrooms: i32,
    pub description: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub featured: bool,
}

impl NewProperty {
    /// Write-path validation; runs before any store mutation is attempted.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title is required".into());
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err("price must be a non-negative number".into());
        }
        if self.location.trim().is_empty() {
            return Err("location is required".into());
        }
        if self.lot_size <= 0 {
            return Err("lot_size must be positive".into());
        }
        if self.description.trim().is_empty() {
            return Err("description is required".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProperty {
    pub title: Option<String>,
    pub price: Option<f64>,
    pub location: Option<String>,
    pub lot_size: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub construction_size: Option<Option<i64>>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub description: Option<String>,
    pub amenities: Option<Vec<String>>,
    pub images: Option<Vec<String>>,
    pub featured: Option<bool>,
}

impl UpdateProperty {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err("title must not be blank".into());
            }
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err("price must be a non-negative number".into());
            }
        }
        if let Some(location) = &self.location {
            if location.trim().is_empty() {
                return Err("location must not be blank".into());
            }
        }
        if let Some(lot_size) = self.lot_size {
            if lot_size <= 0 {
                return Err("lot_size must be positive".into());
            }
        }
        if let Some(description) = &self.description {
            if description.trim().is_empty() {
                return Err("description must not be blank".into());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct PropertyImage {
    pub id: RowId,
    pub property_id: Uuid,
    pub image_url: String,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPropertyImage {
    pub image_url: String,
    pub alt_text: Option<String>,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ContactInquiry {
    pub id: RowId,
    pub property_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewInquiry {
    pub property_id: Option<Uuid>,
    pub name: String,
    pub email: String,
    pub message: String,
}

impl NewInquiry {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().len() < 2 {
            return Err("name must be at least 2 characters".into());
        }
        // Light-touch check; real address verification is the mail layer's problem.
        if !self.email.contains('@') || self.email.len() < 5 || self.email.len() > 255 {
            return Err("a valid email address is required".into());
        }
        if self.message.trim().len() < 10 {
            return Err("message must be at least 10 characters".into());
        }
        if self.message.len() > 2000 {
            return Err("message must be less than 2000 characters".into());
        }
        Ok(())
    }
}

/// Admin/staff record layered on top of the external identity provider's
/// user object. `id` equals the provider's subject claim.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    pub role: String,
    pub full_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const ADMIN_ROLE: &str = "admin";
pub const DEFAULT_ROLE: &str = "user";

impl UserProfile {
    /// The profile's role field is the single source of truth for admin
    /// access; token claims are only used to identify the subject.
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Listing result envelope: one page of rows plus count-derived page metadata.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PropertyPage {
    pub properties: Vec<Property>,
    pub total: i64,
    pub page: u32,
    pub total_pages: u32,
}

impl PropertyPage {
    pub fn empty(page: u32) -> Self {
        Self { properties: Vec::new(), total: 0, page, total_pages: 0 }
    }
}

/// Derive a URL-safe slug from a property title. Uniqueness is the
/// repository's job (it appends a numeric suffix on collision).
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true; // suppress leading dashes
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("property");
    }
    slug
}
