use std::sync::Arc;
use std::time::Duration;

use actix_multipart::Multipart;
use actix_web::{web, HttpRequest, HttpResponse};
use futures_util::TryStreamExt as _;
use uuid::Uuid;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::filters::RawFilters;
use crate::listing::ListingService;
use crate::models::*;
use crate::rate_limit::InMemoryRateLimiter;
use crate::repo::Repo;
use crate::storage::ImageStore;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/properties")
                    .route(web::get().to(list_properties))
                    .route(web::post().to(create_property)),
            )
            .service(web::resource("/properties/featured").route(web::get().to(featured_properties)))
            .service(web::resource("/properties/slug/{slug}").route(web::get().to(get_property_by_slug)))
            .service(
                web::resource("/properties/{id}")
                    .route(web::get().to(get_property))
                    .route(web::patch().to(update_property))
                    .route(web::delete().to(delete_property)),
            )
            .service(web::resource("/properties/{id}/related").route(web::get().to(related_properties)))
            .service(
                web::resource("/properties/{id}/images")
                    .route(web::get().to(list_property_images))
                    .route(web::post().to(upload_property_image))
                    .route(web::delete().to(remove_property_images)),
            )
            .service(
                web::resource("/properties/{id}/images/primary")
                    .route(web::put().to(set_primary_image)),
            )
            .service(
                web::resource("/properties/{id}/images/sync")
                    .route(web::post().to(sync_property_images)),
            )
            .service(
                web::resource("/inquiries")
                    .route(web::post().to(create_inquiry)),
            )
            .service(web::resource("/admin/inquiries").route(web::get().to(list_inquiries)))
            .service(web::resource("/admin/images/migrate").route(web::post().to(migrate_images)))
            .service(web::resource("/auth/me").route(web::get().to(auth_me))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub image_store: Arc<dyn ImageStore>,
    pub listings: ListingService,
    pub rate_limiter: InMemoryRateLimiter,
}

impl AppState {
    pub fn new(
        repo: Arc<dyn Repo>,
        image_store: Arc<dyn ImageStore>,
        rate_limiter: InMemoryRateLimiter,
    ) -> Self {
        let listings = ListingService::new(repo.clone(), image_store.clone());
        Self { repo, image_store, listings, rate_limiter }
    }
}

/// Admin gate: the profile record's role field decides, nothing else. The
/// profile is created lazily (non-privileged) on first authenticated touch.
async fn ensure_admin(data: &AppState, auth: &Auth) -> Result<UserProfile, ApiError> {
    let profile = data
        .repo
        .ensure_profile(&auth.0.sub, &auth.0.email)
        .await
        .map_err(|e| {
            log::error!("profile lookup failed for {}: {e}", auth.0.sub);
            ApiError::Internal
        })?;
    if profile.is_admin() {
        Ok(profile)
    } else {
        Err(ApiError::Forbidden)
    }
}

// ---------------- Public listing surface -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/properties",
    params(RawFilters),
    responses(
        (status = 200, description = "Filtered, sorted, paginated listing", body = PropertyPage)
    )
)]
pub async fn list_properties(
    data: web::Data<AppState>,
    query: web::Query<RawFilters>,
) -> Result<HttpResponse, ApiError> {
    let filters = query.into_inner().normalize();
    let page = data.listings.list(&filters).await;
    Ok(HttpResponse::Ok().json(page))
}

#[derive(Debug, serde::Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/properties/featured",
    responses((status = 200, description = "Featured properties", body = [Property]))
)]
pub async fn featured_properties(
    data: web::Data<AppState>,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(6);
    let properties = data.listings.get_featured(limit).await;
    Ok(HttpResponse::Ok().json(properties))
}

#[utoipa::path(
    get,
    path = "/api/v1/properties/{id}",
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 200, description = "Property", body = Property),
        (status = 404, description = "Property not found")
    )
)]
pub async fn get_property(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    match data.listings.get_by_id(path.into_inner()).await {
        Some(property) => Ok(HttpResponse::Ok().json(property)),
        None => Err(ApiError::NotFound),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/properties/slug/{slug}",
    params(("slug" = String, Path, description = "Property slug")),
    responses(
        (status = 200, description = "Property", body = Property),
        (status = 404, description = "Property not found")
    )
)]
pub async fn get_property_by_slug(
    data: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    match data.listings.get_by_slug(&path.into_inner()).await {
        Some(property) => Ok(HttpResponse::Ok().json(property)),
        None => Err(ApiError::NotFound),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/properties/{id}/related",
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 200, description = "Related properties (same location, backfilled)", body = [Property]),
        (status = 404, description = "Property not found")
    )
)]
pub async fn related_properties(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<LimitQuery>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let limit = query.limit.filter(|l| *l > 0).unwrap_or(4);
    let current = data.repo.get_property(id).await.map_err(|_| ApiError::NotFound)?;
    let related = data.listings.get_related(id, &current.location, limit).await;
    Ok(HttpResponse::Ok().json(related))
}

// ---------------- Admin property CRUD -----------------------

#[utoipa::path(
    post,
    path = "/api/v1/properties",
    request_body = NewProperty,
    responses(
        (status = 201, description = "Property created", body = Property),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden - Admins only"),
        (status = 409, description = "Slug conflict")
    )
)]
pub async fn create_property(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewProperty>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    // Reject before any store write is attempted.
    payload.validate().map_err(ApiError::BadRequest)?;
    let property = data.repo.create_property(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(property))
}

#[utoipa::path(
    patch,
    path = "/api/v1/properties/{id}",
    request_body = UpdateProperty,
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 200, description = "Property updated", body = Property),
        (status = 400, description = "Validation failed"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Property not found")
    )
)]
pub async fn update_property(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<UpdateProperty>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    payload.validate().map_err(ApiError::BadRequest)?;
    let property = data
        .repo
        .update_property(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(property))
}

#[utoipa::path(
    delete,
    path = "/api/v1/properties/{id}",
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 204, description = "Property deleted"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Property not found")
    )
)]
pub async fn delete_property(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    let id = path.into_inner();
    data.repo.delete_property(id).await?;
    // Blob cleanup is best-effort; the row (and its side-table cascade) is
    // already gone, orphaned objects only waste space.
    if let Err(e) = data.image_store.delete_all(id).await {
        log::warn!("blob cleanup failed for deleted property {id}: {e}");
    }
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- Image management -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/properties/{id}/images",
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 200, description = "Registered image rows", body = [PropertyImage]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_property_images(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    let rows = data.repo.list_property_images(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct ImageUploadResponse {
    pub url: String,
    pub image: PropertyImage,
}

const IMAGE_SIZE_LIMIT: usize = 10 * 1024 * 1024; // 10 MB

const ALLOWED_MIME: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '-' })
        .collect();
    if cleaned.trim_matches('-').is_empty() { "upload".into() } else { cleaned }
}

#[utoipa::path(
    post,
    path = "/api/v1/properties/{id}/images",
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 201, description = "Image stored and registered", body = ImageUploadResponse),
        (status = 404, description = "Property not found"),
        (status = 413, description = "Payload too large"),
        (status = 415, description = "Unsupported media type")
    )
)]
pub async fn upload_property_image(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    mut payload: Multipart,
) -> Result<HttpResponse, ApiError> {
    use actix_web::http::StatusCode;
    ensure_admin(&data, &auth).await?;
    let property_id = path.into_inner();
    // Property must exist before we touch blob storage.
    data.repo.get_property(property_id).await.map_err(|_| ApiError::NotFound)?;

    while let Some(field) = payload.try_next().await.map_err(|e| {
        log::error!("multipart error: {e}");
        ApiError::Internal
    })? {
        let Some(name) = field.content_disposition().get_name() else { continue };
        if name != "file" {
            continue;
        }
        let original_name = field
            .content_disposition()
            .get_filename()
            .map(sanitize_file_name)
            .unwrap_or_else(|| "upload".into());

        let mut field_stream = field;
        let mut bytes: Vec<u8> = Vec::new();
        while let Some(chunk) = field_stream.try_next().await.map_err(|e| {
            log::error!("stream read error: {e}");
            ApiError::Internal
        })? {
            if bytes.len() + chunk.len() > IMAGE_SIZE_LIMIT {
                return Ok(HttpResponse::build(StatusCode::PAYLOAD_TOO_LARGE).finish());
            }
            bytes.extend_from_slice(&chunk);
        }

        let mime = infer::get(&bytes)
            .map(|t| t.mime_type().to_string())
            .unwrap_or_else(|| "application/octet-stream".into());
        if !ALLOWED_MIME.contains(&mime.as_str()) {
            return Ok(HttpResponse::UnsupportedMediaType().finish());
        }

        // Timestamp prefix keeps repeated uploads of the same file distinct.
        let file_name = format!("{}-{}", chrono::Utc::now().timestamp_millis(), original_name);
        let url = data
            .image_store
            .save(property_id, &file_name, &bytes)
            .await
            .map_err(|e| {
                log::error!("image store save error: {e}");
                ApiError::Internal
            })?;

        let new_image = NewPropertyImage { image_url: url.clone(), alt_text: None, caption: None };
        let mut created = data
            .repo
            .add_property_images(property_id, std::slice::from_ref(&new_image))
            .await?;
        let image = created.pop().ok_or(ApiError::Internal)?;

        // Keep the cache column current; the read-time union covers us if
        // this step fails, so it is logged rather than surfaced.
        if let Err(e) = data.listings.sync_images(property_id).await {
            log::warn!("image cache sync failed for property {property_id}: {e}");
        }

        return Ok(HttpResponse::Created().json(ImageUploadResponse { url, image }));
    }
    Ok(HttpResponse::BadRequest().finish())
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct RemoveImagesRequest {
    pub urls: Vec<String>,
}

#[utoipa::path(
    delete,
    path = "/api/v1/properties/{id}/images",
    request_body = RemoveImagesRequest,
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 200, description = "Matching rows removed, cache resynced"),
        (status = 400, description = "Empty URL list"),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn remove_property_images(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<RemoveImagesRequest>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    let property_id = path.into_inner();
    if payload.urls.is_empty() {
        return Err(ApiError::BadRequest("urls must not be empty".into()));
    }
    let removed = data
        .repo
        .remove_property_images(property_id, &payload.urls)
        .await?;
    // Best-effort blob deletion for objects we manage. Runs before the cache
    // re-sync so a still-listed blob cannot resurrect a removed URL.
    for url in &payload.urls {
        if let Some(file_name) = url.rsplit('/').next() {
            if let Err(e) = data.image_store.delete(property_id, file_name).await {
                log::warn!("blob delete failed for {url}: {e}");
            }
        }
    }
    if let Err(e) = data.listings.sync_images(property_id).await {
        log::warn!("image cache sync failed for property {property_id}: {e}");
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({ "removed": removed })))
}

#[derive(Debug, serde::Deserialize, utoipa::ToSchema)]
pub struct SetPrimaryRequest {
    pub image_url: String,
}

#[utoipa::path(
    put,
    path = "/api/v1/properties/{id}/images/primary",
    request_body = SetPrimaryRequest,
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 200, description = "Primary image updated"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "No image row with that URL")
    )
)]
pub async fn set_primary_image(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    payload: web::Json<SetPrimaryRequest>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    data.repo
        .set_primary_image(path.into_inner(), &payload.image_url)
        .await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "status": "ok" })))
}

#[utoipa::path(
    post,
    path = "/api/v1/properties/{id}/images/sync",
    params(("id" = Uuid, Path, description = "Property id")),
    responses(
        (status = 200, description = "Canonical image list written to the cache column"),
        (status = 403, description = "Forbidden"),
        (status = 404, description = "Property not found")
    )
)]
pub async fn sync_property_images(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    let images = data.listings.sync_images(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "images": images })))
}

#[utoipa::path(
    post,
    path = "/api/v1/admin/images/migrate",
    responses(
        (status = 200, description = "Migration report", body = crate::listing::MigrationReport),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn migrate_images(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    let report = data.listings.migrate_images().await;
    Ok(HttpResponse::Ok().json(report))
}

// ---------------- Inquiries -----------------------

const INQUIRY_RATE_LIMIT: usize = 5;
const INQUIRY_RATE_WINDOW: Duration = Duration::from_secs(60);

#[utoipa::path(
    post,
    path = "/api/v1/inquiries",
    request_body = NewInquiry,
    responses(
        (status = 201, description = "Inquiry recorded", body = ContactInquiry),
        (status = 400, description = "Validation failed"),
        (status = 429, description = "Too many requests")
    )
)]
pub async fn create_inquiry(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<NewInquiry>,
) -> Result<HttpResponse, ApiError> {
    let client_ip = req
        .connection_info()
        .realip_remote_addr()
        .unwrap_or("unknown")
        .to_string();
    if !data
        .rate_limiter
        .check(&client_ip, INQUIRY_RATE_LIMIT, INQUIRY_RATE_WINDOW)
    {
        return Err(ApiError::TooManyRequests);
    }
    payload.validate().map_err(ApiError::BadRequest)?;
    let inquiry = data.repo.create_inquiry(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(inquiry))
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/inquiries",
    responses(
        (status = 200, description = "All inquiries, newest first", body = [ContactInquiry]),
        (status = 403, description = "Forbidden")
    )
)]
pub async fn list_inquiries(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    ensure_admin(&data, &auth).await?;
    let inquiries = data.repo.list_inquiries().await?;
    Ok(HttpResponse::Ok().json(inquiries))
}

// ---------------- Auth -----------------------

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user's profile", body = UserProfile),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth, data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    // First authenticated touch creates the profile with the default role.
    let profile = data
        .repo
        .ensure_profile(&auth.0.sub, &auth.0.email)
        .await
        .map_err(ApiError::from)?;
    Ok(HttpResponse::Ok().json(profile))
}
