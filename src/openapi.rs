use crate::listing::MigrationReport;
use crate::models::{
    ContactInquiry, NewInquiry, NewProperty, Property, PropertyImage, PropertyPage,
    UpdateProperty, UserProfile,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_properties,
        crate::routes::featured_properties,
        crate::routes::get_property,
        crate::routes::get_property_by_slug,
        crate::routes::related_properties,
        crate::routes::create_property,
        crate::routes::update_property,
        crate::routes::delete_property,
        crate::routes::list_property_images,
        crate::routes::upload_property_image,
        crate::routes::remove_property_images,
        crate::routes::set_primary_image,
        crate::routes::sync_property_images,
        crate::routes::migrate_images,
        crate::routes::create_inquiry,
        crate::routes::list_inquiries,
        crate::routes::auth_me,
    ),
    components(schemas(
        Property, NewProperty, UpdateProperty, PropertyPage, PropertyImage,
        ContactInquiry, NewInquiry, UserProfile, MigrationReport,
        crate::routes::ImageUploadResponse,
        crate::routes::RemoveImagesRequest, crate::routes::SetPrimaryRequest
    )),
    tags(
        (name = "properties", description = "Listing search and property CRUD"),
        (name = "images", description = "Property image management"),
        (name = "inquiries", description = "Visitor contact inquiries"),
    )
)]
pub struct ApiDoc;
