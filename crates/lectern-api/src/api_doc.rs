//! OpenAPI documentation, served at `/api/openapi.json` and rendered by RapiDoc at `/docs`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error;
use crate::handlers;
use lectern_core::models;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Lectern API",
        version = "0.1.0",
        description = "Chunked media uploads with per-institution storage quotas. Clients upload parts directly to object storage through presigned URLs; the API reserves, commits and releases quota around each upload."
    ),
    paths(
        // Uploads
        handlers::uploads::initiate_upload,
        handlers::uploads::complete_upload,
        handlers::uploads::cancel_upload,
        handlers::uploads::get_upload_session,
        handlers::uploads::refresh_part_urls,
        // Media
        handlers::media::list_media,
        handlers::media::get_media,
        handlers::media::get_media_access,
        handlers::media::delete_media,
        // Quota
        handlers::quota::get_quota,
        // Admin
        handlers::admin::set_institution_quota,
        handlers::admin::preview_media,
    ),
    components(
        schemas(
            error::ErrorResponse,
            error::QuotaErrorDetails,
            models::MediaType,
            models::MediaAssetStatus,
            models::MediaAsset,
            models::MediaPage,
            models::MediaAccessResponse,
            models::QuotaType,
            models::QuotaUsage,
            models::InstitutionQuota,
            models::SetQuotaRequest,
            models::UploadStatus,
            models::UploadSession,
            models::CompletedPart,
            models::InitiateUploadRequest,
            models::InitiateUploadResponse,
            models::CompleteUploadRequest,
            models::RefreshPartUrlsRequest,
            models::RefreshPartUrlsResponse,
            models::PresignedPart,
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "uploads", description = "Chunked upload sessions"),
        (name = "media", description = "Finalized media assets"),
        (name = "quota", description = "Institution storage quota"),
        (name = "admin", description = "Platform administration")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_lists_every_route() {
        let spec = get_openapi_spec();
        for path in [
            "/api/media/initiate-upload",
            "/api/media/{id}/complete",
            "/api/media/{id}/cancel",
            "/api/media/uploads/{id}/parts",
            "/api/media/quota",
            "/api/admin/institutions/{institutionId}/quota",
        ] {
            assert!(spec.paths.paths.contains_key(path), "missing {}", path);
        }
        assert!(spec
            .components
            .as_ref()
            .is_some_and(|c| c.security_schemes.contains_key("bearer_auth")));
    }
}
