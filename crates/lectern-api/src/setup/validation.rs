//! Configuration validation
//!
//! Runs the config's own checks and warns about settings that are legal but risky.

use anyhow::Result;
use lectern_core::Config;

pub fn validate_config(config: &Config) -> Result<()> {
    config.validate()?;

    if config.is_production() && config.object_store().endpoint.is_some() {
        tracing::warn!(
            endpoint = ?config.object_store().endpoint,
            "Custom S3 endpoint configured in production"
        );
    }

    let upload = config.upload();
    if upload.presigned_url_expiry_minutes > upload.session_ttl_minutes as u64 {
        tracing::warn!(
            presigned_url_expiry_minutes = upload.presigned_url_expiry_minutes,
            session_ttl_minutes = upload.session_ttl_minutes,
            "Part URLs outlive the upload session; late parts will be aborted by the sweeper"
        );
    }

    Ok(())
}
