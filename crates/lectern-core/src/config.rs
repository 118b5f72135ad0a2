//! Configuration module
//!
//! Environment-driven configuration for the API server, the upload coordinator and the
//! expiry sweeper. `.env` files are honoured through `dotenvy`.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::models::MediaType;

const MB: u64 = 1024 * 1024;

// Common constants
const SERVER_PORT: u16 = 3000;
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const MAX_VIDEO_SIZE_MB: u64 = 2048;
const MAX_DOCUMENT_SIZE_MB: u64 = 100;
const MAX_IMAGE_SIZE_MB: u64 = 20;
const MAX_AUDIO_SIZE_MB: u64 = 200;
const UPLOAD_PART_SIZE_MB: u64 = 8;
const UPLOAD_SESSION_TTL_MINUTES: i64 = 24 * 60;
const PRESIGNED_URL_EXPIRY_MINUTES: u64 = 60;
const OBJECT_STORE_TIMEOUT_SECS: u64 = 30;
const OBJECT_STORE_MAX_RETRIES: u32 = 3;
const OBJECT_STORE_RETRY_BASE_DELAY_MS: u64 = 200;
const SWEEP_INTERVAL_SECS: u64 = 300;
const SWEEP_BATCH_SIZE: i64 = 100;
const DEFAULT_VIDEO_QUOTA_MB: u64 = 10 * 1024;
const DEFAULT_DOCUMENT_QUOTA_MB: u64 = 2 * 1024;
const DEFAULT_TOTAL_QUOTA_MB: u64 = 15 * 1024;

/// Base configuration: server, database, auth
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub server_port: u16,
    pub environment: String,
    pub cors_origins: Vec<String>,
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub jwt_secret: String,
    pub log_format: String,
}

/// Object store connection settings
#[derive(Clone, Debug)]
pub struct ObjectStoreConfig {
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for S3-compatible providers (MinIO, DigitalOcean Spaces, etc.)
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
}

/// Upload, quota and sweeper settings
#[derive(Clone, Debug)]
pub struct UploadConfig {
    pub max_video_size_bytes: u64,
    pub max_document_size_bytes: u64,
    pub max_image_size_bytes: u64,
    pub max_audio_size_bytes: u64,
    pub part_size_bytes: u64,
    pub session_ttl_minutes: i64,
    pub presigned_url_expiry_minutes: u64,
    pub sweep_interval_seconds: u64,
    pub sweep_batch_size: i64,
    pub default_video_quota_bytes: i64,
    pub default_document_quota_bytes: i64,
    pub default_total_quota_bytes: i64,
}

impl UploadConfig {
    pub fn max_size_for(&self, media_type: MediaType) -> u64 {
        match media_type {
            MediaType::Video => self.max_video_size_bytes,
            MediaType::Document => self.max_document_size_bytes,
            MediaType::Image => self.max_image_size_bytes,
            MediaType::Audio => self.max_audio_size_bytes,
        }
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_ttl_minutes)
    }

    pub fn presigned_url_expiry(&self) -> Duration {
        Duration::from_secs(self.presigned_url_expiry_minutes * 60)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_video_size_bytes: MAX_VIDEO_SIZE_MB * MB,
            max_document_size_bytes: MAX_DOCUMENT_SIZE_MB * MB,
            max_image_size_bytes: MAX_IMAGE_SIZE_MB * MB,
            max_audio_size_bytes: MAX_AUDIO_SIZE_MB * MB,
            part_size_bytes: UPLOAD_PART_SIZE_MB * MB,
            session_ttl_minutes: UPLOAD_SESSION_TTL_MINUTES,
            presigned_url_expiry_minutes: PRESIGNED_URL_EXPIRY_MINUTES,
            sweep_interval_seconds: SWEEP_INTERVAL_SECS,
            sweep_batch_size: SWEEP_BATCH_SIZE,
            default_video_quota_bytes: (DEFAULT_VIDEO_QUOTA_MB * MB) as i64,
            default_document_quota_bytes: (DEFAULT_DOCUMENT_QUOTA_MB * MB) as i64,
            default_total_quota_bytes: (DEFAULT_TOTAL_QUOTA_MB * MB) as i64,
        }
    }
}

/// Full application configuration
#[derive(Clone, Debug)]
pub struct LecternConfig {
    pub base: BaseConfig,
    pub object_store: ObjectStoreConfig,
    pub upload: UploadConfig,
}

/// Application configuration.
#[derive(Clone, Debug)]
pub struct Config(pub Box<LecternConfig>);

impl Config {
    fn inner(&self) -> &LecternConfig {
        &self.0
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        let config = LecternConfig::from_env()?;
        Ok(Config(Box::new(config)))
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        self.inner().validate()
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.inner().base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn environment(&self) -> &str {
        &self.inner().base.environment
    }

    pub fn server_port(&self) -> u16 {
        self.inner().base.server_port
    }

    pub fn cors_origins(&self) -> &[String] {
        &self.inner().base.cors_origins
    }

    pub fn database_url(&self) -> &str {
        &self.inner().base.database_url
    }

    pub fn db_max_connections(&self) -> u32 {
        self.inner().base.db_max_connections
    }

    pub fn db_timeout_seconds(&self) -> u64 {
        self.inner().base.db_timeout_seconds
    }

    pub fn jwt_secret(&self) -> &str {
        &self.inner().base.jwt_secret
    }

    pub fn log_format(&self) -> &str {
        &self.inner().base.log_format
    }

    pub fn object_store(&self) -> &ObjectStoreConfig {
        &self.inner().object_store
    }

    pub fn upload(&self) -> &UploadConfig {
        &self.inner().upload
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

impl LecternConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let environment = env::var("ENVIRONMENT")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string());

        let cors_origins_str = env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".to_string());
        let is_production =
            environment.to_lowercase() == "production" || environment.to_lowercase() == "prod";
        if is_production && cors_origins_str.trim() == "*" {
            return Err(anyhow::anyhow!(
                "CORS_ORIGINS cannot be '*' in production. Please specify explicit origins."
            ));
        }
        let cors_origins: Vec<String> = cors_origins_str
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;
        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;

        let base = BaseConfig {
            server_port: env_or("SERVER_PORT", SERVER_PORT),
            environment,
            cors_origins,
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", MAX_CONNECTIONS),
            db_timeout_seconds: env_or("DB_TIMEOUT_SECONDS", CONNECTION_TIMEOUT_SECS),
            jwt_secret,
            log_format: env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string()),
        };

        let bucket = env::var("S3_BUCKET")
            .map_err(|_| anyhow::anyhow!("S3_BUCKET environment variable not set"))?;
        let region = env::var("S3_REGION")
            .or_else(|_| env::var("AWS_REGION"))
            .unwrap_or_else(|_| "us-east-1".to_string());

        let object_store = ObjectStoreConfig {
            bucket,
            region,
            endpoint: env::var("S3_ENDPOINT").ok().filter(|s| !s.trim().is_empty()),
            timeout_seconds: env_or("OBJECT_STORE_TIMEOUT_SECONDS", OBJECT_STORE_TIMEOUT_SECS),
            max_retries: env_or("OBJECT_STORE_MAX_RETRIES", OBJECT_STORE_MAX_RETRIES),
            retry_base_delay_ms: env_or(
                "OBJECT_STORE_RETRY_BASE_DELAY_MS",
                OBJECT_STORE_RETRY_BASE_DELAY_MS,
            ),
        };

        let upload = UploadConfig {
            max_video_size_bytes: env_or("MAX_VIDEO_SIZE_MB", MAX_VIDEO_SIZE_MB) * MB,
            max_document_size_bytes: env_or("MAX_DOCUMENT_SIZE_MB", MAX_DOCUMENT_SIZE_MB) * MB,
            max_image_size_bytes: env_or("MAX_IMAGE_SIZE_MB", MAX_IMAGE_SIZE_MB) * MB,
            max_audio_size_bytes: env_or("MAX_AUDIO_SIZE_MB", MAX_AUDIO_SIZE_MB) * MB,
            part_size_bytes: env_or("UPLOAD_PART_SIZE_MB", UPLOAD_PART_SIZE_MB) * MB,
            session_ttl_minutes: env_or("UPLOAD_SESSION_TTL_MINUTES", UPLOAD_SESSION_TTL_MINUTES),
            presigned_url_expiry_minutes: env_or(
                "PRESIGNED_URL_EXPIRY_MINUTES",
                PRESIGNED_URL_EXPIRY_MINUTES,
            ),
            sweep_interval_seconds: env_or("SWEEP_INTERVAL_SECONDS", SWEEP_INTERVAL_SECS),
            sweep_batch_size: env_or("SWEEP_BATCH_SIZE", SWEEP_BATCH_SIZE),
            default_video_quota_bytes: (env_or("DEFAULT_VIDEO_QUOTA_MB", DEFAULT_VIDEO_QUOTA_MB)
                * MB) as i64,
            default_document_quota_bytes: (env_or(
                "DEFAULT_DOCUMENT_QUOTA_MB",
                DEFAULT_DOCUMENT_QUOTA_MB,
            ) * MB) as i64,
            default_total_quota_bytes: (env_or("DEFAULT_TOTAL_QUOTA_MB", DEFAULT_TOTAL_QUOTA_MB)
                * MB) as i64,
        };

        Ok(LecternConfig {
            base,
            object_store,
            upload,
        })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.base.jwt_secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters long"
            ));
        }

        if !self.base.database_url.starts_with("postgres://")
            && !self.base.database_url.starts_with("postgresql://")
        {
            return Err(anyhow::anyhow!(
                "DATABASE_URL must be a valid PostgreSQL connection string"
            ));
        }

        if self.upload.part_size_bytes < 5 * MB {
            return Err(anyhow::anyhow!(
                "UPLOAD_PART_SIZE_MB must be at least 5 (object store minimum part size)"
            ));
        }

        if self.upload.session_ttl_minutes <= 0 {
            return Err(anyhow::anyhow!(
                "UPLOAD_SESSION_TTL_MINUTES must be positive"
            ));
        }

        if self.upload.presigned_url_expiry_minutes == 0
            || self.upload.presigned_url_expiry_minutes > 7 * 24 * 60
        {
            return Err(anyhow::anyhow!(
                "PRESIGNED_URL_EXPIRY_MINUTES must be between 1 and 10080"
            ));
        }

        if self.upload.sweep_interval_seconds == 0 || self.upload.sweep_batch_size <= 0 {
            return Err(anyhow::anyhow!(
                "SWEEP_INTERVAL_SECONDS and SWEEP_BATCH_SIZE must be positive"
            ));
        }

        if self.upload.default_total_quota_bytes < self.upload.default_video_quota_bytes
            || self.upload.default_total_quota_bytes < self.upload.default_document_quota_bytes
        {
            tracing::warn!(
                "DEFAULT_TOTAL_QUOTA_MB is smaller than a typed default; TOTAL will be the binding limit"
            );
        }

        if self.object_store.timeout_seconds == 0 {
            return Err(anyhow::anyhow!(
                "OBJECT_STORE_TIMEOUT_SECONDS must be positive"
            ));
        }

        Ok(())
    }
}
