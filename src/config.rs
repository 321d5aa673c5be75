use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub s3_endpoint: String,
    pub s3_bucket: String,
    pub s3_access_key: String,
    pub s3_secret_key: String,
    pub mail_from: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "dealcart".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "dealcart-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        Ok(Self {
            database_url,
            jwt,
            s3_endpoint: std::env::var("S3_ENDPOINT")?,
            s3_bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "dealcart-images".into()),
            s3_access_key: std::env::var("S3_ACCESS_KEY")?,
            s3_secret_key: std::env::var("S3_SECRET_KEY")?,
            mail_from: std::env::var("MAIL_FROM")
                .unwrap_or_else(|_| "noreply@dealcart.local".into()),
        })
    }
}
