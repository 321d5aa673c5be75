use axum::async_trait;
use tracing::info;

/// Templated-email sender. Delivery is an external concern; the default
/// implementation emits structured log events that a shipper can pick up.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_verification_email(&self, to: &str, token: &str) -> anyhow::Result<()>;
    async fn send_coupon_email(&self, to: &str, code: &str) -> anyhow::Result<()>;
}

pub struct LogMailer {
    pub from: String,
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_verification_email(&self, to: &str, token: &str) -> anyhow::Result<()> {
        info!(from = %self.from, %to, %token, "verification email");
        Ok(())
    }

    async fn send_coupon_email(&self, to: &str, code: &str) -> anyhow::Result<()> {
        info!(from = %self.from, %to, %code, "coupon email");
        Ok(())
    }
}
