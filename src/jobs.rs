use std::sync::Arc;

use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::repo::{Role, User};
use crate::coupons;
use crate::mailer::Mailer;
use crate::storage::StorageClient;

/// Deferred side effects. Everything here runs off the request path so a
/// slow mailer or blob store never adds to request latency.
#[derive(Debug, Clone)]
pub enum Job {
    SendVerificationEmail { user_id: Uuid },
    SendCouponEmail { coupon_id: Uuid },
    PurgeBlob { s3_key: String },
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Job>,
}

impl JobQueue {
    /// Spawn the worker and return the enqueue handle.
    pub fn start(db: PgPool, mailer: Arc<dyn Mailer>, storage: Arc<dyn StorageClient>) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if let Err(e) = run_job(&db, mailer.as_ref(), storage.as_ref(), &job).await {
                    warn!(error = %e, ?job, "background job failed");
                }
            }
        });
        Self { tx }
    }

    /// A queue with no worker. For tests; enqueued jobs are retained in the
    /// channel and never executed. Usable outside a tokio runtime.
    pub fn detached() -> Self {
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        std::mem::forget(rx);
        Self { tx }
    }

    pub fn enqueue(&self, job: Job) {
        if self.tx.send(job).is_err() {
            warn!("job queue worker is gone; job dropped");
        }
    }
}

async fn run_job(
    db: &PgPool,
    mailer: &dyn Mailer,
    storage: &dyn StorageClient,
    job: &Job,
) -> anyhow::Result<()> {
    match job {
        Job::SendVerificationEmail { user_id } => {
            let Some(user) = User::find_by_id(db, *user_id).await? else {
                warn!(%user_id, "verification email for unknown user");
                return Ok(());
            };
            // Admins are provisioned verified; only customers get the email.
            if user.role != Role::Customer {
                return Ok(());
            }
            let Some(token) = user.verification_token.as_deref() else {
                debug!(%user_id, "user already verified");
                return Ok(());
            };
            mailer.send_verification_email(&user.email, token).await
        }
        Job::SendCouponEmail { coupon_id } => {
            let Some((email, code)) = coupons::repo::coupon_recipient(db, *coupon_id).await? else {
                warn!(%coupon_id, "coupon email without a purchaser");
                return Ok(());
            };
            mailer.send_coupon_email(&email, &code).await
        }
        Job::PurgeBlob { s3_key } => storage.delete_object(s3_key).await,
    }
}
