use axum::async_trait;
use tracing::info;

/// Outbound delivery of password-reset tokens. Mail/SMS transport lives
/// behind this seam; the ledger only cares whether delivery succeeded.
#[async_trait]
pub trait ResetNotifier: Send + Sync {
    async fn send_reset_token(&self, email: &str, token: &str) -> anyhow::Result<()>;
}

/// Dev transport: records the delivery in the log instead of sending mail.
#[derive(Clone)]
pub struct LogNotifier;

#[async_trait]
impl ResetNotifier for LogNotifier {
    async fn send_reset_token(&self, email: &str, token: &str) -> anyhow::Result<()> {
        info!(%email, "password reset token issued");
        tracing::debug!(%token, "reset token (log transport)");
        Ok(())
    }
}
