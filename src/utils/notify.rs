// src/utils/notify.rs

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::AppError;

/// Everything the delivery side needs to produce a certificate message.
#[derive(Debug, Clone)]
pub struct CertificateNotice {
    pub recipient_email: String,
    pub recipient_name: Option<String>,
    pub step: &'static str,
    pub level: &'static str,
    pub examiner_name: Option<String>,
}

/// Outbound notification seam. The core decides WHEN to notify; delivery
/// (SMTP, queue, ...) lives behind this trait.
#[async_trait]
pub trait CertificateNotifier: Send + Sync {
    async fn send_certificate(&self, notice: CertificateNotice) -> Result<(), AppError>;
}

pub type Notifier = Arc<dyn CertificateNotifier>;

/// Default notifier: records the notice in the application log.
pub struct LogNotifier;

#[async_trait]
impl CertificateNotifier for LogNotifier {
    async fn send_certificate(&self, notice: CertificateNotice) -> Result<(), AppError> {
        tracing::info!(
            recipient = %notice.recipient_email,
            step = notice.step,
            level = notice.level,
            "Certificate notification dispatched"
        );
        Ok(())
    }
}
