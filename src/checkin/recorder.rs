//! Visit recording collaborator
//!
//! The pipeline hands each classified customer reference to a
//! [`VisitRecorder`] exactly once. De-duplicating rapid repeat scans of the
//! same physical code is the recorder's job.

use async_trait::async_trait;
use tracing::info;

use super::types::VisitOutcome;
use crate::error::ResolveError;

/// Resolves a customer reference and records a visit for it
#[async_trait]
pub trait VisitRecorder: Send + Sync {
    /// Recorder identifier for logs
    fn name(&self) -> &'static str;

    async fn resolve_and_record_visit(&self, customer_ref: &str) -> Result<VisitOutcome, ResolveError>;
}

/// Dry-run recorder: logs the reference and reports success
#[derive(Debug, Default, Clone, Copy)]
pub struct LogVisitRecorder;

#[async_trait]
impl VisitRecorder for LogVisitRecorder {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn resolve_and_record_visit(&self, customer_ref: &str) -> Result<VisitOutcome, ResolveError> {
        info!("Check-in recorded (dry run) for customer {}", customer_ref);
        Ok(VisitOutcome::new(customer_ref))
    }
}
