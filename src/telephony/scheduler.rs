//! # Call Scheduler
//!
//! Background jobs that ring users. Each job runs on its own tokio task after
//! an optional delay; a batch staggers its jobs so the provider isn't asked to
//! dial everybody at once.
//!
//! ## Job flow:
//! 1. Mark the user `initiated`
//! 2. Load the user (unknown users end the job with a warning)
//! 3. Place the call with the user id in the answer webhook
//! 4. Store the provider's call id on the user

use crate::repository::{CallStatus, StatusUpdate, UserRepository};
use crate::telephony::client::{CallPlacer, CallbackParams};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallJob {
    CallUser { user_id: String },
}

#[derive(Clone)]
pub struct CallScheduler {
    repository: Arc<dyn UserRepository>,
    placer: Arc<dyn CallPlacer>,
}

impl CallScheduler {
    pub fn new(repository: Arc<dyn UserRepository>, placer: Arc<dyn CallPlacer>) -> Self {
        Self { repository, placer }
    }

    /// Run `job` after `delay` on a background task.
    pub fn enqueue(&self, job: CallJob, delay: Duration) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(err) = scheduler.run_job(&job).await {
                error!(?job, error = %err, "Call job failed");
            }
        })
    }

    /// Enqueue one call per user, the n-th one `delay + n * stagger` from now.
    ///
    /// Offsets saturate instead of overflowing; an absurd offset just never fires.
    pub fn enqueue_batch(
        &self,
        user_ids: Vec<String>,
        delay: Duration,
        stagger: Duration,
    ) -> Vec<JoinHandle<()>> {
        info!(count = user_ids.len(), ?delay, ?stagger, "Scheduling call batch");
        user_ids
            .into_iter()
            .enumerate()
            .map(|(index, user_id)| {
                let offset = batch_offset(delay, stagger, index);
                self.enqueue(CallJob::CallUser { user_id }, offset)
            })
            .collect()
    }

    /// Returns the call id, or `None` when the user doesn't exist.
    pub async fn run_job(&self, job: &CallJob) -> Result<Option<String>> {
        let CallJob::CallUser { user_id } = job;

        self.repository
            .update_status(user_id, StatusUpdate::status(CallStatus::Initiated))
            .await?;

        let Some(user) = self.repository.find_user(user_id).await? else {
            warn!(user_id = %user_id, "User not found, skipping call");
            return Ok(None);
        };

        let callback = CallbackParams {
            user_id: Some(user_id.clone()),
        };
        let call_sid = self.placer.place_call(&user.phone, callback).await?;

        self.repository
            .update_status(user_id, StatusUpdate::call_sid(call_sid.clone()))
            .await?;
        info!(user_id = %user_id, call_sid = %call_sid, "Call started for user");
        Ok(Some(call_sid))
    }
}

fn batch_offset(delay: Duration, stagger: Duration, index: usize) -> Duration {
    let index = u32::try_from(index).unwrap_or(u32::MAX);
    delay.saturating_add(stagger.saturating_mul(index))
}
