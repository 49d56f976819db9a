//! Quota-gated execution of actions

use std::future::Future;

use scribe_db::{SubscriptionRepository, UsageRepository};
use scribe_types::{Feature, UserId};
use thiserror::Error;
use tracing::{error, warn};

use crate::{QuotaError, UsageRecorder};

/// Failure of a gated action
#[derive(Error, Debug)]
pub enum GateError<E> {
    /// Quota could not be reserved; the action did not run
    #[error(transparent)]
    Quota(#[from] QuotaError),

    /// The action ran and failed; its quota was returned
    #[error("gated action failed: {0}")]
    Action(E),
}

/// Runs actions under a per-user quota.
///
/// The unit is reserved before the action starts, so concurrent callers
/// can never overrun the limit. A failed action gets its unit back.
pub struct QuotaGate<S: SubscriptionRepository, U: UsageRepository> {
    recorder: UsageRecorder<S, U>,
}

impl<S: SubscriptionRepository, U: UsageRepository> QuotaGate<S, U> {
    pub fn new(recorder: UsageRecorder<S, U>) -> Self {
        Self { recorder }
    }

    /// Reserve, run `action`, then commit or release
    pub async fn run<T, E, F, Fut>(
        &self,
        user_id: &UserId,
        feature: Feature,
        action: F,
    ) -> Result<T, GateError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let reservation = self.recorder.reserve(user_id, feature).await?;

        match action().await {
            Ok(value) => {
                // The action already happened; a lost total is logged, not surfaced.
                if let Err(err) = self.recorder.commit(&reservation).await {
                    error!(user_id = %user_id, feature = %feature, error = %err, "Failed to commit reservation");
                }
                Ok(value)
            }
            Err(err) => {
                if let Err(release_err) = self.recorder.release(&reservation).await {
                    warn!(user_id = %user_id, feature = %feature, error = %release_err, "Failed to release reservation");
                }
                Err(GateError::Action(err))
            }
        }
    }
}

impl<S: SubscriptionRepository, U: UsageRepository> Clone for QuotaGate<S, U> {
    fn clone(&self) -> Self {
        Self {
            recorder: self.recorder.clone(),
        }
    }
}

impl<S: SubscriptionRepository, U: UsageRepository> std::fmt::Debug for QuotaGate<S, U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaGate").finish()
    }
}
