//! Destroys an expired service's data when its cleanup job fires.
//!
//! Every step is idempotent: deletes are scoped by service id and the
//! status flip is unconditional, so running the executor twice for the
//! same service converges on the same end state.

use crate::store::postgres::PgStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupOutcome {
    /// False when the job was stale (renewed since scheduling) or the
    /// service no longer exists.
    pub destroyed: bool,
    pub messages_deleted: u64,
    pub records_deleted: u64,
}

/// Purge messages and records for `service_id` and mark it destroyed.
///
/// `epoch` is the value of `cleanup_epoch` the job was scheduled under.
/// A renewal bumps the row's epoch, so a job that fires after the service
/// was renewed sees a mismatch and no-ops; this closes the race between
/// an old job firing and the scheduler cancelling it.
pub async fn run_cleanup(
    store: &PgStore,
    service_id: i64,
    epoch: i64,
) -> anyhow::Result<CleanupOutcome> {
    let Some(service) = store.get_service(service_id).await? else {
        tracing::debug!(service_id, "cleanup: service no longer exists");
        return Ok(CleanupOutcome::default());
    };

    if service.cleanup_epoch != epoch {
        tracing::debug!(
            service_id,
            job_epoch = epoch,
            current_epoch = service.cleanup_epoch,
            "cleanup: stale job, service was renewed"
        );
        return Ok(CleanupOutcome::default());
    }

    let messages_deleted = store.delete_messages(service_id).await?;
    let records_deleted = store.delete_records(service_id).await?;
    store.mark_destroyed(service_id).await?;

    tracing::info!(
        service_id,
        messages_deleted,
        records_deleted,
        "service destroyed"
    );

    Ok(CleanupOutcome {
        destroyed: true,
        messages_deleted,
        records_deleted,
    })
}
