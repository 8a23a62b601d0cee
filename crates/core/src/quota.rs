//! Per-participant ticket caps.

/// A purchase would push a participant over the raffle's per-user cap.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Quota exceeded: participant holds {held}, requested {requested}, limit {limit}")]
pub struct QuotaExceeded {
    pub held: i64,
    pub requested: i32,
    pub limit: i32,
}

/// Check `requested` more numbers against `max_tickets_per_user`.
///
/// No cap means no limit. Purchases are never truncated to fit: the whole
/// request either fits or is refused.
pub fn check_quota(
    max_tickets_per_user: Option<i32>,
    held: i64,
    requested: i32,
) -> Result<(), QuotaExceeded> {
    let Some(limit) = max_tickets_per_user else {
        return Ok(());
    };
    if held + i64::from(requested) > i64::from(limit) {
        return Err(QuotaExceeded {
            held,
            requested,
            limit,
        });
    }
    Ok(())
}
