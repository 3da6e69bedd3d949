//! # Service Job Rules
//!
//! Pure rules of the service-job engine: which status transitions are legal,
//! how totals roll up from line items, how service codes look, and how a
//! queue reorder is validated before anything is written.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   queued ──────► working ──────► done ──────► picked_up                │
//! │     │  needs a      │   recompute     set          │                    │
//! │     │  technician   │   totals        picked_up_at │ within warranty   │
//! │     │               │                              ▼                    │
//! │     │               │                          complaint               │
//! │     │               │                          set complaint_at        │
//! │     ▼                                                                   │
//! │   (soft delete, queued only)                                           │
//! │                                                                         │
//! │   Every other pair, including X → X, is an invalid transition.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Totals
//! ```text
//!   grand_total           = Σ price × qty
//!   cost_total            = Σ cost × qty
//!   technician_commission = (Σ price × qty over service lines) × 10%
//!   shop_profit           = grand_total − cost_total − technician_commission
//! ```

use chrono::NaiveDate;
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{ItemKind, Rate, ServiceDetail, ServiceJobStatus, ServiceTotals};
use crate::validation::validate_id_list;
use crate::COMMISSION_RATE_BPS;

// =============================================================================
// Transitions
// =============================================================================

/// Facts about the job that transition preconditions depend on.
#[derive(Debug, Clone, Copy)]
pub struct TransitionContext {
    pub technician_id: Option<i64>,
    pub warranty_expires_on: Option<NaiveDate>,
    /// Today in the outlet's local calendar.
    pub local_today: NaiveDate,
}

/// Statuses reachable from `from` in one step.
pub fn allowed_targets(from: ServiceJobStatus) -> &'static [ServiceJobStatus] {
    use ServiceJobStatus::*;

    match from {
        Queued => &[Working],
        Working => &[Done],
        Done => &[PickedUp],
        PickedUp => &[Complaint],
        Complaint => &[],
    }
}

/// Checks that `from → to` is a legal transition and its precondition holds.
///
/// ## Errors
/// - [`CoreError::InvalidTransition`] when `to` is not reachable from `from`
/// - [`CoreError::InvalidState`] when the transition is legal but its
///   precondition fails (no technician, warranty expired)
pub fn check_transition(
    from: ServiceJobStatus,
    to: ServiceJobStatus,
    ctx: &TransitionContext,
) -> CoreResult<()> {
    if !allowed_targets(from).contains(&to) {
        return Err(CoreError::InvalidTransition {
            entity: "service job",
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    match to {
        ServiceJobStatus::Working if ctx.technician_id.is_none() => Err(CoreError::invalid_state(
            "a technician must be assigned before work starts",
        )),
        ServiceJobStatus::Complaint => match ctx.warranty_expires_on {
            Some(expiry) if ctx.local_today > expiry => Err(CoreError::invalid_state(format!(
                "warranty expired on {}",
                expiry
            ))),
            _ => Ok(()),
        },
        _ => Ok(()),
    }
}

/// Note stored on the history row of a transition.
pub fn history_note(notes: Option<&str>, to: ServiceJobStatus) -> String {
    match notes.map(str::trim) {
        Some(n) if !n.is_empty() => n.to_string(),
        _ => format!("status changed to {}", to),
    }
}

/// Formats the service code for the `seq`-th job of an outlet.
///
/// ```rust
/// use torque_core::service_job::service_code;
/// assert_eq!(service_code(3, 42), "SJ-3-000042");
/// ```
pub fn service_code(outlet_id: i64, seq: i64) -> String {
    format!("SJ-{}-{:06}", outlet_id, seq)
}

// =============================================================================
// Guards
// =============================================================================

/// Only queued jobs may be soft-deleted.
pub fn ensure_deletable(status: ServiceJobStatus) -> CoreResult<()> {
    if status != ServiceJobStatus::Queued {
        return Err(CoreError::Integrity(format!(
            "a {} service job cannot be deleted",
            status
        )));
    }
    Ok(())
}

/// Header fields and line items are frozen once the vehicle left.
pub fn ensure_editable(status: ServiceJobStatus) -> CoreResult<()> {
    if status.is_terminal() {
        return Err(CoreError::invalid_state(format!(
            "service job is {} and can no longer be edited",
            status
        )));
    }
    Ok(())
}

/// Clearing every line item at once is limited to jobs still in the queue.
pub fn ensure_details_clearable(status: ServiceJobStatus) -> CoreResult<()> {
    if !status.is_in_queue() {
        return Err(CoreError::invalid_state(format!(
            "details of a {} service job cannot be cleared",
            status
        )));
    }
    Ok(())
}

// =============================================================================
// Totals
// =============================================================================

/// The parts of a line item the totals calculator looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineItem {
    pub kind: ItemKind,
    pub quantity: i64,
    pub unit_price: Money,
    pub unit_cost: Money,
}

impl LineItem {
    pub fn new(kind: ItemKind, quantity: i64, unit_price: Money, unit_cost: Money) -> Self {
        LineItem {
            kind,
            quantity,
            unit_price,
            unit_cost,
        }
    }
}

impl From<&ServiceDetail> for LineItem {
    fn from(d: &ServiceDetail) -> Self {
        LineItem::new(d.item_kind, d.quantity, d.unit_price(), d.unit_cost())
    }
}

/// Rolls line items up into job totals.
///
/// Idempotent and side-effect free: the same lines always give the same totals.
pub fn compute_totals<I>(lines: I) -> ServiceTotals
where
    I: IntoIterator<Item = LineItem>,
{
    let mut grand_total = Money::zero();
    let mut cost_total = Money::zero();
    let mut labour_total = Money::zero();

    for line in lines {
        let revenue = line.unit_price * line.quantity;
        grand_total += revenue;
        cost_total += line.unit_cost * line.quantity;
        if line.kind == ItemKind::Service {
            labour_total += revenue;
        }
    }

    let technician_commission = labour_total.apply_rate(Rate::from_bps(COMMISSION_RATE_BPS));

    ServiceTotals {
        grand_total,
        cost_total,
        technician_commission,
        shop_profit: grand_total - cost_total - technician_commission,
    }
}

// =============================================================================
// Queue Reorder
// =============================================================================

/// A job as the reorder planner sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSlot {
    pub id: i64,
    pub outlet_id: i64,
    pub status: ServiceJobStatus,
    pub queue_date: NaiveDate,
    pub queue_number: i64,
}

/// Validates a reorder request and returns `(job id, new queue number)` pairs.
///
/// `found` holds the live jobs that matched the requested ids and `waiting`
/// holds every queued or working job of the outlet. The request must name
/// exactly the waiting jobs of one queue day. Those jobs hand out the numbers
/// they already hold, lowest first, in list order; finished jobs of the day
/// keep theirs, so the day still numbers `1..k` with no gaps or repeats.
///
/// ## Errors
/// - `not_found` for an id with no live job
/// - `invalid_state` for a job of another outlet or one that left the queue
/// - `invalid_input` for a duplicate id, a list spanning several days, or a
///   list that leaves out part of the day's queue
pub fn plan_reorder(
    outlet_id: i64,
    requested: &[i64],
    found: &[QueueSlot],
    waiting: &[QueueSlot],
) -> CoreResult<Vec<(i64, i64)>> {
    validate_id_list("ids", requested)?;

    let by_id: HashMap<i64, &QueueSlot> = found.iter().map(|s| (s.id, s)).collect();

    let mut queue_date = None;
    for id in requested {
        let slot = by_id
            .get(id)
            .ok_or_else(|| CoreError::not_found("service job", id))?;

        if slot.outlet_id != outlet_id {
            return Err(CoreError::invalid_state(format!(
                "service job {} is not queued at outlet {}",
                id, outlet_id
            )));
        }

        if !slot.status.is_in_queue() {
            return Err(CoreError::invalid_state(format!(
                "service job {} is {} and no longer in the queue",
                id, slot.status
            )));
        }

        match queue_date {
            None => queue_date = Some(slot.queue_date),
            Some(day) if day != slot.queue_date => {
                return Err(ValidationError::Invalid {
                    field: "ids".to_string(),
                    reason: format!(
                        "jobs from {} and {} cannot share one queue",
                        day, slot.queue_date
                    ),
                }
                .into());
            }
            Some(_) => {}
        }
    }

    let mut numbers: Vec<i64> = waiting
        .iter()
        .filter(|s| {
            s.outlet_id == outlet_id && Some(s.queue_date) == queue_date && s.status.is_in_queue()
        })
        .map(|s| s.queue_number)
        .collect();

    if numbers.len() != requested.len() {
        return Err(ValidationError::Invalid {
            field: "ids".to_string(),
            reason: format!(
                "the queue holds {} waiting jobs for that day but {} were listed",
                numbers.len(),
                requested.len()
            ),
        }
        .into());
    }

    numbers.sort_unstable();
    Ok(requested.iter().copied().zip(numbers).collect())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use ServiceJobStatus::*;

    fn ctx() -> TransitionContext {
        TransitionContext {
            technician_id: Some(7),
            warranty_expires_on: None,
            local_today: NaiveDate::from_ymd_opt(2024, 5, 10).unwrap(),
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let c = ctx();
        assert!(check_transition(Queued, Working, &c).is_ok());
        assert!(check_transition(Working, Done, &c).is_ok());
        assert!(check_transition(Done, PickedUp, &c).is_ok());
        assert!(check_transition(PickedUp, Complaint, &c).is_ok());
    }

    #[test]
    fn test_rejected_transitions() {
        let c = ctx();
        for (from, to) in [
            (Queued, Queued),
            (Queued, Done),
            (Working, Queued),
            (Done, Working),
            (PickedUp, Done),
            (Complaint, PickedUp),
            (Complaint, Complaint),
        ] {
            let err = check_transition(from, to, &c).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidTransition, "{from} -> {to}");
        }
    }

    #[test]
    fn test_working_requires_technician() {
        let c = TransitionContext {
            technician_id: None,
            ..ctx()
        };
        let err = check_transition(Queued, Working, &c).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_complaint_within_warranty() {
        let expiry = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let on_expiry = TransitionContext {
            warranty_expires_on: Some(expiry),
            ..ctx()
        };
        assert!(check_transition(PickedUp, Complaint, &on_expiry).is_ok());

        let after = TransitionContext {
            local_today: NaiveDate::from_ymd_opt(2024, 5, 11).unwrap(),
            ..on_expiry
        };
        let err = check_transition(PickedUp, Complaint, &after).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_history_note() {
        assert_eq!(history_note(None, Working), "status changed to working");
        assert_eq!(history_note(Some("  "), PickedUp), "status changed to picked_up");
        assert_eq!(history_note(Some("customer paid"), Done), "customer paid");
    }

    #[test]
    fn test_compute_totals_mixed_lines() {
        let totals = compute_totals([
            LineItem::new(ItemKind::Service, 2, Money::from_cents(10_000), Money::from_cents(4_000)),
            LineItem::new(ItemKind::Product, 1, Money::from_cents(5_000), Money::from_cents(3_000)),
        ]);

        assert_eq!(totals.grand_total.cents(), 25_000);
        assert_eq!(totals.cost_total.cents(), 11_000);
        assert_eq!(totals.technician_commission.cents(), 2_000);
        assert_eq!(totals.shop_profit.cents(), 12_000);
        assert_eq!(
            totals.grand_total - totals.cost_total - totals.technician_commission - totals.shop_profit,
            Money::zero()
        );
    }

    #[test]
    fn test_compute_totals_rounds_half_even() {
        // 1.25 labour → 0.125 commission → 0.12
        let totals = compute_totals([LineItem::new(
            ItemKind::Service,
            1,
            Money::from_cents(125),
            Money::zero(),
        )]);
        assert_eq!(totals.technician_commission.cents(), 12);
        assert_eq!(totals.shop_profit.cents(), 113);
    }

    #[test]
    fn test_compute_totals_empty() {
        assert_eq!(compute_totals([]), ServiceTotals::default());
    }

    #[test]
    fn test_guards() {
        assert!(ensure_deletable(Queued).is_ok());
        assert_eq!(ensure_deletable(Working).unwrap_err().kind(), ErrorKind::Integrity);

        assert!(ensure_editable(Done).is_ok());
        assert!(ensure_editable(PickedUp).is_err());

        assert!(ensure_details_clearable(Working).is_ok());
        assert!(ensure_details_clearable(Done).is_err());
    }

    fn slot(id: i64, outlet_id: i64, status: ServiceJobStatus, day: u32) -> QueueSlot {
        QueueSlot {
            id,
            outlet_id,
            status,
            queue_date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            queue_number: id % 10 + 1,
        }
    }

    #[test]
    fn test_plan_reorder() {
        let found = [slot(10, 1, Queued, 15), slot(11, 1, Working, 15), slot(12, 1, Queued, 15)];
        let plan = plan_reorder(1, &[12, 10, 11], &found, &found).unwrap();
        assert_eq!(plan, vec![(12, 1), (10, 2), (11, 3)]);
    }

    #[test]
    fn test_plan_reorder_rejects_foreign_or_missing_ids() {
        let found = [slot(10, 1, Queued, 15), slot(12, 1, Queued, 15), slot(99, 2, Queued, 15)];
        let waiting = &found[..2];
        assert_eq!(
            plan_reorder(1, &[12, 99, 10], &found, waiting).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
        assert_eq!(
            plan_reorder(1, &[12, 55], &found, waiting).unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            plan_reorder(1, &[12, 12], &found, waiting).unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn test_plan_reorder_rejects_finished_jobs() {
        let found = [slot(10, 1, Done, 15)];
        assert!(plan_reorder(1, &[10], &found, &[]).is_err());
    }

    #[test]
    fn test_plan_reorder_requires_whole_day() {
        let waiting = [
            slot(10, 1, Queued, 15),
            slot(11, 1, Queued, 15),
            slot(12, 1, Queued, 15),
            slot(20, 1, Working, 14),
        ];

        let partial = plan_reorder(1, &[12], &waiting, &waiting).unwrap_err();
        assert_eq!(partial.kind(), ErrorKind::InvalidInput);

        let mixed = plan_reorder(1, &[20, 10, 11, 12], &waiting, &waiting).unwrap_err();
        assert_eq!(mixed.kind(), ErrorKind::InvalidInput);

        // yesterday's leftover job forms a queue of its own
        assert_eq!(plan_reorder(1, &[20], &waiting, &waiting).unwrap(), vec![(20, 1)]);
    }

    #[test]
    fn test_plan_reorder_leaves_finished_numbers_alone() {
        // job 10 is done and keeps number 1; 11 and 12 hold 2 and 3
        let waiting = [slot(11, 1, Working, 15), slot(12, 1, Queued, 15)];
        let plan = plan_reorder(1, &[12, 11], &waiting, &waiting).unwrap();
        assert_eq!(plan, vec![(12, 2), (11, 3)]);
    }

    #[test]
    fn test_service_code() {
        assert_eq!(service_code(1, 1), "SJ-1-000001");
        assert_eq!(service_code(12, 1_234_567), "SJ-12-1234567");
    }
}
