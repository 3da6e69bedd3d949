//! Reconditioning rules.
//!
//! ```text
//!   pending ──(start / first detail)──► in_progress ──(complete)──► completed
//!      │
//!      └──(cancel)──► cancelled
//! ```

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::types::{DetailKind, ReconditioningDetail, ReconditioningStatus};
use crate::validation::validate_quantity;

/// Checks a reconditioning status change.
pub fn check_transition(from: ReconditioningStatus, to: ReconditioningStatus) -> CoreResult<()> {
    use ReconditioningStatus::*;

    match (from, to) {
        (Pending, InProgress) | (InProgress, Completed) | (Pending, Cancelled) => Ok(()),
        _ => Err(CoreError::InvalidTransition {
            entity: "reconditioning job",
            from: from.to_string(),
            to: to.to_string(),
        }),
    }
}

/// Detail adds and edits require an open job.
pub fn ensure_accepts_details(status: ReconditioningStatus) -> CoreResult<()> {
    if !status.accepts_details() {
        return Err(CoreError::invalid_state(format!(
            "reconditioning job is {} and no longer accepts details",
            status
        )));
    }
    Ok(())
}

/// Checks that exactly the id matching `kind` is set and returns it.
pub fn referenced_item(
    kind: DetailKind,
    product_id: Option<i64>,
    service_id: Option<i64>,
) -> CoreResult<i64> {
    let (wanted, other, field, other_field) = match kind {
        DetailKind::Part => (product_id, service_id, "product_id", "service_id"),
        DetailKind::Service => (service_id, product_id, "service_id", "product_id"),
    };

    if other.is_some() {
        return Err(ValidationError::Invalid {
            field: other_field.to_string(),
            reason: format!("must be empty for a {} detail", kind_name(kind)),
        }
        .into());
    }

    wanted.ok_or_else(|| {
        ValidationError::Required {
            field: field.to_string(),
        }
        .into()
    })
}

fn kind_name(kind: DetailKind) -> &'static str {
    match kind {
        DetailKind::Part => "part",
        DetailKind::Service => "service",
    }
}

/// `unit_price × quantity` after validating both.
pub fn line_total(unit_price: Money, quantity: i64) -> CoreResult<Money> {
    validate_quantity(quantity)?;
    if unit_price.is_negative() {
        return Err(ValidationError::MustNotBeNegative {
            field: "unit_price".to_string(),
        }
        .into());
    }
    Ok(unit_price * quantity)
}

/// Actual cost recorded on completion: the explicit figure, else the sum of
/// detail totals.
pub fn actual_cost(explicit: Option<Money>, details: &[ReconditioningDetail]) -> CoreResult<Money> {
    match explicit {
        Some(cost) if cost.is_negative() => Err(ValidationError::MustNotBeNegative {
            field: "actual_cost".to_string(),
        }
        .into()),
        Some(cost) => Ok(cost),
        None => Ok(details
            .iter()
            .map(|d| Money::from_cents(d.total_price_cents))
            .sum()),
    }
}

/// Additional stock to take (positive) or give back (negative) when a part
/// detail's quantity changes. Lines recorded with a shortfall never touched
/// stock and stay that way.
pub fn stock_delta_for_quantity_change(detail: &ReconditioningDetail, new_quantity: i64) -> i64 {
    if detail.kind != DetailKind::Part || detail.stock_shortfall {
        return 0;
    }
    new_quantity - detail.quantity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Utc;
    use ReconditioningStatus::*;

    fn detail(kind: DetailKind, quantity: i64, total: i64, shortfall: bool) -> ReconditioningDetail {
        let now = Utc::now();
        ReconditioningDetail {
            id: 1,
            reconditioning_job_id: 1,
            kind,
            product_id: (kind == DetailKind::Part).then_some(3),
            service_id: (kind == DetailKind::Service).then_some(4),
            description: None,
            quantity,
            unit_price_cents: total / quantity,
            total_price_cents: total,
            stock_shortfall: shortfall,
            usage_at: now,
            created_by: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }

    #[test]
    fn test_transitions() {
        assert!(check_transition(Pending, InProgress).is_ok());
        assert!(check_transition(InProgress, Completed).is_ok());
        assert!(check_transition(Pending, Cancelled).is_ok());

        for (from, to) in [
            (Pending, Completed),
            (InProgress, Cancelled),
            (InProgress, Pending),
            (Completed, InProgress),
            (Cancelled, Pending),
        ] {
            assert_eq!(
                check_transition(from, to).unwrap_err().kind(),
                ErrorKind::InvalidTransition
            );
        }
    }

    #[test]
    fn test_referenced_item() {
        assert_eq!(referenced_item(DetailKind::Part, Some(3), None).unwrap(), 3);
        assert_eq!(referenced_item(DetailKind::Service, None, Some(4)).unwrap(), 4);

        assert!(referenced_item(DetailKind::Part, None, None).is_err());
        assert!(referenced_item(DetailKind::Part, Some(3), Some(4)).is_err());
        assert!(referenced_item(DetailKind::Service, Some(3), None).is_err());
    }

    #[test]
    fn test_line_total() {
        assert_eq!(line_total(Money::from_cents(7_500), 4).unwrap().cents(), 30_000);
        assert!(line_total(Money::from_cents(7_500), 0).is_err());
        assert!(line_total(Money::from_cents(-1), 1).is_err());
    }

    #[test]
    fn test_actual_cost() {
        let details = [
            detail(DetailKind::Part, 2, 20_000, false),
            detail(DetailKind::Service, 1, 15_000, false),
        ];
        assert_eq!(actual_cost(None, &details).unwrap().cents(), 35_000);
        assert_eq!(
            actual_cost(Some(Money::from_cents(300_000)), &details).unwrap().cents(),
            300_000
        );
        assert!(actual_cost(Some(Money::from_cents(-5)), &details).is_err());
    }

    #[test]
    fn test_stock_delta() {
        let part = detail(DetailKind::Part, 2, 20_000, false);
        assert_eq!(stock_delta_for_quantity_change(&part, 5), 3);
        assert_eq!(stock_delta_for_quantity_change(&part, 1), -1);
        assert_eq!(part.deducted_quantity(), 2);

        let short = detail(DetailKind::Part, 2, 20_000, true);
        assert_eq!(stock_delta_for_quantity_change(&short, 5), 0);
        assert_eq!(short.deducted_quantity(), 0);

        let labour = detail(DetailKind::Service, 1, 15_000, false);
        assert_eq!(stock_delta_for_quantity_change(&labour, 3), 0);
    }

    #[test]
    fn test_closed_jobs_reject_details() {
        assert!(ensure_accepts_details(InProgress).is_ok());
        assert_eq!(
            ensure_accepts_details(Completed).unwrap_err().kind(),
            ErrorKind::InvalidState
        );
    }
}
