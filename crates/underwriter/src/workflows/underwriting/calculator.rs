use super::domain::{overdue_check_label, CaseInput, DerivedFields};

/// Recompute every derived field from raw input. Pure and idempotent.
pub fn calculate(input: &CaseInput) -> DerivedFields {
    let deal = &input.deal;

    let (down_payment_amount, remaining_amount) =
        match (nonzero(deal.purchase_price), nonzero(deal.down_payment_percent)) {
            (Some(price), Some(pv)) => {
                let down_payment = price * pv / 100.0;
                (
                    Some(round_to(down_payment, 2)),
                    Some(round_to(price - down_payment, 2)),
                )
            }
            _ => (None, None),
        };

    let monthly_payment = match (
        nonzero(remaining_amount),
        nonzero(deal.interest_rate),
        deal.lease_term_months.filter(|months| *months > 0),
    ) {
        (Some(principal), Some(rate), Some(months)) => {
            annuity_payment(principal, rate, months).map(|payment| round_to(payment, 2))
        }
        _ => None,
    };

    let total_monthly_income = round_to(
        input
            .profile
            .income_sources()
            .into_iter()
            .map(|source| source.monthly_average())
            .sum::<f64>(),
        2,
    );

    let dti = debt_to_income(
        monthly_payment,
        input.profile.monthly_obligations(),
        total_monthly_income,
    );

    let worst_category = input
        .profile
        .delinquency_sources()
        .into_iter()
        .filter_map(|source| source.category)
        .max();

    DerivedFields {
        down_payment_amount,
        remaining_amount,
        monthly_payment,
        total_monthly_income,
        dti,
        overdue_check_result: overdue_check_label(worst_category).to_string(),
    }
}

/// Fixed payment amortizing `principal` over `months` at `annual_rate_percent`.
/// A zero rate degrades to straight-line repayment.
pub fn annuity_payment(principal: f64, annual_rate_percent: f64, months: u32) -> Option<f64> {
    if months == 0 {
        return None;
    }

    let n = f64::from(months);
    let rate = annual_rate_percent / 100.0 / 12.0;
    if rate == 0.0 {
        return Some(principal / n);
    }

    let growth = (1.0 + rate).powf(n);
    let payment = principal * rate * growth / (growth - 1.0);
    payment.is_finite().then_some(payment)
}

/// Percent of monthly income consumed by the new payment plus existing obligations.
pub fn debt_to_income(
    monthly_payment: Option<f64>,
    monthly_obligations: Option<f64>,
    monthly_income: f64,
) -> Option<f64> {
    if monthly_income <= 0.0 {
        return None;
    }

    let debt = monthly_payment.unwrap_or(0.0) + monthly_obligations.unwrap_or(0.0);
    Some(round_to(debt / monthly_income * 100.0, 2))
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn nonzero(value: Option<f64>) -> Option<f64> {
    value.filter(|value| *value != 0.0 && value.is_finite())
}
