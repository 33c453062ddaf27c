use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the insolvency estimation for one (account, token) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsolvencyDate {
    /// Net-receiving or flat account; never becomes insolvent.
    Never,
    /// The cushion (balance + deposit) is already exhausted.
    Already,
    At(DateTime<Utc>),
    /// The date arithmetic was not representable. Treated as due
    /// immediately; displayed as the literal "Invalid Date".
    Invalid,
}

impl InsolvencyDate {
    /// Storage form: epoch seconds, 0 = never, -1 = already insolvent.
    /// `Invalid` carries the observation instant so the due-query picks the
    /// record up right away.
    pub fn epoch_seconds(&self, as_of: DateTime<Utc>) -> i64 {
        match self {
            InsolvencyDate::Never => 0,
            InsolvencyDate::Already => -1,
            InsolvencyDate::At(at) => at.timestamp(),
            InsolvencyDate::Invalid => as_of.timestamp(),
        }
    }

    pub fn human(&self) -> String {
        match self {
            InsolvencyDate::Never => "never".to_string(),
            InsolvencyDate::Already => "now".to_string(),
            InsolvencyDate::At(at) => at.to_rfc3339(),
            InsolvencyDate::Invalid => "Invalid Date".to_string(),
        }
    }

    pub fn is_urgent(&self) -> bool {
        matches!(self, InsolvencyDate::Already)
    }
}

/// Estimate when an account becomes insolvent for one token.
///
/// Pure and deterministic; the caller supplies `now` as of the read moment.
/// A non-negative net flow rate can never drain the account. For a draining
/// account the deposit extends solvency: only once balance plus deposit goes
/// negative is insolvency already in effect. Otherwise the remaining runway
/// is `|available_balance / net_flow_rate|` whole seconds from `now`.
/// Division results the arithmetic cannot represent count as zero seconds
/// remaining (due immediately); a date beyond the representable range is
/// `Invalid`.
pub fn compute_insolvency_date(
    net_flow_rate: i128,
    available_balance: i128,
    deposit: i128,
    now: DateTime<Utc>,
) -> InsolvencyDate {
    if net_flow_rate >= 0 {
        return InsolvencyDate::Never;
    }

    if available_balance.saturating_add(deposit) < 0 {
        return InsolvencyDate::Already;
    }

    let seconds = available_balance
        .checked_div(net_flow_rate)
        .map_or(0, i128::unsigned_abs);

    let date = i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|runway| now.checked_add_signed(runway));

    match date {
        Some(at) => InsolvencyDate::At(at),
        None => InsolvencyDate::Invalid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_non_negative_rate_never_insolvent() {
        for rate in [0, 1, 385_802_469_135_802] {
            for balance in [-1_000, 0, 1_000] {
                for deposit in [-50, 0, 50] {
                    assert_eq!(
                        compute_insolvency_date(rate, balance, deposit, now()),
                        InsolvencyDate::Never,
                    );
                }
            }
        }
    }

    #[test]
    fn test_exhausted_cushion_is_already_insolvent() {
        // cushion = -200 + 100 = -100
        assert_eq!(
            compute_insolvency_date(-5, -200, 100, now()),
            InsolvencyDate::Already,
        );
    }

    #[test]
    fn test_runway_from_balance_and_rate() {
        // 1000 / 10 price units per second = 100 seconds
        let date = compute_insolvency_date(-10, 1_000, 50, now());
        assert_eq!(date, InsolvencyDate::At(now() + Duration::seconds(100)));
    }

    #[test]
    fn test_negative_balance_covered_by_deposit() {
        // draining, balance already negative but deposit still covers it
        let date = compute_insolvency_date(-10, -200, 300, now());
        assert_eq!(date, InsolvencyDate::At(now() + Duration::seconds(20)));
    }

    #[test]
    fn test_runway_is_never_in_the_past() {
        let date = compute_insolvency_date(-1_000_000, 3, 0, now());
        assert_eq!(date, InsolvencyDate::At(now()));
    }

    #[test]
    fn test_extreme_negative_balance_is_already_insolvent() {
        // the cushion check fires before any division could overflow
        let date = compute_insolvency_date(-1, i128::MIN, i128::MAX, now());
        assert_eq!(date, InsolvencyDate::Already);
    }

    #[test]
    fn test_unrepresentable_date_is_invalid() {
        let date = compute_insolvency_date(-1, i128::MAX, 0, now());
        assert_eq!(date, InsolvencyDate::Invalid);
        assert_eq!(date.human(), "Invalid Date");
        assert_eq!(date.epoch_seconds(now()), now().timestamp());
    }

    #[test]
    fn test_sentinel_storage_forms() {
        assert_eq!(InsolvencyDate::Never.epoch_seconds(now()), 0);
        assert_eq!(InsolvencyDate::Already.epoch_seconds(now()), -1);
        assert!(InsolvencyDate::Already.is_urgent());
        assert!(!InsolvencyDate::Never.is_urgent());
        let at = now() + Duration::seconds(100);
        assert_eq!(InsolvencyDate::At(at).epoch_seconds(now()), at.timestamp());
    }

    #[test]
    fn test_deterministic_for_fixed_now() {
        let a = compute_insolvency_date(-7, 12_345, 678, now());
        let b = compute_insolvency_date(-7, 12_345, 678, now());
        assert_eq!(a, b);
    }
}
