use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::assets::{Asset, AssetStatus};

/// Assets within this many days of expiry are in the critical tier.
pub const CRITICAL_WINDOW_DAYS: i64 = 14;
/// Assets within this many days of expiry are at least in the warning tier.
pub const WARNING_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryTier {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct Classification {
    pub status: AssetStatus,
    pub days_until_expiry: Option<i64>,
    pub tier: Option<ExpiryTier>,
    pub is_expired: bool,
}

/// Whole days from `now` to `expires_at`, rounded up. One hour from now
/// counts as 1 day; five days ago counts as -5.
pub fn days_until(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (expires_at - now).num_seconds();
    // ceil(secs / 86400) without going through floats
    secs.div_euclid(86_400) + i64::from(secs.rem_euclid(86_400) > 0)
}

/// Derives lifecycle status from the asset and the supplied instant. Never
/// caches: callers pass `now` on every query so the view cannot drift from
/// wall-clock time.
///
/// Stored status is authoritative only for non-lifecycle assets, assets
/// without an expiry date, and the decommissioned terminal state.
pub fn classify(asset: &Asset, now: DateTime<Utc>) -> Classification {
    let stored = asset.stored_status();

    if stored == AssetStatus::Decommissioned {
        return Classification {
            status: AssetStatus::Decommissioned,
            days_until_expiry: None,
            tier: None,
            is_expired: false,
        };
    }

    let expires_at = match asset.expires_at {
        Some(ts) if asset.is_lifecycle_bearing() => ts,
        _ => {
            return Classification {
                status: stored,
                days_until_expiry: None,
                tier: None,
                is_expired: false,
            }
        }
    };

    let days = days_until(expires_at, now);
    // Strictly past the instant is expired even when the ceiling day count
    // is still 0 (e.g. one second ago).
    let is_expired = expires_at < now;

    let (status, tier) = if is_expired {
        (AssetStatus::Expired, None)
    } else if days <= CRITICAL_WINDOW_DAYS {
        (AssetStatus::Expiring, Some(ExpiryTier::Critical))
    } else if days <= WARNING_WINDOW_DAYS {
        (AssetStatus::Expiring, Some(ExpiryTier::Warning))
    } else {
        (AssetStatus::Active, None)
    };

    Classification {
        status,
        days_until_expiry: Some(days),
        tier,
        is_expired,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_fixtures::lifecycle_asset;
    use chrono::Duration;

    #[test]
    fn test_expired_one_second_ago() {
        let now = Utc::now();
        let asset = lifecycle_asset(now - Duration::seconds(1));
        let c = classify(&asset, now);
        assert!(c.is_expired);
        assert_eq!(c.status, AssetStatus::Expired);
    }

    #[test]
    fn test_critical_tier_at_ten_days() {
        let now = Utc::now();
        let asset = lifecycle_asset(now + Duration::days(10));
        let c = classify(&asset, now);
        assert_eq!(c.status, AssetStatus::Expiring);
        assert_eq!(c.tier, Some(ExpiryTier::Critical));
        assert_eq!(c.days_until_expiry, Some(10));
    }

    #[test]
    fn test_warning_tier_at_twenty_days() {
        let now = Utc::now();
        let c = classify(&lifecycle_asset(now + Duration::days(20)), now);
        assert_eq!(c.status, AssetStatus::Expiring);
        assert_eq!(c.tier, Some(ExpiryTier::Warning));
    }

    #[test]
    fn test_active_at_forty_days() {
        let now = Utc::now();
        let c = classify(&lifecycle_asset(now + Duration::days(40)), now);
        assert_eq!(c.status, AssetStatus::Active);
        assert_eq!(c.tier, None);
        assert!(!c.is_expired);
    }

    #[test]
    fn test_tier_boundaries() {
        let now = Utc::now();
        let c14 = classify(&lifecycle_asset(now + Duration::days(14)), now);
        assert_eq!(c14.tier, Some(ExpiryTier::Critical));
        let c15 = classify(&lifecycle_asset(now + Duration::days(15)), now);
        assert_eq!(c15.tier, Some(ExpiryTier::Warning));
        let c30 = classify(&lifecycle_asset(now + Duration::days(30)), now);
        assert_eq!(c30.tier, Some(ExpiryTier::Warning));
        let c31 = classify(&lifecycle_asset(now + Duration::days(31)), now);
        assert_eq!(c31.status, AssetStatus::Active);
    }

    #[test]
    fn test_days_until_rounds_up() {
        let now = Utc::now();
        assert_eq!(days_until(now + Duration::hours(1), now), 1);
        assert_eq!(days_until(now + Duration::days(2), now), 2);
        assert_eq!(days_until(now - Duration::days(5), now), -5);
        assert_eq!(days_until(now - Duration::seconds(1), now), 0);
    }

    #[test]
    fn test_decommissioned_passes_through() {
        let now = Utc::now();
        let mut asset = lifecycle_asset(now + Duration::days(5));
        asset.status = AssetStatus::Decommissioned.as_str().to_string();
        let c = classify(&asset, now);
        assert_eq!(c.status, AssetStatus::Decommissioned);
        assert_eq!(c.days_until_expiry, None);
    }

    #[test]
    fn test_non_lifecycle_type_keeps_stored_status() {
        let now = Utc::now();
        let mut asset = lifecycle_asset(now - Duration::days(90));
        asset.asset_type = "hardware".to_string();
        let c = classify(&asset, now);
        assert_eq!(c.status, AssetStatus::Active);
        assert!(!c.is_expired);
    }

    #[test]
    fn test_no_expiry_date_keeps_stored_status() {
        let now = Utc::now();
        let mut asset = lifecycle_asset(now);
        asset.expires_at = None;
        let c = classify(&asset, now);
        assert_eq!(c.status, AssetStatus::Active);
        assert_eq!(c.days_until_expiry, None);
    }
}
