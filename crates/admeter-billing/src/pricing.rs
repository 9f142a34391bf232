//! CPI Rate Cards

use admeter_common::{BillingError, BillingResult};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Per-impression pricing for a campaign.
///
/// The effective CPI is the base rate plus additive premiums for audience
/// targeting, location targeting, and placement type. Premiums are locked
/// into the campaign at launch and used unchanged for live billing and
/// settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateCard {
    pub base_rate: Decimal,
    pub audience_premium: Decimal,
    pub location_premium: Decimal,
    pub placement_premium: Decimal,
}

impl RateCard {
    /// Flat rate with no targeting premiums
    pub fn flat(base_rate: Decimal) -> Self {
        Self {
            base_rate,
            audience_premium: dec!(0),
            location_premium: dec!(0),
            placement_premium: dec!(0),
        }
    }

    /// Effective cost per impression
    pub fn cpi(&self) -> Decimal {
        self.base_rate + self.audience_premium + self.location_premium + self.placement_premium
    }

    /// Reject negative components and a non-positive effective rate
    pub fn validate(&self) -> BillingResult<()> {
        if self.base_rate <= dec!(0) {
            return Err(BillingError::Validation("base rate must be positive".into()));
        }
        if self.audience_premium < dec!(0)
            || self.location_premium < dec!(0)
            || self.placement_premium < dec!(0)
        {
            return Err(BillingError::Validation("premiums must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpi_sums_premiums() {
        let card = RateCard {
            base_rate: dec!(0.05),
            audience_premium: dec!(0.02),
            location_premium: dec!(0.02),
            placement_premium: dec!(0.01),
        };
        assert_eq!(card.cpi(), dec!(0.10));
        assert!(card.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_rates() {
        assert!(RateCard::flat(dec!(0)).validate().is_err());
        let mut card = RateCard::flat(dec!(0.10));
        card.location_premium = dec!(-0.01);
        assert!(card.validate().is_err());
    }
}
