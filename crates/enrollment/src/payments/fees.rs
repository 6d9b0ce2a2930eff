use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::{Amount, PaymentCategory};

/// A "lipa namba": a till number payers send money to, with the display name and the
/// amount expected for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Till {
    pub till: String,
    pub name: String,
    pub amount: Amount,
}

impl Till {
    pub fn new(till: impl Into<String>, name: impl Into<String>, amount: Amount) -> Self {
        Self {
            till: till.into(),
            name: name.into(),
            amount,
        }
    }
}

/// Configured payment destinations per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    pub application_fee: Amount,
    pub application: Vec<Till>,
    /// Shown when no application till is configured.
    pub fallback_till: Till,
    pub fees: Vec<Till>,
    pub meals: Vec<Till>,
    pub transport: Vec<Till>,
}

impl FeeSchedule {
    pub fn tills(&self, category: PaymentCategory) -> &[Till] {
        match category {
            PaymentCategory::ApplicationFee => &self.application,
            PaymentCategory::Fees => &self.fees,
            PaymentCategory::Meals => &self.meals,
            PaymentCategory::Transport => &self.transport,
            PaymentCategory::Unknown => &[],
        }
    }

    pub fn application_till(&self) -> Till {
        self.application
            .first()
            .cloned()
            .unwrap_or_else(|| self.fallback_till.clone())
    }

    pub fn primary_till(&self, category: PaymentCategory) -> Option<&Till> {
        self.tills(category).first()
    }

    /// Classifies a payment by its amount alone. Only used for rows stored without a
    /// category; when two categories share an amount the first in
    /// fees/meals/transport/application order wins.
    pub fn categorize(&self, amount: Amount) -> PaymentCategory {
        const ORDER: [PaymentCategory; 3] = [
            PaymentCategory::Fees,
            PaymentCategory::Meals,
            PaymentCategory::Transport,
        ];

        for category in ORDER {
            if self.tills(category).iter().any(|till| till.amount == amount) {
                return category;
            }
        }

        if amount == self.application_fee {
            PaymentCategory::ApplicationFee
        } else {
            PaymentCategory::Unknown
        }
    }

    /// Amounts configured for more than one category, which `categorize` cannot tell apart.
    pub fn ambiguous_amounts(&self) -> Vec<(Amount, Vec<PaymentCategory>)> {
        let mut by_amount: BTreeMap<Amount, Vec<PaymentCategory>> = BTreeMap::new();
        let mut record = |amount: Amount, category: PaymentCategory| {
            let categories = by_amount.entry(amount).or_default();
            if !categories.contains(&category) {
                categories.push(category);
            }
        };

        for category in [
            PaymentCategory::Fees,
            PaymentCategory::Meals,
            PaymentCategory::Transport,
        ] {
            for till in self.tills(category) {
                record(till.amount, category);
            }
        }
        record(self.application_fee, PaymentCategory::ApplicationFee);

        by_amount
            .into_iter()
            .filter(|(_, categories)| categories.len() > 1)
            .collect()
    }
}

impl Default for FeeSchedule {
    fn default() -> Self {
        let application_fee = Amount::from_major(10_000);
        let fees = Amount::from_major(150_000);
        let meals = Amount::from_major(50_000);
        let transport = Amount::from_major(80_000);

        Self {
            application_fee,
            application: vec![
                Till::new("000000", "SATELLITE APPLICATIONS", application_fee),
                Till::new("000001", "SATELLITE APPLICATIONS ALT", application_fee),
            ],
            fallback_till: Till::new("000000", "SATELLITE PRE & PRIMARY SCHOOL", application_fee),
            fees: vec![
                Till::new("111111", "SATELLITE FEES", fees),
                Till::new("111112", "SATELLITE FEES ALT", fees),
            ],
            meals: vec![
                Till::new("222221", "SATELLITE MEALS", meals),
                Till::new("222222", "SATELLITE MEALS ALT", meals),
            ],
            transport: vec![
                Till::new("333331", "SATELLITE TRANSPORT", transport),
                Till::new("333332", "SATELLITE TRANSPORT ALT", transport),
            ],
        }
    }
}
