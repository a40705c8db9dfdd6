use std::{collections::HashMap, fmt};

use tracing::warn;

use crate::{
    aggregate::{WardAggregate, WardTable},
    records::WardIncomeRecord,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffordabilityBand {
    MoreAffordable,
    Stretched,
    HighRisk,
    SevereRisk,
    Unknown,
}

impl AffordabilityBand {
    /// Lower edges are closed: a ratio of exactly 4 is `Stretched`.
    pub fn classify(ratio: Option<f64>) -> Self {
        match ratio {
            Some(r) if r.is_finite() => {
                if r < 4.0 {
                    Self::MoreAffordable
                } else if r < 6.0 {
                    Self::Stretched
                } else if r < 8.0 {
                    Self::HighRisk
                } else {
                    Self::SevereRisk
                }
            }
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::MoreAffordable => "More Affordable (<4x)",
            Self::Stretched => "Stretched (4–6x)",
            Self::HighRisk => "High Risk (6–8x)",
            Self::SevereRisk => "Severe Risk (8x+)",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AffordabilityBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// `None` unless both sides are usable numbers and income is positive.
pub fn affordability_ratio(median_price: Option<f64>, income: Option<f64>) -> Option<f64> {
    let price = median_price.filter(|p| p.is_finite())?;
    let income = income.filter(|i| i.is_finite() && *i > 0.0)?;
    Some(price / income)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DashboardRow {
    pub ward: WardAggregate,
    pub average_household_income: Option<f64>,
    pub affordability_ratio: Option<f64>,
    pub affordability_band: AffordabilityBand,
}

impl DashboardRow {
    pub fn new(ward: WardAggregate, average_household_income: Option<f64>) -> Self {
        let affordability_ratio = affordability_ratio(ward.median_price, average_household_income);
        Self {
            ward,
            average_household_income,
            affordability_ratio,
            affordability_band: AffordabilityBand::classify(affordability_ratio),
        }
    }

    pub fn ward_label(&self) -> String {
        ward_label(self.ward.ward_id)
    }
}

pub fn ward_label(ward_id: u32) -> String {
    format!("Ward {}", ward_id)
}

/// Inner join of ward statistics and income on ward id. Wards missing from
/// either side are left out. Output follows the ward table order.
pub fn join_income(wards: &WardTable, incomes: &[WardIncomeRecord]) -> Vec<DashboardRow> {
    let mut by_ward: HashMap<u32, Option<f64>> = HashMap::with_capacity(incomes.len());
    for rec in incomes {
        if by_ward.contains_key(&rec.ward_id) {
            warn!(ward_id = rec.ward_id, "duplicate income row ignored");
            continue;
        }
        by_ward.insert(rec.ward_id, rec.average_household_income);
    }

    wards
        .rows
        .iter()
        .filter_map(|w| {
            by_ward
                .get(&w.ward_id)
                .map(|income| DashboardRow::new(w.clone(), *income))
        })
        .collect()
}
