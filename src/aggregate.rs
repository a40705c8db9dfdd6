use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use regex::Regex;
use std::sync::OnceLock;

use crate::assign::AssignedListing;

pub const UNKNOWN_STYLE: &str = "Unknown";

/// Collects values for one statistic. Non-finite values are ignored.
#[derive(Debug, Clone, Default)]
pub struct Sample {
    vals: Vec<f64>,
}

impl Sample {
    pub fn new() -> Self {
        Self { vals: Vec::new() }
    }

    pub fn add(&mut self, v: f64) {
        if v.is_finite() {
            self.vals.push(v);
        }
    }

    pub fn len(&self) -> usize {
        self.vals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vals.is_empty()
    }

    pub fn mean(&self) -> Option<f64> {
        if self.vals.is_empty() {
            None
        } else {
            Some(self.vals.iter().sum::<f64>() / self.vals.len() as f64)
        }
    }

    /// Even-sized samples take the mean of the two middle values.
    pub fn median(&self) -> Option<f64> {
        if self.vals.is_empty() {
            return None;
        }
        let sorted: Vec<f64> = self.vals.iter().copied().sorted_by(|a, b| a.total_cmp(b)).collect();
        let mid = sorted.len() / 2;
        if sorted.len() % 2 == 0 {
            Some((sorted[mid - 1] + sorted[mid]) / 2.0)
        } else {
            Some(sorted[mid])
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WardAggregate {
    pub ward_id: u32,
    pub listing_count: usize,
    pub median_price: Option<f64>,
    pub mean_price: Option<f64>,
    pub median_walk_score: Option<f64>,
    /// One entry per category in the owning table, zero when absent here.
    pub style_shares: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WardTable {
    /// Normalised style keys observed anywhere in the input, sorted.
    pub categories: Vec<String>,
    pub rows: Vec<WardAggregate>,
}

impl WardTable {
    pub fn get(&self, ward_id: u32) -> Option<&WardAggregate> {
        self.rows.iter().find(|r| r.ward_id == ward_id)
    }
}

fn label_junk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("static regex"))
}

/// Column-safe form of a style label: `"Semi-Detached  (2 storey)"` becomes
/// `"Semi_Detached_2_storey"`.
pub fn style_key(label: &str) -> String {
    let key = label_junk().replace_all(label.trim(), "_");
    let key = key.trim_matches('_');
    if key.is_empty() {
        UNKNOWN_STYLE.to_owned()
    } else {
        key.to_owned()
    }
}

/// Groups assigned listings by ward and computes the summary statistics.
/// Rows come out in ascending ward order.
pub fn aggregate_wards(listings: &[AssignedListing]) -> WardTable {
    let with_styles = listings.iter().any(|l| l.listing.style.is_some());
    let style_of = |l: &AssignedListing| -> String {
        l.listing
            .style
            .as_deref()
            .map(style_key)
            .unwrap_or_else(|| UNKNOWN_STYLE.to_owned())
    };

    let categories: Vec<String> = if with_styles {
        listings.iter().map(style_of).collect::<BTreeSet<_>>().into_iter().collect()
    } else {
        Vec::new()
    };

    let groups: BTreeMap<u32, Vec<&AssignedListing>> = listings
        .iter()
        .map(|l| (l.ward_id, l))
        .into_group_map()
        .into_iter()
        .collect();

    let rows = groups
        .into_iter()
        .map(|(ward_id, ward)| {
            let mut price = Sample::new();
            let mut walk = Sample::new();
            let mut counts: BTreeMap<String, usize> =
                categories.iter().map(|c| (c.clone(), 0)).collect();

            for &l in ward.iter() {
                price.add(l.listing.price);
                if let Some(w) = l.listing.walk_score {
                    walk.add(w);
                }
                if with_styles {
                    *counts.entry(style_of(l)).or_default() += 1;
                }
            }

            let n = ward.len();
            WardAggregate {
                ward_id,
                listing_count: n,
                median_price: price.median(),
                mean_price: price.mean(),
                median_walk_score: walk.median(),
                style_shares: counts
                    .into_iter()
                    .map(|(c, k)| (c, k as f64 / n as f64))
                    .collect(),
            }
        })
        .collect();

    WardTable { categories, rows }
}
