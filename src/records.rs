use regex::Regex;
use std::sync::OnceLock;

/// A validated listing. Coordinates are WGS84 degrees.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    pub latitude: f64,
    pub longitude: f64,
    pub price: f64,
    pub walk_score: Option<f64>,
    pub style: Option<String>,
}

impl Listing {
    /// Builds a listing from loosely parsed fields, rejecting it when a
    /// required field is missing or the price is not positive.
    pub fn validate(
        latitude: Option<f64>,
        longitude: Option<f64>,
        price: Option<f64>,
        walk_score: Option<f64>,
        style: Option<String>,
    ) -> Option<Self> {
        let latitude = latitude.filter(|x| x.is_finite())?;
        let longitude = longitude.filter(|x| x.is_finite())?;
        let price = price.filter(|x| x.is_finite() && *x > 0.0)?;

        Some(Self {
            latitude,
            longitude,
            price,
            walk_score: walk_score.filter(|x| x.is_finite()),
            style: style
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
        })
    }

    pub fn point(&self) -> geo::Point<f64> {
        geo::Point::new(self.longitude, self.latitude)
    }
}

/// Listings that passed validation, plus how many rows did not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingTable {
    pub listings: Vec<Listing>,
    pub rejected: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WardIncomeRecord {
    pub ward_id: u32,
    pub average_household_income: Option<f64>,
}

fn money_junk() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^0-9.\-]").expect("static regex"))
}

/// `"$2,500,000"` -> `2500000.0`. Anything that is left without digits is null.
pub fn parse_money(input: &str) -> Option<f64> {
    let cleaned = money_junk().replace_all(input.trim(), "");
    match cleaned.as_ref() {
        "" | "." | "-" | "-." => None,
        s => s.parse::<f64>().ok(),
    }
}

pub fn parse_number(input: &str) -> Option<f64> {
    input.trim().parse::<f64>().ok().filter(|x| x.is_finite())
}
