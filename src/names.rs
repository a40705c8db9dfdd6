use std::collections::HashMap;

use tracing::{info, warn};

use crate::afford::ward_label;

/// City of Ottawa ward names, used when no lookup file is supplied.
pub const OTTAWA_WARDS: [(u32, &'static str); 24] = [
    (1, "Orléans East-Cumberland"),
    (2, "Orléans West-Innes"),
    (3, "Barrhaven West"),
    (4, "Kanata North"),
    (5, "West Carleton-March"),
    (6, "Stittsville"),
    (7, "Bay"),
    (8, "College"),
    (9, "Knoxdale-Merivale"),
    (10, "Gloucester-Southgate"),
    (11, "Beacon Hill-Cyrville"),
    (12, "Rideau-Vanier"),
    (13, "Rideau-Rockcliffe"),
    (14, "Somerset"),
    (15, "Kitchissippi"),
    (16, "River"),
    (17, "Capital"),
    (18, "Alta Vista"),
    (19, "Orléans South-Navan"),
    (20, "Osgoode"),
    (21, "Rideau-Jock"),
    (22, "Riverside South-Findlay Creek"),
    (23, "Kanata South"),
    (24, "Barrhaven East"),
];

#[derive(Debug, Clone, Default)]
pub struct WardNames {
    map: HashMap<u32, String>,
}

impl WardNames {
    pub fn fallback() -> Self {
        Self {
            map: OTTAWA_WARDS.iter().map(|(id, n)| (*id, n.to_string())).collect(),
        }
    }

    /// Names scraped from the city's ward page, or the built-in list when the
    /// page could not be read or yielded no rows.
    pub fn resolve(fetched: anyhow::Result<Vec<(u32, String)>>) -> Self {
        match fetched {
            Ok(rows) if !rows.is_empty() => {
                let mut names = Self::default();
                names.extend(rows);
                info!(wards = names.len(), "using fetched ward names");
                names
            }
            Ok(_) => {
                warn!("ward name page had no rows, using built-in names");
                Self::fallback()
            }
            Err(e) => {
                warn!(error = %e, "could not fetch ward names, using built-in names");
                Self::fallback()
            }
        }
    }

    /// Later entries replace earlier ones.
    pub fn extend<I: IntoIterator<Item = (u32, String)>>(&mut self, names: I) {
        for (id, name) in names {
            let name = name.trim();
            if !name.is_empty() {
                self.map.insert(id, name.to_owned());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// All known names, by ward id.
    pub fn entries(&self) -> Vec<(u32, &str)> {
        let mut v: Vec<(u32, &str)> = self.map.iter().map(|(id, n)| (*id, n.as_str())).collect();
        v.sort_by_key(|(id, _)| *id);
        v
    }

    pub fn name(&self, ward_id: u32) -> Option<&str> {
        self.map.get(&ward_id).map(|s| s.as_str())
    }

    /// `"Ward 14 - Somerset"`, or just `"Ward 14"` if the name is unknown.
    pub fn full(&self, ward_id: u32) -> String {
        match self.name(ward_id) {
            Some(n) => format!("{} - {}", ward_label(ward_id), n),
            None => ward_label(ward_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_covers_all_wards() {
        let names = WardNames::fallback();
        assert_eq!(names.len(), 24);
        assert_eq!(names.full(14), "Ward 14 - Somerset");
        assert_eq!(names.full(31), "Ward 31");
    }

    #[test]
    fn overrides_replace_fallback() {
        let mut names = WardNames::fallback();
        names.extend(vec![(7, " Bay Ward ".to_owned()), (8, "".to_owned()), (25, "New".to_owned())]);
        assert_eq!(names.name(7), Some("Bay Ward"));
        assert_eq!(names.name(8), Some("College"));
        assert_eq!(names.full(25), "Ward 25 - New");
    }

    #[test]
    fn resolve_prefers_fetched_names() {
        let names = WardNames::resolve(Ok(vec![(2, "Two".to_owned()), (1, "One".to_owned())]));
        assert_eq!(names.entries(), vec![(1, "One"), (2, "Two")]);
        assert_eq!(names.name(14), None);
    }

    #[test]
    fn resolve_falls_back_on_failure() {
        let names = WardNames::resolve(Err(anyhow::anyhow!("connection refused")));
        assert_eq!(names.len(), 24);
        assert_eq!(names.name(1), Some("Orléans East-Cumberland"));

        let names = WardNames::resolve(Ok(Vec::new()));
        assert_eq!(names.entries().len(), 24);
        assert_eq!(names.entries()[23], (24, "Barrhaven East"));
    }
}
