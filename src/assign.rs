use geo::{
    coordinate_position::{CoordPos, CoordinatePosition},
    MultiPolygon, Point,
};

use crate::{records::Listing, wards::WardPolygon};

/// Point-in-region test used for ward assignment. Points on the boundary
/// count as inside.
pub trait Containment {
    fn contains_or_touches(&self, point: &Point<f64>, region: &MultiPolygon<f64>) -> bool;
}

/// `covers` semantics on top of `geo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Covers;

impl Containment for Covers {
    fn contains_or_touches(&self, point: &Point<f64>, region: &MultiPolygon<f64>) -> bool {
        region.coordinate_position(&point.0) != CoordPos::Outside
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignedListing {
    pub listing: Listing,
    pub ward_id: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Assignment {
    pub assigned: Vec<AssignedListing>,
    /// Listings that no polygon covers.
    pub unassigned: usize,
}

impl Assignment {
    pub fn total(&self) -> usize {
        self.assigned.len() + self.unassigned
    }
}

/// First ward in `wards` order that covers the point.
pub fn locate<C: Containment>(point: &Point<f64>, wards: &[WardPolygon], containment: &C) -> Option<u32> {
    if !(point.x().is_finite() && point.y().is_finite()) {
        return None;
    }

    wards
        .iter()
        .filter(|w| w.may_contain(point))
        .find(|w| containment.contains_or_touches(point, &w.geometry))
        .map(|w| w.ward_id)
}

pub fn assign_wards<C: Containment>(listings: &[Listing], wards: &[WardPolygon], containment: &C) -> Assignment {
    let mut out = Assignment::default();

    for listing in listings {
        match locate(&listing.point(), wards, containment) {
            Some(ward_id) => out.assigned.push(AssignedListing {
                listing: listing.clone(),
                ward_id,
            }),
            None => out.unassigned += 1,
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wards::tests::square;

    fn listing(lon: f64, lat: f64) -> Listing {
        Listing {
            latitude: lat,
            longitude: lon,
            price: 1.0,
            walk_score: None,
            style: None,
        }
    }

    fn two_wards() -> Vec<WardPolygon> {
        vec![
            WardPolygon::new(1, square(0.0, 0.0, 1.0)),
            WardPolygon::new(2, square(1.0, 0.0, 1.0)),
        ]
    }

    #[test]
    fn interior_points() {
        let wards = two_wards();
        assert_eq!(locate(&Point::new(0.5, 0.5), &wards, &Covers), Some(1));
        assert_eq!(locate(&Point::new(1.5, 0.5), &wards, &Covers), Some(2));
        assert_eq!(locate(&Point::new(5.0, 5.0), &wards, &Covers), None);
    }

    #[test]
    fn boundary_counts_and_first_match_wins() {
        let wards = two_wards();
        // on the outer edge of ward 1 only
        assert_eq!(locate(&Point::new(0.0, 0.5), &wards, &Covers), Some(1));
        // shared edge: both cover it, ward 1 is tested first
        assert_eq!(locate(&Point::new(1.0, 0.5), &wards, &Covers), Some(1));

        let reversed: Vec<WardPolygon> = wards.into_iter().rev().collect();
        assert_eq!(locate(&Point::new(1.0, 0.5), &reversed, &Covers), Some(2));
    }

    #[test]
    fn hole_is_outside() {
        use geo::{coord, LineString, Polygon};
        let outer = LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0), (0.0, 0.0)]);
        let hole = LineString::new(vec![
            coord! { x: 1.0, y: 1.0 },
            coord! { x: 3.0, y: 1.0 },
            coord! { x: 3.0, y: 3.0 },
            coord! { x: 1.0, y: 3.0 },
            coord! { x: 1.0, y: 1.0 },
        ]);
        let ward = WardPolygon::new(7, MultiPolygon::new(vec![Polygon::new(outer, vec![hole])]));
        assert_eq!(locate(&Point::new(2.0, 2.0), &[ward.clone()], &Covers), None);
        assert_eq!(locate(&Point::new(0.5, 2.0), &[ward], &Covers), Some(7));
    }

    #[test]
    fn non_finite_points_are_unassignable() {
        assert_eq!(locate(&Point::new(f64::NAN, 0.5), &two_wards(), &Covers), None);
    }

    #[test]
    fn assignment_counts_exclusions() {
        let listings = vec![listing(0.5, 0.5), listing(1.5, 0.2), listing(9.0, 9.0)];
        let a = assign_wards(&listings, &two_wards(), &Covers);
        assert_eq!(a.assigned.len(), 2);
        assert_eq!(a.unassigned, 1);
        assert_eq!(a.total(), listings.len());
        assert_eq!(a.assigned[1].ward_id, 2);
    }

    /// Every assigned point is covered by its ward and by no earlier one.
    #[test]
    fn assigned_ward_is_first_cover() {
        let wards = two_wards();
        let listings: Vec<Listing> = (0..=20)
            .flat_map(|i| (0..=10).map(move |j| listing(i as f64 * 0.1, j as f64 * 0.1)))
            .collect();
        let a = assign_wards(&listings, &wards, &Covers);
        assert_eq!(a.unassigned, 0);

        for al in &a.assigned {
            let p = al.listing.point();
            let pos = wards.iter().position(|w| w.ward_id == al.ward_id).unwrap();
            assert!(Covers.contains_or_touches(&p, &wards[pos].geometry));
            assert!(wards[..pos].iter().all(|w| !Covers.contains_or_touches(&p, &w.geometry)));
        }
    }
}
