use std::{collections::HashMap, path::Path};

use geo::Point;
use image::{ImageBuffer, ImageResult, Rgb, RgbImage};
use rayon::prelude::*;

use crate::{
    afford::{AffordabilityBand, DashboardRow},
    assign::{locate, AssignedListing, Containment},
    wards::WardPolygon,
};

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const LISTING: Rgb<u8> = Rgb([30, 30, 30]);

pub fn band_colour(band: Option<AffordabilityBand>) -> Rgb<u8> {
    match band {
        Some(AffordabilityBand::MoreAffordable) => Rgb([77, 175, 74]),
        Some(AffordabilityBand::Stretched) => Rgb([255, 217, 47]),
        Some(AffordabilityBand::HighRisk) => Rgb([253, 141, 60]),
        Some(AffordabilityBand::SevereRisk) => Rgb([215, 25, 28]),
        // wards with no dashboard row, or an Unknown band
        Some(AffordabilityBand::Unknown) | None => Rgb([200, 200, 200]),
    }
}

/// Maps lon/lat onto image pixels, keeping the aspect ratio and centring the
/// wards in the frame. Latitude grows upwards.
#[derive(Debug, Clone, Copy)]
struct Frame {
    min_x: f64,
    max_y: f64,
    scale: f64,
    x_offset: f64,
    y_offset: f64,
}

impl Frame {
    fn fit(wards: &[WardPolygon], width: u32, height: u32) -> Option<Self> {
        let mut min_x = f64::INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut max_y = f64::NEG_INFINITY;

        for r in wards.iter().filter_map(|w| w.bbox()) {
            min_x = min_x.min(r.min().x);
            min_y = min_y.min(r.min().y);
            max_x = max_x.max(r.max().x);
            max_y = max_y.max(r.max().y);
        }

        let bbox_width = max_x - min_x;
        let bbox_height = max_y - min_y;
        if !(bbox_width > 1e-14 && bbox_height > 1e-14) {
            return None;
        }

        let scale = (width as f64 / bbox_width).min(height as f64 / bbox_height);
        Some(Self {
            min_x,
            max_y,
            scale,
            x_offset: (width as f64 - bbox_width * scale) / 2.0,
            y_offset: (height as f64 - bbox_height * scale) / 2.0,
        })
    }

    fn to_world(&self, px: f64, py: f64) -> Point<f64> {
        Point::new(
            self.min_x + (px - self.x_offset) / self.scale,
            self.max_y - (py - self.y_offset) / self.scale,
        )
    }

    fn to_image(&self, p: &Point<f64>) -> (f64, f64) {
        (
            (p.x() - self.min_x) * self.scale + self.x_offset,
            (self.max_y - p.y()) * self.scale + self.y_offset,
        )
    }
}

/// Draws a choropleth of the wards coloured by affordability band, with the
/// assigned listings as dots. Each pixel centre takes the first ward that
/// covers it, the same rule used for listings.
pub fn draw_wards<C: Containment + Sync>(
    wards: &[WardPolygon],
    dashboard: &[DashboardRow],
    listings: &[AssignedListing],
    containment: &C,
    width: u32,
    height: u32,
) -> RgbImage {
    let Some(frame) = Frame::fit(wards, width, height) else {
        return ImageBuffer::from_pixel(width, height, BACKGROUND);
    };

    let bands: HashMap<u32, AffordabilityBand> = dashboard
        .iter()
        .map(|r| (r.ward.ward_id, r.affordability_band))
        .collect();

    let pixels: Vec<Rgb<u8>> = (0..width as usize * height as usize)
        .into_par_iter()
        .map(|idx| {
            let x = (idx % width as usize) as f64 + 0.5;
            let y = (idx / width as usize) as f64 + 0.5;
            match locate(&frame.to_world(x, y), wards, containment) {
                Some(id) => band_colour(bands.get(&id).copied()),
                None => BACKGROUND,
            }
        })
        .collect();

    let mut img = ImageBuffer::from_fn(width, height, |x, y| pixels[y as usize * width as usize + x as usize]);

    for l in listings {
        let (cx, cy) = frame.to_image(&l.listing.point());
        let (cx, cy) = (cx.floor() as i64, cy.floor() as i64);
        for dy in -1..=1 {
            for dx in -1..=1 {
                let (x, y) = (cx + dx, cy + dy);
                if x >= 0 && y >= 0 && (x as u32) < width && (y as u32) < height {
                    img.put_pixel(x as u32, y as u32, LISTING);
                }
            }
        }
    }

    img
}

pub fn save_map<P: AsRef<Path>, C: Containment + Sync>(
    path: P,
    wards: &[WardPolygon],
    dashboard: &[DashboardRow],
    listings: &[AssignedListing],
    containment: &C,
    size: u32,
) -> ImageResult<()> {
    draw_wards(wards, dashboard, listings, containment, size, size).save(path)
}
