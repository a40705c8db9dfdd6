//! Reading the raw tables and writing the two output CSVs.

use std::{io, path::Path, time::Duration};

use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord, Writer};
use geo::{LineString, MultiPolygon, Polygon};
use scraper::{ElementRef, Html, Selector};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::{
    afford::DashboardRow,
    aggregate::{WardAggregate, WardTable},
    error::SchemaError,
    infer::Properties,
    names::WardNames,
    records::{parse_money, parse_number, Listing, ListingTable, WardIncomeRecord},
    wards::WardFeature,
};

pub const OTTAWA_WARDS_URL: &str = "https://maps.ottawa.ca/arcgis/rest/services/Wards/MapServer/0/query?where=1%3D1&outFields=*&outSR=4326&f=geojson";

pub const OTTAWA_WARD_NAMES_URL: &str =
    "https://ottawa.ca/en/city-hall/council-committees-and-boards/how-city-government-works/city-wards";

pub const WARD_AGGREGATES_FILE: &str = "ward_aggregates.csv";
pub const WARD_LOOKUP_FILE: &str = "ward_lookup.csv";
pub const DASHBOARD_FILE: &str = "affordability_dashboard.csv";

const LATITUDE: &[&str] = &["latitude", "lat"];
const LONGITUDE: &[&str] = &["longitude", "lng", "lon"];
const PRICE: &[&str] = &["price"];
const WALK_SCORE: &[&str] = &["walkscore", "walk_score"];
// the raw export stores the listing style in a column called `ward`
const STYLE: &[&str] = &["style", "listing_style", "ward"];

const INCOME_WARD: &[&str] = &["ward", "ward_id"];
const INCOME_VALUE: &[&str] = &[
    "average_household_income",
    "average household income",
    "avg household income",
];
const NAME_WARD: &[&str] = &["ward", "ward_id", "ward number"];
const NAME_VALUE: &[&str] = &["ward_name", "ward name", "name"];

/// Index of the first header matching any of `names`, earlier names first.
fn find_column(headers: &StringRecord, names: &[&str]) -> Option<usize> {
    names
        .iter()
        .find_map(|n| headers.iter().position(|h| h.trim().eq_ignore_ascii_case(n)))
}

fn require_column(
    headers: &StringRecord,
    names: &[&'static str],
    table: &'static str,
) -> Result<usize, SchemaError> {
    find_column(headers, names).ok_or(SchemaError::MissingColumn {
        column: names[0],
        table,
    })
}

fn field<'a>(record: &'a StringRecord, idx: Option<usize>) -> Option<&'a str> {
    idx.and_then(|i| record.get(i))
}

fn parse_ward_id(s: &str) -> Option<u32> {
    let v = parse_number(s)?;
    if v.fract() == 0.0 && v >= 1.0 && v <= u32::MAX as f64 {
        Some(v as u32)
    } else {
        None
    }
}

pub fn read_listings<R: io::Read>(rdr: R) -> Result<ListingTable> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(rdr);
    let headers = rdr.headers()?.clone();

    let lat = require_column(&headers, LATITUDE, "listings")?;
    let lng = require_column(&headers, LONGITUDE, "listings")?;
    let price = require_column(&headers, PRICE, "listings")?;
    let walk = find_column(&headers, WALK_SCORE);
    let style = find_column(&headers, STYLE);

    let mut table = ListingTable::default();
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "unreadable listing row");
                table.rejected += 1;
                continue;
            }
        };

        let listing = Listing::validate(
            field(&record, Some(lat)).and_then(parse_number),
            field(&record, Some(lng)).and_then(parse_number),
            field(&record, Some(price)).and_then(parse_money),
            field(&record, walk).and_then(parse_number),
            field(&record, style).map(str::to_owned),
        );

        match listing {
            Some(l) => table.listings.push(l),
            None => table.rejected += 1,
        }
    }

    Ok(table)
}

pub fn load_listings<P: AsRef<Path>>(path: P) -> Result<ListingTable> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening listings {}", path.display()))?;
    let table = read_listings(file).with_context(|| format!("reading listings {}", path.display()))?;
    info!(
        path = %path.display(),
        kept = table.listings.len(),
        rejected = table.rejected,
        "loaded listings"
    );
    Ok(table)
}

pub fn read_income<R: io::Read>(rdr: R) -> Result<Vec<WardIncomeRecord>> {
    let mut rdr = ReaderBuilder::new().flexible(true).from_reader(rdr);
    let headers = rdr.headers()?.clone();

    let ward = require_column(&headers, INCOME_WARD, "income")?;
    let income = require_column(&headers, INCOME_VALUE, "income")?;

    let mut out = Vec::new();
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "unreadable income row");
                continue;
            }
        };
        let Some(ward_id) = field(&record, Some(ward)).and_then(parse_ward_id) else {
            debug!(row = ?record, "income row without ward number");
            continue;
        };
        out.push(WardIncomeRecord {
            ward_id,
            average_household_income: field(&record, Some(income)).and_then(parse_money),
        });
    }

    Ok(out)
}

pub fn load_income<P: AsRef<Path>>(path: P) -> Result<Vec<WardIncomeRecord>> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).with_context(|| format!("opening income {}", path.display()))?;
    let rows = read_income(file).with_context(|| format!("reading income {}", path.display()))?;
    info!(path = %path.display(), rows = rows.len(), "loaded income");
    Ok(rows)
}

pub fn load_ward_names<P: AsRef<Path>>(path: P) -> Result<Vec<(u32, String)>> {
    let path = path.as_ref();
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("opening ward names {}", path.display()))?;
    let headers = rdr.headers()?.clone();

    let ward = require_column(&headers, NAME_WARD, "ward names")?;
    let name = require_column(&headers, NAME_VALUE, "ward names")?;

    let mut out = Vec::new();
    for result in rdr.records() {
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "unreadable ward name row");
                continue;
            }
        };
        if let (Some(id), Some(n)) = (
            field(&record, Some(ward)).and_then(parse_ward_id),
            field(&record, Some(name)),
        ) {
            out.push((id, n.to_owned()));
        }
    }
    Ok(out)
}

fn cell_text(cell: ElementRef) -> String {
    cell.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("bad selector {}: {:?}", css, e))
}

/// Pulls `(ward, name)` pairs out of the first HTML table whose header has
/// both a ward number and a ward name column.
pub fn parse_ward_names_html(html: &str) -> Result<Vec<(u32, String)>> {
    let doc = Html::parse_document(html);
    let tables = selector("table")?;
    let rows = selector("tr")?;
    let cells = selector("th, td")?;

    for table in doc.select(&tables) {
        let mut trs = table.select(&rows);
        let Some(header) = trs.next() else { continue };
        let header: Vec<String> = header.select(&cells).map(|c| cell_text(c).to_lowercase()).collect();

        let ward = header.iter().position(|h| h.contains("ward") && h.contains("number"));
        let name = header.iter().position(|h| h.contains("ward") && h.contains("name"));
        let (Some(ward), Some(name)) = (ward, name) else {
            continue;
        };

        let mut out = Vec::new();
        for tr in trs {
            let row: Vec<String> = tr.select(&cells).map(cell_text).collect();
            // cells may read "Ward 12"
            let id = row
                .get(ward)
                .and_then(|s| parse_ward_id(s.trim_start_matches(|c: char| !c.is_ascii_digit())));
            if let (Some(id), Some(n)) = (id, row.get(name)) {
                if !n.is_empty() {
                    out.push((id, n.clone()));
                }
            }
        }
        out.sort_by_key(|(id, _)| *id);
        return Ok(out);
    }

    Err(anyhow!("no ward number/name table found"))
}

pub fn fetch_ward_names(url: &str) -> Result<Vec<(u32, String)>> {
    info!(url, "fetching ward names");
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let html = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .with_context(|| format!("fetching ward names from {}", url))?;
    parse_ward_names_html(&html)
}

#[derive(Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Option<Properties>,
    #[serde(default)]
    geometry: Option<GeometryJson>,
}

type Ring = Vec<Vec<f64>>;

#[derive(Deserialize)]
#[serde(tag = "type")]
enum GeometryJson {
    Polygon { coordinates: Vec<Ring> },
    MultiPolygon { coordinates: Vec<Vec<Ring>> },
    #[serde(other)]
    Other,
}

fn ring(coords: &Ring) -> LineString<f64> {
    coords
        .iter()
        .filter(|c| c.len() >= 2)
        .map(|c| (c[0], c[1]))
        .collect::<Vec<_>>()
        .into()
}

fn polygon(rings: &[Ring]) -> Option<Polygon<f64>> {
    let (exterior, holes) = rings.split_first()?;
    let exterior = ring(exterior);
    if exterior.0.len() < 3 {
        return None;
    }
    Some(Polygon::new(exterior, holes.iter().map(ring).collect()))
}

impl GeometryJson {
    fn into_multi_polygon(self) -> Option<MultiPolygon<f64>> {
        let polys: Vec<Polygon<f64>> = match self {
            Self::Polygon { coordinates } => polygon(&coordinates).into_iter().collect(),
            Self::MultiPolygon { coordinates } => coordinates.iter().filter_map(|p| polygon(p)).collect(),
            Self::Other => Vec::new(),
        };
        if polys.is_empty() {
            None
        } else {
            Some(MultiPolygon::new(polys))
        }
    }
}

/// Parses a GeoJSON feature collection. Features without an areal geometry
/// are skipped.
pub fn parse_ward_features(json: &str) -> Result<Vec<WardFeature>> {
    let collection: FeatureCollection = serde_json::from_str(json).context("parsing ward GeoJSON")?;

    let mut out = Vec::with_capacity(collection.features.len());
    for (i, feature) in collection.features.into_iter().enumerate() {
        match feature.geometry.and_then(GeometryJson::into_multi_polygon) {
            Some(geometry) => out.push(WardFeature {
                properties: feature.properties.unwrap_or_default(),
                geometry,
            }),
            None => warn!(feature = i, "skipping feature without polygon geometry"),
        }
    }
    Ok(out)
}

pub fn load_ward_features<P: AsRef<Path>>(path: P) -> Result<Vec<WardFeature>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).with_context(|| format!("reading wards {}", path.display()))?;
    let features = parse_ward_features(&text)?;
    info!(path = %path.display(), features = features.len(), "loaded ward polygons");
    Ok(features)
}

pub fn fetch_ward_features(url: &str) -> Result<Vec<WardFeature>> {
    info!(url, "fetching ward polygons");
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    let text = client
        .get(url)
        .send()
        .and_then(|r| r.error_for_status())
        .and_then(|r| r.text())
        .with_context(|| format!("fetching wards from {}", url))?;
    let features = parse_ward_features(&text)?;
    info!(features = features.len(), "fetched ward polygons");
    Ok(features)
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| x.to_string()).unwrap_or_default()
}

fn aggregate_header(categories: &[String]) -> Vec<String> {
    let mut h: Vec<String> = [
        "ward_id",
        "listing_count",
        "median_price",
        "mean_price",
        "median_walk_score",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    h.extend(categories.iter().map(|c| format!("style_share_{}", c)));
    h
}

fn aggregate_fields(row: &WardAggregate, categories: &[String]) -> Vec<String> {
    let mut f = vec![
        row.ward_id.to_string(),
        row.listing_count.to_string(),
        opt(row.median_price),
        opt(row.mean_price),
        opt(row.median_walk_score),
    ];
    f.extend(
        categories
            .iter()
            .map(|c| row.style_shares.get(c).copied().unwrap_or(0.0).to_string()),
    );
    f
}

pub fn write_ward_table<W: io::Write>(writer: W, table: &WardTable) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(aggregate_header(&table.categories))?;
    for row in &table.rows {
        wtr.write_record(aggregate_fields(row, &table.categories))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_dashboard<W: io::Write>(
    writer: W,
    categories: &[String],
    rows: &[DashboardRow],
    names: &WardNames,
) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);

    let mut header = aggregate_header(categories);
    header.extend(
        [
            "average_household_income",
            "affordability_ratio",
            "affordability_band",
            "ward_label",
            "ward_name",
            "ward_full",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    wtr.write_record(header)?;

    for row in rows {
        let id = row.ward.ward_id;
        let mut f = aggregate_fields(&row.ward, categories);
        f.push(opt(row.average_household_income));
        f.push(opt(row.affordability_ratio));
        f.push(row.affordability_band.to_string());
        f.push(row.ward_label());
        f.push(names.name(id).unwrap_or_default().to_owned());
        f.push(names.full(id));
        wtr.write_record(f)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_ward_lookup<W: io::Write>(writer: W, names: &WardNames) -> Result<()> {
    let mut wtr = Writer::from_writer(writer);
    wtr.write_record(["Ward", "Ward_Name", "Ward_Full"])?;
    for (id, name) in names.entries() {
        wtr.write_record([id.to_string(), name.to_owned(), names.full(id)])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn save_outputs<P: AsRef<Path>>(
    out_dir: P,
    table: &WardTable,
    dashboard: &[DashboardRow],
    names: &WardNames,
) -> Result<()> {
    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let path = out_dir.join(WARD_AGGREGATES_FILE);
    let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    write_ward_table(file, table)?;
    info!(path = %path.display(), rows = table.rows.len(), "wrote ward aggregates");

    let path = out_dir.join(DASHBOARD_FILE);
    let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    write_dashboard(file, &table.categories, dashboard, names)?;
    info!(path = %path.display(), rows = dashboard.len(), "wrote dashboard");

    let path = out_dir.join(WARD_LOOKUP_FILE);
    let file = std::fs::File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    write_ward_lookup(file, names)?;
    info!(path = %path.display(), rows = names.len(), "wrote ward lookup");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{afford::AffordabilityBand, aggregate::WardAggregate};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::io::Write;

    #[test]
    fn listings_with_messy_values() {
        let csv = "\
latitude,longitude,price,walkScore,ward
45.42,-75.69,\"$649,900\",88,Detached
45.43,-75.70,Contact agent,70,Condo
,-75.70,500000,,Condo
45.44,-75.71,\"1,200,000\",n/a,
";
        let t = read_listings(csv.as_bytes()).unwrap();
        assert_eq!(t.listings.len(), 2);
        assert_eq!(t.rejected, 2);
        assert_eq!(t.listings[0].price, 649_900.0);
        assert_eq!(t.listings[0].walk_score, Some(88.0));
        assert_eq!(t.listings[0].style.as_deref(), Some("Detached"));
        assert_eq!(t.listings[1].walk_score, None);
        assert_eq!(t.listings[1].style, None);
    }

    #[test]
    fn listings_need_required_columns() {
        let err = read_listings("latitude,price\n1,2\n".as_bytes()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SchemaError>(),
            Some(&SchemaError::MissingColumn {
                column: "longitude",
                table: "listings"
            })
        );
    }

    #[test]
    fn income_rows() {
        let csv = "\
Ward,Average_Household_Income
1,120000
2.0,
x,99
3,\"$95,000\"
";
        let rows = read_income(csv.as_bytes()).unwrap();
        assert_eq!(
            rows,
            vec![
                WardIncomeRecord { ward_id: 1, average_household_income: Some(120_000.0) },
                WardIncomeRecord { ward_id: 2, average_household_income: None },
                WardIncomeRecord { ward_id: 3, average_household_income: Some(95_000.0) },
            ]
        );
    }

    #[test]
    fn income_needs_value_column() {
        let err = read_income("Ward,Population\n1,5\n".as_bytes()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<SchemaError>(),
            Some(SchemaError::MissingColumn { table: "income", .. })
        ));
    }

    #[test]
    fn geojson_features() {
        let json = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"WARD_NUM": "1", "NAME": "A"},
                 "geometry": {"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,1],[0,0]]]}},
                {"type": "Feature", "properties": {"WARD_NUM": "2", "NAME": "B"},
                 "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[1,0,5],[2,0,5],[2,1,5],[1,0,5]]],
                    [[[3,0],[4,0],[4,1],[3,0]]]
                 ]}},
                {"type": "Feature", "properties": {"WARD_NUM": "3"},
                 "geometry": {"type": "Point", "coordinates": [0, 0]}},
                {"type": "Feature", "properties": null, "geometry": null}
            ]
        }"#;
        let features = parse_ward_features(json).unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0].properties.keys().collect::<Vec<_>>(), vec!["WARD_NUM", "NAME"]);
        assert_eq!(features[1].geometry.0.len(), 2);
    }

    #[test]
    fn ward_names_file() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        write!(f, "Ward,Ward_Name\n1,East\nnope,West\n2,Middle\n").unwrap();
        let names = load_ward_names(f.path()).unwrap();
        assert_eq!(names, vec![(1, "East".to_owned()), (2, "Middle".to_owned())]);
    }

    #[test]
    fn output_tables() {
        let mut shares = BTreeMap::new();
        shares.insert("Condo".to_owned(), 0.25);
        shares.insert("Detached".to_owned(), 0.75);
        let table = WardTable {
            categories: vec!["Condo".to_owned(), "Detached".to_owned()],
            rows: vec![WardAggregate {
                ward_id: 14,
                listing_count: 4,
                median_price: Some(600000.0),
                mean_price: Some(612500.5),
                median_walk_score: None,
                style_shares: shares,
            }],
        };

        let mut buf = Vec::new();
        write_ward_table(&mut buf, &table).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "ward_id,listing_count,median_price,mean_price,median_walk_score,style_share_Condo,style_share_Detached\n\
             14,4,600000,612500.5,,0.25,0.75\n"
        );

        let rows = vec![DashboardRow::new(table.rows[0].clone(), Some(100000.0))];
        assert_eq!(rows[0].affordability_band, AffordabilityBand::HighRisk);

        let mut buf = Vec::new();
        write_dashboard(&mut buf, &table.categories, &rows, &WardNames::fallback()).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().ends_with(
            "average_household_income,affordability_ratio,affordability_band,ward_label,ward_name,ward_full"
        ));
        assert_eq!(
            lines.next().unwrap(),
            "14,4,600000,612500.5,,0.25,0.75,100000,6,High Risk (6–8x),Ward 14,Somerset,Ward 14 - Somerset"
        );
    }

    #[test]
    fn outputs_land_in_dir() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        save_outputs(&out, &WardTable::default(), &[], &WardNames::default()).unwrap();
        assert!(out.join(WARD_AGGREGATES_FILE).exists());
        assert!(out.join(DASHBOARD_FILE).exists());
        assert!(out.join(WARD_LOOKUP_FILE).exists());
    }

    #[test]
    fn ward_lookup_table() {
        let mut names = WardNames::default();
        names.extend(vec![(12, "Rideau-Vanier".to_owned()), (3, "Barrhaven West".to_owned())]);

        let mut buf = Vec::new();
        write_ward_lookup(&mut buf, &names).unwrap();
        assert_eq!(
            String::from_utf8(buf).unwrap(),
            "Ward,Ward_Name,Ward_Full\n\
             3,Barrhaven West,Ward 3 - Barrhaven West\n\
             12,Rideau-Vanier,Ward 12 - Rideau-Vanier\n"
        );
    }

    const WARDS_PAGE: &str = r#"<html><body>
        <table><tr><th>Councillor</th><th>Phone</th></tr><tr><td>A</td><td>1</td></tr></table>
        <table class="wards">
          <thead><tr><th>Ward number</th><th>Ward name</th><th>Councillor</th></tr></thead>
          <tbody>
            <tr><td>2</td><td><a href="/w2">Orléans West-Innes</a></td><td>B</td></tr>
            <tr><td>Ward 1</td><td>Orléans   East-Cumberland</td><td>C</td></tr>
            <tr><td>n/a</td><td>Nowhere</td><td>D</td></tr>
            <tr><td>3</td><td></td><td>E</td></tr>
          </tbody>
        </table>
    </body></html>"#;

    #[test]
    fn ward_names_from_html() {
        let names = parse_ward_names_html(WARDS_PAGE).unwrap();
        assert_eq!(
            names,
            vec![
                (1, "Orléans East-Cumberland".to_owned()),
                (2, "Orléans West-Innes".to_owned()),
            ]
        );
    }

    #[test]
    fn html_without_ward_table_is_an_error() {
        let page = "<html><body><table><tr><th>Name</th></tr><tr><td>x</td></tr></table></body></html>";
        assert!(parse_ward_names_html(page).is_err());
        assert_eq!(WardNames::resolve(parse_ward_names_html(page)).len(), 24);
    }

    #[test]
    fn unreadable_rows_are_skipped() {
        let mut income = b"Ward,Average_Household_Income\n1,100000\n".to_vec();
        income.extend_from_slice(b"2,\xff\xfe\n3,90000\n");
        let rows = read_income(income.as_slice()).unwrap();
        assert_eq!(rows.iter().map(|r| r.ward_id).collect::<Vec<_>>(), vec![1, 3]);

        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"Ward,Ward_Name\n1,East\n2,\xffbad\n3,South\n").unwrap();
        let names = load_ward_names(f.path()).unwrap();
        assert_eq!(names, vec![(1, "East".to_owned()), (3, "South".to_owned())]);
    }
}
