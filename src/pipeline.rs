use tracing::info;

use crate::{
    afford::{join_income, DashboardRow},
    aggregate::{aggregate_wards, WardTable},
    assign::{assign_wards, AssignedListing, Containment},
    records::{ListingTable, WardIncomeRecord},
    wards::WardPolygon,
};

/// Row counts at each stage of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub rows_read: usize,
    pub rows_rejected: usize,
    pub assigned: usize,
    pub unassigned: usize,
    pub wards: usize,
    pub income_rows: usize,
    pub dashboard_rows: usize,
}

impl RunSummary {
    pub fn log(&self) {
        info!(
            rows_read = self.rows_read,
            rows_rejected = self.rows_rejected,
            assigned = self.assigned,
            unassigned = self.unassigned,
            wards = self.wards,
            income_rows = self.income_rows,
            dashboard_rows = self.dashboard_rows,
            "pipeline finished"
        );
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub assigned: Vec<AssignedListing>,
    pub wards: WardTable,
    pub dashboard: Vec<DashboardRow>,
    pub summary: RunSummary,
}

/// Runs assignment, aggregation and the income join over one snapshot.
/// Each stage completes before the next starts.
pub fn run<C: Containment>(
    listings: &ListingTable,
    wards: &[WardPolygon],
    incomes: &[WardIncomeRecord],
    containment: &C,
) -> PipelineOutput {
    let assignment = assign_wards(&listings.listings, wards, containment);
    info!(
        assigned = assignment.assigned.len(),
        unassigned = assignment.unassigned,
        "assigned listings to wards"
    );

    let table = aggregate_wards(&assignment.assigned);
    let dashboard = join_income(&table, incomes);

    let summary = RunSummary {
        rows_read: listings.listings.len() + listings.rejected,
        rows_rejected: listings.rejected,
        assigned: assignment.assigned.len(),
        unassigned: assignment.unassigned,
        wards: table.rows.len(),
        income_rows: incomes.len(),
        dashboard_rows: dashboard.len(),
    };

    PipelineOutput {
        assigned: assignment.assigned,
        wards: table,
        dashboard,
        summary,
    }
}
