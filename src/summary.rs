use crate::number::{format_amount, format_signed_percent, parse_amount, NegativeStyle};
use crate::schema::{ColumnLayout, SummaryPolicy};
use crate::statement::TabularStatement;
use log::debug;

/// How a row's annual figure is derived from its period cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnualRule {
    /// Opening balance of the year: the first period's cell.
    FirstPeriod,
    /// Point-in-time balance: the last period's cell.
    LastPeriod,
    /// Flow line: sum over every period column.
    Sum,
}

impl AnnualRule {
    pub fn for_label(label: &str, policy: &SummaryPolicy) -> Self {
        let has = |kw: &str| !kw.is_empty() && label.contains(kw);
        if has(&policy.opening_balance_keyword) {
            AnnualRule::FirstPeriod
        } else if has(&policy.balance_keyword) {
            AnnualRule::LastPeriod
        } else {
            AnnualRule::Sum
        }
    }
}

/// Rewrites the annual total column of every row, and the variance column
/// against the untouched prior-year total when the headers carry both.
///
/// Returns `false` (and writes nothing) when the annual total header is absent.
pub fn recompute_summary_columns(
    statement: &mut TabularStatement,
    layout: &ColumnLayout,
    policy: &SummaryPolicy,
    style: NegativeStyle,
) -> bool {
    let header_has = |col: usize, marker: &str| {
        !marker.is_empty() && statement.header(col).contains(marker)
    };

    if !header_has(layout.annual_total_col, &layout.annual_total_marker) {
        debug!(
            "Column {} is not an annual total column; summary left as-is",
            layout.annual_total_col
        );
        return false;
    }
    let has_variance = header_has(layout.variance_col, &layout.variance_marker)
        && header_has(layout.prior_total_col, &layout.prior_total_marker);

    let periods = layout.period_cols_within(statement.width());
    if periods.is_empty() {
        return false;
    }
    let (first, last) = (*periods.start(), *periods.end());

    for row in 0..statement.rows.len() {
        let total = match AnnualRule::for_label(statement.label(row), policy) {
            AnnualRule::FirstPeriod => statement.cell(row, first).to_string(),
            AnnualRule::LastPeriod => statement.cell(row, last).to_string(),
            AnnualRule::Sum => {
                let sum: f64 = periods
                    .clone()
                    .map(|col| parse_amount(statement.cell(row, col)))
                    .sum();
                format_amount(sum, style)
            }
        };

        if has_variance {
            let prior = parse_amount(statement.cell(row, layout.prior_total_col));
            let variance = format_amount(parse_amount(&total) - prior, style);
            statement.set_cell(row, layout.variance_col, variance);
        }
        statement.set_cell(row, layout.annual_total_col, total);
    }

    true
}

/// Appends a `YoY` percent column comparing the last column with the
/// prior-year column, as the profit/loss view shows it.
pub fn append_yoy_percent(statement: &TabularStatement, prior_col: usize) -> TabularStatement {
    if statement.headers.is_empty() {
        return statement.clone();
    }

    let mut out = statement.clone();
    out.headers.push("YoY".to_string());

    for row in &mut out.rows {
        let prior = row.get(prior_col).map(|c| parse_amount(c)).unwrap_or(0.0);
        let current = row.last().map(|c| parse_amount(c)).unwrap_or(0.0);

        let yoy = if prior != 0.0 {
            format_signed_percent((current - prior) / prior.abs() * 100.0)
        } else if current != 0.0 {
            "+100.0%".to_string()
        } else {
            "-".to_string()
        };
        row.push(yoy);
    }

    out
}
