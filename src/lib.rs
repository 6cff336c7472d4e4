//! # Financial Report Dashboard
//!
//! The computational core behind a monthly cash-flow reporting dashboard.
//!
//! ## Core Concepts
//!
//! - **Tabular Statement**: a flat CSV export (label column, monthly period columns,
//!   an annual total and a year-over-year variance). Hierarchy is implicit in labels
//!   and row order.
//! - **Grouping**: a declarative [`GroupingGrammar`] rebuilds the section →
//!   sub-category → line-item tree the report is read as.
//! - **Scenario recalculation**: a base statement computed at a reference growth
//!   rate is re-derived at any other rate. Only forecast months move; opening
//!   balances carry from the previous month's recomputed closing balance.
//! - **Cash/loan propagation**: the recalculated balance series is copied into the
//!   cash row of the cash/loan balance statement.
//! - **Report Template**: every keyword set, column position and cost fraction is
//!   data in a versioned [`ReportTemplate`], loadable from JSON.
//!
//! ## Example
//!
//! ```rust,ignore
//! use financial_report_dashboard::*;
//!
//! let template = ReportTemplate::default();
//! let source = CsvDirectorySource::new("data");
//! let result = ScenarioProcessor::process_from_source(&template, &source, 160.0)?;
//!
//! if let RecalcStatus::Partial { missing } = &result.cashflow.status {
//!     println!("rows not found: {:?}", missing);
//! }
//! let forest = build_forest(
//!     &result.cashflow.statement,
//!     &template.cashflow_grammar,
//!     &ExpansionState::default(),
//! );
//! ```

pub mod error;
pub mod grouping;
pub mod ingestion;
pub mod narrative;
pub mod number;
pub mod recalc;
pub mod roles;
pub mod schema;
pub mod statement;
pub mod summary;

pub use error::{DashboardError, Result};
pub use grouping::{
    build_forest, ExpansionState, Forest, NodeId, NodeKind, OutlineEntry, Placement, TreeBuilder,
    TreeNode,
};
pub use ingestion::{decode_report_text, parse_csv_bytes, CsvDirectorySource, StatementSource};
pub use narrative::{
    emphasis_spans, ChangeItem, EmphasisSpan, JsonFileStore, KeyValueStore, MemoryStore,
    NarrativeBoard, NarrativeDefaults, Tone, CHANGES_KEY, INSIGHTS_KEY,
};
pub use number::{format_amount, format_signed_percent, parse_amount, NegativeStyle};
pub use recalc::{
    recalculate_cashflow, update_cashloan_from_cashflow, RecalcOutcome, RecalcStatus,
    ScenarioRecalculator,
};
pub use roles::RowIndexMap;
pub use schema::*;
pub use statement::{StatementKind, TabularStatement};
pub use summary::{append_yoy_percent, recompute_summary_columns, AnnualRule};

use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Both statements derived for one scenario rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioResult {
    pub target_rate: f64,
    pub cashflow: RecalcOutcome,
    pub cashloan: RecalcOutcome,
}

impl ScenarioResult {
    pub fn is_fully_recomputed(&self) -> bool {
        self.cashflow.status == RecalcStatus::Recomputed
            && self.cashloan.status == RecalcStatus::Recomputed
    }
}

pub struct ScenarioProcessor;

impl ScenarioProcessor {
    pub fn process(
        template: &ReportTemplate,
        base_cashflow: &TabularStatement,
        base_cashloan: &TabularStatement,
        target_rate: f64,
    ) -> Result<ScenarioResult> {
        template.validate()?;
        template.scenario.validate_rate(target_rate)?;
        if base_cashflow.width() <= template.layout.first_period_col {
            return Err(DashboardError::StatementShape(format!(
                "cash flow has {} columns, periods start at column {}",
                base_cashflow.width(),
                template.layout.first_period_col
            )));
        }

        info!(
            "Processing scenario {}% with template '{}' v{}",
            target_rate, template.name, template.version
        );
        debug!(
            "Cash flow has {} rows x {} columns, cash/loan has {} rows",
            base_cashflow.rows.len(),
            base_cashflow.width(),
            base_cashloan.rows.len()
        );

        let recalculator = ScenarioRecalculator::new(template);
        let cashflow = recalculator.recalculate(base_cashflow, target_rate)?;
        let cashloan = recalculator.propagate_to_cashloan(base_cashloan, &cashflow.statement);

        debug!(
            "Scenario statuses: cash flow {:?}, cash/loan {:?}",
            cashflow.status, cashloan.status
        );

        Ok(ScenarioResult {
            target_rate,
            cashflow,
            cashloan,
        })
    }

    /// Loads the cash flow and cash/loan tables from `source`, then processes them.
    pub fn process_from_source<S: StatementSource + ?Sized>(
        template: &ReportTemplate,
        source: &S,
        target_rate: f64,
    ) -> Result<ScenarioResult> {
        let cashflow = source.load(StatementKind::CashFlow)?;
        let cashloan = source.load(StatementKind::CashLoan)?;
        Self::process(template, &cashflow, &cashloan, target_rate)
    }
}

pub fn process_scenario(
    template: &ReportTemplate,
    base_cashflow: &TabularStatement,
    base_cashloan: &TabularStatement,
    target_rate: f64,
) -> Result<ScenarioResult> {
    ScenarioProcessor::process(template, base_cashflow, base_cashloan, target_rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(name: &str) -> TabularStatement {
        let bytes = match name {
            "cf" => include_bytes!("../tests/fixtures/cf.csv").as_slice(),
            _ => include_bytes!("../tests/fixtures/cashloan.csv").as_slice(),
        };
        parse_csv_bytes(bytes).unwrap()
    }

    #[test]
    fn test_end_to_end_processing() {
        let template = ReportTemplate::default();
        let result = process_scenario(&template, &fixture("cf"), &fixture("cashloan"), 200.0);
        assert!(result.is_ok());

        let result = result.unwrap();
        assert!(result.is_fully_recomputed());

        let cf = &result.cashflow.statement;
        let online = cf.find_row("온라인").unwrap();
        let ads = cf.find_row("광고선전비").unwrap();
        assert_eq!(cf.cell(online, 2), "1,700");
        assert_eq!(cf.cell(online, 4), "2,692");
        assert_eq!(cf.cell(ads, 4), "-508");

        let closing = cf.find_row("기말잔액").unwrap();
        let cash = result.cashloan.statement.find_row("현금잔액").unwrap();
        for col in 2..=14 {
            assert_eq!(result.cashloan.statement.cell(cash, col), cf.cell(closing, col));
        }
    }

    #[test]
    fn test_reference_rate_keeps_both_statements() {
        let template = ReportTemplate::default();
        let cf = fixture("cf");
        let cashloan = fixture("cashloan");
        let result = ScenarioProcessor::process(&template, &cf, &cashloan, 130.0).unwrap();

        assert_eq!(result.cashflow.statement, cf);
        assert_eq!(result.cashloan.statement, cashloan);
    }

    #[test]
    fn test_invalid_rate_is_rejected_before_work() {
        let template = ReportTemplate::default();
        let result = process_scenario(&template, &fixture("cf"), &fixture("cashloan"), 99.0);
        assert!(matches!(
            result,
            Err(DashboardError::InvalidScenarioRate { value, .. }) if value == 99.0
        ));
    }

    #[test]
    fn test_headerless_cashflow_is_a_shape_error() {
        let template = ReportTemplate::default();
        let result = process_scenario(
            &template,
            &TabularStatement::default(),
            &fixture("cashloan"),
            150.0,
        );
        assert!(matches!(result, Err(DashboardError::StatementShape(_))));
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let mut template = ReportTemplate::default();
        template.layout.last_period_col = 1;
        let result = process_scenario(&template, &fixture("cf"), &fixture("cashloan"), 150.0);
        assert!(matches!(result, Err(DashboardError::InvalidTemplate(_))));
    }
}
