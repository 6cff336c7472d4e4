use crate::error::Result;
use crate::number::{format_amount, parse_amount, NegativeStyle};
use crate::roles::RowIndexMap;
use crate::schema::{ReportTemplate, RowRole};
use crate::statement::TabularStatement;
use crate::summary::recompute_summary_columns;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

/// Roles without which no forecast cell can be derived.
pub const REQUIRED_CASHFLOW_ROLES: [RowRole; 2] = [RowRole::DrivingRevenue, RowRole::RevenueTotal];

/// How much of a statement a recalculation was able to derive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "PascalCase")]
pub enum RecalcStatus {
    /// Every derived cell was recomputed.
    Recomputed,
    /// Recomputed, but the listed optional rows were absent and skipped.
    Partial { missing: Vec<RowRole> },
    /// A required row was absent; the base statement is returned as-is.
    Unchanged { missing: Vec<RowRole> },
}

impl RecalcStatus {
    pub fn is_unchanged(&self) -> bool {
        matches!(self, RecalcStatus::Unchanged { .. })
    }

    pub fn missing(&self) -> &[RowRole] {
        match self {
            RecalcStatus::Recomputed => &[],
            RecalcStatus::Partial { missing } | RecalcStatus::Unchanged { missing } => missing,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalcOutcome {
    pub statement: TabularStatement,
    pub status: RecalcStatus,
}

impl RecalcOutcome {
    fn unchanged(base: &TabularStatement, missing: Vec<RowRole>) -> Self {
        Self {
            statement: base.clone(),
            status: RecalcStatus::Unchanged { missing },
        }
    }
}

/// Derives scenario statements from a base computed at the template's
/// reference rate.
pub struct ScenarioRecalculator<'a> {
    template: &'a ReportTemplate,
}

impl<'a> ScenarioRecalculator<'a> {
    pub fn new(template: &'a ReportTemplate) -> Self {
        Self { template }
    }

    /// Recomputes the forecast periods of `base` at `target_rate`.
    ///
    /// Actual periods are left untouched. Each forecast period is derived from
    /// the base cells of the same column, except the opening balance, which is
    /// carried from the previous period's recomputed closing balance.
    pub fn recalculate(&self, base: &TabularStatement, target_rate: f64) -> Result<RecalcOutcome> {
        let policy = &self.template.scenario;
        policy.validate_rate(target_rate)?;

        let roles = RowIndexMap::build(base, self.template);
        let missing_required = roles.missing(&REQUIRED_CASHFLOW_ROLES);
        if !missing_required.is_empty() {
            warn!(
                "Cash flow statement lacks required rows {:?}; returning base unchanged",
                missing_required
            );
            return Ok(RecalcOutcome::unchanged(base, missing_required));
        }

        let layout = &self.template.layout;
        let periods = layout.period_cols_within(base.width());
        if periods.is_empty() {
            warn!(
                "Cash flow statement has {} columns, no period column in range; returning base unchanged",
                base.width()
            );
            return Ok(RecalcOutcome::unchanged(base, Vec::new()));
        }

        let ratio = target_rate / policy.reference_rate;
        let style = NegativeStyle::detect(base);
        let first_forecast = layout.first_period_col + policy.actual_periods;

        info!(
            "Recalculating cash flow at {}% (reference {}%, ratio {:.4}), forecast from column {}",
            target_rate, policy.reference_rate, ratio, first_forecast
        );

        let mut pass = ColumnPass {
            base,
            out: base.normalized(),
            roles: &roles,
            template: self.template,
            style,
        };

        // Closing balance of the previous period as displayed, carried left to right.
        let mut carried_closing: Option<f64> = None;

        for col in periods.clone() {
            if col < first_forecast {
                carried_closing = pass.base_value(RowRole::ClosingBalance, col);
                continue;
            }
            carried_closing = pass.recompute_period(col, ratio, carried_closing);
        }

        let summarized =
            recompute_summary_columns(&mut pass.out, layout, &self.template.summary, style);
        debug!("Annual summary columns recomputed: {}", summarized);

        let missing = roles.missing_from(self.template);
        let status = if missing.is_empty() {
            RecalcStatus::Recomputed
        } else {
            debug!("Optional rows absent, skipped: {:?}", missing);
            RecalcStatus::Partial { missing }
        };

        Ok(RecalcOutcome {
            statement: pass.out,
            status,
        })
    }

    /// Copies a recalculated cash flow's balance series into the cash row of the
    /// cash/loan statement, then refreshes that row's variance.
    pub fn propagate_to_cashloan(
        &self,
        base_cashloan: &TabularStatement,
        cashflow: &TabularStatement,
    ) -> RecalcOutcome {
        let mapping = &self.template.cashloan;
        let roles = RowIndexMap::build(cashflow, self.template);

        let cash_row = base_cashloan.find_row(&mapping.cash_balance_pattern);
        let mut missing = roles.missing(&[RowRole::OpeningBalance, RowRole::ClosingBalance]);
        if cash_row.is_none() {
            missing.insert(0, RowRole::CashBalance);
        }

        let (cash_row, opening_row, closing_row) = match (
            cash_row,
            roles.get(RowRole::OpeningBalance),
            roles.get(RowRole::ClosingBalance),
        ) {
            (Some(cash), Some(opening), Some(closing)) => (cash, opening, closing),
            _ => {
                warn!(
                    "Cannot propagate cash balances, rows missing: {:?}; cash/loan statement unchanged",
                    missing
                );
                return RecalcOutcome::unchanged(base_cashloan, missing);
            }
        };

        let layout = &self.template.layout;
        let periods = layout.period_cols_within(cashflow.width());
        if periods.is_empty() {
            warn!("Cash flow statement has no period columns; cash/loan statement unchanged");
            return RecalcOutcome::unchanged(base_cashloan, Vec::new());
        }

        let mut out = base_cashloan.normalized();
        out.set_cell(
            cash_row,
            mapping.opening_col,
            cashflow.cell(opening_row, *periods.start()).to_string(),
        );

        for col in periods.clone() {
            let Some(target) = col.checked_add_signed(mapping.period_col_offset) else {
                debug!("Period column {} maps before the first cash/loan column", col);
                continue;
            };
            out.set_cell(cash_row, target, cashflow.cell(closing_row, col).to_string());
        }

        out.set_cell(
            cash_row,
            mapping.closing_col,
            cashflow.cell(closing_row, *periods.end()).to_string(),
        );

        let variance_marker = &mapping.variance_marker;
        if !variance_marker.is_empty() && out.header(mapping.variance_col).contains(variance_marker.as_str()) {
            let style = NegativeStyle::detect(base_cashloan);
            let variance = parse_amount(out.cell(cash_row, mapping.closing_col))
                - parse_amount(out.cell(cash_row, mapping.prior_col));
            out.set_cell(cash_row, mapping.variance_col, format_amount(variance, style));
        }

        info!(
            "Propagated {} period balances into cash/loan row {}",
            periods.count(),
            cash_row
        );

        RecalcOutcome {
            statement: out,
            status: RecalcStatus::Recomputed,
        }
    }
}

/// Working state of one recalculation: the untouched base and the output
/// being written column by column.
struct ColumnPass<'a> {
    base: &'a TabularStatement,
    out: TabularStatement,
    roles: &'a RowIndexMap,
    template: &'a ReportTemplate,
    style: NegativeStyle,
}

impl<'a> ColumnPass<'a> {
    fn base_value(&self, role: RowRole, col: usize) -> Option<f64> {
        self.roles
            .get(role)
            .map(|row| parse_amount(self.base.cell(row, col)))
    }

    /// Value as written to the output, so subtotals agree with the displayed cells.
    fn out_value(&self, role: RowRole, col: usize) -> Option<f64> {
        self.roles
            .get(role)
            .map(|row| parse_amount(self.out.cell(row, col)))
    }

    fn write(&mut self, role: RowRole, col: usize, value: f64) -> Option<f64> {
        let row = self.roles.get(role)?;
        let text = format_amount(value, self.style);
        let written = parse_amount(&text);
        self.out.set_cell(row, col, text);
        Some(written)
    }

    fn sum_out(&self, roles: &[RowRole], col: usize) -> f64 {
        roles
            .iter()
            .filter_map(|role| self.out_value(*role, col))
            .sum()
    }

    /// Recomputes one forecast column and returns its closing balance.
    fn recompute_period(&mut self, col: usize, ratio: f64, carried_closing: Option<f64>) -> Option<f64> {
        let template = self.template;
        let policy = &template.scenario;

        if col > template.layout.first_period_col {
            if let Some(opening) = carried_closing {
                self.write(RowRole::OpeningBalance, col, opening);
            }
        }

        let base_revenue = self.base_value(RowRole::DrivingRevenue, col).unwrap_or(0.0);
        let scaled = base_revenue * ratio;
        let revenue = self
            .write(RowRole::DrivingRevenue, col, scaled)
            .unwrap_or(0.0);
        // Cost lines follow the unrounded growth.
        let delta = scaled - base_revenue;

        for cost in &policy.variable_costs {
            if let Some(base_cost) = self.base_value(cost.role, col) {
                self.write(cost.role, col, base_cost - delta * cost.fraction);
            }
        }

        let expenses = match self.base_value(RowRole::ExpenseTotal, col) {
            Some(base_total) => {
                let adjusted = base_total - delta * policy.variable_fraction_total();
                self.write(RowRole::ExpenseTotal, col, adjusted).unwrap_or(0.0)
            }
            None => {
                let variable: Vec<RowRole> = policy.variable_costs.iter().map(|c| c.role).collect();
                self.sum_out(&policy.fixed_costs, col) + self.sum_out(&variable, col)
            }
        };

        let sales = revenue + self.sum_out(&policy.revenue_components, col);
        self.write(RowRole::RevenueTotal, col, sales);

        let operating = sales + self.sum_out(&policy.fixed_outflows, col) + expenses;
        let operating = self
            .write(RowRole::OperatingTotal, col, operating)
            .unwrap_or(operating);

        let financing = match self.out_value(RowRole::FinancingTotal, col) {
            Some(total) => total,
            None => self.sum_out(&policy.financing_components, col),
        };

        let net = operating + financing;
        let net = self.write(RowRole::NetCash, col, net).unwrap_or(net);

        // Without an opening row the balance still carries through the accumulator.
        let opening = self
            .out_value(RowRole::OpeningBalance, col)
            .or(carried_closing.filter(|_| col > template.layout.first_period_col))
            .or_else(|| {
                let base_closing = self.base_value(RowRole::ClosingBalance, col)?;
                Some(base_closing - self.base_value(RowRole::NetCash, col).unwrap_or(0.0))
            })?;
        let closing = self.write(RowRole::ClosingBalance, col, opening + net);

        debug!(
            "Column {}: revenue {} (delta {}), operating {}, net {}, closing {:?}",
            col, revenue, delta, operating, net, closing
        );

        closing
    }
}

/// Recalculates a cash flow statement with the given template.
pub fn recalculate_cashflow(
    base: &TabularStatement,
    target_rate: f64,
    template: &ReportTemplate,
) -> Result<RecalcOutcome> {
    ScenarioRecalculator::new(template).recalculate(base, target_rate)
}

pub fn update_cashloan_from_cashflow(
    base_cashloan: &TabularStatement,
    cashflow: &TabularStatement,
    template: &ReportTemplate,
) -> RecalcOutcome {
    ScenarioRecalculator::new(template).propagate_to_cashloan(base_cashloan, cashflow)
}
