use crate::error::{DashboardError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::Path;

/// Semantic role of a cash-flow row, located by label substring.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum RowRole {
    #[schemars(description = "Period opening cash balance")]
    OpeningBalance,
    #[schemars(description = "Operating activities total")]
    OperatingTotal,
    #[schemars(description = "Sales receipts aggregate (driving line plus unscaled revenue lines)")]
    RevenueTotal,
    #[schemars(description = "The scenario-scaled revenue line (online channel)")]
    DrivingRevenue,
    WholesaleRevenue,
    LicenseRevenue,
    #[schemars(description = "Goods purchase payments, a fixed outflow")]
    GoodsPayments,
    #[schemars(description = "Operating expense aggregate")]
    ExpenseTotal,
    Payroll,
    Commission,
    Advertising,
    OtherExpenses,
    #[schemars(description = "Financing activities total, assumed scenario-invariant")]
    FinancingTotal,
    OtherReceipts,
    OtherPayments,
    #[schemars(description = "Net change in cash for the period")]
    NetCash,
    #[schemars(description = "Period closing cash balance")]
    ClosingBalance,
    #[schemars(description = "Cash balance row of the cash/loan balance statement")]
    CashBalance,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct RolePattern {
    pub role: RowRole,
    #[schemars(description = "Substring that identifies the row label. The first matching row wins.")]
    pub pattern: String,
}

/// Hierarchy level a grouping rule assigns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum RuleKind {
    #[schemars(description = "Level-0 row that never has children (opening/closing balances, single-value summaries). Resets both cursors.")]
    Standalone,
    #[schemars(description = "Level-0 activity section. Resets the level-1 cursor.")]
    Section,
    #[schemars(description = "Level-1 sub-category, valid only under a section whose label matches the scope.")]
    SubCategory,
    #[schemars(description = "Level-2 line item, valid only under a sub-category whose label matches the scope.")]
    LineItem,
}

impl RuleKind {
    pub fn level(&self) -> u8 {
        match self {
            RuleKind::Standalone | RuleKind::Section => 0,
            RuleKind::SubCategory => 1,
            RuleKind::LineItem => 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub struct GroupingRule {
    pub kind: RuleKind,

    #[schemars(description = "Label substrings recognised by this rule")]
    pub patterns: Vec<String>,

    #[serde(default)]
    #[schemars(
        description = "Parent label substrings this rule is valid under. Empty means any parent of the right level."
    )]
    pub scope: Vec<String>,

    #[serde(default)]
    #[schemars(description = "Whether nodes created by this rule start expanded")]
    pub default_expanded: bool,
}

impl GroupingRule {
    pub fn new(kind: RuleKind, patterns: &[&str]) -> Self {
        Self {
            kind,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            scope: Vec::new(),
            default_expanded: false,
        }
    }

    pub fn scoped_to(mut self, parents: &[&str]) -> Self {
        self.scope = parents.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn expanded(mut self) -> Self {
        self.default_expanded = true;
        self
    }

    pub fn matches_label(&self, label: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| !p.is_empty() && label.contains(p.as_str()))
    }

    pub fn accepts_parent(&self, parent_label: &str) -> bool {
        self.scope.is_empty()
            || self
                .scope
                .iter()
                .any(|s| !s.is_empty() && parent_label.contains(s.as_str()))
    }
}

/// What happens to a row no rule claims.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum UnmatchedPolicy {
    #[default]
    #[schemars(description = "Attach under the deepest open cursor; top-level orphan when none is open")]
    AttachToCursor,
    #[schemars(description = "Always become a top-level orphan node")]
    TopLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default, JsonSchema)]
pub struct GroupingGrammar {
    pub rules: Vec<GroupingRule>,

    #[serde(default)]
    #[schemars(description = "Label substrings rendered as bold header rows regardless of level")]
    pub header_patterns: Vec<String>,

    #[serde(default)]
    pub unmatched: UnmatchedPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ColumnLayout {
    #[schemars(description = "Prior-year reference total, never recomputed")]
    pub prior_total_col: usize,
    pub first_period_col: usize,
    pub last_period_col: usize,
    pub annual_total_col: usize,
    pub variance_col: usize,
    #[schemars(description = "Header substring required at annual_total_col before it is recomputed")]
    pub annual_total_marker: String,
    #[schemars(description = "Header substring required at prior_total_col before the variance is recomputed")]
    pub prior_total_marker: String,
    #[schemars(description = "Header substring required at variance_col before it is recomputed")]
    pub variance_marker: String,
}

impl ColumnLayout {
    pub fn period_cols(&self) -> RangeInclusive<usize> {
        self.first_period_col..=self.last_period_col
    }

    pub fn period_count(&self) -> usize {
        self.last_period_col + 1 - self.first_period_col
    }

    /// Period range clipped to a statement `width` columns wide.
    pub fn period_cols_within(&self, width: usize) -> RangeInclusive<usize> {
        let last = self.last_period_col.min(width.saturating_sub(1));
        self.first_period_col..=last
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct VariableCost {
    pub role: RowRole,
    #[schemars(description = "Share of the driving-revenue delta added as extra outflow")]
    pub fraction: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ScenarioPolicy {
    #[schemars(description = "Growth rate (percent) the base statement was computed at")]
    pub reference_rate: f64,
    pub min_rate: f64,
    pub max_rate: f64,
    #[schemars(description = "Leading period columns holding actuals; these never change")]
    pub actual_periods: usize,
    pub variable_costs: Vec<VariableCost>,
    #[schemars(description = "Unscaled lines summed with the driving line into RevenueTotal")]
    pub revenue_components: Vec<RowRole>,
    #[schemars(description = "Unscaled cost lines used when ExpenseTotal has to be rebuilt from its parts")]
    pub fixed_costs: Vec<RowRole>,
    #[schemars(description = "Fixed outflow lines added into OperatingTotal")]
    pub fixed_outflows: Vec<RowRole>,
    #[schemars(description = "Lines summed when FinancingTotal is absent")]
    pub financing_components: Vec<RowRole>,
}

impl ScenarioPolicy {
    pub fn variable_fraction_total(&self) -> f64 {
        self.variable_costs.iter().map(|c| c.fraction).sum()
    }

    pub fn validate_rate(&self, rate: f64) -> Result<()> {
        if !rate.is_finite() || rate < self.min_rate || rate > self.max_rate {
            return Err(DashboardError::InvalidScenarioRate {
                value: rate,
                min: self.min_rate,
                max: self.max_rate,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct SummaryPolicy {
    #[schemars(description = "Rows whose label contains this are point-in-time balances")]
    pub balance_keyword: String,
    #[schemars(description = "Balance rows whose label contains this take the first period instead of the last")]
    pub opening_balance_keyword: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct CashloanMapping {
    #[schemars(description = "Label substring of the cash balance row in the cash/loan statement")]
    pub cash_balance_pattern: String,
    #[schemars(description = "Column receiving the first period's opening balance")]
    pub opening_col: usize,
    #[schemars(description = "Cash/loan column = cash-flow period column + offset")]
    pub period_col_offset: isize,
    #[schemars(description = "Column receiving the last period's closing balance")]
    pub closing_col: usize,
    pub prior_col: usize,
    pub variance_col: usize,
    pub variance_marker: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct ReportTemplate {
    #[schemars(description = "Template revision; bump whenever keyword sets or constants change")]
    pub version: String,
    pub name: String,
    pub layout: ColumnLayout,
    pub roles: Vec<RolePattern>,
    pub cashflow_grammar: GroupingGrammar,
    pub cashloan_grammar: GroupingGrammar,
    pub scenario: ScenarioPolicy,
    pub summary: SummaryPolicy,
    pub cashloan: CashloanMapping,
}

impl ReportTemplate {
    pub fn pattern_for(&self, role: RowRole) -> Option<&str> {
        self.roles
            .iter()
            .find(|r| r.role == role)
            .map(|r| r.pattern.as_str())
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let template: ReportTemplate = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn generate_json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(ReportTemplate)
    }

    pub fn schema_as_json() -> std::result::Result<String, serde_json::Error> {
        let schema = Self::generate_json_schema();
        serde_json::to_string_pretty(&schema)
    }

    pub fn validate(&self) -> Result<()> {
        let layout = &self.layout;
        if layout.first_period_col > layout.last_period_col {
            return Err(DashboardError::InvalidTemplate(format!(
                "first period column {} is after last period column {}",
                layout.first_period_col, layout.last_period_col
            )));
        }
        if layout.first_period_col == 0 {
            return Err(DashboardError::InvalidTemplate(
                "column 0 holds the row label, periods cannot start there".to_string(),
            ));
        }
        for (name, col) in [
            ("annual total", layout.annual_total_col),
            ("variance", layout.variance_col),
            ("prior total", layout.prior_total_col),
        ] {
            if layout.period_cols().contains(&col) {
                return Err(DashboardError::InvalidTemplate(format!(
                    "{} column {} overlaps the period range",
                    name, col
                )));
            }
        }

        let scenario = &self.scenario;
        if scenario.actual_periods > layout.period_count() {
            return Err(DashboardError::InvalidTemplate(format!(
                "{} actual periods exceed the {} period columns",
                scenario.actual_periods,
                layout.period_count()
            )));
        }
        if !scenario.reference_rate.is_finite() || scenario.reference_rate <= 0.0 {
            return Err(DashboardError::InvalidTemplate(format!(
                "reference rate must be positive, got {}",
                scenario.reference_rate
            )));
        }
        if !scenario.min_rate.is_finite()
            || !scenario.max_rate.is_finite()
            || scenario.min_rate > scenario.max_rate
        {
            return Err(DashboardError::InvalidTemplate(format!(
                "invalid rate bounds {}..={}",
                scenario.min_rate, scenario.max_rate
            )));
        }
        if let Some(cost) = scenario.variable_costs.iter().find(|c| !c.fraction.is_finite()) {
            return Err(DashboardError::InvalidTemplate(format!(
                "variable cost fraction for {:?} is not finite",
                cost.role
            )));
        }
        if let Some(role) = self.roles.iter().find(|r| r.pattern.trim().is_empty()) {
            return Err(DashboardError::InvalidTemplate(format!(
                "empty label pattern for {:?}",
                role.role
            )));
        }

        Ok(())
    }
}

impl Default for ReportTemplate {
    /// The monthly cash-flow report template: column 1 is the prior-year total,
    /// columns 2..=13 are January to December, 14 the current-year total and 15
    /// the year-over-year variance.
    fn default() -> Self {
        let roles = [
            (RowRole::OpeningBalance, "기초잔액"),
            (RowRole::OperatingTotal, "영업활동"),
            (RowRole::RevenueTotal, "매출수금"),
            (RowRole::DrivingRevenue, "온라인(US+EU)"),
            (RowRole::WholesaleRevenue, "홀세일"),
            (RowRole::LicenseRevenue, "라이선스"),
            (RowRole::GoodsPayments, "물품대 지출"),
            (RowRole::ExpenseTotal, "비용지출"),
            (RowRole::Payroll, "인건비"),
            (RowRole::Commission, "지급수수료"),
            (RowRole::Advertising, "광고선전비"),
            (RowRole::OtherExpenses, "기타비용"),
            (RowRole::FinancingTotal, "재무활동"),
            (RowRole::OtherReceipts, "기타수금"),
            (RowRole::OtherPayments, "기타지출"),
            (RowRole::NetCash, "Net Cash"),
            (RowRole::ClosingBalance, "기말잔액"),
        ]
        .into_iter()
        .map(|(role, pattern)| RolePattern {
            role,
            pattern: pattern.to_string(),
        })
        .collect();

        let cashflow_grammar = GroupingGrammar {
            rules: vec![
                GroupingRule::new(RuleKind::Standalone, &["기초잔액", "기말잔액", "Net Cash"]),
                GroupingRule::new(RuleKind::Section, &["영업활동"]).expanded(),
                GroupingRule::new(RuleKind::Section, &["투자활동", "재무활동"]),
                GroupingRule::new(RuleKind::SubCategory, &["매출수금", "물품대 지출", "비용지출"])
                    .scoped_to(&["영업활동"]),
                GroupingRule::new(RuleKind::SubCategory, &["기타수금", "기타지출"])
                    .scoped_to(&["투자활동", "재무활동"]),
                GroupingRule::new(RuleKind::LineItem, &["온라인", "홀세일", "라이선스"])
                    .scoped_to(&["매출수금"]),
                GroupingRule::new(
                    RuleKind::LineItem,
                    &["인건비", "지급수수료", "광고선전비", "기타비용"],
                )
                .scoped_to(&["비용지출"]),
            ],
            header_patterns: vec![
                "Total".to_string(),
                "Profit".to_string(),
                "Equity".to_string(),
                "합계".to_string(),
            ],
            unmatched: UnmatchedPolicy::AttachToCursor,
        };

        let cashloan_grammar = GroupingGrammar {
            rules: vec![
                GroupingRule::new(RuleKind::Standalone, &["현금잔액", "순현금"]),
                GroupingRule::new(RuleKind::Section, &["차입금"]).expanded(),
            ],
            header_patterns: vec!["합계".to_string()],
            unmatched: UnmatchedPolicy::AttachToCursor,
        };

        Self {
            version: "2026.1".to_string(),
            name: "Monthly cash flow (online growth scenario)".to_string(),
            layout: ColumnLayout {
                prior_total_col: 1,
                first_period_col: 2,
                last_period_col: 13,
                annual_total_col: 14,
                variance_col: 15,
                annual_total_marker: "합계".to_string(),
                prior_total_marker: "25년".to_string(),
                variance_marker: "YoY".to_string(),
            },
            roles,
            cashflow_grammar,
            cashloan_grammar,
            scenario: ScenarioPolicy {
                reference_rate: 130.0,
                min_rate: 100.0,
                max_rate: 200.0,
                actual_periods: 2,
                variable_costs: vec![
                    VariableCost {
                        role: RowRole::Advertising,
                        fraction: 0.20,
                    },
                    VariableCost {
                        role: RowRole::Commission,
                        fraction: 0.10,
                    },
                ],
                revenue_components: vec![RowRole::WholesaleRevenue, RowRole::LicenseRevenue],
                fixed_costs: vec![RowRole::Payroll, RowRole::OtherExpenses],
                fixed_outflows: vec![RowRole::GoodsPayments],
                financing_components: vec![RowRole::OtherReceipts, RowRole::OtherPayments],
            },
            summary: SummaryPolicy {
                balance_keyword: "잔액".to_string(),
                opening_balance_keyword: "기초잔액".to_string(),
            },
            cashloan: CashloanMapping {
                cash_balance_pattern: "현금잔액".to_string(),
                opening_col: 1,
                period_col_offset: 0,
                closing_col: 14,
                prior_col: 1,
                variance_col: 15,
                variance_marker: "YoY".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template_is_valid() {
        let template = ReportTemplate::default();
        assert!(template.validate().is_ok());
        assert_eq!(template.layout.period_count(), 12);
        assert!((template.scenario.variable_fraction_total() - 0.30).abs() < 1e-12);
        assert_eq!(template.pattern_for(RowRole::ClosingBalance), Some("기말잔액"));
    }

    #[test]
    fn test_period_cols_within_clips_to_width() {
        let layout = ReportTemplate::default().layout;
        assert_eq!(layout.period_cols_within(16), 2..=13);
        assert_eq!(layout.period_cols_within(6), 2..=5);
        assert!(layout.period_cols_within(2).is_empty());
    }

    #[test]
    fn test_schema_generation() {
        let schema_json = ReportTemplate::schema_as_json().unwrap();
        assert!(schema_json.contains("reference_rate"));
        assert!(schema_json.contains("cashflow_grammar"));
        assert!(schema_json.contains("variable_costs"));
    }

    #[test]
    fn test_json_round_trip_preserves_template() {
        let template = ReportTemplate::default();
        let json = template.to_json().unwrap();
        let parsed = ReportTemplate::from_json(&json).unwrap();
        assert_eq!(parsed, template);
    }

    #[test]
    fn test_rule_defaults_when_omitted() {
        let rule: GroupingRule =
            serde_json::from_str(r#"{"kind":"Section","patterns":["Operating"]}"#).unwrap();
        assert!(rule.scope.is_empty());
        assert!(!rule.default_expanded);
        assert!(rule.accepts_parent("anything"));
    }

    #[test]
    fn test_validation_rejects_bad_layouts() {
        let mut template = ReportTemplate::default();
        template.layout.first_period_col = 14;
        assert!(matches!(
            template.validate(),
            Err(DashboardError::InvalidTemplate(_))
        ));

        let mut template = ReportTemplate::default();
        template.scenario.actual_periods = 13;
        assert!(template.validate().is_err());

        let mut template = ReportTemplate::default();
        template.scenario.reference_rate = 0.0;
        assert!(template.validate().is_err());

        let mut template = ReportTemplate::default();
        template.layout.annual_total_col = 5;
        assert!(template.validate().is_err());

        let mut template = ReportTemplate::default();
        template.layout.first_period_col = 0;
        template.scenario.actual_periods = 0;
        assert!(matches!(
            template.validate(),
            Err(DashboardError::InvalidTemplate(msg)) if msg.contains("row label")
        ));
    }

    #[test]
    fn test_layout_has_no_movable_label_column() {
        let json = serde_json::to_value(ReportTemplate::default().layout).unwrap();
        assert!(json.get("label_col").is_none());
        assert!(!ReportTemplate::schema_as_json().unwrap().contains("label_col"));
    }

    #[test]
    fn test_rate_bounds() {
        let policy = ReportTemplate::default().scenario;
        assert!(policy.validate_rate(100.0).is_ok());
        assert!(policy.validate_rate(200.0).is_ok());
        assert!(matches!(
            policy.validate_rate(250.0),
            Err(DashboardError::InvalidScenarioRate { .. })
        ));
        assert!(policy.validate_rate(f64::NAN).is_err());
    }
}
