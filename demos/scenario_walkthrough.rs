use financial_report_dashboard::*;
use std::error::Error;

fn print_tree(nodes: &[TreeNode], statement_cols: &[usize]) {
    for node in nodes {
        let indent = "  ".repeat(node.level as usize);
        let marker = match (node.is_collapsible(), node.is_expanded) {
            (true, true) => "▾",
            (true, false) => "▸",
            _ => " ",
        };
        let values: Vec<&str> = statement_cols
            .iter()
            .map(|&col| node.row_data.get(col).map(String::as_str).unwrap_or(""))
            .collect();
        println!("{}{} {:<16} {}", indent, marker, node.label(), values.join(" | "));
        if node.is_expanded {
            print_tree(&node.children, statement_cols);
        }
    }
}

fn main() -> std::result::Result<(), Box<dyn Error>> {
    let data_dir = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "tests/fixtures".to_string());
    let rate: f64 = match std::env::args().nth(2) {
        Some(arg) => arg.parse()?,
        None => 160.0,
    };

    let template = match std::env::var("REPORT_TEMPLATE") {
        Ok(path) => ReportTemplate::load(path)?,
        Err(_) => ReportTemplate::default(),
    };

    println!("📊 Template '{}' v{}", template.name, template.version);
    println!(
        "   reference rate {}%, allowed {}%..={}%\n",
        template.scenario.reference_rate, template.scenario.min_rate, template.scenario.max_rate
    );

    let source = CsvDirectorySource::new(&data_dir);
    let result = ScenarioProcessor::process_from_source(&template, &source, rate)?;

    match &result.cashflow.status {
        RecalcStatus::Recomputed => println!("✅ Cash flow recomputed at {}%", rate),
        RecalcStatus::Partial { missing } => {
            println!("⚠️  Cash flow recomputed at {}%, rows not found: {:?}", rate, missing)
        }
        RecalcStatus::Unchanged { missing } => {
            println!("❌ Cash flow left unchanged, required rows missing: {:?}", missing)
        }
    }

    let mut expansion = ExpansionState::default();
    let forest = build_forest(
        &result.cashflow.statement,
        &template.cashflow_grammar,
        &expansion,
    );
    let layout = &template.layout;
    let cols = [layout.first_period_col, layout.last_period_col, layout.annual_total_col];

    println!("\nCash flow (Jan | Dec | annual):");
    print_tree(&forest.roots, &cols);

    expansion.set_expand_all(true);
    let expanded = build_forest(
        &result.cashflow.statement,
        &template.cashflow_grammar,
        &expansion,
    );
    println!(
        "\n{} of {} rows visible collapsed, {} expanded",
        forest.visible_rows().len(),
        forest.node_count(),
        expanded.visible_rows().len()
    );

    let cashloan = &result.cashloan.statement;
    if let Some(cash) = cashloan.find_row(&template.cashloan.cash_balance_pattern) {
        println!(
            "\n💰 Year-end cash {} (YoY {})",
            cashloan.cell(cash, template.cashloan.closing_col),
            cashloan.cell(cash, template.cashloan.variance_col)
        );
    }

    if let Ok(pl) = source.load(StatementKind::ProfitLoss) {
        println!("\nProfit & loss:");
        let pl = append_yoy_percent(&pl, 1);
        for row in &pl.rows {
            println!("  {}", row.join("  "));
        }
    }

    Ok(())
}
