use serde::{Deserialize, Serialize};

/// A flat report table as loaded from a CSV export.
///
/// Column 0 holds the row label. Row order matters: the grouping pass reads
/// hierarchy from label content and adjacency alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabularStatement {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TabularStatement {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    /// Convenience constructor for fixtures and demos.
    pub fn from_str_rows(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.rows.is_empty()
    }

    /// Row label (column 0), or `""` for an empty row.
    pub fn label(&self, row: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.first())
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Cell text; out-of-range positions read as blank.
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn header(&self, col: usize) -> &str {
        self.headers.get(col).map(String::as_str).unwrap_or("")
    }

    /// Writes a cell, growing the row with blanks if it is too short.
    pub fn set_cell(&mut self, row: usize, col: usize, value: String) {
        if let Some(cells) = self.rows.get_mut(row) {
            if cells.len() <= col {
                cells.resize(col + 1, String::new());
            }
            cells[col] = value;
        }
    }

    /// First row whose label contains `pattern`.
    pub fn find_row(&self, pattern: &str) -> Option<usize> {
        if pattern.is_empty() {
            return None;
        }
        (0..self.rows.len()).find(|&idx| self.label(idx).contains(pattern))
    }

    /// Copy with every row padded to the header width. Longer rows are kept intact.
    pub fn normalized(&self) -> Self {
        let width = self.width();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let mut row = row.clone();
                if row.len() < width {
                    row.resize(width, String::new());
                }
                row
            })
            .collect();

        Self {
            headers: self.headers.clone(),
            rows,
        }
    }
}

/// The report tables the dashboard knows how to load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum StatementKind {
    CashFlow,
    CashLoan,
    ProfitLoss,
    BalanceSheet,
    WorkingCapital,
}

impl StatementKind {
    /// File stem of the exported table.
    pub fn file_stem(&self) -> &'static str {
        match self {
            StatementKind::CashFlow => "cf",
            StatementKind::CashLoan => "cashloan",
            StatementKind::ProfitLoss => "pl",
            StatementKind::BalanceSheet => "bs",
            StatementKind::WorkingCapital => "wc",
        }
    }
}
