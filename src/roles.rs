use crate::schema::{ReportTemplate, RowRole};
use crate::statement::TabularStatement;
use std::collections::BTreeMap;

/// Role → row position, resolved by label substring against one statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowIndexMap {
    positions: BTreeMap<RowRole, usize>,
}

impl RowIndexMap {
    pub fn build(statement: &TabularStatement, template: &ReportTemplate) -> Self {
        let mut positions = BTreeMap::new();
        for rule in &template.roles {
            if positions.contains_key(&rule.role) {
                continue;
            }
            if let Some(idx) = statement.find_row(&rule.pattern) {
                positions.insert(rule.role, idx);
            }
        }
        Self { positions }
    }

    pub fn get(&self, role: RowRole) -> Option<usize> {
        self.positions.get(&role).copied()
    }

    pub fn contains(&self, role: RowRole) -> bool {
        self.positions.contains_key(&role)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Roles from `wanted` that did not resolve, in the order given.
    pub fn missing(&self, wanted: &[RowRole]) -> Vec<RowRole> {
        wanted
            .iter()
            .copied()
            .filter(|role| !self.contains(*role))
            .collect()
    }

    /// Every role the template declares that this statement lacks.
    pub fn missing_from(&self, template: &ReportTemplate) -> Vec<RowRole> {
        let mut missing: Vec<RowRole> = template
            .roles
            .iter()
            .map(|r| r.role)
            .filter(|role| !self.contains(*role))
            .collect();
        missing.dedup();
        missing
    }
}
