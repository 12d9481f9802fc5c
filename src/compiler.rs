use std::{
    collections::{hash_map, HashMap, HashSet},
    iter,
};

use itertools::Itertools;
use tracing::{debug, warn};

use crate::config::{ConfigError, Filter, TableMapping};
use crate::rules::{
    FilterBlock, FilterCondition, FilterType, ObjectLocator, Rule, RuleDocument, RuleId, RuleKind,
};

/// Validates `mapping` and compiles it into a rule document. Nothing is
/// emitted when validation fails.
pub fn compile(mapping: &TableMapping) -> Result<RuleDocument, ConfigError> {
    mapping.validate()?;
    Ok(compile_unvalidated(mapping))
}

/// Compiles `mapping` without checking it first. Inconsistent input produces
/// rules that point at columns the source table may not have.
pub fn compile_unvalidated(mapping: &TableMapping) -> RuleDocument {
    RuleBuilder::compile(mapping)
}

/// Lower-cases `name` and replaces everything outside `[a-z0-9]` with `-`, one
/// `-` per UTF-16 code unit, so characters outside the BMP become `--`.
pub fn slug(name: &str) -> String {
    name.to_lowercase()
        .chars()
        .flat_map(|c| {
            let (c, count) = if c.is_ascii_lowercase() || c.is_ascii_digit() {
                (c, 1)
            } else {
                ('-', c.len_utf16())
            };
            iter::repeat(c).take(count)
        })
        .collect()
}

impl From<&Filter> for FilterCondition {
    fn from(filter: &Filter) -> Self {
        Self {
            filter_operator: filter.filter_operator.clone(),
            value: filter.value.clone(),
            start_value: filter.start_value.clone(),
            end_value: filter.end_value.clone(),
        }
    }
}

/// Groups filters by column, in order of each column's first appearance.
pub fn filter_blocks(filters: &[Filter]) -> Vec<FilterBlock> {
    let mut blocks: Vec<FilterBlock> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for filter in filters {
        let condition = FilterCondition::from(filter);
        match index.entry(filter.column_name.as_str()) {
            hash_map::Entry::Occupied(occupied) => {
                blocks[*occupied.get()].filter_conditions.push(condition);
            }

            hash_map::Entry::Vacant(vacant) => {
                // The new block's index is the old length.
                vacant.insert(blocks.len());
                blocks.push(FilterBlock {
                    filter_type: FilterType::Source,
                    column_name: filter.column_name.clone(),
                    filter_conditions: vec![condition],
                });
            }
        }
    }

    blocks
}

/// Appends `-<rule-id>` to every rule name that an earlier rule already uses.
fn disambiguate_names(rules: &mut [Rule]) {
    let mut seen = HashSet::new();
    for rule in rules {
        while seen.contains(&rule.name) {
            debug!(rule_id = %rule.id, name = %rule.name, "disambiguating rule name");
            rule.name = format!("{}-{}", rule.name, rule.id);
        }
        seen.insert(rule.name.clone());
    }
}

#[derive(Debug, Default)]
struct RuleBuilder {
    rules: Vec<Rule>,
}

impl RuleBuilder {
    fn push(&mut self, name: String, locator: ObjectLocator, kind: RuleKind) {
        // Ids are positions, so the next id is always one past the length.
        let id = RuleId(self.rules.len() + 1);
        self.rules.push(Rule {
            id,
            name,
            locator,
            kind,
        });
    }

    fn compile_selection(&mut self, mapping: &TableMapping) {
        self.push(
            format!("include-{}-{}", mapping.target_table, mapping.target_schema),
            ObjectLocator::table(&mapping.source_schema, &mapping.source_table),
            RuleKind::Selection {
                filters: filter_blocks(&mapping.filters),
            },
        );
    }

    // Both renames locate the source identifiers: the service applies them
    // before anything has been renamed.
    fn compile_renames(&mut self, mapping: &TableMapping) {
        self.push(
            "rename-table".to_owned(),
            ObjectLocator::table(&mapping.source_schema, &mapping.source_table),
            RuleKind::RenameTable {
                value: mapping.target_table.clone(),
            },
        );
        self.push(
            "rename-schema".to_owned(),
            ObjectLocator::schema(&mapping.source_schema),
            RuleKind::RenameSchema {
                value: mapping.target_schema.clone(),
            },
        );
    }

    fn compile_column_renames(&mut self, mapping: &TableMapping) {
        for (target, source) in mapping.target_column_names.iter() {
            self.push(
                format!("rename-{}-to-{}", slug(source), slug(target)),
                ObjectLocator::column(&mapping.source_schema, &mapping.source_table, source),
                RuleKind::RenameColumn {
                    value: target.to_owned(),
                },
            );
        }
    }

    fn compile_added_columns(&mut self, mapping: &TableMapping) {
        for (name, add_column) in mapping.add_columns.iter() {
            self.push(
                format!("add-column-{}", slug(name)),
                ObjectLocator::table(&mapping.source_schema, &mapping.source_table),
                RuleKind::AddColumn {
                    value: name.to_owned(),
                    data_type: add_column.data_type.clone(),
                    expression: add_column
                        .expression
                        .clone()
                        .filter(|expression| !expression.is_empty()),
                },
            );
        }
    }

    fn compile_removals(&mut self, mapping: &TableMapping) {
        let used: HashSet<&str> = mapping
            .target_column_names
            .values()
            .map(String::as_str)
            .collect();

        let removed = mapping
            .source_column_names
            .iter()
            .filter(|column| !used.contains(column.as_str()))
            .collect_vec();

        // Columns read by an added column's expression are still removed.
        let removed_set: HashSet<&str> = removed.iter().map(|column| column.as_str()).collect();
        for (name, add_column) in mapping.add_columns.iter() {
            for column in add_column
                .source_columns
                .iter()
                .filter(|column| removed_set.contains(column.as_str()))
            {
                warn!(
                    added_column = name,
                    column = column.as_str(),
                    "column is read by an added column but is also removed"
                );
            }
        }

        for column in removed {
            self.push(
                format!("remove-{}", slug(column)),
                ObjectLocator::column(&mapping.source_schema, &mapping.source_table, column),
                RuleKind::RemoveColumn,
            );
        }
    }

    fn compile(mapping: &TableMapping) -> RuleDocument {
        let mut zelf = RuleBuilder::default();
        zelf.compile_selection(mapping);
        zelf.compile_renames(mapping);
        zelf.compile_column_renames(mapping);
        zelf.compile_added_columns(mapping);
        zelf.compile_removals(mapping);

        let mut rules = zelf.rules;
        disambiguate_names(&mut rules);

        debug!(
            source = %format!("{}.{}", mapping.source_schema, mapping.source_table),
            rules = rules.len(),
            "compiled table mapping"
        );

        RuleDocument { rules }
    }
}
