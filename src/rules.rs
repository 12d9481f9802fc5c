use std::fmt;

use serde::{ser::SerializeMap, Serialize, Serializer};
use serde_json::Value;

use crate::config::{ColumnName, DataType, Identifier};

/// Position of a rule in its document, starting at 1. Serialized as a string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RuleId(pub usize);

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for RuleId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ObjectLocator {
    pub schema_name: Identifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<ColumnName>,
}

impl ObjectLocator {
    pub fn schema(schema: &str) -> Self {
        Self {
            schema_name: schema.to_owned(),
            table_name: None,
            column_name: None,
        }
    }

    pub fn table(schema: &str, table: &str) -> Self {
        Self {
            table_name: Some(table.to_owned()),
            ..Self::schema(schema)
        }
    }

    pub fn column(schema: &str, table: &str, column: &str) -> Self {
        Self {
            column_name: Some(column.to_owned()),
            ..Self::table(schema, table)
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    Source,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterCondition {
    pub filter_operator: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_value: Option<Value>,
}

/// All the conditions placed on a single column.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterBlock {
    pub filter_type: FilterType,
    pub column_name: ColumnName,
    pub filter_conditions: Vec<FilterCondition>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum RuleKind {
    Selection {
        filters: Vec<FilterBlock>,
    },
    RenameTable {
        value: Identifier,
    },
    RenameSchema {
        value: Identifier,
    },
    RenameColumn {
        value: ColumnName,
    },
    AddColumn {
        value: ColumnName,
        data_type: DataType,
        expression: Option<String>,
    },
    RemoveColumn,
}

impl RuleKind {
    pub fn category(&self) -> &'static str {
        match self {
            RuleKind::Selection { .. } => "selection",
            RuleKind::RenameTable { .. } => "rename-table",
            RuleKind::RenameSchema { .. } => "rename-schema",
            RuleKind::RenameColumn { .. } => "rename-column",
            RuleKind::AddColumn { .. } => "add-column",
            RuleKind::RemoveColumn => "remove-column",
        }
    }

    fn rule_type(&self) -> &'static str {
        match self {
            RuleKind::Selection { .. } => "selection",
            _ => "transformation",
        }
    }

    fn rule_target(&self) -> &'static str {
        match self {
            RuleKind::RenameTable { .. } => "table",
            RuleKind::RenameSchema { .. } => "schema",
            _ => "column",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Rule {
    pub id: RuleId,
    pub name: String,
    pub locator: ObjectLocator,
    pub kind: RuleKind,
}

// Key order differs between rule kinds and has to match what the migration
// service's own tooling emits, so this is written out by hand.
impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("rule-type", self.kind.rule_type())?;
        map.serialize_entry("rule-id", &self.id)?;
        map.serialize_entry("rule-name", &self.name)?;

        match &self.kind {
            RuleKind::Selection { filters } => {
                map.serialize_entry("object-locator", &self.locator)?;
                map.serialize_entry("rule-action", "include")?;
                map.serialize_entry("filters", filters)?;
            }

            RuleKind::RenameTable { value }
            | RuleKind::RenameSchema { value }
            | RuleKind::RenameColumn { value } => {
                map.serialize_entry("rule-action", "rename")?;
                map.serialize_entry("rule-target", self.kind.rule_target())?;
                map.serialize_entry("object-locator", &self.locator)?;
                map.serialize_entry("value", value)?;
            }

            RuleKind::AddColumn {
                value,
                data_type,
                expression,
            } => {
                map.serialize_entry("rule-action", "add-column")?;
                map.serialize_entry("rule-target", self.kind.rule_target())?;
                map.serialize_entry("object-locator", &self.locator)?;
                map.serialize_entry("value", value)?;
                map.serialize_entry("data-type", data_type)?;
                if let Some(expression) = expression {
                    map.serialize_entry("expression", expression)?;
                }
            }

            RuleKind::RemoveColumn => {
                map.serialize_entry("rule-target", self.kind.rule_target())?;
                map.serialize_entry("object-locator", &self.locator)?;
                map.serialize_entry("rule-action", "remove-column")?;
                map.serialize_entry("value", &Value::Null)?;
                map.serialize_entry("old-value", &Value::Null)?;
            }
        }

        map.end()
    }
}

/// The `table-mappings` document handed to the migration service.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RuleDocument {
    pub rules: Vec<Rule>,
}

impl RuleDocument {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn rules_of<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Rule> + 'a {
        self.rules
            .iter()
            .filter(move |rule| rule.kind.category() == category)
    }
}
