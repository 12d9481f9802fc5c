use std::{collections::HashSet, fmt, marker::PhantomData};

use itertools::Itertools;
use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use serde_json::Value;

pub type Identifier = String;
pub type ColumnName = Identifier;

/// A JSON object whose key order matters.
///
/// Duplicate keys are kept rather than collapsed, so that
/// [`TableMapping::validate`] can report them.
#[derive(Clone, Debug, PartialEq)]
pub struct OrderedMap<V>(pub Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.0.iter().map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some(entry) = access.next_entry()? {
            entries.push(entry);
        }
        Ok(OrderedMap(entries))
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// One row filter on a source column.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub column_name: ColumnName,
    pub filter_operator: String,
    #[serde(default, deserialize_with = "present")]
    pub value: Option<Value>,
    #[serde(default, alias = "start-value", deserialize_with = "present")]
    pub start_value: Option<Value>,
    #[serde(default, alias = "end-value", deserialize_with = "present")]
    pub end_value: Option<Value>,
}

/// A key that is present is `Some`, even when its value is `null`. Absent keys
/// fall back to the field default.
fn present<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// Column type of an added column, passed through to the rule untouched.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct DataType(pub OrderedMap<Value>);

impl DataType {
    pub fn kind(&self) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| *key == "type")
            .and_then(|(_, value)| value.as_str())
    }
}

/// A computed column added to the target table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddColumn {
    #[serde(default)]
    pub expression: Option<String>,
    /// Columns the expression reads. Informational only; never checked against
    /// the expression text.
    #[serde(default)]
    pub source_columns: Vec<ColumnName>,
    pub data_type: DataType,
}

/// Declarative description of how one source table maps onto one target table.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableMapping {
    pub source_schema: Identifier,
    pub source_table: Identifier,
    pub target_schema: Identifier,
    pub target_table: Identifier,
    #[serde(default)]
    pub filters: Vec<Filter>,
    pub source_column_names: Vec<ColumnName>,
    /// Target column name -> source column name.
    #[serde(default)]
    pub target_column_names: OrderedMap<ColumnName>,
    #[serde(default)]
    pub add_columns: OrderedMap<AddColumn>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must not be empty")]
    EmptyIdentifier { field: &'static str },

    #[error("column {column:?} is listed more than once in sourceColumnNames")]
    DuplicateSourceColumn { column: ColumnName },

    #[error("target column {column:?} is mapped more than once in targetColumnNames")]
    DuplicateTargetColumn { column: ColumnName },

    #[error("column {column:?} is defined more than once in addColumns")]
    DuplicateAddColumn { column: ColumnName },

    #[error("addColumns.{column}.dataType needs a string \"type\"")]
    MissingDataType { column: ColumnName },

    #[error("addColumns.{column}.dataType has key {key:?} more than once")]
    DuplicateDataTypeKey { column: ColumnName, key: String },

    #[error("addColumns.{column} collides with the renamed column targetColumnNames.{column}")]
    AddColumnCollision { column: ColumnName },

    #[error("{field} references column {column:?}, which is not in sourceColumnNames")]
    UnknownSourceColumn { field: String, column: ColumnName },
}

impl TableMapping {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Checks the cross-field consistency the rule compiler relies on. The
    /// first problem found is reported.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("sourceSchema", &self.source_schema),
            ("sourceTable", &self.source_table),
            ("targetSchema", &self.target_schema),
            ("targetTable", &self.target_table),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyIdentifier { field });
            }
        }

        if let Some(column) = self.source_column_names.iter().duplicates().next() {
            return Err(ConfigError::DuplicateSourceColumn {
                column: column.clone(),
            });
        }

        if let Some(column) = self.target_column_names.keys().duplicates().next() {
            return Err(ConfigError::DuplicateTargetColumn {
                column: column.to_owned(),
            });
        }

        if let Some(column) = self.add_columns.keys().duplicates().next() {
            return Err(ConfigError::DuplicateAddColumn {
                column: column.to_owned(),
            });
        }

        let source_columns: HashSet<&str> =
            self.source_column_names.iter().map(String::as_str).collect();

        for (target, source) in self.target_column_names.iter() {
            if !source_columns.contains(source.as_str()) {
                return Err(ConfigError::UnknownSourceColumn {
                    field: format!("targetColumnNames.{}", target),
                    column: source.clone(),
                });
            }
        }

        let renamed: HashSet<&str> = self.target_column_names.keys().collect();
        for (name, add_column) in self.add_columns.iter() {
            if renamed.contains(name) {
                return Err(ConfigError::AddColumnCollision {
                    column: name.to_owned(),
                });
            }

            if add_column.data_type.kind().is_none() {
                return Err(ConfigError::MissingDataType {
                    column: name.to_owned(),
                });
            }

            if let Some(key) = add_column.data_type.0.keys().duplicates().next() {
                return Err(ConfigError::DuplicateDataTypeKey {
                    column: name.to_owned(),
                    key: key.to_owned(),
                });
            }

            if let Some(column) = add_column
                .source_columns
                .iter()
                .find(|column| !source_columns.contains(column.as_str()))
            {
                return Err(ConfigError::UnknownSourceColumn {
                    field: format!("addColumns.{}.sourceColumns", name),
                    column: column.clone(),
                });
            }
        }

        Ok(())
    }
}
