// ABOUTME: Migration plan mapping schemas to table selectors
// ABOUTME: Resolves selectors against the tables actually present in the source

use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Which tables of a schema to migrate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SelectorRepr", into = "SelectorRepr")]
pub enum TableSelector {
    All,
    Tables(Vec<String>),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum SelectorRepr {
    Keyword(String),
    List(Vec<String>),
}

impl TryFrom<SelectorRepr> for TableSelector {
    type Error = String;

    fn try_from(repr: SelectorRepr) -> Result<Self, Self::Error> {
        match repr {
            SelectorRepr::Keyword(k) if k.eq_ignore_ascii_case("all") => Ok(TableSelector::All),
            SelectorRepr::Keyword(k) => Err(format!(
                "unknown table selector '{}': expected \"all\" or a list of table names",
                k
            )),
            SelectorRepr::List(list) if list.len() == 1 && list[0].eq_ignore_ascii_case("all") => {
                Ok(TableSelector::All)
            }
            SelectorRepr::List(list) => Ok(TableSelector::Tables(list)),
        }
    }
}

impl From<TableSelector> for SelectorRepr {
    fn from(selector: TableSelector) -> Self {
        match selector {
            TableSelector::All => SelectorRepr::Keyword("all".to_string()),
            TableSelector::Tables(list) => SelectorRepr::List(list),
        }
    }
}

/// Tables picked by a selector, plus explicitly requested tables the source lacks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedTables {
    pub tables: Vec<String>,
    pub missing: Vec<String>,
}

impl TableSelector {
    /// Resolve against the tables present in the source
    ///
    /// `All` keeps the source's order; an explicit list keeps its own order,
    /// drops duplicates and reports names the source does not have.
    pub fn resolve(&self, available: &[String]) -> ResolvedTables {
        match self {
            TableSelector::All => ResolvedTables {
                tables: available.to_vec(),
                missing: Vec::new(),
            },
            TableSelector::Tables(wanted) => {
                let mut resolved = ResolvedTables::default();
                for name in wanted {
                    if resolved.tables.contains(name) || resolved.missing.contains(name) {
                        continue;
                    }
                    if available.contains(name) {
                        resolved.tables.push(name.clone());
                    } else {
                        resolved.missing.push(name.clone());
                    }
                }
                resolved
            }
        }
    }
}

/// Schema name → table selector; immutable for the duration of a run
///
/// Schemas keep the order they were declared in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationPlan {
    schemas: Vec<(String, TableSelector)>,
}

impl MigrationPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a schema, or replace the selector of one already in the plan
    pub fn with_schema(mut self, schema: impl Into<String>, selector: TableSelector) -> Self {
        let schema = schema.into();
        match self.schemas.iter_mut().find(|(name, _)| *name == schema) {
            Some(entry) => entry.1 = selector,
            None => self.schemas.push((schema, selector)),
        }
        self
    }

    pub fn schemas(&self) -> impl Iterator<Item = (&str, &TableSelector)> {
        self.schemas.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }
}

impl Serialize for MigrationPlan {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.schemas.len()))?;
        for (schema, selector) in &self.schemas {
            map.serialize_entry(schema, selector)?;
        }
        map.end()
    }
}

struct PlanVisitor;

impl<'de> Visitor<'de> for PlanVisitor {
    type Value = MigrationPlan;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a table of schema names to table selectors")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut schemas: Vec<(String, TableSelector)> = Vec::new();
        while let Some((schema, selector)) = access.next_entry::<String, TableSelector>()? {
            if schemas.iter().any(|(name, _)| *name == schema) {
                return Err(de::Error::custom(format!("schema '{}' listed twice", schema)));
            }
            schemas.push((schema, selector));
        }
        Ok(MigrationPlan { schemas })
    }
}

impl<'de> Deserialize<'de> for MigrationPlan {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(PlanVisitor)
    }
}
