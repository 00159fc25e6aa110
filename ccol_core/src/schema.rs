use std::collections::HashSet;

use crate::error::{CcolError, Result};
use crate::types::ColumnType;

/// One schema entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub column_type: ColumnType,
}

impl Field {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }
}

/// Ordered column declaration shared by writer and reader. Names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::with_capacity(fields.len());
        for f in &fields {
            if !seen.insert(f.name.as_str()) {
                return Err(CcolError::SchemaMismatch(format!(
                    "duplicate column name '{}'",
                    f.name
                )));
            }
        }
        Ok(Self { fields })
    }

    /// Parse `name:type,name:type,...`.
    pub fn parse(spec: &str) -> Result<Self> {
        let fields = spec
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|entry| {
                let (name, ty) = entry.split_once(':').ok_or_else(|| {
                    CcolError::SchemaMismatch(format!(
                        "schema entry '{}' is not of the form name:type",
                        entry
                    ))
                })?;
                Ok(Field::new(name.trim(), ty.trim().parse()?))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(fields)
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }
}

impl<S: Into<String>> TryFrom<Vec<(S, ColumnType)>> for Schema {
    type Error = CcolError;

    fn try_from(pairs: Vec<(S, ColumnType)>) -> Result<Self> {
        Self::new(
            pairs
                .into_iter()
                .map(|(name, ty)| Field::new(name, ty))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schema_string() {
        let schema = Schema::parse("id:int32, price:float64 ,name:string").unwrap();
        let names: Vec<_> = schema.names().collect();
        assert_eq!(names, vec!["id", "price", "name"]);
        assert_eq!(schema.field("price").unwrap().column_type, ColumnType::Float64);
    }

    #[test]
    fn rejects_duplicates_and_bad_types() {
        assert!(matches!(
            Schema::parse("a:int32,a:string"),
            Err(CcolError::SchemaMismatch(_))
        ));
        assert!(Schema::parse("a:int128").is_err());
        assert!(Schema::parse("a").is_err());
    }
}
