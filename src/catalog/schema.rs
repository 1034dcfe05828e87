use crate::error::{GranaryError, GranaryResult};
use crate::sql::parse_single_statement;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Attribute type with its maximum byte size. `Char` and `Varchar` carry the
/// declared length `n`; `Int` is always 4 bytes on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Int,
    Char(usize),
    Varchar(usize),
}

impl DataType {
    pub fn max_size(&self) -> usize {
        match self {
            DataType::Int => 4,
            DataType::Char(n) | DataType::Varchar(n) => *n,
        }
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            DataType::Int => write!(f, "Int"),
            DataType::Char(n) => write!(f, "Char({n})"),
            DataType::Varchar(n) => write!(f, "Varchar({n})"),
        }
    }
}

impl TryFrom<&sqlparser::ast::DataType> for DataType {
    type Error = GranaryError;

    fn try_from(value: &sqlparser::ast::DataType) -> Result<Self, Self::Error> {
        match value {
            sqlparser::ast::DataType::Int(_) | sqlparser::ast::DataType::Integer(_) => {
                Ok(DataType::Int)
            }
            sqlparser::ast::DataType::Char(Some(len))
            | sqlparser::ast::DataType::Character(Some(len)) => match len {
                sqlparser::ast::CharacterLength::IntegerLength { length, .. } => {
                    Ok(DataType::Char(*length as usize))
                }
                sqlparser::ast::CharacterLength::Max => Err(GranaryError::NotSupport(format!(
                    "Not support datatype {}",
                    value
                ))),
            },
            sqlparser::ast::DataType::Varchar(Some(len))
            | sqlparser::ast::DataType::CharacterVarying(Some(len)) => match len {
                sqlparser::ast::CharacterLength::IntegerLength { length, .. } => {
                    Ok(DataType::Varchar(*length as usize))
                }
                sqlparser::ast::CharacterLength::Max => Err(GranaryError::NotSupport(format!(
                    "Not support datatype {}",
                    value
                ))),
            },
            _ => Err(GranaryError::NotSupport(format!(
                "Not support datatype {}",
                value
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub data_type: DataType,
    pub not_null: bool,
    pub unique: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, data_type: DataType, not_null: bool, unique: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            not_null,
            unique,
        }
    }
}

pub type AttributeRef = Arc<Attribute>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: String,
    pub attributes: Vec<AttributeRef>,
    pub is_temp: bool,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, attributes: Vec<Attribute>, is_temp: bool) -> Self {
        Self {
            name: name.into(),
            attributes: attributes.into_iter().map(Arc::new).collect(),
            is_temp,
        }
    }

    /// Builds a schema from a `CREATE TABLE` statement. Column order
    /// determines attribute order; `NOT NULL` and `UNIQUE` (including
    /// `PRIMARY KEY`) set the corresponding flags.
    pub fn from_create_table_sql(sql: &str) -> GranaryResult<TableSchema> {
        let (name, columns) = match parse_single_statement(sql)? {
            sqlparser::ast::Statement::CreateTable { name, columns, .. } => (name, columns),
            other => {
                return Err(GranaryError::Storage(format!(
                    "expected a CREATE TABLE statement, got: {}",
                    other
                )))
            }
        };
        let table_name = object_name(&name)?;
        let mut attributes = Vec::with_capacity(columns.len());
        for column in &columns {
            let data_type: DataType = (&column.data_type).try_into()?;
            let not_null = column
                .options
                .iter()
                .any(|opt| matches!(opt.option, sqlparser::ast::ColumnOption::NotNull));
            let unique = column
                .options
                .iter()
                .any(|opt| matches!(opt.option, sqlparser::ast::ColumnOption::Unique { .. }));
            if attributes
                .iter()
                .any(|a: &Attribute| a.name.eq_ignore_ascii_case(&column.name.value))
            {
                return Err(GranaryError::Storage(format!(
                    "duplicated column name '{}' in table {}",
                    column.name.value, table_name
                )));
            }
            attributes.push(Attribute::new(
                column.name.value.clone(),
                data_type,
                not_null,
                unique,
            ));
        }
        Ok(TableSchema::new(table_name, attributes, false))
    }

    pub fn attr_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn attribute(&self, index: usize) -> GranaryResult<&AttributeRef> {
        self.attributes.get(index).ok_or_else(|| {
            GranaryError::Internal(format!(
                "no attribute at ordinal {} in table {}",
                index, self.name
            ))
        })
    }

    /// Ordinal of the attribute with the given name.
    pub fn index_of(&self, name: &str) -> GranaryResult<usize> {
        self.attributes
            .iter()
            .position(|attr| attr.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                GranaryError::Internal(format!(
                    "no attribute named \"{}\" in table {}",
                    name, self.name
                ))
            })
    }

    /// Pairs of ordinals `(left, right)` whose attributes share name and type.
    pub fn common_attributes(&self, other: &TableSchema) -> Vec<(usize, usize)> {
        let mut common = Vec::new();
        for (left_idx, left) in self.attributes.iter().enumerate() {
            let matched = other.attributes.iter().position(|right| {
                right.name.eq_ignore_ascii_case(&left.name) && right.data_type == left.data_type
            });
            if let Some(right_idx) = matched {
                common.push((left_idx, right_idx));
            }
        }
        common
    }

    /// Natural-join result schema: all left attributes in order, then the
    /// right attributes whose `(name, type)` pair is absent on the left.
    pub fn natural_join(&self, other: &TableSchema) -> TableSchema {
        let shared: Vec<usize> = self
            .common_attributes(other)
            .into_iter()
            .map(|(_, right_idx)| right_idx)
            .collect();
        let mut attributes: Vec<AttributeRef> = self.attributes.clone();
        for (idx, attr) in other.attributes.iter().enumerate() {
            if !shared.contains(&idx) {
                attributes.push(attr.clone());
            }
        }
        TableSchema {
            name: format!("{}_{}", self.name, other.name),
            attributes,
            is_temp: true,
        }
    }

    /// Same attributes under a different table name; used for temporary
    /// relations such as Grace partitions.
    pub fn renamed(&self, name: impl Into<String>) -> TableSchema {
        TableSchema {
            name: name.into(),
            attributes: self.attributes.clone(),
            is_temp: true,
        }
    }
}

pub(crate) fn object_name(name: &sqlparser::ast::ObjectName) -> GranaryResult<String> {
    match name.0.as_slice() {
        [table] => Ok(table.value.clone()),
        _ => Err(GranaryError::NotSupport(format!(
            "qualified table name {} not supported",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::{Attribute, DataType, TableSchema};

    #[test]
    fn schema_from_create_table_sql() {
        let schema = TableSchema::from_create_table_sql(
            "CREATE TABLE emp (id INT NOT NULL UNIQUE, name VARCHAR(20), dept CHAR(8) NOT NULL);",
        )
        .unwrap();
        assert_eq!(schema.name, "emp");
        assert_eq!(schema.attr_count(), 3);
        let id = schema.attribute(0).unwrap();
        assert_eq!(id.data_type, DataType::Int);
        assert!(id.not_null);
        assert!(id.unique);
        let name = schema.attribute(1).unwrap();
        assert_eq!(name.data_type, DataType::Varchar(20));
        assert!(!name.not_null);
        let dept = schema.attribute(2).unwrap();
        assert_eq!(dept.data_type, DataType::Char(8));
        assert!(dept.not_null);
        assert_eq!(schema.index_of("NAME").unwrap(), 1);
    }

    #[test]
    fn schema_rejects_duplicate_columns() {
        let err =
            TableSchema::from_create_table_sql("CREATE TABLE t (a INT, a INT);").unwrap_err();
        assert!(err.to_string().contains("duplicated column"));
    }

    #[test]
    fn natural_join_schema_drops_shared_right_attributes() {
        let left = TableSchema::new(
            "r",
            vec![
                Attribute::new("a", DataType::Int, false, false),
                Attribute::new("b", DataType::Int, false, false),
            ],
            false,
        );
        let right = TableSchema::new(
            "s",
            vec![
                Attribute::new("a", DataType::Int, false, false),
                Attribute::new("c", DataType::Varchar(10), false, false),
            ],
            false,
        );

        assert_eq!(left.common_attributes(&right), vec![(0, 0)]);
        let joined = left.natural_join(&right);
        let names: Vec<&str> = joined
            .attributes
            .iter()
            .map(|attr| attr.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(joined.is_temp);
    }

    #[test]
    fn same_name_different_type_is_not_common() {
        let left = TableSchema::new(
            "r",
            vec![Attribute::new("a", DataType::Int, false, false)],
            false,
        );
        let right = TableSchema::new(
            "s",
            vec![Attribute::new("a", DataType::Char(4), false, false)],
            false,
        );
        assert!(left.common_attributes(&right).is_empty());
        assert_eq!(left.natural_join(&right).attr_count(), 2);
    }
}
