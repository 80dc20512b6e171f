//! The seam between the engines and a particular SQL engine.
//!
//! A [`Dialect`] supplies statement templates, type names and quoting rules. Templates are plain
//! strings with `{name}` placeholders filled textually by the command builder, which only ever
//! substitutes quoted identifiers, parameter placeholders, or fragments built from those.

use tessera_core::{ColumnType, ValueType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    // schema
    CreateSchema,
    CreateTable,
    RequiredColumn,
    NullableColumn,
    Identity16Column,
    Identity32Column,
    Identity64Column,
    IdentityColumn,
    PrimaryKey,
    AddColumn,
    AlterColumn,
    SelectColumns,
    // queries
    Select,
    SelectDistinct,
    SelectTop1,
    SelectSkipTake,
    SelectSkipTakeDistinct,
    Count,
    CountDistinct,
    Exists,
    // mutations
    Insert,
    InsertReturning,
    InsertIfAbsent,
    Update,
    Delete,
    Merge,
    MergeIncrement,
    // predicate operators
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    And,
    Or,
    Not,
    IsNull,
    IsNotNull,
    Like,
    In,
    // guards and markers
    AlwaysTrue,
    AlwaysFalse,
    DummyUpdate,
    Descending,
    OrderBy,
    // transactions
    BeginTransaction,
    Commit,
    Rollback,
}

impl StatementKind {
    /// Statements that read rows from the table and carry a `{filter}`.
    pub fn is_select_family(&self) -> bool {
        matches!(
            self,
            StatementKind::Select
                | StatementKind::SelectDistinct
                | StatementKind::SelectTop1
                | StatementKind::SelectSkipTake
                | StatementKind::SelectSkipTakeDistinct
                | StatementKind::Count
                | StatementKind::CountDistinct
                | StatementKind::Exists
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    #[default]
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

pub trait Dialect: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// The template for `kind`, or `None` when the engine has no equivalent statement.
    fn template(&self, kind: StatementKind) -> Option<&'static str>;

    fn type_name(&self, base: ValueType) -> &'static str;

    /// Full type name including the width suffix of variable-length and exact numeric types.
    fn column_type_name(&self, column_type: &ColumnType) -> String {
        let base = self.type_name(column_type.base);
        match column_type.base {
            ValueType::String => match column_type.length {
                Some(length) => format!("{}({})", base, length),
                None => base.to_owned(),
            },
            ValueType::Decimal => match (column_type.precision, column_type.scale) {
                (Some(precision), Some(scale)) => format!("{}({},{})", base, precision, scale),
                (Some(precision), None) => format!("{}({})", base, precision),
                _ => base.to_owned(),
            },
            _ => base.to_owned(),
        }
    }

    /// The type signature introspection reports for a column declared as `column_type`.
    fn column_signature(&self, column_type: &ColumnType) -> String { self.column_type_name(column_type) }

    fn parameter_name(&self, name: &str) -> String { format!(":{}", name) }

    fn quote_identifier(&self, name: &str) -> String { format!("\"{}\"", name.replace('"', "\"\"")) }

    fn default_schema(&self) -> &'static str;

    /// How a bound parameter appears where a value of `column_type` is expected.
    fn value_expression(&self, placeholder: &str, _column_type: Option<&ColumnType>) -> String { placeholder.to_owned() }

    /// How a column appears in a select list.
    fn select_expression(&self, quoted_column: &str, _column_type: &ColumnType) -> String { quoted_column.to_owned() }

    /// True when the identity column definition already declares the primary key.
    fn identity_is_primary_key(&self) -> bool { false }
}

/// Statement forms shared by most engines: ANSI SQL plus the `ON CONFLICT` upsert.
pub fn generic_template(kind: StatementKind) -> Option<&'static str> {
    use StatementKind::*;
    Some(match kind {
        CreateSchema => "CREATE SCHEMA IF NOT EXISTS {schemaName}",
        CreateTable => "CREATE TABLE IF NOT EXISTS {table} ({columnDefinitions})",
        RequiredColumn => "{columnName} {typeName} NOT NULL",
        NullableColumn => "{columnName} {typeName} NULL",
        Identity16Column => "{columnName} SMALLINT GENERATED BY DEFAULT AS IDENTITY",
        Identity32Column => "{columnName} INTEGER GENERATED BY DEFAULT AS IDENTITY",
        Identity64Column => "{columnName} BIGINT GENERATED BY DEFAULT AS IDENTITY",
        IdentityColumn => return None,
        PrimaryKey => "CONSTRAINT {constraintName} PRIMARY KEY ({columns})",
        AddColumn => "ALTER TABLE {table} ADD COLUMN {columnDefinition}",
        AlterColumn => "ALTER TABLE {table} ALTER COLUMN {columnName} SET DATA TYPE {typeName}",
        SelectColumns => {
            "SELECT column_name AS column_name, data_type AS signature FROM information_schema.columns \
             WHERE table_schema = {schemaParam} AND table_name = {tableParam} ORDER BY ordinal_position"
        }
        Select => "SELECT {columns} FROM {table} WHERE {filter}{orderBy}",
        SelectDistinct => "SELECT DISTINCT {columns} FROM {table} WHERE {filter}{orderBy}",
        SelectTop1 => "SELECT {columns} FROM {table} WHERE {filter}{orderBy} FETCH FIRST 1 ROWS ONLY",
        SelectSkipTake => "SELECT {columns} FROM {table} WHERE {filter}{orderBy} OFFSET {skip} ROWS FETCH NEXT {take} ROWS ONLY",
        SelectSkipTakeDistinct => "SELECT DISTINCT {columns} FROM {table} WHERE {filter}{orderBy} OFFSET {skip} ROWS FETCH NEXT {take} ROWS ONLY",
        Count => "SELECT COUNT(*) FROM {table} WHERE {filter}",
        CountDistinct => "SELECT COUNT(*) FROM (SELECT DISTINCT {columns} FROM {table} WHERE {filter}) distinct_rows",
        Exists => "SELECT CASE WHEN EXISTS (SELECT 1 FROM {table} WHERE {filter}) THEN 1 ELSE 0 END",
        Insert => "INSERT INTO {table} ({columns}) VALUES ({values})",
        InsertReturning => "INSERT INTO {table} ({columns}) VALUES ({values}) RETURNING {returning}",
        InsertIfAbsent => "INSERT INTO {table} ({columns}) SELECT {values} WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {filter})",
        Update => "UPDATE {table} SET {assignments} WHERE {filter}",
        Delete => "DELETE FROM {table} WHERE {filter}",
        Merge => "INSERT INTO {table} ({columns}) VALUES ({values}) ON CONFLICT ({keyColumns}) DO UPDATE SET {updates}",
        MergeIncrement => {
            "INSERT INTO {table} AS target ({columns}) VALUES ({values}) ON CONFLICT ({keyColumns}) \
             DO UPDATE SET {incrementColumn} = target.{incrementColumn} + excluded.{incrementColumn} RETURNING {incrementColumn}"
        }
        Equal => "{left} = {right}",
        NotEqual => "{left} <> {right}",
        GreaterThan => "{left} > {right}",
        GreaterThanOrEqual => "{left} >= {right}",
        LessThan => "{left} < {right}",
        LessThanOrEqual => "{left} <= {right}",
        And => "{left} AND {right}",
        Or => "({left} OR {right})",
        Not => "NOT ({operand})",
        IsNull => "{operand} IS NULL",
        IsNotNull => "{operand} IS NOT NULL",
        Like => "{left} LIKE {right} ESCAPE '\\'",
        In => "{operand} IN ({list})",
        AlwaysTrue => "1 = 1",
        AlwaysFalse => "1 = 0",
        DummyUpdate => "{column} = excluded.{column}",
        Descending => "{column} DESC",
        OrderBy => " ORDER BY {columns}",
        BeginTransaction => "START TRANSACTION ISOLATION LEVEL {isolationLevel}",
        Commit => "COMMIT",
        Rollback => "ROLLBACK",
    })
}

/// The shared statement forms on their own. Useful where no engine-specific behaviour matters.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str { "generic" }

    fn template(&self, kind: StatementKind) -> Option<&'static str> { generic_template(kind) }

    fn type_name(&self, base: ValueType) -> &'static str {
        match base {
            ValueType::Bool => "BOOLEAN",
            ValueType::I16 => "SMALLINT",
            ValueType::I32 => "INTEGER",
            ValueType::I64 => "BIGINT",
            ValueType::F64 => "DOUBLE PRECISION",
            ValueType::Decimal => "DECIMAL",
            ValueType::String => "VARCHAR",
            ValueType::Binary => "VARBINARY",
            ValueType::Guid => "UUID",
            ValueType::Date => "DATE",
            ValueType::DateTime => "TIMESTAMP",
            ValueType::Timestamp => "TIMESTAMP WITH TIME ZONE",
        }
    }

    fn default_schema(&self) -> &'static str { "public" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_suffix() {
        let dialect = GenericDialect;
        assert_eq!(dialect.column_type_name(&ColumnType::string(50)), "VARCHAR(50)");
        assert_eq!(dialect.column_type_name(&ColumnType::decimal(10, 2)), "DECIMAL(10,2)");
        assert_eq!(dialect.column_type_name(&ColumnType::new(ValueType::String)), "VARCHAR");
        // only variable-length and exact numeric types carry a suffix
        assert_eq!(dialect.column_type_name(&ColumnType::new(ValueType::I32).with_length(4)), "INTEGER");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(GenericDialect.quote_identifier("name"), r#""name""#);
        assert_eq!(GenericDialect.quote_identifier(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn test_select_family() {
        assert!(StatementKind::SelectTop1.is_select_family());
        assert!(StatementKind::Exists.is_select_family());
        assert!(!StatementKind::Update.is_select_family());
    }
}
