use tessera_core::{ColumnType, ValueType};
use tessera_storage_common::dialect::{generic_template, Dialect, StatementKind};

/// SQLite statement forms.
///
/// Types are the five storage classes; declared widths are not enforced by SQLite and are left
/// out of the column signature. Column types cannot be altered, so drift is only reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str { "sqlite" }

    fn template(&self, kind: StatementKind) -> Option<&'static str> {
        use StatementKind::*;
        match kind {
            CreateSchema | AlterColumn => None,
            Identity16Column | Identity32Column | Identity64Column => Some("{columnName} INTEGER PRIMARY KEY AUTOINCREMENT"),
            SelectColumns => Some("SELECT name AS column_name, type AS signature FROM pragma_table_info({tableParam}, {schemaParam}) ORDER BY cid"),
            SelectTop1 => Some("SELECT {columns} FROM {table} WHERE {filter}{orderBy} LIMIT 1"),
            SelectSkipTake => Some("SELECT {columns} FROM {table} WHERE {filter}{orderBy} LIMIT {take} OFFSET {skip}"),
            SelectSkipTakeDistinct => Some("SELECT DISTINCT {columns} FROM {table} WHERE {filter}{orderBy} LIMIT {take} OFFSET {skip}"),
            InsertIfAbsent => Some("INSERT OR IGNORE INTO {table} ({columns}) SELECT {values} WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {filter})"),
            MergeIncrement => Some(
                "INSERT INTO {table} ({columns}) VALUES ({values}) ON CONFLICT ({keyColumns}) \
                 DO UPDATE SET {incrementColumn} = {incrementColumn} + excluded.{incrementColumn} RETURNING {incrementColumn}",
            ),
            // SQLite has one isolation level; IMMEDIATE takes the write lock up front
            BeginTransaction => Some("BEGIN IMMEDIATE"),
            other => generic_template(other),
        }
    }

    fn type_name(&self, base: ValueType) -> &'static str {
        match base {
            ValueType::Bool | ValueType::I16 | ValueType::I32 | ValueType::I64 => "INTEGER",
            ValueType::F64 => "REAL",
            ValueType::Binary => "BLOB",
            // exact decimals, guids and temporal values are stored as text
            ValueType::Decimal | ValueType::String | ValueType::Guid | ValueType::Date | ValueType::DateTime | ValueType::Timestamp => "TEXT",
        }
    }

    fn column_type_name(&self, column_type: &ColumnType) -> String { self.type_name(column_type.base).to_owned() }

    fn default_schema(&self) -> &'static str { "main" }

    fn identity_is_primary_key(&self) -> bool { true }
}
