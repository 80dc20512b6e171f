use tessera_core::{ColumnType, ValueType};
use tessera_storage_common::dialect::{generic_template, Dialect, StatementKind};

/// Postgres statement forms.
///
/// Every bound value is cast to its column's base type, so a placeholder in a position Postgres
/// cannot infer (the `SELECT` list of an insert-if-absent) still gets a concrete type. Exact
/// decimals travel as text and are cast server-side.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// The name `information_schema.columns.data_type` reports.
    fn information_schema_name(base: ValueType) -> &'static str {
        match base {
            ValueType::Bool => "boolean",
            ValueType::I16 => "smallint",
            ValueType::I32 => "integer",
            ValueType::I64 => "bigint",
            ValueType::F64 => "double precision",
            ValueType::Decimal => "numeric",
            ValueType::String => "character varying",
            ValueType::Binary => "bytea",
            ValueType::Guid => "uuid",
            ValueType::Date => "date",
            ValueType::DateTime => "timestamp without time zone",
            ValueType::Timestamp => "timestamp with time zone",
        }
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str { "postgres" }

    fn template(&self, kind: StatementKind) -> Option<&'static str> {
        use StatementKind::*;
        match kind {
            IdentityColumn => Some("{columnName} {typeName} NOT NULL DEFAULT gen_random_uuid()"),
            SelectColumns => Some(
                "SELECT CAST(column_name AS TEXT) AS column_name, CAST(CASE \
                 WHEN character_maximum_length IS NOT NULL THEN data_type || '(' || character_maximum_length || ')' \
                 WHEN data_type = 'numeric' AND numeric_precision IS NOT NULL THEN data_type || '(' || numeric_precision || ',' || numeric_scale || ')' \
                 ELSE data_type END AS TEXT) AS signature \
                 FROM information_schema.columns \
                 WHERE table_schema = CAST({schemaParam} AS TEXT) AND table_name = CAST({tableParam} AS TEXT) ORDER BY ordinal_position",
            ),
            SelectTop1 => Some("SELECT {columns} FROM {table} WHERE {filter}{orderBy} LIMIT 1"),
            SelectSkipTake => Some("SELECT {columns} FROM {table} WHERE {filter}{orderBy} LIMIT {take} OFFSET {skip}"),
            SelectSkipTakeDistinct => Some("SELECT DISTINCT {columns} FROM {table} WHERE {filter}{orderBy} LIMIT {take} OFFSET {skip}"),
            // the NOT EXISTS guard covers the common case; the conflict clause settles concurrent inserts
            InsertIfAbsent => Some("INSERT INTO {table} ({columns}) SELECT {values} WHERE NOT EXISTS (SELECT 1 FROM {table} WHERE {filter}) ON CONFLICT DO NOTHING"),
            other => generic_template(other),
        }
    }

    fn type_name(&self, base: ValueType) -> &'static str {
        match base {
            ValueType::Bool => "BOOLEAN",
            ValueType::I16 => "SMALLINT",
            ValueType::I32 => "INTEGER",
            ValueType::I64 => "BIGINT",
            ValueType::F64 => "DOUBLE PRECISION",
            ValueType::Decimal => "NUMERIC",
            ValueType::String => "VARCHAR",
            ValueType::Binary => "BYTEA",
            ValueType::Guid => "UUID",
            ValueType::Date => "DATE",
            ValueType::DateTime => "TIMESTAMP",
            ValueType::Timestamp => "TIMESTAMPTZ",
        }
    }

    fn column_signature(&self, column_type: &ColumnType) -> String {
        let base = Self::information_schema_name(column_type.base);
        match (column_type.base, column_type.length, column_type.precision) {
            (ValueType::String, Some(length), _) => format!("{}({})", base, length),
            (ValueType::Decimal, _, Some(precision)) => format!("{}({},{})", base, precision, column_type.scale.unwrap_or(0)),
            _ => base.to_owned(),
        }
    }

    fn default_schema(&self) -> &'static str { "public" }

    fn value_expression(&self, placeholder: &str, column_type: Option<&ColumnType>) -> String {
        match column_type {
            // base type only: an explicit cast to VARCHAR(n) truncates and one to NUMERIC(p,s) rounds
            Some(ct) if ct.base == ValueType::Decimal => format!("CAST(CAST({} AS TEXT) AS {})", placeholder, self.type_name(ct.base)),
            Some(ct) => format!("CAST({} AS {})", placeholder, self.type_name(ct.base)),
            None => placeholder.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use tessera_core::{ColumnValues, TableDescriptor, Value};
    use tessera_storage_common::{CommandBuilder, IsolationLevel, SelectOptions, TypeMap};
    use tessql::field;

    fn builder(table: TableDescriptor) -> CommandBuilder { CommandBuilder::new(Arc::new(PostgresDialect), Arc::new(TypeMap::standard()), Arc::new(table)) }

    fn orders() -> TableDescriptor {
        TableDescriptor::builder("orders")
            .key("id", ColumnType::identity(ValueType::I64))
            .column("customer", ColumnType::string(40))
            .column("total", ColumnType::decimal(10, 2))
            .schema("sales")
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_table_with_identity_key() {
        let b = builder(orders());
        assert_eq!(b.create_schema().unwrap().unwrap().sql, r#"CREATE SCHEMA IF NOT EXISTS "sales""#);
        assert_eq!(
            b.create_table().unwrap().sql,
            r#"CREATE TABLE IF NOT EXISTS "sales"."orders" ("id" BIGINT GENERATED BY DEFAULT AS IDENTITY, "customer" VARCHAR(40) NULL, "total" NUMERIC(10,2) NULL, CONSTRAINT "pk_orders" PRIMARY KEY ("id"))"#
        );
    }

    #[test]
    fn test_guid_identity_uses_generated_uuid() {
        let table = TableDescriptor::builder("tokens").key("id", ColumnType::identity(ValueType::Guid)).build().unwrap();
        let sql = builder(table).create_table().unwrap().sql;
        assert!(sql.contains(r#""id" UUID NOT NULL DEFAULT gen_random_uuid()"#), "{}", sql);
    }

    #[test]
    fn test_values_are_cast_to_column_types() {
        let b = builder(orders());
        let values = ColumnValues::from([("customer".to_string(), Some(Value::from("acme"))), ("total".to_string(), Some(Value::Decimal("9.99".into())))]);
        let sql = b.insert(&values).unwrap().sql;
        assert_eq!(sql, r#"INSERT INTO "sales"."orders" ("customer", "total") VALUES (CAST(:customer AS VARCHAR), CAST(CAST(:total AS TEXT) AS NUMERIC))"#);

        let like = b.count(&field("customer").starts_with("ac"), None).unwrap().sql;
        assert!(like.contains(r#""customer" LIKE :customer ESCAPE '\'"#), "{}", like);
    }

    #[test]
    fn test_paging_and_conflicts() {
        let b = builder(orders());
        let options = SelectOptions { skip: Some(10), take: Some(5), ..Default::default() };
        let sql = b.select(&["customer".to_string()], &tessql::Predicate::True, &options).unwrap().sql;
        assert!(sql.ends_with("WHERE 1 = 1 LIMIT 5 OFFSET 10"), "{}", sql);

        let row = ColumnValues::from([("customer".to_string(), Some(Value::from("acme")))]);
        let sql = b.insert_if_absent(&row, &field("customer").eq("acme")).unwrap().sql;
        assert!(sql.ends_with("ON CONFLICT DO NOTHING"), "{}", sql);
        assert_eq!(b.begin(IsolationLevel::RepeatableRead).unwrap().sql, "START TRANSACTION ISOLATION LEVEL REPEATABLE READ");
    }

    #[test]
    fn test_signatures_match_introspection() {
        let d = PostgresDialect;
        assert_eq!(d.column_signature(&ColumnType::string(40)), "character varying(40)");
        assert_eq!(d.column_signature(&ValueType::String.into()), "character varying");
        assert_eq!(d.column_signature(&ColumnType::decimal(10, 2)), "numeric(10,2)");
        assert_eq!(d.column_signature(&ColumnType::identity(ValueType::I64)), "bigint");
        assert_eq!(d.column_signature(&ValueType::Timestamp.into()), "timestamp with time zone");
    }

    #[test]
    fn test_introspection_binds_schema_and_table() {
        let command = builder(orders()).live_columns().unwrap();
        assert!(command.sql.contains("table_schema = CAST(:schemaName AS TEXT)"), "{}", command.sql);
        assert_eq!(command.parameters.get("schemaName"), Some(&Some(Value::from("sales"))));
    }
}
