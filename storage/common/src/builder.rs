//! Statement generation for one table.
//!
//! The builder is the only place SQL text is assembled. Identifiers are always quoted through the
//! dialect and values always travel as parameters. Every statement passes through the registered
//! [`CommandAugmenter`]s before it is rendered.

use std::sync::Arc;

use tessera_core::{ColumnType, ColumnValues, StorageError, TableDescriptor, ValueType};
use tessql::{OrderByItem, Predicate, Selection};

use crate::command::{Command, CommandAugmenter, Draft, Parameters, WhereStatement};
use crate::dialect::{Dialect, IsolationLevel, StatementKind};
use crate::template::render;
use crate::translate::{Aliases, Translator};
use crate::types::TypeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectOptions {
    pub distinct: bool,
    pub skip: Option<u64>,
    pub take: Option<u64>,
    pub order_by: Vec<OrderByItem>,
}

impl From<&Selection> for SelectOptions {
    fn from(selection: &Selection) -> Self {
        Self { distinct: false, skip: selection.skip, take: selection.take, order_by: selection.order_by.clone() }
    }
}

#[derive(Clone)]
pub struct CommandBuilder {
    dialect: Arc<dyn Dialect>,
    types: Arc<TypeMap>,
    table: Arc<TableDescriptor>,
    aliases: Arc<Aliases>,
    augmenters: Vec<Arc<dyn CommandAugmenter>>,
}

impl CommandBuilder {
    pub fn new(dialect: Arc<dyn Dialect>, types: Arc<TypeMap>, table: Arc<TableDescriptor>) -> Self {
        Self { dialect, types, table, aliases: Arc::new(Aliases::new()), augmenters: Vec::new() }
    }

    pub fn with_aliases(mut self, aliases: Aliases) -> Self {
        self.aliases = Arc::new(aliases);
        self
    }

    pub fn with_augmenter(mut self, augmenter: Arc<dyn CommandAugmenter>) -> Self {
        self.augmenters.push(augmenter);
        self
    }

    pub fn dialect(&self) -> &dyn Dialect { self.dialect.as_ref() }

    pub fn types(&self) -> &Arc<TypeMap> { &self.types }

    pub fn table(&self) -> &TableDescriptor { &self.table }

    pub fn quote(&self, name: &str) -> String { self.dialect.quote_identifier(name) }

    /// `"schema"."table"`, using the dialect's default schema when none is declared.
    pub fn table_name(&self) -> String {
        let schema = self.table.schema().unwrap_or(self.dialect.default_schema());
        format!("{}.{}", self.quote(schema), self.quote(self.table.name()))
    }

    pub fn translator(&self) -> Translator<'_> { Translator::new(self.dialect.as_ref(), &self.types, &self.table).with_aliases(&self.aliases) }

    pub fn where_statement(&self, predicate: &Predicate) -> Result<WhereStatement, StorageError> { self.translator().translate(predicate) }

    fn column_type(&self, column: &str) -> Result<&ColumnType, StorageError> {
        self.table.column(column).ok_or_else(|| StorageError::argument(format!("{} has no column {}", self.table.qualified_name(), column)))
    }

    fn projection(&self, columns: &[String]) -> Result<Vec<(String, ColumnType)>, StorageError> {
        columns.iter().map(|c| Ok((c.clone(), self.column_type(c)?.clone()))).collect()
    }

    fn select_list(&self, columns: &[String]) -> Result<String, StorageError> {
        let mut list = Vec::with_capacity(columns.len());
        for column in columns {
            list.push(self.dialect.select_expression(&self.quote(column), self.column_type(column)?));
        }
        Ok(list.join(", "))
    }

    /// Bind `values` as parameters, returning `(quoted column, value expression)` pairs.
    fn bind_values(&self, values: &ColumnValues, parameters: &mut Parameters) -> Result<Vec<(String, String)>, StorageError> {
        let mut bound = Vec::with_capacity(values.len());
        for (column, value) in values {
            bound.push((self.quote(column), self.bind_value(column, value.clone(), column, parameters)?));
        }
        Ok(bound)
    }

    fn bind_value(&self, column: &str, value: Option<tessera_core::Value>, hint: &str, parameters: &mut Parameters) -> Result<String, StorageError> {
        let column_type = self.column_type(column)?;
        let value = match value {
            Some(value) => Some(self.types.coerce(value, column_type)?),
            None => None,
        };
        let name = parameters.add(hint, value);
        Ok(self.dialect.value_expression(&self.dialect.parameter_name(&name), Some(column_type)))
    }

    fn finish(&self, mut draft: Draft) -> Result<Command, StorageError> {
        for augmenter in &self.augmenters {
            augmenter.augment(&mut draft, self.dialect.as_ref());
        }
        draft.render(self.dialect.as_ref())
    }

    fn filtered(&self, kind: StatementKind, filter: &Predicate) -> Result<Draft, StorageError> {
        let mut draft = Draft::new(kind).fragment("table", self.table_name());
        let filter = self.translator().predicate(filter, &mut draft.parameters)?;
        Ok(draft.fragment("filter", filter))
    }

    pub fn select(&self, columns: &[String], filter: &Predicate, options: &SelectOptions) -> Result<Command, StorageError> {
        let paged = options.skip.is_some() || options.take.is_some();
        let kind = match (paged, options.distinct) {
            (false, false) => StatementKind::Select,
            (false, true) => StatementKind::SelectDistinct,
            (true, false) => StatementKind::SelectSkipTake,
            (true, true) => StatementKind::SelectSkipTakeDistinct,
        };
        let mut draft = self.filtered(kind, filter)?.fragment("columns", self.select_list(columns)?);
        draft = draft.fragment("orderBy", self.translator().order_by(&options.order_by)?);
        if paged {
            let take = options.take.map(|t| t.min(i64::MAX as u64)).unwrap_or(i64::MAX as u64);
            draft = draft.fragment("skip", options.skip.unwrap_or(0).to_string()).fragment("take", take.to_string());
        }
        draft.projection = self.projection(columns)?;
        self.finish(draft)
    }

    /// At most one row.
    pub fn select_first(&self, columns: &[String], filter: &Predicate) -> Result<Command, StorageError> {
        let mut draft = self.filtered(StatementKind::SelectTop1, filter)?.fragment("columns", self.select_list(columns)?).fragment("orderBy", "");
        draft.projection = self.projection(columns)?;
        self.finish(draft)
    }

    /// Count matching rows, or distinct combinations of `distinct_columns` when given.
    pub fn count(&self, filter: &Predicate, distinct_columns: Option<&[String]>) -> Result<Command, StorageError> {
        match distinct_columns {
            None => self.finish(self.filtered(StatementKind::Count, filter)?),
            Some(columns) => self.finish(self.filtered(StatementKind::CountDistinct, filter)?.fragment("columns", self.select_list(columns)?)),
        }
    }

    pub fn exists(&self, filter: &Predicate) -> Result<Command, StorageError> { self.finish(self.filtered(StatementKind::Exists, filter)?) }

    pub fn insert(&self, values: &ColumnValues) -> Result<Command, StorageError> {
        let mut draft = Draft::new(StatementKind::Insert).fragment("table", self.table_name());
        let bound = self.bind_values(values, &mut draft.parameters)?;
        let draft = draft.fragment("columns", join_first(&bound)).fragment("values", join_second(&bound));
        self.finish(draft)
    }

    /// Insert and read back `returning` (typically a generated identity).
    pub fn insert_returning(&self, values: &ColumnValues, returning: &[String]) -> Result<Command, StorageError> {
        let mut draft = Draft::new(StatementKind::InsertReturning).fragment("table", self.table_name());
        let bound = self.bind_values(values, &mut draft.parameters)?;
        let returning_list = returning.iter().map(|c| self.quote(c)).collect::<Vec<_>>().join(", ");
        let mut draft = draft.fragment("columns", join_first(&bound)).fragment("values", join_second(&bound)).fragment("returning", returning_list);
        draft.projection = self.projection(returning)?;
        self.finish(draft)
    }

    /// Insert unless a row matching `filter` already exists.
    pub fn insert_if_absent(&self, values: &ColumnValues, filter: &Predicate) -> Result<Command, StorageError> {
        let mut draft = Draft::new(StatementKind::InsertIfAbsent).fragment("table", self.table_name());
        let bound = self.bind_values(values, &mut draft.parameters)?;
        let filter = self.translator().predicate(filter, &mut draft.parameters)?;
        let draft = draft.fragment("columns", join_first(&bound)).fragment("values", join_second(&bound)).fragment("filter", filter);
        self.finish(draft)
    }

    pub fn update(&self, assignments: &ColumnValues, filter: &Predicate) -> Result<Command, StorageError> {
        let mut draft = Draft::new(StatementKind::Update).fragment("table", self.table_name());
        let bound = self.bind_values(assignments, &mut draft.parameters)?;
        let filter = self.translator().predicate(filter, &mut draft.parameters)?;
        self.finish(draft.fragment("assignments", join_assignments(&bound)).fragment("filter", filter))
    }

    /// Update only if the current row still holds `expected`. Old values bind as `old_<column>`.
    pub fn update_if_unchanged(&self, assignments: &ColumnValues, filter: &Predicate, expected: &ColumnValues) -> Result<Command, StorageError> {
        let mut draft = Draft::new(StatementKind::Update).fragment("table", self.table_name());
        let bound = self.bind_values(assignments, &mut draft.parameters)?;
        let mut conditions = vec![self.translator().predicate(filter, &mut draft.parameters)?];
        for (column, old) in expected {
            let quoted = self.quote(column);
            let condition = match old {
                None => self.render(StatementKind::IsNull, &[("operand", &quoted)])?,
                Some(_) => {
                    let value = self.bind_value(column, old.clone(), &format!("old_{}", column), &mut draft.parameters)?;
                    self.render(StatementKind::Equal, &[("left", &quoted), ("right", &value)])?
                }
            };
            conditions.push(condition);
        }
        let mut filter = conditions.remove(0);
        for condition in conditions {
            filter = self.render(StatementKind::And, &[("left", &filter), ("right", &condition)])?;
        }
        self.finish(draft.fragment("assignments", join_assignments(&bound)).fragment("filter", filter))
    }

    pub fn delete(&self, filter: &Predicate) -> Result<Command, StorageError> { self.finish(self.filtered(StatementKind::Delete, filter)?) }

    /// Upsert keyed on `keys` (plus `identity_keys`, when a generated identity is part of the key).
    /// With no non-key columns the conflict branch performs a no-op self-assignment.
    pub fn merge(&self, keys: &ColumnValues, values: &ColumnValues, identity_keys: &ColumnValues) -> Result<Command, StorageError> {
        let mut draft = Draft::new(StatementKind::Merge).fragment("table", self.table_name());
        let mut all = keys.clone();
        all.extend(identity_keys.iter().map(|(k, v)| (k.clone(), v.clone())));
        let conflict = all.keys().map(|k| self.quote(k)).collect::<Vec<_>>().join(", ");
        all.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        let bound = self.bind_values(&all, &mut draft.parameters)?;

        let updates = if values.is_empty() {
            let first = keys.keys().chain(identity_keys.keys()).next().ok_or_else(|| StorageError::argument("merge requires at least one key column"))?;
            self.render(StatementKind::DummyUpdate, &[("column", &self.quote(first))])?
        } else {
            let mut updates = Vec::with_capacity(values.len());
            for column in values.keys() {
                updates.push(self.render(StatementKind::DummyUpdate, &[("column", &self.quote(column))])?);
            }
            updates.join(", ")
        };
        let draft = draft.fragment("columns", join_first(&bound)).fragment("values", join_second(&bound)).fragment("keyColumns", conflict).fragment("updates", updates);
        self.finish(draft)
    }

    /// Upsert that adds the bound value of `increment_column` to the stored one on conflict,
    /// returning the resulting value.
    pub fn merge_increment(&self, keys: &ColumnValues, values: &ColumnValues, increment_column: &str) -> Result<Command, StorageError> {
        if !values.contains_key(increment_column) {
            return Err(StorageError::argument(format!("merge_increment needs a value for {}", increment_column)));
        }
        let mut draft = Draft::new(StatementKind::MergeIncrement).fragment("table", self.table_name());
        let conflict = keys.keys().map(|k| self.quote(k)).collect::<Vec<_>>().join(", ");
        let mut all = keys.clone();
        all.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        let bound = self.bind_values(&all, &mut draft.parameters)?;
        let mut draft = draft
            .fragment("columns", join_first(&bound))
            .fragment("values", join_second(&bound))
            .fragment("keyColumns", conflict)
            .fragment("incrementColumn", self.quote(increment_column));
        draft.projection = self.projection(&[increment_column.to_owned()])?;
        self.finish(draft)
    }

    // schema statements

    /// `None` when the table lives in the default schema or the dialect has no schemas.
    pub fn create_schema(&self) -> Result<Option<Command>, StorageError> {
        let (Some(schema), Some(_)) = (self.table.schema(), self.dialect.template(StatementKind::CreateSchema)) else { return Ok(None) };
        self.finish(Draft::new(StatementKind::CreateSchema).fragment("schemaName", self.quote(schema))).map(Some)
    }

    pub fn create_table(&self) -> Result<Command, StorageError> {
        let mut definitions = Vec::with_capacity(self.table.columns().len() + 1);
        let mut identity_key = false;
        for (name, column_type) in self.table.columns() {
            identity_key |= column_type.identity && self.table.is_key(name);
            definitions.push(self.column_definition(name, column_type)?);
        }
        let keys = self.table.key_columns();
        if identity_key && self.dialect.identity_is_primary_key() {
            if keys.len() > 1 {
                return Err(StorageError::Schema(format!(
                    "{} cannot combine an identity column with other key columns on {}",
                    self.dialect.name(),
                    self.table.qualified_name()
                )));
            }
        } else if !keys.is_empty() {
            let constraint = self.quote(&format!("pk_{}", self.table.name()));
            let columns = keys.iter().map(|k| self.quote(k)).collect::<Vec<_>>().join(", ");
            definitions.push(self.render(StatementKind::PrimaryKey, &[("constraintName", &constraint), ("columns", &columns)])?);
        }
        self.finish(Draft::new(StatementKind::CreateTable).fragment("table", self.table_name()).fragment("columnDefinitions", definitions.join(", ")))
    }

    fn column_definition(&self, name: &str, column_type: &ColumnType) -> Result<String, StorageError> {
        let is_key = self.table.is_key(name);
        let kind = if column_type.identity && is_key {
            match column_type.base {
                ValueType::I16 => StatementKind::Identity16Column,
                ValueType::I32 => StatementKind::Identity32Column,
                ValueType::I64 => StatementKind::Identity64Column,
                _ => StatementKind::IdentityColumn,
            }
        } else if is_key {
            StatementKind::RequiredColumn
        } else {
            StatementKind::NullableColumn
        };
        let Some(template) = self.dialect.template(kind) else {
            return Err(StorageError::Schema(format!("{} cannot generate {} identity values for {}", self.dialect.name(), column_type.base, name)));
        };
        render(template, &[("columnName", &self.quote(name)), ("typeName", &self.dialect.column_type_name(column_type))])
    }

    pub fn add_column(&self, name: &str) -> Result<Command, StorageError> {
        let definition = self.column_definition(name, self.column_type(name)?)?;
        self.finish(Draft::new(StatementKind::AddColumn).fragment("table", self.table_name()).fragment("columnDefinition", definition))
    }

    /// `None` when the dialect cannot change a column's type in place.
    pub fn alter_column(&self, name: &str) -> Result<Option<Command>, StorageError> {
        if self.dialect.template(StatementKind::AlterColumn).is_none() {
            return Ok(None);
        }
        let type_name = self.dialect.column_type_name(self.column_type(name)?);
        let draft = Draft::new(StatementKind::AlterColumn).fragment("table", self.table_name()).fragment("columnName", self.quote(name)).fragment("typeName", type_name);
        self.finish(draft).map(Some)
    }

    /// Introspection of the live table: rows of `column_name` and `signature`.
    pub fn live_columns(&self) -> Result<Command, StorageError> {
        let mut draft = Draft::new(StatementKind::SelectColumns);
        let schema = self.table.schema().unwrap_or(self.dialect.default_schema());
        let schema_param = self.dialect.parameter_name(&draft.parameters.add("schemaName", Some(schema.into())));
        let table_param = self.dialect.parameter_name(&draft.parameters.add("tableName", Some(self.table.name().into())));
        self.finish(draft.fragment("schemaParam", schema_param).fragment("tableParam", table_param))
    }

    pub fn begin(&self, level: IsolationLevel) -> Result<Command, StorageError> {
        self.finish(Draft::new(StatementKind::BeginTransaction).fragment("isolationLevel", level.as_sql()))
    }

    pub fn commit(&self) -> Result<Command, StorageError> { self.finish(Draft::new(StatementKind::Commit)) }

    pub fn rollback(&self) -> Result<Command, StorageError> { self.finish(Draft::new(StatementKind::Rollback)) }

    fn render(&self, kind: StatementKind, substitutions: &[(&str, &str)]) -> Result<String, StorageError> {
        match self.dialect.template(kind) {
            Some(template) => render(template, substitutions),
            None => Err(StorageError::argument(format!("{} has no {:?} statement", self.dialect.name(), kind))),
        }
    }
}

fn join_first(pairs: &[(String, String)]) -> String { pairs.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>().join(", ") }

fn join_second(pairs: &[(String, String)]) -> String { pairs.iter().map(|(_, v)| v.as_str()).collect::<Vec<_>>().join(", ") }

fn join_assignments(pairs: &[(String, String)]) -> String { pairs.iter().map(|(c, v)| format!("{} = {}", c, v)).collect::<Vec<_>>().join(", ") }

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::GenericDialect;
    use tessera_core::Value;
    use tessql::{field, OrderDirection};

    fn builder() -> CommandBuilder {
        let table = TableDescriptor::builder("items")
            .key("Id", ValueType::I32)
            .column("Name", ColumnType::string(50))
            .column("Price", ColumnType::decimal(10, 2))
            .build()
            .unwrap();
        CommandBuilder::new(Arc::new(GenericDialect), Arc::new(TypeMap::standard()), Arc::new(table))
    }

    fn values(pairs: &[(&str, Option<Value>)]) -> ColumnValues { pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect() }

    fn columns(names: &[&str]) -> Vec<String> { names.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn test_select_variants() {
        let b = builder();
        let cmd = b.select(&columns(&["Id", "Name"]), &field("Id").eq(1), &SelectOptions::default()).unwrap();
        assert_eq!(cmd.sql, r#"SELECT "Id", "Name" FROM "public"."items" WHERE "Id" = :Id"#);
        assert_eq!(cmd.projection.len(), 2);

        let options = SelectOptions { skip: Some(10), take: Some(5), order_by: vec![OrderByItem { field: "Name".into(), direction: OrderDirection::Desc }], ..Default::default() };
        let cmd = b.select(&columns(&["Name"]), &Predicate::True, &options).unwrap();
        assert_eq!(cmd.sql, r#"SELECT "Name" FROM "public"."items" WHERE 1 = 1 ORDER BY "Name" DESC OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"#);

        let options = SelectOptions { distinct: true, ..Default::default() };
        let cmd = b.select(&columns(&["Name"]), &Predicate::True, &options).unwrap();
        assert_eq!(cmd.sql, r#"SELECT DISTINCT "Name" FROM "public"."items" WHERE 1 = 1"#);

        let cmd = b.select_first(&columns(&["Name"]), &field("Id").eq(2)).unwrap();
        assert_eq!(cmd.sql, r#"SELECT "Name" FROM "public"."items" WHERE "Id" = :Id FETCH FIRST 1 ROWS ONLY"#);
    }

    #[test]
    fn test_skip_without_take() {
        let options = SelectOptions { skip: Some(3), ..Default::default() };
        let cmd = builder().select(&columns(&["Id"]), &Predicate::True, &options).unwrap();
        assert!(cmd.sql.ends_with(&format!("OFFSET 3 ROWS FETCH NEXT {} ROWS ONLY", i64::MAX)));
    }

    #[test]
    fn test_count_and_exists() {
        let b = builder();
        assert_eq!(b.count(&Predicate::True, None).unwrap().sql, r#"SELECT COUNT(*) FROM "public"."items" WHERE 1 = 1"#);
        assert_eq!(
            b.count(&Predicate::True, Some(&columns(&["Name"]))).unwrap().sql,
            r#"SELECT COUNT(*) FROM (SELECT DISTINCT "Name" FROM "public"."items" WHERE 1 = 1) distinct_rows"#
        );
        assert_eq!(
            b.exists(&field("Id").eq(1)).unwrap().sql,
            r#"SELECT CASE WHEN EXISTS (SELECT 1 FROM "public"."items" WHERE "Id" = :Id) THEN 1 ELSE 0 END"#
        );
    }

    #[test]
    fn test_insert_coerces_values() {
        let cmd = builder().insert(&values(&[("Id", Some(Value::I64(1))), ("Name", None), ("Price", Some(Value::I32(3)))])).unwrap();
        assert_eq!(cmd.sql, r#"INSERT INTO "public"."items" ("Id", "Name", "Price") VALUES (:Id, :Name, :Price)"#);
        assert_eq!(cmd.parameters.get("Id"), Some(&Some(Value::I32(1))));
        assert_eq!(cmd.parameters.get("Name"), Some(&None));
        assert_eq!(cmd.parameters.get("Price"), Some(&Some(Value::Decimal("3".into()))));
    }

    #[test]
    fn test_insert_unknown_column() {
        let err = builder().insert(&values(&[("Nope", None)])).unwrap_err();
        assert!(matches!(err, StorageError::InvalidArgument(_)));
    }

    #[test]
    fn test_insert_if_absent() {
        let cmd = builder().insert_if_absent(&values(&[("Id", Some(Value::I32(1)))]), &field("Id").eq(1)).unwrap();
        assert_eq!(
            cmd.sql,
            r#"INSERT INTO "public"."items" ("Id") SELECT :Id WHERE NOT EXISTS (SELECT 1 FROM "public"."items" WHERE "Id" = :Id1)"#
        );
    }

    #[test]
    fn test_update_if_unchanged() {
        let cmd = builder()
            .update_if_unchanged(&values(&[("Name", Some("new".into()))]), &field("Id").eq(1), &values(&[("Name", Some("old".into())), ("Price", None)]))
            .unwrap();
        assert_eq!(cmd.sql, r#"UPDATE "public"."items" SET "Name" = :Name WHERE "Id" = :Id AND "Name" = :old_Name AND "Price" IS NULL"#);
        assert_eq!(cmd.parameters.get("old_Name"), Some(&Some(Value::from("old"))));
    }

    #[test]
    fn test_merge() {
        let b = builder();
        let cmd = b.merge(&values(&[("Id", Some(Value::I32(1)))]), &values(&[("Name", Some("a".into()))]), &ColumnValues::new()).unwrap();
        assert_eq!(
            cmd.sql,
            r#"INSERT INTO "public"."items" ("Id", "Name") VALUES (:Id, :Name) ON CONFLICT ("Id") DO UPDATE SET "Name" = excluded."Name""#
        );
        // no non-key columns still yields a valid statement
        let cmd = b.merge(&values(&[("Id", Some(Value::I32(1)))]), &ColumnValues::new(), &ColumnValues::new()).unwrap();
        assert!(cmd.sql.ends_with(r#"DO UPDATE SET "Id" = excluded."Id""#));
    }

    #[test]
    fn test_merge_increment() {
        let b = builder();
        let cmd = b.merge_increment(&values(&[("Id", Some(Value::I32(1)))]), &values(&[("Price", Some(Value::F64(1.5)))]), "Price").unwrap();
        assert!(cmd.sql.ends_with(r#"DO UPDATE SET "Price" = target."Price" + excluded."Price" RETURNING "Price""#));
        assert_eq!(cmd.projection.iter().map(|(c, _)| c.as_str()).collect::<Vec<_>>(), vec!["Price"]);
        assert!(b.merge_increment(&values(&[("Id", None)]), &ColumnValues::new(), "Price").is_err());
    }

    #[test]
    fn test_create_table() {
        let cmd = builder().create_table().unwrap();
        assert_eq!(
            cmd.sql,
            r#"CREATE TABLE IF NOT EXISTS "public"."items" ("Id" INTEGER NOT NULL, "Name" VARCHAR(50) NULL, "Price" DECIMAL(10,2) NULL, CONSTRAINT "pk_items" PRIMARY KEY ("Id"))"#
        );
        assert!(builder().create_schema().unwrap().is_none());
    }

    #[test]
    fn test_identity_column() {
        let table = TableDescriptor::builder("log").schema("app").key("Seq", ColumnType::identity(ValueType::I64)).column("Body", ValueType::String).build().unwrap();
        let b = CommandBuilder::new(Arc::new(GenericDialect), Arc::new(TypeMap::standard()), Arc::new(table));
        assert!(b.create_table().unwrap().sql.contains(r#""Seq" BIGINT GENERATED BY DEFAULT AS IDENTITY"#));
        assert_eq!(b.create_schema().unwrap().unwrap().sql, r#"CREATE SCHEMA IF NOT EXISTS "app""#);

        let guid = TableDescriptor::builder("g").key("Id", ColumnType::identity(ValueType::Guid)).build().unwrap();
        let b = CommandBuilder::new(Arc::new(GenericDialect), Arc::new(TypeMap::standard()), Arc::new(guid));
        assert!(matches!(b.create_table().unwrap_err(), StorageError::Schema(_)));
    }

    #[test]
    fn test_live_columns_binds_names() {
        let cmd = builder().live_columns().unwrap();
        assert!(cmd.sql.contains("table_schema = :schemaName AND table_name = :tableName"));
        assert_eq!(cmd.parameters.get("tableName"), Some(&Some(Value::from("items"))));
    }

    #[test]
    fn test_transactions() {
        let b = builder();
        assert_eq!(b.begin(IsolationLevel::Serializable).unwrap().sql, "START TRANSACTION ISOLATION LEVEL SERIALIZABLE");
        assert_eq!(b.commit().unwrap().sql, "COMMIT");
        assert_eq!(b.rollback().unwrap().sql, "ROLLBACK");
    }

    #[test]
    fn test_augmenter_sees_every_statement() {
        struct Tag;
        impl CommandAugmenter for Tag {
            fn augment(&self, draft: &mut Draft, _dialect: &dyn Dialect) {
                if let Some(filter) = draft.fragments.get_mut("filter") {
                    *filter = format!("({}) AND 2 = 2", filter);
                }
            }
        }
        let b = builder().with_augmenter(Arc::new(Tag));
        assert_eq!(b.count(&Predicate::True, None).unwrap().sql, r#"SELECT COUNT(*) FROM "public"."items" WHERE (1 = 1) AND 2 = 2"#);
    }
}
