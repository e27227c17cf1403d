//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from model configuration.
//! Identifiers are quoted; every value is bound as a JSONB parameter.

use super::Page;
use crate::context::Record;
use crate::model::{Model, Relation, RelationKind};
use serde_json::Value;

const MAIN_ALIAS: &str = "main";
const REL_ALIAS: &str = "rel";

/// Quote identifier for PostgreSQL.
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Table name, schema-qualified when written as `schema.table`.
fn qualified_table(table: &str) -> String {
    table.split('.').map(quoted).collect::<Vec<_>>().join(".")
}

fn literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

#[derive(Debug)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }

    /// `to_jsonb(main."col") = $n AND ...`; empty conditions yield `TRUE`.
    fn where_clause(&mut self, conditions: &Record) -> String {
        let parts: Vec<String> = conditions
            .iter()
            .map(|(col, val)| {
                let n = self.push_param(val.clone());
                format!("to_jsonb({}.{}) = ${}", MAIN_ALIAS, quoted(col), n)
            })
            .collect();
        if parts.is_empty() {
            "TRUE".into()
        } else {
            parts.join(" AND ")
        }
    }
}

/// `to_jsonb(main) || jsonb_build_object('writer', (...), ...)`
fn row_expr(relations: &[Relation]) -> String {
    if relations.is_empty() {
        return format!("to_jsonb({})", MAIN_ALIAS);
    }
    let parts: Vec<String> = relations
        .iter()
        .map(|rel| {
            let from = format!(
                "{} AS {} WHERE {}.{} = {}.{}",
                qualified_table(&rel.target_table),
                REL_ALIAS,
                REL_ALIAS,
                quoted(&rel.their_key),
                MAIN_ALIAS,
                quoted(&rel.our_key)
            );
            let sub = match rel.kind {
                RelationKind::ToOne => format!("(SELECT to_jsonb({}) FROM {} LIMIT 1)", REL_ALIAS, from),
                RelationKind::ToMany => format!(
                    "(SELECT COALESCE(jsonb_agg(to_jsonb({})), '[]'::jsonb) FROM {})",
                    REL_ALIAS, from
                ),
            };
            format!("{}, {}", literal(&rel.name), sub)
        })
        .collect();
    format!("to_jsonb({}) || jsonb_build_object({})", MAIN_ALIAS, parts.join(", "))
}

/// Restricts a write to the first row matching `conditions`.
fn single_row_filter(model: &Model, q: &mut QueryBuf, conditions: &Record) -> String {
    let where_clause = q.where_clause(conditions);
    format!(
        "ctid = (SELECT ctid FROM {} AS {} WHERE {} LIMIT 1)",
        qualified_table(&model.table),
        MAIN_ALIAS,
        where_clause
    )
}

pub fn select_many(model: &Model, conditions: &Record, relations: &[Relation], page: Page) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(conditions);
    q.sql = format!(
        "SELECT {} FROM {} AS {} WHERE {} ORDER BY {}.{} LIMIT {} OFFSET {}",
        row_expr(relations),
        qualified_table(&model.table),
        MAIN_ALIAS,
        where_clause,
        MAIN_ALIAS,
        quoted(&model.primary_key),
        page.limit.min(Page::MAX_LIMIT),
        page.offset
    );
    q
}

pub fn select_one(model: &Model, conditions: &Record, relations: &[Relation]) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_clause = q.where_clause(conditions);
    q.sql = format!(
        "SELECT {} FROM {} AS {} WHERE {} LIMIT 1",
        row_expr(relations),
        qualified_table(&model.table),
        MAIN_ALIAS,
        where_clause
    );
    q
}

/// INSERT only the columns present in `data`, so omitted columns keep their DB defaults.
/// Values are typed by `jsonb_populate_record` against the table's row type.
pub fn insert(model: &Model, data: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&model.table);
    if data.is_empty() {
        q.sql = format!("INSERT INTO {} AS {} DEFAULT VALUES RETURNING to_jsonb({})", table, MAIN_ALIAS, MAIN_ALIAS);
        return q;
    }
    let cols: Vec<String> = data.keys().map(|k| quoted(k)).collect();
    let n = q.push_param(Value::Object(data.clone()));
    q.sql = format!(
        "INSERT INTO {} AS {} ({}) SELECT {} FROM jsonb_populate_record(NULL::{}, ${}) RETURNING to_jsonb({})",
        table,
        MAIN_ALIAS,
        cols.join(", "),
        cols.join(", "),
        table,
        n,
        MAIN_ALIAS
    );
    q
}

/// UPDATE the first matching row: SET only columns present in `data` (never the primary key).
pub fn update(model: &Model, conditions: &Record, data: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&model.table);
    let sets: Vec<String> = data
        .keys()
        .filter(|k| **k != model.primary_key)
        .map(|k| format!("{} = {}.{}", quoted(k), REL_ALIAS, quoted(k)))
        .collect();
    if sets.is_empty() {
        return select_one(model, conditions, &[]);
    }
    let n = q.push_param(Value::Object(data.clone()));
    let filter = single_row_filter(model, &mut q, conditions);
    q.sql = format!(
        "UPDATE {} AS {} SET {} FROM jsonb_populate_record(NULL::{}, ${}) AS {} WHERE {}.{} RETURNING to_jsonb({})",
        table,
        MAIN_ALIAS,
        sets.join(", "),
        table,
        n,
        REL_ALIAS,
        MAIN_ALIAS,
        filter,
        MAIN_ALIAS
    );
    q
}

pub fn delete(model: &Model, conditions: &Record) -> QueryBuf {
    let mut q = QueryBuf::new();
    let table = qualified_table(&model.table);
    let filter = single_row_filter(model, &mut q, conditions);
    q.sql = format!(
        "DELETE FROM {} AS {} WHERE {}.{} RETURNING to_jsonb({})",
        table, MAIN_ALIAS, MAIN_ALIAS, filter, MAIN_ALIAS
    );
    q
}
