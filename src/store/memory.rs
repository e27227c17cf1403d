//! Process-local store. Tables are vectors of JSON records keyed by table name.

use super::{Page, Store};
use crate::context::{value_eq, Record};
use crate::error::StoreError;
use crate::model::{KeyType, Model, Relation, RelationKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type Tables = HashMap<String, Vec<Record>>;

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert records as-is (no key generation, no conflict check).
    pub fn seed(&self, model: &Model, records: impl IntoIterator<Item = Value>) -> Result<(), StoreError> {
        let mut tables = self.write()?;
        let rows = tables.entry(model.table.clone()).or_default();
        for r in records {
            match r {
                Value::Object(map) => rows.push(map),
                other => return Err(StoreError::InvalidData(format!("seed record must be an object, got {}", other))),
            }
        }
        Ok(())
    }

    /// Snapshot of a table, in insertion order.
    pub fn rows(&self, model: &Model) -> Result<Vec<Record>, StoreError> {
        Ok(self.read()?.get(&model.table).cloned().unwrap_or_default())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, StoreError> {
        self.tables.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, StoreError> {
        self.tables.write().map_err(|_| StoreError::Poisoned)
    }
}

fn matches(record: &Record, conditions: &Record) -> bool {
    conditions
        .iter()
        .all(|(k, v)| record.get(k).map(|r| value_eq(r, v)).unwrap_or(false))
}

fn expand(tables: &Tables, record: &Record, relations: &[Relation]) -> Record {
    let mut out = record.clone();
    for rel in relations {
        let ours = record.get(&rel.our_key).cloned().unwrap_or(Value::Null);
        let related = tables.get(&rel.target_table).map(Vec::as_slice).unwrap_or(&[]);
        let mut hits = related
            .iter()
            .filter(|row| !ours.is_null() && row.get(&rel.their_key).map(|t| value_eq(t, &ours)).unwrap_or(false))
            .map(|row| Value::Object(row.clone()));
        let value = match rel.kind {
            RelationKind::ToOne => hits.next().unwrap_or(Value::Null),
            RelationKind::ToMany => Value::Array(hits.collect()),
        };
        out.insert(rel.name.clone(), value);
    }
    out
}

fn next_key(model: &Model, rows: &[Record]) -> Value {
    match model.key_type {
        KeyType::Int => {
            let max = rows
                .iter()
                .filter_map(|r| r.get(&model.primary_key).and_then(Value::as_i64))
                .max()
                .unwrap_or(0);
            Value::from(max + 1)
        }
        KeyType::Text | KeyType::Uuid => Value::String(uuid::Uuid::new_v4().to_string()),
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_many(
        &self,
        model: &Model,
        conditions: &Record,
        relations: &[Relation],
        page: Page,
    ) -> Result<Vec<Record>, StoreError> {
        let tables = self.read()?;
        let rows = tables.get(&model.table).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows
            .iter()
            .filter(|r| matches(r, conditions))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .map(|r| expand(&tables, r, relations))
            .collect())
    }

    async fn find_one(
        &self,
        model: &Model,
        conditions: &Record,
        relations: &[Relation],
    ) -> Result<Option<Record>, StoreError> {
        let tables = self.read()?;
        Ok(tables
            .get(&model.table)
            .and_then(|rows| rows.iter().find(|r| matches(r, conditions)))
            .map(|r| expand(&tables, r, relations)))
    }

    async fn insert_one(&self, model: &Model, data: &Record) -> Result<Record, StoreError> {
        let mut tables = self.write()?;
        let rows = tables.entry(model.table.clone()).or_default();
        let mut record = data.clone();
        let key = match record.get(&model.primary_key) {
            Some(k) if !k.is_null() => k.clone(),
            _ => next_key(model, rows),
        };
        if rows
            .iter()
            .any(|r| r.get(&model.primary_key).map(|k| value_eq(k, &key)).unwrap_or(false))
        {
            return Err(StoreError::Conflict(format!("{} {} already exists", model.name, key)));
        }
        record.insert(model.primary_key.clone(), key);
        rows.push(record.clone());
        Ok(record)
    }

    async fn update_one(
        &self,
        model: &Model,
        conditions: &Record,
        data: &Record,
    ) -> Result<Option<Record>, StoreError> {
        let mut tables = self.write()?;
        let Some(row) = tables
            .get_mut(&model.table)
            .and_then(|rows| rows.iter_mut().find(|r| matches(r, conditions)))
        else {
            return Ok(None);
        };
        for (k, v) in data {
            if *k == model.primary_key {
                continue;
            }
            row.insert(k.clone(), v.clone());
        }
        Ok(Some(row.clone()))
    }

    async fn delete_one(&self, model: &Model, conditions: &Record) -> Result<Option<Record>, StoreError> {
        let mut tables = self.write()?;
        let Some(rows) = tables.get_mut(&model.table) else {
            return Ok(None);
        };
        Ok(rows
            .iter()
            .position(|r| matches(r, conditions))
            .map(|i| rows.remove(i)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn insert_generates_keys_and_rejects_duplicates() {
        let store = MemoryStore::new();
        let tag = Model::new("Tag").key_type(KeyType::Int);
        let a = store.insert_one(&tag, &obj(json!({"name": "rust"}))).await.unwrap();
        let b = store.insert_one(&tag, &obj(json!({"name": "web"}))).await.unwrap();
        assert_eq!(a["id"], json!(1));
        assert_eq!(b["id"], json!(2));

        let err = store.insert_one(&tag, &obj(json!({"id": 1, "name": "dup"}))).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn large_int_keys_stay_distinct() {
        let store = MemoryStore::new();
        let tag = Model::new("Tag").key_type(KeyType::Int);
        let big = 1_i64 << 53;
        store.insert_one(&tag, &obj(json!({"id": big, "name": "a"}))).await.unwrap();
        store.insert_one(&tag, &obj(json!({"id": big + 1, "name": "b"}))).await.unwrap();

        let found = store.find_one(&tag, &obj(json!({"id": big + 1})), &[]).await.unwrap().unwrap();
        assert_eq!(found["name"], json!("b"));
    }

    #[tokio::test]
    async fn find_expands_relations_both_directions() {
        let store = MemoryStore::new();
        let user = Model::new("User");
        let post = Model::new("Post");
        store.seed(&user, [json!({"id": "u1", "name": "ann"})]).unwrap();
        store
            .seed(
                &post,
                [
                    json!({"id": "p1", "title": "a", "writer": "u1"}),
                    json!({"id": "p2", "title": "b", "writer": "u1"}),
                    json!({"id": "p3", "title": "c", "writer": null}),
                ],
            )
            .unwrap();

        let writer = Relation::belongs_to(&post, "writer", &user, "writer");
        let found = store
            .find_one(&post, &obj(json!({"id": "p1"})), std::slice::from_ref(&writer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found["writer"], json!({"id": "u1", "name": "ann"}));

        let orphan = store
            .find_one(&post, &obj(json!({"id": "p3"})), std::slice::from_ref(&writer))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(orphan["writer"], Value::Null);

        let posts = Relation::has_many(&user, "posts", &post, "writer");
        let users = store.find_many(&user, &Record::new(), &[posts], Page::default()).await.unwrap();
        assert_eq!(users[0]["posts"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn update_and_delete_touch_one_row() {
        let store = MemoryStore::new();
        let post = Model::new("Post");
        store
            .seed(&post, [json!({"id": "p1", "title": "a"}), json!({"id": "p2", "title": "a"})])
            .unwrap();

        let updated = store
            .update_one(&post, &obj(json!({"title": "a"})), &obj(json!({"title": "z", "id": "zz"})))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated, obj(json!({"id": "p1", "title": "z"})));

        let deleted = store.delete_one(&post, &obj(json!({"id": "p2"}))).await.unwrap();
        assert!(deleted.is_some());
        assert!(store.delete_one(&post, &obj(json!({"id": "p2"}))).await.unwrap().is_none());
        assert_eq!(store.rows(&post).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn list_honours_page_window() {
        let store = MemoryStore::new();
        let tag = Model::new("Tag");
        store
            .seed(&tag, (0..5).map(|i| json!({"id": format!("t{}", i)})))
            .unwrap();
        let rows = store
            .find_many(&tag, &Record::new(), &[], Page { limit: 2, offset: 1 })
            .await
            .unwrap();
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!("t1"), json!("t2")]);
    }
}
