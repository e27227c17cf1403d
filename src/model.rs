//! Model and relation descriptors declared once at startup.

use crate::error::{AppError, ConfigError};
use serde_json::Value;

/// Primary key type for parsing path ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum KeyType {
    #[default]
    Text,
    Int,
    Uuid,
}

impl KeyType {
    /// Turn a raw path segment into the JSON value stored in the primary key column.
    pub fn parse(&self, raw: &str) -> Result<Value, AppError> {
        Ok(match self {
            KeyType::Uuid => {
                let u = uuid::Uuid::parse_str(raw).map_err(|_| AppError::BadRequest("invalid uuid".into()))?;
                Value::String(u.to_string())
            }
            KeyType::Int => {
                let n: i64 = raw.parse().map_err(|_| AppError::BadRequest("invalid id".into()))?;
                Value::Number(n.into())
            }
            KeyType::Text => Value::String(raw.to_string()),
        })
    }
}

/// A persisted resource exposed through generated routes.
#[derive(Clone, Debug)]
pub struct Model {
    pub name: String,
    /// Lower-cased plural used for the default route path.
    pub collection: String,
    pub table: String,
    pub primary_key: String,
    pub key_type: KeyType,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let collection = pluralize(&name.to_lowercase());
        Model {
            table: collection.clone(),
            collection,
            name,
            primary_key: "id".into(),
            key_type: KeyType::default(),
        }
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    pub fn primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = column.into();
        self
    }

    pub fn key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = key_type;
        self
    }

    /// `/posts`
    pub fn collection_path(&self) -> String {
        format!("/{}", self.collection)
    }

    /// `/posts/:id`
    pub fn item_path(&self) -> String {
        format!("/{}/:id", self.collection)
    }
}

fn pluralize(word: &str) -> String {
    let bytes = word.as_bytes();
    let consonant_y = word.ends_with('y')
        && bytes.len() > 1
        && !matches!(bytes[bytes.len() - 2], b'a' | b'e' | b'i' | b'o' | b'u');
    if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        format!("{}es", word)
    } else {
        format!("{}s", word)
    }
}

/// Direction of a relation: to_one (we hold the key of theirs) or to_many (they hold ours).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    ToOne,
    ToMany,
}

/// A related entity that a query may ask to expand. Name is the key it appears under in results.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub name: String,
    /// Model name the relation belongs to.
    pub source: String,
    /// Model name of the related entity.
    pub target: String,
    pub target_table: String,
    pub kind: RelationKind,
    /// Our column used in the join (our FK for to_one; our PK for to_many).
    pub our_key: String,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    pub their_key: String,
}

impl Relation {
    /// `source.local_key` references `target`'s primary key.
    pub fn belongs_to(source: &Model, name: impl Into<String>, target: &Model, local_key: impl Into<String>) -> Self {
        Relation {
            name: name.into(),
            source: source.name.clone(),
            target: target.name.clone(),
            target_table: target.table.clone(),
            kind: RelationKind::ToOne,
            our_key: local_key.into(),
            their_key: target.primary_key.clone(),
        }
    }

    /// `target.foreign_key` references `source`'s primary key.
    pub fn has_many(source: &Model, name: impl Into<String>, target: &Model, foreign_key: impl Into<String>) -> Self {
        Relation {
            name: name.into(),
            source: source.name.clone(),
            target: target.name.clone(),
            target_table: target.table.clone(),
            kind: RelationKind::ToMany,
            our_key: source.primary_key.clone(),
            their_key: foreign_key.into(),
        }
    }
}

/// Resolve opted-in relation names for `model` against the declared set, keeping the order of `names`.
pub fn relations_of(model: &Model, declared: &[Relation], names: &[String]) -> Result<Vec<Relation>, ConfigError> {
    names
        .iter()
        .map(|name| {
            declared
                .iter()
                .find(|r| r.source == model.name && &r.name == name)
                .cloned()
                .ok_or_else(|| ConfigError::UnknownRelation {
                    model: model.name.clone(),
                    relation: name.clone(),
                })
        })
        .collect()
}
