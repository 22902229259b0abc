//! In-memory key-value store (for development/testing).

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::client::{KeyValueClient, SCAN_START};
use crate::error::{CacheError, CacheResult};

/// A record held by [`MemoryKeyValueStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredRecord {
    /// Plain string value.
    String(String),
    /// Field map.
    Hash(HashMap<String, String>),
}

/// Key-value store held in memory.
///
/// `SCAN` walks a sorted snapshot of the key space; the cursor is the offset
/// of the next key to examine. Reading a record with the wrong command fails
/// the way Redis does (`WRONGTYPE`).
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    records: RwLock<BTreeMap<String, StoredRecord>>,
}

impl MemoryKeyValueStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// All keys currently stored.
    pub async fn keys(&self) -> Vec<String> {
        self.records.read().await.keys().cloned().collect()
    }

    /// Get a stored record.
    pub async fn record(&self, key: &str) -> Option<StoredRecord> {
        self.records.read().await.get(key).cloned()
    }

    /// Number of stored records.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

fn wrong_type(key: &str) -> CacheError {
    CacheError::WrongType(format!(
        "WRONGTYPE operation against a key holding the wrong kind of value: {}",
        key
    ))
}

#[async_trait]
impl KeyValueClient for MemoryKeyValueStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        match self.records.read().await.get(key) {
            None => Ok(None),
            Some(StoredRecord::String(value)) => Ok(Some(value.clone())),
            Some(StoredRecord::Hash(_)) => Err(wrong_type(key)),
        }
    }

    async fn set(&self, key: &str, value: &str) -> CacheResult<()> {
        self.records
            .write()
            .await
            .insert(key.to_string(), StoredRecord::String(value.to_string()));
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> CacheResult<Option<String>> {
        match self.records.read().await.get(key) {
            None => Ok(None),
            Some(StoredRecord::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(StoredRecord::String(_)) => Err(wrong_type(key)),
        }
    }

    async fn hset(&self, key: &str, fields: &[(String, String)]) -> CacheResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .entry(key.to_string())
            .or_insert_with(|| StoredRecord::Hash(HashMap::new()));

        match record {
            StoredRecord::Hash(existing) => {
                existing.extend(fields.iter().cloned());
                Ok(())
            }
            StoredRecord::String(_) => Err(wrong_type(key)),
        }
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> CacheResult<(u64, Vec<String>)> {
        let records = self.records.read().await;
        let offset = usize::try_from(cursor).unwrap_or(usize::MAX);
        let count = count.max(1);

        let keys: Vec<String> = records
            .keys()
            .skip(offset)
            .take(count)
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();

        let next = offset.saturating_add(count);
        let next = if next >= records.len() {
            SCAN_START
        } else {
            next as u64
        };
        Ok((next, keys))
    }

    async fn unlink(&self, keys: &[String]) -> CacheResult<u64> {
        let mut records = self.records.write().await;
        let removed = keys.iter().filter(|key| records.remove(*key).is_some()).count();
        Ok(removed as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Any,
    One,
    Literal(char),
}

fn tokenize(pattern: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '*' => Token::Any,
            '?' => Token::One,
            '\\' => Token::Literal(chars.next().unwrap_or('\\')),
            c => Token::Literal(c),
        });
    }
    tokens
}

/// Match `text` against a Redis-style glob.
///
/// Supports `*`, `?` and backslash escapes; every other character matches
/// itself.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let tokens = tokenize(pattern);
    let text: Vec<char> = text.chars().collect();

    let (mut t, mut p) = (0, 0);
    // Position of the last `*` and the text offset it was tried at.
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match tokens.get(p) {
            Some(Token::Any) => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(Token::One) => {
                p += 1;
                t += 1;
            }
            Some(Token::Literal(c)) if *c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, start)) => {
                    p = star + 1;
                    t = start + 1;
                    backtrack = Some((star, start + 1));
                }
                None => return false,
            },
        }
    }

    tokens[p..].iter().all(|token| *token == Token::Any)
}
