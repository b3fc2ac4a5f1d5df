use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kitty {
    pub id: i64,
    pub name: String,
    pub color: String,
}

/// A cat that has not been stored yet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKitty {
    pub name: String,
    pub color: String,
}

impl NewKitty {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// In-memory cat storage. Ids are assigned sequentially from 1.
pub struct CatRepository {
    cats: DashMap<i64, Kitty>,
    next_id: AtomicI64,
}

impl CatRepository {
    pub fn new() -> Self {
        Self {
            cats: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn insert(&self, cat: NewKitty) -> Kitty {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let kitty = Kitty {
            id,
            name: cat.name,
            color: cat.color,
        };
        self.cats.insert(id, kitty.clone());
        kitty
    }

    pub fn get(&self, id: i64) -> Option<Kitty> {
        self.cats.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.cats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cats.is_empty()
    }
}

impl Default for CatRepository {
    fn default() -> Self {
        Self::new()
    }
}
