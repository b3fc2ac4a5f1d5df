use nd_dispatch::DispatchError;
use thiserror::Error;
use tracing::debug;

use crate::repository::{CatRepository, Kitty, NewKitty};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatError {
    #[error("Request is missing a valid id")]
    MissingId,

    #[error("Couldn't find a cat with id: {0}")]
    NotFound(i64),

    #[error("Invalid cat: {0}")]
    Invalid(String),
}

impl From<CatError> for DispatchError {
    fn from(err: CatError) -> Self {
        match err {
            CatError::NotFound(_) => DispatchError::not_found(err.to_string()),
            CatError::MissingId | CatError::Invalid(_) => DispatchError::bad_request(err.to_string()),
        }
    }
}

pub struct CatService {
    repository: CatRepository,
}

impl CatService {
    pub fn new(repository: CatRepository) -> Self {
        Self { repository }
    }

    pub fn add(&self, cat: NewKitty) -> Result<Kitty, CatError> {
        if cat.name.trim().is_empty() {
            return Err(CatError::Invalid("name must not be empty".to_string()));
        }
        if cat.color.trim().is_empty() {
            return Err(CatError::Invalid("color must not be empty".to_string()));
        }

        let kitty = self.repository.insert(cat);
        debug!(id = kitty.id, name = %kitty.name, "Cat added");
        Ok(kitty)
    }

    /// Ids start at 1; anything lower is rejected before lookup
    pub fn find(&self, id: i64) -> Result<Kitty, CatError> {
        if id < 1 {
            return Err(CatError::MissingId);
        }
        self.repository.get(id).ok_or(CatError::NotFound(id))
    }
}

impl Default for CatService {
    fn default() -> Self {
        Self::new(CatRepository::new())
    }
}
