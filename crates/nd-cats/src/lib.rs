//! Cats sample domain
//!
//! A small in-memory catalogue exposed over NATS:
//! - `find.<service>.cats` (reply): look a cat up by id
//! - `create.<service>.cats` (ack): add a cat, acknowledged on `ack.create.<service>.cats`

pub mod repository;
pub mod service;
pub mod subscription;

pub use repository::{CatRepository, Kitty, NewKitty};
pub use service::{CatError, CatService};
pub use subscription::{
    register_subscriptions, CatResponse, CatResult, CreateCatSubscription, FindCatQuery, FindCatSubscription,
    RESOURCE,
};
