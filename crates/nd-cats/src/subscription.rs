use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use nd_common::{subject, ChannelVerb};
use nd_dispatch::{AckHandler, ReplyHandler, Subscription, SubscriptionRegistry};

use crate::repository::{Kitty, NewKitty};
use crate::service::CatService;

pub const RESOURCE: &str = "cats";

/// `data` of a find request. `catId` may be a number or a numeric string.
/// A missing or null `catId` reads as 0 and is rejected as an invalid id
/// rather than a malformed message.
#[derive(Debug, Clone, Deserialize)]
pub struct FindCatQuery {
    #[serde(rename = "catId", default, deserialize_with = "string_or_number::deserialize_i64")]
    pub cat_id: i64,
}

mod string_or_number {
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum StringOrNum {
            Num(i64),
            Str(String),
        }

        match Option::<StringOrNum>::deserialize(deserializer)? {
            Some(StringOrNum::Num(n)) => Ok(n),
            Some(StringOrNum::Str(s)) => s.trim().parse().map_err(de::Error::custom),
            None => Ok(0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatResponse {
    pub result: CatResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatResult {
    /// Ids travel as strings in responses
    pub id: String,
    pub name: String,
    pub color: String,
}

impl From<Kitty> for CatResponse {
    fn from(cat: Kitty) -> Self {
        CatResponse {
            result: CatResult {
                id: cat.id.to_string(),
                name: cat.name,
                color: cat.color,
            },
        }
    }
}

pub struct FindCatSubscription {
    service: Arc<CatService>,
}

impl FindCatSubscription {
    pub fn new(service: Arc<CatService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ReplyHandler for FindCatSubscription {
    type Payload = FindCatQuery;
    type Response = CatResponse;

    async fn handle(&self, query: FindCatQuery) -> nd_dispatch::Result<CatResponse> {
        info!(cat_id = query.cat_id, "Received find cat request");
        let cat = self.service.find(query.cat_id)?;
        Ok(cat.into())
    }
}

pub struct CreateCatSubscription {
    service: Arc<CatService>,
}

impl CreateCatSubscription {
    pub fn new(service: Arc<CatService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl AckHandler for CreateCatSubscription {
    type Payload = NewKitty;

    async fn handle(&self, cat: NewKitty) -> nd_dispatch::Result<()> {
        let kitty = self.service.add(cat)?;
        info!(id = kitty.id, name = %kitty.name, color = %kitty.color, "Cat created");
        Ok(())
    }
}

/// Register the find (reply) and create (ack) subscriptions for `service_name`
pub fn register_subscriptions(
    registry: &mut SubscriptionRegistry,
    service_name: &str,
    service: Arc<CatService>,
) -> nd_dispatch::Result<()> {
    registry.register(Subscription::reply(
        subject(ChannelVerb::Find, service_name, RESOURCE),
        FindCatSubscription::new(service.clone()),
    ))?;
    registry.register(Subscription::ack(
        subject(ChannelVerb::Create, service_name, RESOURCE),
        CreateCatSubscription::new(service),
    ))?;
    Ok(())
}
