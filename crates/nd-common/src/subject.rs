//! Subject naming conventions
//!
//! Subjects are `<verb>.<service-name>.<resource>`. Ack-style subscriptions
//! acknowledge on `ack.<subject>` and accept redeliveries on `retry.<subject>`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Service name used in subjects when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "ads-kotlin-service-template";

/// RESTful verb at the head of a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelVerb {
    Pub,
    Find,
    Create,
    Trigger,
}

impl ChannelVerb {
    pub fn name_in_subject(&self) -> &'static str {
        match self {
            ChannelVerb::Pub => "pub",
            ChannelVerb::Find => "find",
            ChannelVerb::Create => "create",
            ChannelVerb::Trigger => "trigger",
        }
    }
}

impl fmt::Display for ChannelVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name_in_subject())
    }
}

/// Build `<verb>.<service>.<resource>`.
pub fn subject(verb: ChannelVerb, service: &str, resource: &str) -> String {
    format!("{}.{}.{}", verb.name_in_subject(), service, resource)
}

pub fn ack_subject(subject: &str) -> String {
    format!("ack.{}", subject)
}

pub fn retry_subject(subject: &str) -> String {
    format!("retry.{}", subject)
}
