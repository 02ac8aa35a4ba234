//! Topics and wire types for the launch channel.
//!
//! Response bodies are JSON. Execute requests carry the raw payload bytes,
//! NUL-terminated, as the request body.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operations a daemon serves. The set is closed and shared by both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    /// Spawn the command line carried in the payload.
    Exec,
    /// Shut the daemon down. The payload is ignored.
    Exit,
}

impl Topic {
    /// Every recognized topic, in discovery order.
    pub const ALL: [Topic; 2] = [Topic::Exec, Topic::Exit];

    pub fn as_str(self) -> &'static str {
        match self {
            Topic::Exec => "exec",
            Topic::Exit => "exit",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for a topic name outside the recognized set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized topic {0:?}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

/// How the daemon answered one execute transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The handler ran and succeeded.
    Acknowledged,
    /// The handler ran and reported failure.
    Declined,
    /// No handler is registered for the topic.
    NotProcessed,
    /// The dispatch queue was full.
    Busy,
}

/// A (service, topic) pair returned by topic discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceTopic {
    pub service: String,
    pub topic: Topic,
}

/// Topic discovery response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsResponse {
    pub pairs: Vec<ServiceTopic>,
}

/// Connection negotiation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub service: String,
    pub topic: Topic,
}

/// Execute transaction acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub outcome: Outcome,
}

/// Generic error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
