//! Execution phases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The point in the request lifecycle a chain runs at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPhase {
    Request,
    Response,
    AsyncRequest,
    AsyncResponse,
}

/// A phase name that does not map to any [`ExecutionPhase`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown execution phase '{0}'")]
pub struct UnknownPhase(pub String);

impl ExecutionPhase {
    pub const ALL: [ExecutionPhase; 4] = [
        ExecutionPhase::Request,
        ExecutionPhase::Response,
        ExecutionPhase::AsyncRequest,
        ExecutionPhase::AsyncResponse,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionPhase::Request => "request",
            ExecutionPhase::Response => "response",
            ExecutionPhase::AsyncRequest => "async_request",
            ExecutionPhase::AsyncResponse => "async_response",
        }
    }

    /// Message phases run with the message view of the context.
    pub fn is_message(&self) -> bool {
        matches!(
            self,
            ExecutionPhase::AsyncRequest | ExecutionPhase::AsyncResponse
        )
    }

    /// Request-side phases act on the request payload.
    pub fn is_request_side(&self) -> bool {
        matches!(self, ExecutionPhase::Request | ExecutionPhase::AsyncRequest)
    }
}

impl fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionPhase {
    type Err = UnknownPhase;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "request" => Ok(ExecutionPhase::Request),
            "response" => Ok(ExecutionPhase::Response),
            "async_request" | "message_request" => Ok(ExecutionPhase::AsyncRequest),
            "async_response" | "message_response" => Ok(ExecutionPhase::AsyncResponse),
            _ => Err(UnknownPhase(s.to_string())),
        }
    }
}
