//! Debug protocol - JSON command/response definitions

use serde::{Deserialize, Serialize};

/// Commands sent by a debug client, one JSON object per line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", content = "params")]
pub enum DebugCommand {
    /// Ping (health check)
    Ping,
    /// Worker liveness and queue length
    Status,
    /// Run a full consistency check of the tree
    Validate,
    /// Node, chain and bin counts plus the root window
    Stats,
    /// Describe the topmost chain containing a voxel
    ChainAt { x: i32, y: i32, z: i32 },
}

/// Responses from debug server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum DebugResponse {
    #[serde(rename = "ok")]
    Ok { data: ResponseData },
    #[serde(rename = "error")]
    Error { message: String },
}

/// Response data variants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseData {
    None,
    Validation {
        valid: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    Status {
        running: bool,
        pending_updates: usize,
    },
    Stats(StatsInfo),
    Chain(ChainInfo),
    Pong { message: String },
}

/// Tree counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsInfo {
    pub nodes: usize,
    pub chains: usize,
    pub subchain_bins: usize,
    pub touching_bins: usize,
    pub root_position: Option<[i32; 3]>,
    pub root_size: Option<i32>,
    pub root_chains: usize,
}

/// Topmost chain at a queried voxel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub found: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supported: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub touching_boundary: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
}

impl ChainInfo {
    pub fn not_found() -> Self {
        Self {
            found: false,
            supported: None,
            touching_boundary: None,
            detached: None,
            size: None,
        }
    }
}

impl DebugResponse {
    pub fn ok(data: ResponseData) -> Self {
        Self::Ok { data }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error {
            message: msg.into(),
        }
    }

    pub fn pong() -> Self {
        Self::ok(ResponseData::Pong {
            message: "pong".into(),
        })
    }

    pub fn none() -> Self {
        Self::ok(ResponseData::None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let json = serde_json::to_string(&DebugCommand::ChainAt { x: 1, y: -2, z: 3 }).unwrap();
        assert_eq!(json, r#"{"cmd":"ChainAt","params":{"x":1,"y":-2,"z":3}}"#);
        let parsed: DebugCommand = serde_json::from_str(r#"{"cmd":"Ping"}"#).unwrap();
        assert_eq!(parsed, DebugCommand::Ping);
    }

    #[test]
    fn test_response_wire_format() {
        let json = serde_json::to_string(&DebugResponse::pong()).unwrap();
        assert_eq!(json, r#"{"status":"ok","data":{"message":"pong"}}"#);

        let invalid = DebugResponse::ok(ResponseData::Validation {
            valid: false,
            message: Some("broken".into()),
        });
        let json = serde_json::to_string(&invalid).unwrap();
        let parsed: DebugResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, invalid);

        let error: DebugResponse =
            serde_json::from_str(r#"{"status":"error","message":"nope"}"#).unwrap();
        assert_eq!(error, DebugResponse::error("nope"));
    }

    #[test]
    fn test_missing_chain_omits_fields() {
        let json = serde_json::to_string(&ResponseData::Chain(ChainInfo::not_found())).unwrap();
        assert_eq!(json, r#"{"found":false}"#);
    }
}
