//! CF-013: Task-manager wire messages.
//!
//! Newline-delimited JSON. Every object carries a `type` tag.

use crate::core::types::{ActionLine, Env};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A request sent to the task manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    TaskRequest(TaskRequest),
    WorkerQuery(WorkerQuery),
}

/// Run a composed task on one of `workers`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    pub host: String,
    pub port: u16,
    pub task_name: String,
    pub workers: Vec<String>,
    pub actions: Vec<ActionLine>,
    pub env: Env,
    pub required_platform: String,
    pub estimated_load: f64,
    pub dir: String,
    /// Seconds
    pub timeout: u64,
    #[serde(default)]
    pub verbose: bool,
}

/// Ask for the worker/tool/platform table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerQuery {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub verbose: bool,
}

/// One line of a manager reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Reply {
    Stdout { line: String },
    Stderr { line: String },
    #[serde(rename_all = "camelCase")]
    Done { exit_code: i32 },
    Workers(WorkerReport),
}

/// The manager's view of its workers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkerReport {
    /// tool name → worker ids providing it
    pub tools: IndexMap<String, Vec<String>>,
    /// worker id → description
    pub workers: IndexMap<String, WorkerInfo>,
    /// os → architectures with at least one worker
    pub host_types: IndexMap<String, Vec<String>>,
    /// local directory → remote working-directory hint
    pub files: IndexMap<String, String>,
}

/// What the manager reports about one worker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkerInfo {
    /// `os-arch` tag
    #[serde(default)]
    pub platform: String,
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

/// Encode one message as a JSON line (with trailing newline).
pub fn encode<T: Serialize>(message: &T) -> Result<String, String> {
    let mut line = serde_json::to_string(message).map_err(|e| format!("encode error: {}", e))?;
    line.push('\n');
    Ok(line)
}

/// Decode one JSON line.
pub fn decode_reply(line: &str) -> Result<Reply, String> {
    serde_json::from_str(line.trim_end()).map_err(|e| format!("malformed reply {:?}: {}", line.trim_end(), e))
}

pub fn decode_request(line: &str) -> Result<Request, String> {
    serde_json::from_str(line.trim_end()).map_err(|e| format!("malformed request: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cf013_task_request_shape() {
        let req = Request::TaskRequest(TaskRequest {
            host: "farm".into(),
            port: 8888,
            task_name: "compile-main.linux-x86_64".into(),
            workers: vec!["w1".into()],
            actions: vec![ActionLine::from("make")],
            env: Env::new(),
            required_platform: "linux-x86_64".into(),
            estimated_load: 0.5,
            dir: "/src".into(),
            timeout: 300,
            verbose: false,
        });
        let line = encode(&req).unwrap();
        assert!(line.ends_with('\n'));
        assert!(line.contains("\"type\":\"taskRequest\""));
        assert!(line.contains("\"taskName\":\"compile-main.linux-x86_64\""));
        assert!(line.contains("\"requiredPlatform\""));
        assert_eq!(decode_request(&line).unwrap(), req);
    }

    #[test]
    fn test_cf013_worker_query_tag() {
        let line = encode(&Request::WorkerQuery(WorkerQuery {
            host: "farm".into(),
            port: 1,
            verbose: true,
        }))
        .unwrap();
        assert!(line.contains("\"type\":\"workerQuery\""));
    }

    #[test]
    fn test_cf013_decode_stream_replies() {
        assert_eq!(
            decode_reply(r#"{"type":"stdout","line":"ok"}"#).unwrap(),
            Reply::Stdout { line: "ok".into() }
        );
        assert_eq!(
            decode_reply("{\"type\":\"done\",\"exitCode\":3}\n").unwrap(),
            Reply::Done { exit_code: 3 }
        );
    }

    #[test]
    fn test_cf013_decode_worker_report() {
        let reply = decode_reply(
            r#"{"type":"workers","tools":{"gcc":["w1"]},"workers":{"w1":{"platform":"linux-x86_64","load":0.2}},"hostTypes":{"linux":["x86_64"]}}"#,
        )
        .unwrap();
        let Reply::Workers(report) = reply else {
            panic!("expected workers reply");
        };
        assert_eq!(report.tools["gcc"], vec!["w1"]);
        assert_eq!(report.workers["w1"].platform, "linux-x86_64");
        assert!(report.workers["w1"].extra.contains_key("load"));
        assert!(report.files.is_empty());
    }

    #[test]
    fn test_cf013_malformed_reply() {
        assert!(decode_reply("not json").unwrap_err().contains("malformed reply"));
        assert!(decode_reply(r#"{"type":"bogus"}"#).is_err());
    }
}
