//! CF-015: Task-manager client.
//!
//! One TCP connection per request. The request is a single JSON line; the
//! manager answers with JSON lines until `done` (task requests) or with a
//! single `workers` line (worker queries). Connecting, writing and the whole
//! read phase share the request timeout.

use super::protocol::{self, Reply, Request, TaskRequest, WorkerQuery, WorkerReport};
use super::ExecOutput;
use crate::core::types::{TaskDescriptor, WorkerTask};
use crate::workers::CapabilitySource;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};
use tracing::debug;

/// Connection settings for the task manager.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    host: String,
    port: u16,
    timeout: Duration,
    verbose: bool,
}

impl ManagerClient {
    pub fn new(host: &str, port: u16, timeout: Duration, verbose: bool) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeout,
            verbose,
        }
    }

    fn connect(&self) -> Result<TcpStream, String> {
        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| format!("cannot resolve {}:{}: {}", self.host, self.port, e))?;
        let mut last_err = format!("no address for {}:{}", self.host, self.port);
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = format!("cannot connect to {}: {}", addr, e),
            }
        }
        Err(last_err)
    }

    fn send(&self, request: &Request) -> Result<(BufReader<TcpStream>, Instant), String> {
        let deadline = Instant::now() + self.timeout;
        let mut stream = self.connect()?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(|e| format!("socket error: {}", e))?;
        let line = protocol::encode(request)?;
        stream
            .write_all(line.as_bytes())
            .and_then(|_| stream.flush())
            .map_err(|e| format!("send error: {}", e))?;
        Ok((BufReader::new(stream), deadline))
    }

    /// Ask the manager to run `task` on one of the worker's matched workers.
    pub fn run_task(&self, task: &TaskDescriptor, worker: &WorkerTask) -> Result<ExecOutput, String> {
        let request = Request::TaskRequest(TaskRequest {
            host: self.host.clone(),
            port: self.port,
            task_name: task.name.clone(),
            workers: worker.workers.clone(),
            actions: task.actions.clone(),
            env: worker.env.clone(),
            required_platform: worker.required_platform.clone(),
            estimated_load: worker.estimated_load,
            dir: worker.base_dir.to_string_lossy().to_string(),
            timeout: self.timeout.as_secs(),
            verbose: self.verbose,
        });
        debug!(task = %task.name, workers = ?worker.workers, "sending task request");

        let (mut reader, deadline) = self.send(&request)?;
        let mut stdout = String::new();
        let mut stderr = String::new();
        loop {
            match read_reply(&mut reader, deadline)? {
                Reply::Stdout { line } => {
                    stdout.push_str(&line);
                    stdout.push('\n');
                }
                Reply::Stderr { line } => {
                    stderr.push_str(&line);
                    stderr.push('\n');
                }
                Reply::Done { exit_code } => {
                    return Ok(ExecOutput {
                        exit_code,
                        stdout,
                        stderr,
                    })
                }
                Reply::Workers(_) => return Err("unexpected workers reply to task request".into()),
            }
        }
    }

    /// Fetch the worker/tool/platform table.
    pub fn query_workers(&self) -> Result<WorkerReport, String> {
        let request = Request::WorkerQuery(WorkerQuery {
            host: self.host.clone(),
            port: self.port,
            verbose: self.verbose,
        });
        let (mut reader, deadline) = self.send(&request)?;
        match read_reply(&mut reader, deadline)? {
            Reply::Workers(report) => Ok(report),
            other => Err(format!("unexpected reply to worker query: {:?}", other)),
        }
    }
}

impl CapabilitySource for ManagerClient {
    fn query(&self) -> Result<WorkerReport, String> {
        self.query_workers()
    }
}

fn read_reply(reader: &mut BufReader<TcpStream>, deadline: Instant) -> Result<Reply, String> {
    let remaining = deadline
        .checked_duration_since(Instant::now())
        .filter(|d| !d.is_zero())
        .ok_or_else(|| "timed out waiting for task manager".to_string())?;
    reader
        .get_ref()
        .set_read_timeout(Some(remaining))
        .map_err(|e| format!("socket error: {}", e))?;

    let mut line = String::new();
    let n = reader
        .read_line(&mut line)
        .map_err(|e| format!("read error: {}", e))?;
    if n == 0 {
        return Err("connection closed before reply completed".into());
    }
    protocol::decode_reply(&line)
}
