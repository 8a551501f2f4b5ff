//! In-process stand-in for the client's command server, plus helpers to read
//! the text exposition.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// PyON bodies served per command.
#[derive(Debug, Clone, Default)]
pub struct Responses {
    pub queue_info: String,
    pub slot_info: String,
    pub options: String,
    /// Close every connection right after the banner.
    pub hang_up: bool,
}

pub struct FakeClient {
    pub address: String,
    responses: Arc<Mutex<Responses>>,
    accept_loop: JoinHandle<()>,
}

impl FakeClient {
    pub async fn start(responses: Responses) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let responses = Arc::new(Mutex::new(responses));

        let shared = Arc::clone(&responses);
        let accept_loop = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    let _ = serve(stream, shared).await;
                });
            }
        });

        Self {
            address,
            responses,
            accept_loop,
        }
    }

    pub fn update(&self, f: impl FnOnce(&mut Responses)) {
        f(&mut self.responses.lock().unwrap());
    }

    /// Stops accepting; later connects are refused.
    pub async fn stop(self) {
        self.accept_loop.abort();
        let _ = self.accept_loop.await;
    }
}

async fn serve(stream: TcpStream, responses: Arc<Mutex<Responses>>) -> std::io::Result<()> {
    let (read, mut write) = stream.into_split();
    write
        .write_all(b"\nWelcome to the Folding@home Client command server.\n> ")
        .await?;
    if responses.lock().unwrap().hang_up {
        return Ok(());
    }

    let mut lines = BufReader::new(read).lines();
    while let Some(line) = lines.next_line().await? {
        let command = line.trim().to_string();
        let body = {
            let r = responses.lock().unwrap();
            match command.as_str() {
                "queue-info" => r.queue_info.clone(),
                "slot-info" => r.slot_info.clone(),
                "options" => r.options.clone(),
                _ => continue,
            }
        };
        write
            .write_all(format!("PyON 1 {command}\n{body}\n---\n> ").as_bytes())
            .await?;
    }
    Ok(())
}

pub fn slot(id: &str, description: &str, paused: bool) -> String {
    let paused = if paused { "True" } else { "False" };
    format!(
        r#"{{"id": "{id}", "status": "RUNNING", "description": "{description}", "options": {{"paused": {paused}}}, "reason": "", "idle": False}}"#
    )
}

pub fn task(slot: &str, id: &str, percent: &str, frames: u32) -> String {
    format!(
        r#"{{"id": "{id}", "slot": "{slot}", "state": "RUNNING", "error": "NO_ERROR", "project": 18201, "run": 1, "clone": 2, "gen": 3, "percentdone": "{percent}", "eta": "2 hours", "ppd": "250000", "creditestimate": "12000", "waitingon": "", "nextattempt": "0.00 secs", "totalframes": 100, "framesdone": {frames}, "timeremaining": "2 hours", "attempts": 0}}"#
    )
}

pub fn list(items: &[String]) -> String {
    format!("[{}]", items.join(", "))
}

pub fn options(user: &str) -> String {
    format!(r#"{{"user": "{user}", "team": "1234", "power": "full", "fold-anon": None}}"#)
}

/// A standard client with one slot running one task.
pub fn one_slot_one_task() -> Responses {
    Responses {
        queue_info: list(&[task("00", "01", "42.00%", 42)]),
        slot_info: list(&[slot("00", "cpu:4", false)]),
        options: options("alice"),
        hang_up: false,
    }
}

/// One exposed series.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

/// Parses the text exposition, skipping comments.
pub fn parse_exposition(body: &str) -> Vec<Sample> {
    body.lines()
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|line| {
            let (series, value) = line.rsplit_once(' ').unwrap();
            let value = value.parse().unwrap();
            let (name, labels) = match series.split_once('{') {
                Some((name, rest)) => (name, parse_labels(rest.trim_end_matches('}'))),
                None => (series, BTreeMap::new()),
            };
            Sample {
                name: name.to_string(),
                labels,
                value,
            }
        })
        .collect()
}

fn parse_labels(mut rest: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    while let Some((key, tail)) = rest.split_once("=\"") {
        let mut value = String::new();
        let mut chars = tail.char_indices();
        let mut end = tail.len();
        while let Some((i, c)) = chars.next() {
            match c {
                '\\' => {
                    if let Some((_, escaped)) = chars.next() {
                        value.push(if escaped == 'n' { '\n' } else { escaped });
                    }
                }
                '"' => {
                    end = i + 1;
                    break;
                }
                _ => value.push(c),
            }
        }
        out.insert(key.trim_start_matches(',').to_string(), value);
        rest = &tail[end..];
    }
    out
}

/// Value of the first series named `name` whose labels include `labels`.
pub fn find(samples: &[Sample], name: &str, labels: &[(&str, &str)]) -> Option<f64> {
    samples
        .iter()
        .find(|s| {
            s.name == name
                && labels
                    .iter()
                    .all(|(k, v)| s.labels.get(*k).map(String::as_str) == Some(*v))
        })
        .map(|s| s.value)
}

/// Everything except `fah_up`.
pub fn without_up(samples: Vec<Sample>) -> Vec<Sample> {
    samples.into_iter().filter(|s| s.name != "fah_up").collect()
}
