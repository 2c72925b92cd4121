#![allow(dead_code)]

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use gpxtx::{CompiledGenerator, SendError, Template, Transport};
use tempfile::NamedTempFile;
use tokio::time::Instant;

/// One message handed to the transport.
#[derive(Debug, Clone)]
pub struct Sent {
    pub payload: String,
    pub at: Instant,
}

/// Records every send; optionally reports each one as a dial failure.
#[derive(Default)]
pub struct Recorder {
    sent: Mutex<Vec<Sent>>,
    fail: bool,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        })
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<String> {
        self.sent().into_iter().map(|s| s.payload).collect()
    }

    /// Sends whose payload starts with `prefix`.
    pub fn from(&self, prefix: &str) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| s.payload.starts_with(prefix))
            .collect()
    }
}

#[async_trait]
impl Transport for Recorder {
    async fn send(&self, payload: &str) -> Result<(), SendError> {
        self.sent.lock().unwrap().push(Sent {
            payload: payload.to_string(),
            at: Instant::now(),
        });
        if self.fail {
            Err(SendError::Dial {
                destination: "recorder".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
            })
        } else {
            Ok(())
        }
    }
}

pub fn generator(
    description: &str,
    frequency_secs: u64,
    template: &str,
    points: &[(f64, f64)],
) -> CompiledGenerator {
    CompiledGenerator::new(
        description,
        Duration::from_secs(frequency_secs),
        0,
        points.iter().copied().collect(),
        Template::compile(template).unwrap(),
    )
}

/// A one-second generator starting at `index_offset`.
pub fn generator_at(
    description: &str,
    index_offset: usize,
    template: &str,
    points: &[(f64, f64)],
) -> CompiledGenerator {
    CompiledGenerator::new(
        description,
        Duration::from_secs(1),
        index_offset,
        points.iter().copied().collect(),
        Template::compile(template).unwrap(),
    )
}

pub fn gpx(points: &[(f64, f64)]) -> String {
    let mut xml = String::from("<?xml version=\"1.0\"?>\n<gpx version=\"1.1\">\n");
    for (lat, lon) in points {
        xml.push_str(&format!("  <wpt lat=\"{lat}\" lon=\"{lon}\"><name>p</name></wpt>\n"));
    }
    xml.push_str("</gpx>\n");
    xml
}

pub fn write_temp(contents: &str, suffix: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}
