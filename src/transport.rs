//! Where output records go once the control loop has produced them.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io;
use std::net::UdpSocket;

/// One tick's output: named values such as `time`, `fx` or `s0`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Record(pub BTreeMap<String, f64>);

impl Record {
    /// An empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key` to `value`.
    pub fn insert(&mut self, key: impl Into<String>, value: f64) {
        self.0.insert(key.into(), value);
    }

    /// The value stored under `key`
    pub fn get(&self, key: &str) -> Option<f64> {
        self.0.get(key).copied()
    }

    /// Serializes the record as a RON map, e.g. `{"fx":0.5,"time":0.01}`.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::to_string(self)
    }

    /// Parses a record produced by [Record::to_ron].
    pub fn from_ron(text: &str) -> Result<Self, ron::de::SpannedError> {
        ron::from_str(text)
    }
}

/// Accepts output records, one per running tick.
pub trait TransportSink {
    /// Delivers `record`. An error stops the control loop.
    fn send(&mut self, record: &Record) -> io::Result<()>;
}

/// Sends each record as a single UDP datagram.
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    /// Binds an ephemeral local port and connects it to `ip:port`.
    pub fn connect(ip: &str, port: u16) -> io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", 0))?;
        socket.connect((ip, port))?;
        debug!("sending records from {} to {ip}:{port}", socket.local_addr()?);
        Ok(Self { socket })
    }
}

impl TransportSink for UdpSink {
    fn send(&mut self, record: &Record) -> io::Result<()> {
        let text = record
            .to_ron()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.socket.send(text.as_bytes())?;
        Ok(())
    }
}
