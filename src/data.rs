use std::fmt;
use std::net::SocketAddr;
use std::time::SystemTime;
use libc::pid_t;
use serde::{Serialize, Serializer};
use crate::classify::Reason;

pub const UNRESOLVED:    &str = "N/A";
pub const ACCESS_DENIED: &str = "Access Denied";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum Protocol {
    TCP,
    UDP,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Established,
    Listen,
    TimeWait,
    CloseWait,
    SynSent,
    SynRecv,
    FinWait1,
    FinWait2,
    Close,
    Closing,
    LastAck,
    None,
    Unknown,
}

#[derive(Clone, Debug, Serialize)]
pub struct Record {
    pub protocol: Protocol,
    #[serde(serialize_with = "text")]
    pub local:    SocketAddr,
    #[serde(serialize_with = "text")]
    pub remote:   SocketAddr,
    pub state:    State,
    pub pid:      pid_t,
    pub process:  String,
    pub exe:      String,
    #[serde(rename = "risk", serialize_with = "reason")]
    pub reason:   Option<Reason>,
}

#[derive(Debug, Serialize)]
pub struct Snapshot {
    pub timestamp: SystemTime,
    pub records:   Vec<Record>,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TCP => "TCP",
            Self::UDP => "UDP",
        }
    }
}

impl State {
    /// Maps the kernel's `tcp_states` code. UDP sockets are stateless.
    pub fn from_code(protocol: Protocol, code: u8) -> Self {
        if protocol == Protocol::UDP {
            return Self::None;
        }

        match code {
            0x01 => Self::Established,
            0x02 => Self::SynSent,
            0x03 => Self::SynRecv,
            0x04 => Self::FinWait1,
            0x05 => Self::FinWait2,
            0x06 => Self::TimeWait,
            0x07 => Self::Close,
            0x08 => Self::CloseWait,
            0x09 => Self::LastAck,
            0x0A => Self::Listen,
            0x0B => Self::Closing,
            _    => Self::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Established => "ESTABLISHED",
            Self::Listen      => "LISTEN",
            Self::TimeWait    => "TIME_WAIT",
            Self::CloseWait   => "CLOSE_WAIT",
            Self::SynSent     => "SYN_SENT",
            Self::SynRecv     => "SYN_RECV",
            Self::FinWait1    => "FIN_WAIT1",
            Self::FinWait2    => "FIN_WAIT2",
            Self::Close       => "CLOSE",
            Self::Closing     => "CLOSING",
            Self::LastAck     => "LAST_ACK",
            Self::None        => "NONE",
            Self::Unknown     => "UNKNOWN",
        }
    }
}

impl Record {
    pub fn risk_reason(&self) -> &'static str {
        self.reason.map(Reason::as_str).unwrap_or("")
    }

    pub fn is_resolved(&self) -> bool {
        self.pid > 0
    }
}

impl Snapshot {
    pub fn new(records: Vec<Record>) -> Self {
        let timestamp = SystemTime::now();
        Self { timestamp, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

fn text<S: Serializer>(addr: &SocketAddr, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(addr)
}

fn reason<S: Serializer>(reason: &Option<Reason>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(reason.map(Reason::as_str).unwrap_or(""))
}
