use std::mem::size_of;
use anyhow::{anyhow, Result};
use bytemuck::{bytes_of, pod_read_unaligned, Pod, Zeroable};
use libc::pid_t;

pub const CN_IDX_PROC:          u32 = 1;
pub const CN_VAL_PROC:          u32 = 1;
pub const PROC_CN_MCAST_LISTEN: u32 = 1;

const NLMSG_NOOP:  u16 = 1;
const NLMSG_ERROR: u16 = 2;
const NLMSG_DONE:  u16 = 3;

const PROC_EVENT_NONE: u32 = 0x0000_0000;
const PROC_EVENT_FORK: u32 = 0x0000_0001;
const PROC_EVENT_EXEC: u32 = 0x0000_0002;
const PROC_EVENT_EXIT: u32 = 0x8000_0000;

/// One process-lifecycle notification from the connector.
#[derive(Debug, Eq, PartialEq)]
pub enum Event {
    Exec(pid_t),
    Fork(pid_t),
    Exit(pid_t),
    Other(u32),
}

#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct NlMsgHdr {
    pub len:   u32,
    pub kind:  u16,
    pub flags: u16,
    pub seq:   u32,
    pub pid:   u32,
}

#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct CnMsg {
    pub idx:   u32,
    pub val:   u32,
    pub seq:   u32,
    pub ack:   u32,
    pub len:   u16,
    pub flags: u16,
}

#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
pub struct ProcEvent {
    pub what:      u32,
    pub cpu:       u32,
    pub timestamp: u64,
}

#[derive(Copy, Clone, Debug, Pod, Zeroable)]
#[repr(C)]
struct Subscribe {
    hdr: NlMsgHdr,
    cn:  CnMsg,
    op:  u32,
}

const HDR:   usize = size_of::<NlMsgHdr>();
const CN:    usize = size_of::<CnMsg>();
const EVENT: usize = size_of::<ProcEvent>();

/// The request that joins the proc connector multicast group.
pub fn subscribe(pid: u32) -> Vec<u8> {
    let msg = Subscribe {
        hdr: NlMsgHdr {
            len:   size_of::<Subscribe>() as u32,
            kind:  NLMSG_DONE,
            flags: 0,
            seq:   0,
            pid:   pid,
        },
        cn: CnMsg {
            idx:   CN_IDX_PROC,
            val:   CN_VAL_PROC,
            seq:   0,
            ack:   0,
            len:   size_of::<u32>() as u16,
            flags: 0,
        },
        op: PROC_CN_MCAST_LISTEN,
    };
    bytes_of(&msg).to_vec()
}

/// Decodes every netlink message in one datagram. Messages for other
/// connector channels are skipped.
pub fn decode(mut buf: &[u8]) -> Result<Vec<Event>> {
    let mut events = Vec::new();

    while buf.len() >= HDR {
        let hdr = pod_read_unaligned::<NlMsgHdr>(&buf[..HDR]);
        let len = usize::try_from(hdr.len)?;

        if len < HDR || len > buf.len() {
            return Err(anyhow!("invalid netlink length: {}", len));
        }

        match hdr.kind {
            NLMSG_ERROR => return Err(anyhow!("netlink error message")),
            NLMSG_NOOP  => (),
            _           => events.extend(Event::parse(&buf[HDR..len])?),
        }

        let aligned = (len + 3) & !3;
        buf = &buf[aligned.min(buf.len())..];
    }

    Ok(events)
}

impl Event {
    /// Decodes one connector payload; `None` for other channels and acks.
    fn parse(buf: &[u8]) -> Result<Option<Self>> {
        if buf.len() < CN {
            return Err(anyhow!("truncated connector message: {} bytes", buf.len()));
        }

        let cn = pod_read_unaligned::<CnMsg>(&buf[..CN]);
        if cn.idx != CN_IDX_PROC || cn.val != CN_VAL_PROC {
            return Ok(None);
        }

        let data = &buf[CN..];
        if data.len() < EVENT {
            return Err(anyhow!("truncated proc event: {} bytes", data.len()));
        }

        let raw  = pod_read_unaligned::<ProcEvent>(&data[..EVENT]);
        let body = &data[EVENT..];

        let event = match raw.what {
            PROC_EVENT_NONE => return Ok(None),
            PROC_EVENT_EXEC => Event::Exec(pid(body, 0)?),
            PROC_EVENT_FORK => Event::Fork(pid(body, 8)?),
            PROC_EVENT_EXIT => Event::Exit(pid(body, 0)?),
            n               => Event::Other(n),
        };

        Ok(Some(event))
    }

    pub fn is_exec(&self) -> bool {
        matches!(self, Self::Exec(_))
    }
}

fn pid(body: &[u8], offset: usize) -> Result<pid_t> {
    let end = offset + size_of::<pid_t>();
    let raw = body.get(offset..end).ok_or_else(|| {
        anyhow!("truncated proc event body: {} bytes", body.len())
    })?;
    Ok(pod_read_unaligned::<pid_t>(raw))
}
