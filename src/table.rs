use std::collections::TryReserveError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use libc::pid_t;
use crate::data::{Protocol, State};

/// Byte order the kernel used when it printed each 32-bit address word.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Endian {
    Little,
    Big,
}

/// How a row identifies its owner. The procfs tables only ever yield
/// `Inode`, correlated against process fd tables. `Pid` is the hook for
/// platforms whose socket tables report the owning pid directly; the
/// scanner skips the inode sweep for those rows and only asks the
/// resolver for identity. No such table reader ships yet.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Owner {
    Inode(u64),
    Pid(pid_t),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Row {
    pub protocol: Protocol,
    pub local:    SocketAddr,
    pub remote:   SocketAddr,
    pub state:    State,
    pub owner:    Owner,
}

impl Endian {
    pub fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Big
        } else {
            Self::Little
        }
    }

    fn word(self, hex: &str) -> Option<[u8; 4]> {
        let word = u32::from_str_radix(hex, 16).ok()?;
        Some(match self {
            Self::Little => word.to_le_bytes(),
            Self::Big    => word.to_be_bytes(),
        })
    }
}

/// Decodes `0100007F:0050` (IPv4) or a 32-digit IPv6 address with port.
pub fn decode_addr(field: &str, endian: Endian) -> Option<SocketAddr> {
    let (addr, port) = field.split_once(':')?;
    let port = u16::from_str_radix(port, 16).ok()?;

    if !addr.is_ascii() {
        return None;
    }

    let ip = match addr.len() {
        8  => IpAddr::V4(Ipv4Addr::from(endian.word(addr)?)),
        32 => {
            let mut octets = [0u8; 16];
            for (i, chunk) in octets.chunks_exact_mut(4).enumerate() {
                chunk.copy_from_slice(&endian.word(&addr[i * 8..i * 8 + 8])?);
            }
            IpAddr::V6(Ipv6Addr::from(octets))
        }
        _  => return None,
    };

    Some(SocketAddr::new(ip, port))
}

/// Parses one row of `/proc/net/{tcp,udp}{,6}`:
///
/// `sl local_address rem_address st tx_queue:rx_queue tr:tm->when retrnsmt uid timeout inode ...`
pub fn parse_line(line: &str, protocol: Protocol, endian: Endian) -> Option<Row> {
    let fields = line.split_whitespace().collect::<Vec<_>>();

    if fields.len() < 10 || !fields[0].ends_with(':') {
        return None;
    }

    let local  = decode_addr(fields[1], endian)?;
    let remote = decode_addr(fields[2], endian)?;
    let code   = u8::from_str_radix(fields[3], 16).ok()?;
    let inode  = fields[9].parse::<u64>().ok()?;

    Some(Row {
        protocol: protocol,
        local:    local,
        remote:   remote,
        state:    State::from_code(protocol, code),
        owner:    Owner::Inode(inode),
    })
}

/// Appends every well-formed row of a table to `rows`, skipping the header.
/// Returns how many malformed rows were dropped. Growth of `rows` is
/// fallible.
pub fn parse(
    text:     &str,
    protocol: Protocol,
    endian:   Endian,
    rows:     &mut Vec<Row>,
) -> Result<usize, TryReserveError> {
    let mut skipped = 0;
    for line in text.lines().skip(1).filter(|l| !l.trim().is_empty()) {
        match parse_line(line, protocol, endian) {
            Some(row) => {
                rows.try_reserve(1)?;
                rows.push(row);
            }
            None => skipped += 1,
        }
    }
    Ok(skipped)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub const HEADER: &str = "  sl  local_address rem_address   st tx_queue rx_queue tr tm->when retrnsmt   uid  timeout inode";

    pub fn encode(addr: SocketAddr, endian: Endian) -> String {
        let word = |b: [u8; 4]| match endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big    => u32::from_be_bytes(b),
        };

        let hex = match addr.ip() {
            IpAddr::V4(ip) => format!("{:08X}", word(ip.octets())),
            IpAddr::V6(ip) => ip.octets().chunks_exact(4).map(|c| {
                format!("{:08X}", word([c[0], c[1], c[2], c[3]]))
            }).collect(),
        };

        format!("{}:{:04X}", hex, addr.port())
    }

    pub fn row(sl: usize, local: &str, remote: &str, st: u8, inode: u64) -> String {
        let endian = Endian::native();
        let local  = encode(local.parse().unwrap(), endian);
        let remote = encode(remote.parse().unwrap(), endian);
        format!(
            "{:4}: {} {} {:02X} 00000000:00000000 00:00000000 00000000  1000        0 {} 1 0000000000000000 20 4 30 10 -1",
            sl, local, remote, st, inode,
        )
    }

    #[test]
    fn kernel_text_decodes() {
        let line = "   1: 0100007F:0277 00000000:0000 0A 00000000:00000000 00:00000000 00000000     0        0 25195 1 0000000000000000 100 0 0 10 0";
        let row = parse_line(line, Protocol::TCP, Endian::Little).unwrap();
        assert_eq!(row.local.to_string(), "127.0.0.1:631");
        assert_eq!(row.remote.to_string(), "0.0.0.0:0");
        assert_eq!(row.state, State::Listen);
        assert_eq!(row.owner, Owner::Inode(25195));
    }

    #[test]
    fn both_byte_orders_round_trip() {
        let addrs = [
            "10.1.2.3:443",
            "192.168.254.1:65535",
            "127.0.0.1:0",
            "[2001:db8::ff00:42:8329]:8080",
            "[::1]:22",
        ];
        for endian in [Endian::Little, Endian::Big] {
            for text in addrs {
                let addr = text.parse::<SocketAddr>().unwrap();
                let hex  = encode(addr, endian);
                let back = decode_addr(&hex, endian).unwrap();
                assert_eq!(back.to_string(), text, "{:?} {}", endian, hex);
            }
        }
    }

    #[test]
    fn udp_rows_are_stateless() {
        let line = row(0, "0.0.0.0:68", "0.0.0.0:0", 0x07, 1);
        let row = parse_line(&line, Protocol::UDP, Endian::native()).unwrap();
        assert_eq!(row.state, State::None);
    }

    #[test]
    fn malformed_rows_are_skipped() {
        let text = [
            HEADER.to_owned(),
            row(0, "10.0.0.2:5555", "93.184.216.34:443", 0x01, 11),
            "   1: garbage".to_owned(),
            "   2: 0100007F:ZZZZ 00000000:0000 0A 0 0 0 0 0 0 9".to_owned(),
            "   3: 0100007F:0050 00000000:0000 0A 0 0 0 0 0 notanumber".to_owned(),
            row(4, "10.0.0.2:5556", "93.184.216.34:80", 0xFE, 12),
            String::new(),
        ].join("\n");

        let mut rows = Vec::new();
        let skipped = parse(&text, Protocol::TCP, Endian::native(), &mut rows).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(skipped, 3);
        assert_eq!(rows[0].state, State::Established);
        assert_eq!(rows[1].state, State::Unknown);
    }

    #[test]
    fn rows_append_to_existing_buffer() {
        let mut rows = Vec::new();
        let v4 = [HEADER.to_owned(), row(0, "10.0.0.2:5555", "93.184.216.34:443", 0x01, 11)].join("\n");
        let v6 = [HEADER.to_owned(), row(0, "[::1]:22", "[::]:0", 0x0A, 12), "   1: junk".to_owned()].join("\n");

        assert_eq!(parse(&v4, Protocol::TCP, Endian::native(), &mut rows).unwrap(), 0);
        assert_eq!(parse(&v6, Protocol::TCP, Endian::native(), &mut rows).unwrap(), 1);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].owner, Owner::Inode(11));
        assert_eq!(rows[1].local.to_string(), "[::1]:22");
        assert_eq!(rows[1].state, State::Listen);
    }
}
