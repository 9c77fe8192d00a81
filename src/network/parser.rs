//! Per-frame multi-protocol parser.
//!
//! Pure function from raw frame bytes to an optional [`Observation`]:
//! no I/O, no shared mutable state, safe to run from any number of
//! workers. Malformed or truncated layers are silently dropped and the
//! observation keeps whatever earlier layers produced.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use etherparse::{EtherType, LinkHeader, NetHeaders, PacketHeaders, TransportHeader};

use crate::domain::models::{Observation, ProtocolData};
use crate::network::vendor;

/// Minimum ARP frame length: 14 bytes Ethernet + 28 bytes ARP.
const ARP_FRAME_LEN: usize = 42;

/// DHCP fixed header (236 bytes) plus the 4-byte magic cookie.
const DHCP_OPTIONS_OFFSET: usize = 240;

/// Offset of the client hardware address inside the DHCP payload.
const DHCP_CHADDR_OFFSET: usize = 28;

pub struct PacketParser {
    enabled: HashSet<String>,
}

impl PacketParser {
    pub fn new(enabled_protocols: &[String]) -> Self {
        PacketParser {
            enabled: enabled_protocols.iter().cloned().collect(),
        }
    }

    fn protocol_enabled(&self, protocol: &str) -> bool {
        self.enabled.contains(protocol)
    }

    /// Parse one frame. Returns `None` when the frame carries nothing
    /// that identifies or enriches a host.
    pub fn parse(&self, data: &[u8], timestamp: DateTime<Utc>) -> Option<Observation> {
        let headers = PacketHeaders::from_ethernet_slice(data).ok()?;
        let mut obs = Observation::new(timestamp);

        if let Some(LinkHeader::Ethernet2(eth)) = &headers.link {
            // Multicast/broadcast sources never identify a host.
            if eth.source[0] & 1 == 0 {
                obs.mac_address = Some(vendor::format_mac(&eth.source));
                obs.vendor = vendor::lookup(&eth.source).map(str::to_string);
            }

            if self.protocol_enabled("arp") && eth.ether_type == EtherType::ARP {
                parse_arp(&mut obs, data);
            }
        }

        if let Some(NetHeaders::Ipv4(ipv4, _)) = &headers.net {
            obs.ip_address = Some(format_ipv4(&ipv4.source));
            obs.os_guess = Some(guess_os_from_ttl(ipv4.time_to_live).to_string());
            obs.record_protocol(ProtocolData::Ipv4 {
                src_ip: format_ipv4(&ipv4.source),
                dst_ip: format_ipv4(&ipv4.destination),
                ttl: ipv4.time_to_live,
                ip_protocol: ipv4.protocol.0,
                total_length: ipv4.total_len,
            });

            let payload = headers.payload.slice();
            match &headers.transport {
                Some(TransportHeader::Tcp(tcp)) => self.parse_tcp(&mut obs, tcp, payload),
                Some(TransportHeader::Udp(udp)) => self.parse_udp(&mut obs, udp, payload),
                _ => {}
            }
        }

        obs.has_findings().then_some(obs)
    }

    fn parse_tcp(&self, obs: &mut Observation, tcp: &etherparse::TcpHeader, payload: &[u8]) {
        let src_port = tcp.source_port;
        let dst_port = tcp.destination_port;

        // A SYN+ACK leaves the listener, so the source port is open.
        if tcp.syn && tcp.ack {
            obs.open_ports.push(src_port);
        }

        let service =
            well_known_tcp_service(src_port).or_else(|| well_known_tcp_service(dst_port));
        if let Some(name) = service {
            obs.services
                .insert(format!("{src_port}/tcp"), name.to_string());
        }

        obs.record_protocol(ProtocolData::Tcp {
            src_port,
            dst_port,
            syn: tcp.syn,
            ack: tcp.ack,
            fin: tcp.fin,
            rst: tcp.rst,
        });

        if self.protocol_enabled("http")
            && (src_port == 80 || dst_port == 80)
            && !payload.is_empty()
        {
            parse_http(obs, payload);
        }
    }

    fn parse_udp(&self, obs: &mut Observation, udp: &etherparse::UdpHeader, payload: &[u8]) {
        let src_port = udp.source_port;
        let dst_port = udp.destination_port;

        obs.record_protocol(ProtocolData::Udp { src_port, dst_port });

        if self.protocol_enabled("dhcp")
            && (matches!(src_port, 67 | 68) || matches!(dst_port, 67 | 68))
        {
            parse_dhcp(obs, payload);
        }

        if self.protocol_enabled("dns") && (src_port == 53 || dst_port == 53) && payload.len() >= 12
        {
            obs.record_protocol(ProtocolData::Dns {
                payload_length: payload.len(),
            });
        }

        if self.protocol_enabled("mdns")
            && (src_port == 5353 || dst_port == 5353)
            && payload.len() >= 12
        {
            obs.record_protocol(ProtocolData::Mdns {
                payload_length: payload.len(),
            });
        }
    }
}

/// ARP request/reply: the sender address pair identifies a host.
/// Offsets are from the start of the Ethernet frame.
fn parse_arp(obs: &mut Observation, data: &[u8]) {
    if data.len() < ARP_FRAME_LEN {
        return;
    }

    let operation = u16::from_be_bytes([data[20], data[21]]);
    if operation != 1 && operation != 2 {
        return;
    }

    let sender_mac: [u8; 6] = data[22..28].try_into().unwrap_or_default();
    let sender_ip = format_ipv4(&data[28..32]);
    let target_mac: [u8; 6] = data[32..38].try_into().unwrap_or_default();
    let target_ip = format_ipv4(&data[38..42]);

    obs.ip_address = Some(sender_ip.clone());
    obs.mac_address = Some(vendor::format_mac(&sender_mac));
    obs.vendor = vendor::lookup(&sender_mac).map(str::to_string);

    obs.record_protocol(ProtocolData::Arp {
        operation,
        sender_ip,
        sender_mac: vendor::format_mac(&sender_mac),
        target_ip,
        target_mac: vendor::format_mac(&target_mac),
    });
}

fn parse_http(obs: &mut Observation, payload: &[u8]) {
    let headers = parse_http_headers(payload);
    if headers.is_empty() {
        return;
    }

    if let Some(user_agent) = headers.get("user-agent") {
        if let Some(os) = guess_os_from_user_agent(user_agent) {
            obs.os_guess = Some(os.to_string());
        }
    }

    if let Some(server) = headers.get("server") {
        obs.services.insert("http".to_string(), server.clone());
    }

    if let Some(host) = headers.get("host") {
        obs.hostname = Some(host.clone());
    }

    obs.record_protocol(ProtocolData::Http { headers });
}

/// BOOTREQUEST frames carry the client MAC and, in the options, often a
/// hostname and vendor class.
fn parse_dhcp(obs: &mut Observation, payload: &[u8]) {
    if payload.len() < DHCP_OPTIONS_OFFSET {
        return;
    }

    // Opcode 1 = BOOTREQUEST; replies identify the server, not the client.
    if payload[0] != 1 {
        return;
    }

    let chaddr: [u8; 6] = payload[DHCP_CHADDR_OFFSET..DHCP_CHADDR_OFFSET + 6]
        .try_into()
        .unwrap_or_default();
    obs.mac_address = Some(vendor::format_mac(&chaddr));
    obs.vendor = vendor::lookup(&chaddr).map(str::to_string);

    let (hostname, domain, vendor_class) = parse_dhcp_options(&payload[DHCP_OPTIONS_OFFSET..]);
    if hostname.is_some() || domain.is_some() || vendor_class.is_some() {
        if let Some(name) = &hostname {
            obs.hostname = Some(name.clone());
        }
        obs.record_protocol(ProtocolData::Dhcp {
            hostname,
            domain,
            vendor_class,
        });
    }
}

/// Walk the DHCP TLV options. Recognised: 12 (hostname), 15 (domain),
/// 60 (vendor class). Option 255 terminates, option 0 is padding.
fn parse_dhcp_options(options: &[u8]) -> (Option<String>, Option<String>, Option<String>) {
    let mut hostname = None;
    let mut domain = None;
    let mut vendor_class = None;

    let mut i = 0;
    while i < options.len() {
        match options[i] {
            255 => break,
            0 => i += 1,
            option => {
                if i + 1 >= options.len() {
                    break;
                }
                let len = options[i + 1] as usize;
                if i + 2 + len > options.len() {
                    break;
                }
                let data = &options[i + 2..i + 2 + len];
                match option {
                    12 => hostname = Some(String::from_utf8_lossy(data).to_string()),
                    15 => domain = Some(String::from_utf8_lossy(data).to_string()),
                    60 => vendor_class = Some(String::from_utf8_lossy(data).to_string()),
                    _ => {}
                }
                i += 2 + len;
            }
        }
    }

    (hostname, domain, vendor_class)
}

/// Split an HTTP payload on CRLF and collect `key: value` lines into a
/// map with lower-cased, trimmed keys.
pub fn parse_http_headers(payload: &[u8]) -> BTreeMap<String, String> {
    let text = String::from_utf8_lossy(payload);
    let mut headers = BTreeMap::new();

    for line in text.split("\r\n") {
        if let Some((key, value)) = line.split_once(':') {
            headers.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    headers
}

/// Coarse OS guess from the IPv4 TTL band. Total on all TTL values.
pub fn guess_os_from_ttl(ttl: u8) -> &'static str {
    match ttl {
        0..=64 => "Linux/Unix",
        65..=128 => "Windows",
        _ => "Cisco/Network Device",
    }
}

/// OS guess from a User-Agent header. First match wins, in priority
/// order: Android, iOS, macOS, Windows, Linux.
pub fn guess_os_from_user_agent(user_agent: &str) -> Option<&'static str> {
    let ua = user_agent.to_lowercase();
    if ua.contains("android") {
        Some("Android")
    } else if ua.contains("iphone") || ua.contains("ipad") {
        Some("iOS")
    } else if ua.contains("mac os x") || ua.contains("macos") {
        Some("macOS")
    } else if ua.contains("windows") {
        Some("Windows")
    } else if ua.contains("linux") {
        Some("Linux")
    } else {
        None
    }
}

fn well_known_tcp_service(port: u16) -> Option<&'static str> {
    match port {
        21 => Some("FTP"),
        22 => Some("SSH"),
        23 => Some("Telnet"),
        25 => Some("SMTP"),
        80 => Some("HTTP"),
        110 => Some("POP3"),
        143 => Some("IMAP"),
        443 => Some("HTTPS"),
        993 => Some("IMAPS"),
        995 => Some("POP3S"),
        1433 => Some("MSSQL"),
        3306 => Some("MySQL"),
        3389 => Some("RDP"),
        5432 => Some("PostgreSQL"),
        6379 => Some("Redis"),
        27017 => Some("MongoDB"),
        _ => None,
    }
}

fn format_ipv4(octets: &[u8]) -> String {
    format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    fn parser() -> PacketParser {
        let protocols: Vec<String> = ["arp", "dhcp", "http", "https", "dns", "smb", "mdns"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        PacketParser::new(&protocols)
    }

    fn arp_frame(
        operation: u16,
        sender_mac: [u8; 6],
        sender_ip: [u8; 4],
        target_mac: [u8; 6],
        target_ip: [u8; 4],
    ) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ARP_FRAME_LEN);
        frame.extend_from_slice(&[0xff; 6]); // destination
        frame.extend_from_slice(&sender_mac);
        frame.extend_from_slice(&[0x08, 0x06]); // EtherType ARP
        frame.extend_from_slice(&[0x00, 0x01]); // hardware type: ethernet
        frame.extend_from_slice(&[0x08, 0x00]); // protocol type: IPv4
        frame.push(6); // hardware size
        frame.push(4); // protocol size
        frame.extend_from_slice(&operation.to_be_bytes());
        frame.extend_from_slice(&sender_mac);
        frame.extend_from_slice(&sender_ip);
        frame.extend_from_slice(&target_mac);
        frame.extend_from_slice(&target_ip);
        frame
    }

    fn dhcp_payload(chaddr: [u8; 6], options: &[u8]) -> Vec<u8> {
        let mut payload = vec![0u8; 236];
        payload[0] = 1; // BOOTREQUEST
        payload[1] = 1; // ethernet
        payload[2] = 6; // hardware address length
        payload[28..34].copy_from_slice(&chaddr);
        payload.extend_from_slice(&[0x63, 0x82, 0x53, 0x63]); // magic cookie
        payload.extend_from_slice(options);
        payload
    }

    fn dhcp_frame(chaddr: [u8; 6], options: &[u8]) -> Vec<u8> {
        let payload = dhcp_payload(chaddr, options);
        let mut frame = Vec::new();
        PacketBuilder::ethernet2(chaddr, [0xff; 6])
            .ipv4([0, 0, 0, 0], [255, 255, 255, 255], 64)
            .udp(68, 67)
            .write(&mut frame, &payload)
            .unwrap();
        frame
    }

    #[test]
    fn ttl_bands_partition_all_values() {
        assert_eq!(guess_os_from_ttl(0), "Linux/Unix");
        assert_eq!(guess_os_from_ttl(64), "Linux/Unix");
        assert_eq!(guess_os_from_ttl(65), "Windows");
        assert_eq!(guess_os_from_ttl(128), "Windows");
        assert_eq!(guess_os_from_ttl(129), "Cisco/Network Device");
        assert_eq!(guess_os_from_ttl(255), "Cisco/Network Device");
    }

    #[test]
    fn user_agent_priority_order() {
        assert_eq!(
            guess_os_from_user_agent("Mozilla/5.0 (Linux; Android 13)"),
            Some("Android")
        );
        assert_eq!(
            guess_os_from_user_agent("Mozilla/5.0 (iPhone; CPU iPhone OS 16_0)"),
            Some("iOS")
        );
        assert_eq!(
            guess_os_from_user_agent("Mozilla/5.0 (Macintosh; Intel Mac OS X 13_1)"),
            Some("macOS")
        );
        assert_eq!(
            guess_os_from_user_agent("Mozilla/5.0 (Windows NT 10.0)"),
            Some("Windows")
        );
        assert_eq!(guess_os_from_user_agent("curl/8.0 (x86_64-linux)"), Some("Linux"));
        assert_eq!(guess_os_from_user_agent("something else"), None);
    }

    #[test]
    fn http_headers_are_lowercased_and_trimmed() {
        let payload = b"GET / HTTP/1.1\r\nHost: example.com \r\nUser-Agent:  curl/8.0\r\n\r\n";
        let headers = parse_http_headers(payload);
        assert_eq!(headers["host"], "example.com");
        assert_eq!(headers["user-agent"], "curl/8.0");
    }

    #[test]
    fn arp_reply_identifies_sender() {
        let frame = arp_frame(
            2,
            [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            [192, 168, 1, 10],
            [0, 0, 0, 0, 0, 0],
            [192, 168, 1, 1],
        );

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert_eq!(obs.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert_eq!(obs.ip_address.as_deref(), Some("192.168.1.10"));
        assert_eq!(obs.vendor, None);

        match &obs.protocols["arp"] {
            ProtocolData::Arp {
                operation,
                sender_ip,
                target_ip,
                ..
            } => {
                assert_eq!(*operation, 2);
                assert_eq!(sender_ip, "192.168.1.10");
                assert_eq!(target_ip, "192.168.1.1");
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn arp_sender_vendor_comes_from_oui() {
        let frame = arp_frame(
            1,
            [0x00, 0x50, 0x56, 0x11, 0x22, 0x33],
            [10, 0, 0, 5],
            [0, 0, 0, 0, 0, 0],
            [10, 0, 0, 1],
        );

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert_eq!(obs.vendor.as_deref(), Some("VMware"));
    }

    #[test]
    fn truncated_arp_keeps_ethernet_findings() {
        let mut frame = arp_frame(
            2,
            [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            [192, 168, 1, 10],
            [0, 0, 0, 0, 0, 0],
            [192, 168, 1, 1],
        );
        frame.truncate(30);

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert_eq!(obs.mac_address.as_deref(), Some("aa:bb:cc:dd:ee:ff"));
        assert!(obs.ip_address.is_none());
        assert!(!obs.protocols.contains_key("arp"));
    }

    #[test]
    fn arp_ignored_when_disabled() {
        let frame = arp_frame(
            2,
            [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff],
            [192, 168, 1, 10],
            [0, 0, 0, 0, 0, 0],
            [192, 168, 1, 1],
        );

        let parser = PacketParser::new(&["dns".to_string()]);
        let obs = parser.parse(&frame, Utc::now()).unwrap();
        assert!(obs.ip_address.is_none());
        assert!(!obs.protocols.contains_key("arp"));
    }

    #[test]
    fn multicast_source_is_not_an_identity() {
        let mut frame = Vec::new();
        PacketBuilder::ethernet2([0x01, 0x00, 0x5e, 0x00, 0x00, 0xfb], [0xff; 6])
            .ipv4([192, 168, 1, 7], [224, 0, 0, 251], 255)
            .udp(5353, 5353)
            .write(&mut frame, &[0u8; 16])
            .unwrap();

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert!(obs.mac_address.is_none());
        assert_eq!(obs.ip_address.as_deref(), Some("192.168.1.7"));
        assert!(obs.protocols.contains_key("mdns"));
    }

    #[test]
    fn syn_ack_marks_source_port_open() {
        let mut frame = Vec::new();
        PacketBuilder::ethernet2([0x02, 0, 0, 0, 0, 1], [0x02, 0, 0, 0, 0, 2])
            .ipv4([10, 0, 0, 9], [10, 0, 0, 10], 64)
            .tcp(22, 51514, 1000, 64240)
            .syn()
            .ack(1)
            .write(&mut frame, &[])
            .unwrap();

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert_eq!(obs.open_ports, vec![22]);
        assert_eq!(obs.services["22/tcp"], "SSH");

        match &obs.protocols["tcp"] {
            ProtocolData::Tcp { syn, ack, .. } => {
                assert!(*syn);
                assert!(*ack);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn plain_syn_opens_nothing() {
        let mut frame = Vec::new();
        PacketBuilder::ethernet2([0x02, 0, 0, 0, 0, 1], [0x02, 0, 0, 0, 0, 2])
            .ipv4([10, 0, 0, 9], [10, 0, 0, 10], 64)
            .tcp(51514, 22, 1000, 64240)
            .syn()
            .write(&mut frame, &[])
            .unwrap();

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert!(obs.open_ports.is_empty());
        // Destination port still identifies the service, keyed by source.
        assert_eq!(obs.services["51514/tcp"], "SSH");
    }

    #[test]
    fn http_request_lifts_host_agent_and_server() {
        let payload = b"GET / HTTP/1.1\r\nHost: www.example.com\r\n\
                        User-Agent: Mozilla/5.0 (Windows NT 10.0)\r\n\
                        Server: nginx/1.18\r\n\r\n";
        let mut frame = Vec::new();
        PacketBuilder::ethernet2([0x02, 0, 0, 0, 0, 1], [0x02, 0, 0, 0, 0, 2])
            .ipv4([10, 0, 0, 5], [93, 184, 216, 34], 128)
            .tcp(49152, 80, 1, 64240)
            .write(&mut frame, payload)
            .unwrap();

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert_eq!(obs.ip_address.as_deref(), Some("10.0.0.5"));
        assert_eq!(obs.hostname.as_deref(), Some("www.example.com"));
        assert_eq!(obs.os_guess.as_deref(), Some("Windows"));
        assert_eq!(obs.services["http"], "nginx/1.18");
        assert!(obs.protocols.contains_key("http"));
    }

    #[test]
    fn http_payload_off_port_80_is_ignored() {
        let payload = b"GET / HTTP/1.1\r\nHost: www.example.com\r\n\r\n";
        let mut frame = Vec::new();
        PacketBuilder::ethernet2([0x02, 0, 0, 0, 0, 1], [0x02, 0, 0, 0, 0, 2])
            .ipv4([10, 0, 0, 5], [93, 184, 216, 34], 128)
            .tcp(49152, 8080, 1, 64240)
            .write(&mut frame, payload)
            .unwrap();

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert!(obs.hostname.is_none());
        assert!(!obs.protocols.contains_key("http"));
    }

    #[test]
    fn dhcp_request_names_the_host() {
        let options = [
            12, 8, b'a', b'l', b'i', b'c', b'e', b'-', b'p', b'c', // hostname
            60, 8, b'M', b'S', b'F', b'T', b' ', b'5', b'.', b'0', // vendor class
            255,
        ];
        let frame = dhcp_frame([0x00, 0x50, 0x56, 0x11, 0x22, 0x33], &options);

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert_eq!(obs.mac_address.as_deref(), Some("00:50:56:11:22:33"));
        assert_eq!(obs.vendor.as_deref(), Some("VMware"));
        assert_eq!(obs.hostname.as_deref(), Some("alice-pc"));

        match &obs.protocols["dhcp"] {
            ProtocolData::Dhcp {
                hostname,
                vendor_class,
                domain,
            } => {
                assert_eq!(hostname.as_deref(), Some("alice-pc"));
                assert_eq!(vendor_class.as_deref(), Some("MSFT 5.0"));
                assert_eq!(*domain, None);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn dhcp_options_skip_padding_and_stop_at_end() {
        let options = [0, 0, 12, 4, b'h', b'o', b's', b't', 255, 12, 3, b'x', b'y', b'z'];
        let (hostname, domain, vendor_class) = parse_dhcp_options(&options);
        assert_eq!(hostname.as_deref(), Some("host"));
        assert_eq!(domain, None);
        assert_eq!(vendor_class, None);
    }

    #[test]
    fn dhcp_truncated_option_is_dropped() {
        // Length byte runs past the buffer.
        let options = [12, 200, b'x'];
        let (hostname, _, _) = parse_dhcp_options(&options);
        assert_eq!(hostname, None);
    }

    #[test]
    fn short_dhcp_payload_is_ignored() {
        let mut frame = Vec::new();
        PacketBuilder::ethernet2([0x02, 0, 0, 0, 0, 1], [0xff; 6])
            .ipv4([0, 0, 0, 0], [255, 255, 255, 255], 64)
            .udp(68, 67)
            .write(&mut frame, &[1u8; 100])
            .unwrap();

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        assert!(!obs.protocols.contains_key("dhcp"));
        // Ethernet and IPv4 findings survive.
        assert_eq!(obs.mac_address.as_deref(), Some("02:00:00:00:00:01"));
    }

    #[test]
    fn dns_and_mdns_are_recorded_shallowly() {
        let mut frame = Vec::new();
        PacketBuilder::ethernet2([0x02, 0, 0, 0, 0, 1], [0x02, 0, 0, 0, 0, 2])
            .ipv4([10, 0, 0, 2], [10, 0, 0, 53], 64)
            .udp(40000, 53)
            .write(&mut frame, &[0u8; 32])
            .unwrap();

        let obs = parser().parse(&frame, Utc::now()).unwrap();
        match &obs.protocols["dns"] {
            ProtocolData::Dns { payload_length } => assert_eq!(*payload_length, 32),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(!obs.protocols.contains_key("mdns"));
    }

    #[test]
    fn garbage_frame_yields_nothing() {
        assert!(parser().parse(&[0x01, 0x02, 0x03], Utc::now()).is_none());
    }
}
