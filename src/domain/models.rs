//! Data model for passive asset discovery: per-frame observations,
//! long-lived asset records, and the aggregate statistics view.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::network::vendor::VIRTUAL_VENDORS;

/// Parsed payload of a single protocol layer, keyed by protocol name in
/// the observation/asset protocol maps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "protocol", rename_all = "snake_case")]
pub enum ProtocolData {
    Arp {
        operation: u16,
        sender_ip: String,
        sender_mac: String,
        target_ip: String,
        target_mac: String,
    },
    Ipv4 {
        src_ip: String,
        dst_ip: String,
        ttl: u8,
        ip_protocol: u8,
        total_length: u16,
    },
    Tcp {
        src_port: u16,
        dst_port: u16,
        syn: bool,
        ack: bool,
        fin: bool,
        rst: bool,
    },
    Udp {
        src_port: u16,
        dst_port: u16,
    },
    Http {
        headers: BTreeMap<String, String>,
    },
    Dhcp {
        hostname: Option<String>,
        domain: Option<String>,
        vendor_class: Option<String>,
    },
    Dns {
        payload_length: usize,
    },
    Mdns {
        payload_length: usize,
    },
}

impl ProtocolData {
    /// Map key under which this payload is stored.
    pub fn key(&self) -> &'static str {
        match self {
            ProtocolData::Arp { .. } => "arp",
            ProtocolData::Ipv4 { .. } => "ipv4",
            ProtocolData::Tcp { .. } => "tcp",
            ProtocolData::Udp { .. } => "udp",
            ProtocolData::Http { .. } => "http",
            ProtocolData::Dhcp { .. } => "dhcp",
            ProtocolData::Dns { .. } => "dns",
            ProtocolData::Mdns { .. } => "mdns",
        }
    }
}

/// Everything extracted from a single frame. Disposable: either merged
/// into an asset record or dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub mac_address: Option<String>,
    pub vendor: Option<String>,
    pub ip_address: Option<String>,
    pub os_guess: Option<String>,
    pub hostname: Option<String>,
    pub open_ports: Vec<u16>,
    pub services: BTreeMap<String, String>,
    pub protocols: BTreeMap<String, ProtocolData>,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Observation {
            timestamp,
            mac_address: None,
            vendor: None,
            ip_address: None,
            os_guess: None,
            hostname: None,
            open_ports: Vec::new(),
            services: BTreeMap::new(),
            protocols: BTreeMap::new(),
        }
    }

    pub fn record_protocol(&mut self, data: ProtocolData) {
        self.protocols.insert(data.key().to_string(), data);
    }

    /// An observation is only worth keeping when it identifies or
    /// enriches a host in some way.
    pub fn has_findings(&self) -> bool {
        self.mac_address.is_some()
            || self.ip_address.is_some()
            || self.hostname.is_some()
            || !self.open_ports.is_empty()
            || !self.services.is_empty()
            || !self.protocols.is_empty()
    }
}

/// Device classes assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    #[serde(rename = "virtual machine")]
    VirtualMachine,
    #[serde(rename = "server")]
    Server,
    #[serde(rename = "web device")]
    WebDevice,
    #[serde(rename = "workstation")]
    Workstation,
    #[serde(rename = "network device")]
    NetworkDevice,
    #[serde(rename = "unknown device")]
    Unknown,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::VirtualMachine => "virtual machine",
            DeviceType::Server => "server",
            DeviceType::WebDevice => "web device",
            DeviceType::Workstation => "workstation",
            DeviceType::NetworkDevice => "network device",
            DeviceType::Unknown => "unknown device",
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operating system knowledge accumulated for an asset. Empty strings
/// mean "not known yet".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OsInfo {
    pub family: String,
    pub version: String,
    pub kernel: String,
    pub detection: BTreeSet<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transport::Tcp => f.write_str("tcp"),
            Transport::Udp => f.write_str("udp"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortState {
    Open,
    Closed,
    Filtered,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortInfo {
    pub port: u16,
    pub transport: Transport,
    pub state: PortState,
    pub service: String,
    pub version: String,
    pub banner: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl PortInfo {
    pub fn open_tcp(port: u16, now: DateTime<Utc>) -> Self {
        PortInfo {
            port,
            transport: Transport::Tcp,
            state: PortState::Open,
            service: String::new(),
            version: String::new(),
            banner: String::new(),
            first_seen: now,
            last_seen: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport: Option<Transport>,
    pub banner: String,
    pub headers: BTreeMap<String, String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl ServiceInfo {
    /// Build a service entry from an observation's `name -> version`
    /// pair. Keys of the form `<port>/<tcp|udp>` also yield the port
    /// and transport.
    fn from_observation(name: &str, version: &str, now: DateTime<Utc>) -> Self {
        let (port, transport) = match name.split_once('/') {
            Some((p, "tcp")) => (p.parse().ok(), Some(Transport::Tcp)),
            Some((p, "udp")) => (p.parse().ok(), Some(Transport::Udp)),
            _ => (None, None),
        };

        ServiceInfo {
            name: name.to_string(),
            version: version.to_string(),
            port,
            transport,
            banner: String::new(),
            headers: BTreeMap::new(),
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Kinds of journalled asset changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    IpChange,
    HostnameChange,
    PortsChange,
    OsChange,
    DeviceTypeChange,
    StatusChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "change_type")]
    pub kind: ChangeKind,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub description: String,
}

/// A long-lived record describing one observed host. The identifier,
/// first-seen timestamp, and change journal are append-only; everything
/// else is updated by merging observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Asset {
    pub id: String,
    pub ip_address: String,
    pub mac_address: String,
    pub hostname: String,
    pub vendor: String,
    pub device_type: DeviceType,
    pub os_info: OsInfo,
    pub open_ports: BTreeMap<u16, PortInfo>,
    pub services: BTreeMap<String, ServiceInfo>,
    pub protocols: BTreeMap<String, ProtocolData>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
    pub is_active: bool,
    pub confidence: f64,
    pub changes: Vec<ChangeRecord>,
}

impl Asset {
    pub fn from_observation(id: String, obs: &Observation, now: DateTime<Utc>) -> Self {
        let mut asset = Asset {
            id,
            ip_address: obs.ip_address.clone().unwrap_or_default(),
            mac_address: obs.mac_address.clone().unwrap_or_default(),
            hostname: obs.hostname.clone().unwrap_or_default(),
            vendor: obs.vendor.clone().unwrap_or_default(),
            device_type: classify_device(obs),
            os_info: os_info_from(obs),
            open_ports: obs
                .open_ports
                .iter()
                .map(|&p| (p, PortInfo::open_tcp(p, now)))
                .collect(),
            services: obs
                .services
                .iter()
                .map(|(name, version)| {
                    (
                        name.clone(),
                        ServiceInfo::from_observation(name, version, now),
                    )
                })
                .collect(),
            protocols: obs.protocols.clone(),
            first_seen: now,
            last_seen: now,
            last_update: now,
            is_active: true,
            confidence: 0.0,
            changes: Vec::new(),
        };
        asset.recompute_confidence();
        asset
    }

    /// Merge an observation into this record, journalling every change
    /// it causes. Runs under the manager's table write lock, so a single
    /// observation is always applied atomically.
    pub fn absorb(&mut self, obs: &Observation, now: DateTime<Utc>) {
        if let Some(ip) = obs.ip_address.as_deref() {
            if !ip.is_empty() && ip != self.ip_address {
                self.journal(
                    now,
                    ChangeKind::IpChange,
                    json!(self.ip_address),
                    json!(ip),
                    "IP address changed",
                );
                self.ip_address = ip.to_string();
            }
        }

        if let Some(hostname) = obs.hostname.as_deref() {
            if !hostname.is_empty() && hostname != self.hostname {
                self.journal(
                    now,
                    ChangeKind::HostnameChange,
                    json!(self.hostname),
                    json!(hostname),
                    "hostname changed",
                );
                self.hostname = hostname.to_string();
            }
        }

        if !obs.open_ports.is_empty() {
            self.merge_ports(obs, now);
        }

        for (name, version) in &obs.services {
            match self.services.get_mut(name) {
                Some(existing) => {
                    if !version.is_empty() {
                        existing.version = version.clone();
                    }
                    existing.last_seen = now;
                }
                None => {
                    self.services.insert(
                        name.clone(),
                        ServiceInfo::from_observation(name, version, now),
                    );
                }
            }
        }

        for (key, data) in &obs.protocols {
            self.protocols.insert(key.clone(), data.clone());
        }

        self.merge_os(obs, now);

        let new_type = classify_device(obs);
        if new_type != self.device_type {
            self.journal(
                now,
                ChangeKind::DeviceTypeChange,
                json!(self.device_type),
                json!(new_type),
                "device type changed",
            );
            self.device_type = new_type;
        }

        self.last_seen = now;
        self.last_update = now;
        self.is_active = true;
        self.recompute_confidence();
    }

    fn merge_ports(&mut self, obs: &Observation, now: DateTime<Utc>) {
        let mut incoming: Vec<u16> = obs.open_ports.clone();
        incoming.sort_unstable();
        incoming.dedup();

        let existing: Vec<u16> = self.open_ports.keys().copied().collect();
        if existing != incoming {
            self.journal(
                now,
                ChangeKind::PortsChange,
                json!(existing),
                json!(incoming),
                "open ports changed",
            );
        }

        for port in incoming {
            self.open_ports
                .entry(port)
                .and_modify(|info| info.last_seen = now)
                .or_insert_with(|| PortInfo::open_tcp(port, now));
        }
    }

    fn merge_os(&mut self, obs: &Observation, now: DateTime<Utc>) {
        let incoming = os_info_from(obs);
        if incoming.family.is_empty() && incoming.detection.is_empty() {
            return;
        }

        if !incoming.family.is_empty() && incoming.family != self.os_info.family {
            self.journal(
                now,
                ChangeKind::OsChange,
                json!(self.os_info),
                json!(incoming),
                "operating system changed",
            );
        }

        if !incoming.family.is_empty() {
            self.os_info.family = incoming.family;
        }
        if !incoming.version.is_empty() {
            self.os_info.version = incoming.version;
        }
        if !incoming.kernel.is_empty() {
            self.os_info.kernel = incoming.kernel;
        }
        self.os_info.detection.extend(incoming.detection);
        if incoming.confidence > self.os_info.confidence {
            self.os_info.confidence = incoming.confidence;
        }
    }

    /// Flip an active asset to inactive, journalling the transition.
    pub fn mark_inactive(&mut self, now: DateTime<Utc>) {
        if self.is_active {
            self.is_active = false;
            self.last_update = now;
            self.journal(
                now,
                ChangeKind::StatusChange,
                json!(true),
                json!(false),
                "asset became inactive",
            );
        }
    }

    fn journal(
        &mut self,
        now: DateTime<Utc>,
        kind: ChangeKind,
        old_value: serde_json::Value,
        new_value: serde_json::Value,
        description: &str,
    ) {
        self.changes.push(ChangeRecord {
            timestamp: now,
            kind,
            old_value,
            new_value,
            description: description.to_string(),
        });
    }

    /// Identification confidence from the attributes currently known.
    /// Monotone under merging: attributes are never un-learned.
    pub fn recompute_confidence(&mut self) {
        let mut confidence: f64 = 0.0;
        if !self.mac_address.is_empty() {
            confidence += 0.3;
        }
        if !self.ip_address.is_empty() {
            confidence += 0.2;
        }
        if !self.hostname.is_empty() {
            confidence += 0.2;
        }
        if !self.open_ports.is_empty() {
            confidence += 0.1;
        }
        if !self.services.is_empty() {
            confidence += 0.1;
        }
        if !self.os_info.family.is_empty() {
            confidence += 0.1;
        }
        self.confidence = confidence.min(1.0);
    }
}

/// Classify the device described by a single observation. First match
/// wins: hypervisor vendors, then port profile, then OS guess.
pub fn classify_device(obs: &Observation) -> DeviceType {
    if let Some(vendor) = obs.vendor.as_deref() {
        if VIRTUAL_VENDORS.contains(&vendor) {
            return DeviceType::VirtualMachine;
        }
    }

    let has_web_ports = obs
        .open_ports
        .iter()
        .any(|&p| matches!(p, 80 | 443 | 8080 | 8443));
    let has_server_ports = obs
        .open_ports
        .iter()
        .any(|&p| matches!(p, 22 | 23 | 3389 | 21 | 25 | 53 | 110 | 143));

    if has_web_ports && has_server_ports {
        return DeviceType::Server;
    } else if has_web_ports {
        return DeviceType::WebDevice;
    } else if has_server_ports {
        return DeviceType::Server;
    }

    match obs.os_guess.as_deref() {
        Some("Linux/Unix") => DeviceType::Server,
        Some("Windows") => DeviceType::Workstation,
        Some("Cisco/Network Device") => DeviceType::NetworkDevice,
        _ => DeviceType::Unknown,
    }
}

/// Derive OS knowledge from one observation: the TTL/User-Agent guess
/// plus whatever the protocol payloads reveal about detection methods.
pub fn os_info_from(obs: &Observation) -> OsInfo {
    let mut info = OsInfo {
        family: obs.os_guess.clone().unwrap_or_default(),
        confidence: 0.5,
        ..OsInfo::default()
    };

    if obs.os_guess.is_some() {
        info.detection.insert("ttl_analysis".to_string());
    }

    if let Some(ProtocolData::Http { headers }) = obs.protocols.get("http") {
        if headers.contains_key("user-agent") {
            info.detection.insert("user_agent".to_string());
        }
    }

    if let Some(ProtocolData::Dhcp {
        vendor_class: Some(vendor_class),
        ..
    }) = obs.protocols.get("dhcp")
    {
        info.detection.insert("dhcp_vendor_class".to_string());
        info.version = vendor_class.clone();
    }

    info
}

/// Aggregate view over the asset table. Rebuilt on every statistics
/// tick; never a source of truth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetStats {
    pub total_assets: usize,
    pub active_assets: usize,
    pub new_assets: u64,
    pub last_update: Option<DateTime<Utc>>,
    pub device_types: BTreeMap<String, usize>,
    pub os_distribution: BTreeMap<String, usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation() -> Observation {
        Observation::new(Utc::now())
    }

    #[test]
    fn empty_observation_has_no_findings() {
        assert!(!observation().has_findings());
    }

    #[test]
    fn single_attribute_is_a_finding() {
        let mut obs = observation();
        obs.hostname = Some("printer-3".into());
        assert!(obs.has_findings());

        let mut obs = observation();
        obs.open_ports.push(631);
        assert!(obs.has_findings());
    }

    #[test]
    fn vm_vendor_wins_classification() {
        let mut obs = observation();
        obs.vendor = Some("VMware".into());
        obs.open_ports = vec![80, 22];
        assert_eq!(classify_device(&obs), DeviceType::VirtualMachine);
    }

    #[test]
    fn port_profile_classification() {
        let mut obs = observation();
        obs.open_ports = vec![80, 22];
        assert_eq!(classify_device(&obs), DeviceType::Server);

        obs.open_ports = vec![8443];
        assert_eq!(classify_device(&obs), DeviceType::WebDevice);

        obs.open_ports = vec![25];
        assert_eq!(classify_device(&obs), DeviceType::Server);
    }

    #[test]
    fn os_guess_classification_fallback() {
        let mut obs = observation();
        obs.os_guess = Some("Windows".into());
        assert_eq!(classify_device(&obs), DeviceType::Workstation);

        obs.os_guess = Some("Cisco/Network Device".into());
        assert_eq!(classify_device(&obs), DeviceType::NetworkDevice);

        obs.os_guess = None;
        assert_eq!(classify_device(&obs), DeviceType::Unknown);
    }

    #[test]
    fn confidence_sums_known_attributes() {
        let mut obs = observation();
        obs.mac_address = Some("aa:bb:cc:dd:ee:ff".into());
        obs.ip_address = Some("192.168.1.10".into());

        let asset = Asset::from_observation("mac_aa:bb:cc:dd:ee:ff".into(), &obs, Utc::now());
        assert!((asset.confidence - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_is_clamped_to_one() {
        let mut obs = observation();
        obs.mac_address = Some("aa:bb:cc:dd:ee:ff".into());
        obs.ip_address = Some("192.168.1.10".into());
        obs.hostname = Some("host".into());
        obs.os_guess = Some("Linux/Unix".into());
        obs.open_ports = vec![22];
        obs.services.insert("22/tcp".into(), "SSH".into());

        let asset = Asset::from_observation("mac_aa:bb:cc:dd:ee:ff".into(), &obs, Utc::now());
        assert!(asset.confidence <= 1.0);
        assert!(asset.confidence > 0.99);
    }

    #[test]
    fn absorb_journals_ip_change_once() {
        let mut obs = observation();
        obs.ip_address = Some("10.0.0.1".into());
        let mut asset = Asset::from_observation("ip_10.0.0.1".into(), &obs, Utc::now());

        obs.ip_address = Some("10.0.0.2".into());
        asset.absorb(&obs, Utc::now());
        assert_eq!(asset.ip_address, "10.0.0.2");
        assert_eq!(asset.changes.len(), 1);
        assert_eq!(asset.changes[0].kind, ChangeKind::IpChange);

        // Same IP again: no further journal entries.
        asset.absorb(&obs, Utc::now());
        assert_eq!(asset.changes.len(), 1);
    }

    #[test]
    fn ports_merge_never_truncates() {
        let mut obs = observation();
        obs.ip_address = Some("10.0.0.1".into());
        obs.open_ports = vec![22];
        let mut asset = Asset::from_observation("ip_10.0.0.1".into(), &obs, Utc::now());

        obs.open_ports = vec![80];
        asset.absorb(&obs, Utc::now());

        let ports: Vec<u16> = asset.open_ports.keys().copied().collect();
        assert_eq!(ports, vec![22, 80]);
        assert!(asset
            .changes
            .iter()
            .any(|c| c.kind == ChangeKind::PortsChange));
    }

    #[test]
    fn repeated_ports_update_last_seen_without_journal() {
        let t0 = Utc::now();
        let mut obs = observation();
        obs.ip_address = Some("10.0.0.1".into());
        obs.open_ports = vec![22];
        let mut asset = Asset::from_observation("ip_10.0.0.1".into(), &obs, t0);

        let t1 = t0 + chrono::Duration::seconds(5);
        asset.absorb(&obs, t1);

        let port = &asset.open_ports[&22];
        assert_eq!(port.first_seen, t0);
        assert_eq!(port.last_seen, t1);
        assert!(!asset
            .changes
            .iter()
            .any(|c| c.kind == ChangeKind::PortsChange));
    }

    #[test]
    fn service_collision_prefers_new_version() {
        let now = Utc::now();
        let mut obs = observation();
        obs.ip_address = Some("10.0.0.1".into());
        obs.services.insert("http".into(), String::new());
        let mut asset = Asset::from_observation("ip_10.0.0.1".into(), &obs, now);

        obs.services.insert("http".into(), "nginx/1.18".into());
        asset.absorb(&obs, now);
        assert_eq!(asset.services["http"].version, "nginx/1.18");

        // An empty version must not clobber a known one.
        obs.services.insert("http".into(), String::new());
        asset.absorb(&obs, now);
        assert_eq!(asset.services["http"].version, "nginx/1.18");
    }

    #[test]
    fn service_key_carries_port_and_transport() {
        let info = ServiceInfo::from_observation("22/tcp", "SSH", Utc::now());
        assert_eq!(info.port, Some(22));
        assert_eq!(info.transport, Some(Transport::Tcp));

        let info = ServiceInfo::from_observation("http", "nginx", Utc::now());
        assert_eq!(info.port, None);
        assert_eq!(info.transport, None);
    }

    #[test]
    fn os_merge_unions_detection_and_keeps_larger_confidence() {
        let mut obs = observation();
        obs.ip_address = Some("10.0.0.1".into());
        obs.os_guess = Some("Linux/Unix".into());
        let mut asset = Asset::from_observation("ip_10.0.0.1".into(), &obs, Utc::now());
        asset.os_info.confidence = 0.9;

        let mut headers = BTreeMap::new();
        headers.insert("user-agent".into(), "curl/8.0".into());
        obs.record_protocol(ProtocolData::Http { headers });
        asset.absorb(&obs, Utc::now());

        assert!(asset.os_info.detection.contains("ttl_analysis"));
        assert!(asset.os_info.detection.contains("user_agent"));
        assert!((asset.os_info.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn os_family_change_is_journalled() {
        let mut obs = observation();
        obs.ip_address = Some("10.0.0.1".into());
        obs.os_guess = Some("Linux/Unix".into());
        let mut asset = Asset::from_observation("ip_10.0.0.1".into(), &obs, Utc::now());

        obs.os_guess = Some("Windows".into());
        asset.absorb(&obs, Utc::now());
        assert_eq!(asset.os_info.family, "Windows");
        assert!(asset.changes.iter().any(|c| c.kind == ChangeKind::OsChange));
    }

    #[test]
    fn mark_inactive_is_idempotent() {
        let mut obs = observation();
        obs.ip_address = Some("10.0.0.1".into());
        let mut asset = Asset::from_observation("ip_10.0.0.1".into(), &obs, Utc::now());

        asset.mark_inactive(Utc::now());
        asset.mark_inactive(Utc::now());

        assert!(!asset.is_active);
        let status_changes = asset
            .changes
            .iter()
            .filter(|c| c.kind == ChangeKind::StatusChange)
            .count();
        assert_eq!(status_changes, 1);
    }

    #[test]
    fn protocol_payloads_serialise_tagged() {
        let data = ProtocolData::Dns { payload_length: 64 };
        let value = serde_json::to_value(&data).unwrap();
        assert_eq!(value["protocol"], "dns");
        assert_eq!(value["payload_length"], 64);

        let back: ProtocolData = serde_json::from_value(value).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn asset_document_round_trips() {
        let mut obs = observation();
        obs.mac_address = Some("aa:bb:cc:dd:ee:ff".into());
        obs.ip_address = Some("192.168.1.10".into());
        obs.open_ports = vec![22];
        obs.services.insert("22/tcp".into(), "SSH".into());
        let asset = Asset::from_observation("mac_aa:bb:cc:dd:ee:ff".into(), &obs, Utc::now());

        let doc = serde_json::to_value(&asset).unwrap();
        assert_eq!(doc["id"], "mac_aa:bb:cc:dd:ee:ff");
        assert_eq!(doc["device_type"], "server");

        let back: Asset = serde_json::from_value(doc).unwrap();
        assert_eq!(back.id, asset.id);
        assert_eq!(back.open_ports.len(), 1);
        assert_eq!(back.services["22/tcp"].version, "SSH");
    }
}
