//! MAC vendor identification from a built-in OUI table.
//!
//! Only the handful of prefixes that matter for device classification
//! (hypervisors, common NIC vendors) are carried; everything else maps
//! to no vendor.

/// Built-in OUI prefix table. Exact match on the first three octets.
const OUI_VENDORS: &[([u8; 3], &str)] = &[
    ([0x00, 0x50, 0x56], "VMware"),
    ([0x00, 0x0c, 0x29], "VMware"),
    ([0x08, 0x00, 0x27], "VirtualBox"),
    ([0x00, 0x15, 0x5d], "Microsoft Hyper-V"),
    ([0x52, 0x54, 0x00], "QEMU/KVM"),
    ([0x00, 0x16, 0x3e], "Xen"),
    ([0xec, 0xf4, 0xbb], "NetApp"),
    ([0x00, 0x90, 0x27], "Intel"),
    ([0xd4, 0xbe, 0xd9], "Dell"),
    ([0x98, 0x90, 0x96], "Foxconn"),
];

/// Vendors that identify a virtualised guest rather than physical hardware.
pub const VIRTUAL_VENDORS: &[&str] = &[
    "VMware",
    "VirtualBox",
    "Microsoft Hyper-V",
    "QEMU/KVM",
    "Xen",
];

/// Look up the vendor for a MAC address by its OUI prefix.
pub fn lookup(mac: &[u8]) -> Option<&'static str> {
    let prefix = mac.get(0..3)?;
    OUI_VENDORS
        .iter()
        .find(|(oui, _)| oui == prefix)
        .map(|(_, vendor)| *vendor)
}

/// Canonical MAC rendering: lower-case, colon-separated.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_prefixes_resolve() {
        assert_eq!(lookup(&[0x00, 0x50, 0x56, 0x11, 0x22, 0x33]), Some("VMware"));
        assert_eq!(lookup(&[0x08, 0x00, 0x27, 0x00, 0x00, 0x01]), Some("VirtualBox"));
        assert_eq!(lookup(&[0x52, 0x54, 0x00, 0xab, 0xcd, 0xef]), Some("QEMU/KVM"));
    }

    #[test]
    fn unknown_prefix_has_no_vendor() {
        assert_eq!(lookup(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]), None);
    }

    #[test]
    fn short_slice_has_no_vendor() {
        assert_eq!(lookup(&[0x00, 0x50]), None);
    }

    #[test]
    fn mac_is_rendered_lowercase_with_colons() {
        assert_eq!(
            format_mac(&[0xAA, 0xBB, 0xCC, 0x0D, 0x0E, 0x0F]),
            "aa:bb:cc:0d:0e:0f"
        );
    }
}
