/// Build a BPF expression from the enabled protocol set so the capture
/// handle can drop uninteresting frames before they reach user space.
///
/// Returns `None` when no enabled protocol has a filter clause, which
/// means the capture runs unfiltered.
pub fn build_bpf_filter(enabled_protocols: &[String]) -> Option<String> {
    let mut clauses: Vec<&str> = Vec::new();

    for protocol in enabled_protocols {
        match protocol.as_str() {
            "arp" => clauses.push("arp"),
            "dhcp" => clauses.push("port 67 or port 68"),
            "dns" => clauses.push("port 53"),
            "http" => clauses.push("port 80"),
            "https" => clauses.push("port 443"),
            "smb" => clauses.push("port 445 or port 139"),
            "mdns" => clauses.push("port 5353"),
            _ => {}
        }
    }

    if clauses.is_empty() {
        None
    } else {
        Some(format!("({})", clauses.join(" or ")))
    }
}
