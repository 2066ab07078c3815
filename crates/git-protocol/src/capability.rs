//! Capability parsing and negotiation.
//!
//! The first non-flush packet from the server carries a NUL-separated (for
//! `receive-pack`) or space-separated (for `upload-pack`) capability list
//! appended after the first ref line. Capabilities relevant here:
//! `report-status`, `delete-refs`, `no-thin`, `ofs-delta`.

/// Parsed set of capabilities, in advertisement order.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    entries: Vec<CapabilityEntry>,
}

/// A single capability, optionally carrying a value (`name=value`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityEntry {
    pub name: String,
    pub value: Option<String>,
}

impl Capabilities {
    /// Parse a space-separated capability string, as seen after the NUL
    /// byte on the first ref-advertisement line.
    pub fn parse(caps_str: &str) -> Self {
        let mut entries = Vec::new();
        for cap in caps_str.split_whitespace() {
            if let Some(eq_pos) = cap.find('=') {
                entries.push(CapabilityEntry {
                    name: cap[..eq_pos].to_string(),
                    value: Some(cap[eq_pos + 1..].to_string()),
                });
            } else {
                entries.push(CapabilityEntry { name: cap.to_string(), value: None });
            }
        }
        Self { entries }
    }

    pub fn has(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.iter().find(|e| e.name == name).and_then(|e| e.value.as_deref())
    }

    pub fn entries(&self) -> &[CapabilityEntry] {
        &self.entries
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for e in &self.entries {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            match &e.value {
                Some(v) => write!(f, "{}={}", e.name, v)?,
                None => write!(f, "{}", e.name)?,
            }
        }
        Ok(())
    }
}

/// Negotiate the capability list a client sends back to an `upload-pack`
/// server, given what it advertised.
pub fn negotiate_fetch_capabilities(server: &Capabilities) -> Vec<String> {
    let mut client = Vec::new();
    if server.has("ofs-delta") {
        client.push("ofs-delta".into());
    }
    if server.has("no-thin") {
        client.push("no-thin".into());
    }
    client.push("agent=gitr/0.1".into());
    client
}

/// Negotiate the capability list a client sends back to a `receive-pack`
/// server.
pub fn negotiate_push_capabilities(server: &Capabilities) -> Vec<String> {
    let mut client = Vec::new();
    if server.has("report-status") {
        client.push("report-status".into());
    }
    if server.has("delete-refs") {
        client.push("delete-refs".into());
    }
    if server.has("ofs-delta") {
        client.push("ofs-delta".into());
    }
    client.push("agent=gitr/0.1".into());
    client
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_capabilities() {
        let caps = Capabilities::parse("report-status delete-refs no-thin ofs-delta agent=git/2.39.0");
        assert!(caps.has("report-status"));
        assert!(caps.has("delete-refs"));
        assert!(caps.has("no-thin"));
        assert!(caps.has("ofs-delta"));
        assert_eq!(caps.get("agent"), Some("git/2.39.0"));
        assert!(!caps.has("nonexistent"));
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let caps = Capabilities::parse("report-status ofs-delta agent=gitr/0.1");
        let formatted = caps.to_string();
        let reparsed = Capabilities::parse(&formatted);
        assert!(reparsed.has("report-status"));
        assert_eq!(reparsed.get("agent"), Some("gitr/0.1"));
    }

    #[test]
    fn negotiate_fetch_caps_picks_supported_only() {
        let server = Capabilities::parse("ofs-delta no-thin shallow");
        let client = negotiate_fetch_capabilities(&server);
        assert!(client.contains(&"ofs-delta".to_string()));
        assert!(client.contains(&"no-thin".to_string()));
        assert!(client.iter().any(|c| c.starts_with("agent=")));
    }

    #[test]
    fn negotiate_push_caps_picks_supported_only() {
        let server = Capabilities::parse("report-status delete-refs ofs-delta");
        let client = negotiate_push_capabilities(&server);
        assert!(client.contains(&"report-status".to_string()));
        assert!(client.contains(&"delete-refs".to_string()));
        assert!(client.contains(&"ofs-delta".to_string()));
    }

    #[test]
    fn negotiate_push_caps_skips_unsupported() {
        let server = Capabilities::parse("ofs-delta");
        let client = negotiate_push_capabilities(&server);
        assert!(!client.contains(&"report-status".to_string()));
        assert!(!client.contains(&"delete-refs".to_string()));
    }
}
