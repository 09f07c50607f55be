//! Network security group rule set

use std::fmt;

/// Administrative (SSH) port
pub const ADMIN_PORT: u16 = 22;

/// Service ports opened to the trusted ranges
pub const SERVICE_PORTS: [u16; 2] = [80, 443];

/// Cloudflare edge ranges, IPv4 (<https://www.cloudflare.com/ips-v4>)
pub const TRUSTED_V4_RANGES: &[&str] = &[
    "173.245.48.0/20",
    "103.21.244.0/22",
    "103.22.200.0/22",
    "103.31.4.0/22",
    "141.101.64.0/18",
    "108.162.192.0/18",
    "190.93.240.0/20",
    "188.114.96.0/20",
    "197.234.240.0/22",
    "198.41.128.0/17",
    "162.158.0.0/15",
    "104.16.0.0/13",
    "104.24.0.0/14",
    "172.64.0.0/13",
    "131.0.72.0/22",
];

/// Cloudflare edge ranges, IPv6 (<https://www.cloudflare.com/ips-v6>)
pub const TRUSTED_V6_RANGES: &[&str] = &[
    "2400:cb00::/32",
    "2606:4700::/32",
    "2803:f800::/32",
    "2405:b500::/32",
    "2405:8100::/32",
    "2a06:98c0::/29",
    "2c0f:f248::/32",
];

/// Priorities leave gaps so rules can be inserted by hand later.
const ADMIN_PRIORITY: u16 = 200;
const TRUSTED_V4_PRIORITY: u16 = 300;
const TRUSTED_V6_PRIORITY: u16 = 310;
const TEMPORARY_PRIORITY: u16 = 900;
const DENY_PRIORITY: u16 = 1000;

/// Wildcard for sources, ports and protocols
pub const ANY: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Any,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Inbound")
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allow => f.write_str("Allow"),
            Self::Deny => f.write_str("Deny"),
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp => f.write_str("Tcp"),
            Self::Any => f.write_str(ANY),
        }
    }
}

/// A single inbound security rule
///
/// Lower priority numbers are evaluated first; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirewallRule {
    pub name: String,
    pub priority: u16,
    pub direction: Direction,
    pub access: Access,
    pub protocol: Protocol,
    pub source_ranges: Vec<String>,
    pub destination_ports: Vec<String>,
}

impl FirewallRule {
    fn new(name: &str, priority: u16, access: Access, protocol: Protocol) -> Self {
        Self {
            name: name.to_string(),
            priority,
            direction: Direction::Inbound,
            access,
            protocol,
            source_ranges: vec![ANY.to_string()],
            destination_ports: vec![ANY.to_string()],
        }
    }

    fn from_sources<S: AsRef<str>>(mut self, sources: &[S]) -> Self {
        self.source_ranges = sources.iter().map(|s| s.as_ref().to_string()).collect();
        self
    }

    fn on_ports(mut self, ports: &[u16]) -> Self {
        self.destination_ports = ports.iter().map(ToString::to_string).collect();
        self
    }

    /// True when the rule matches every source, port and protocol
    pub fn is_catch_all(&self) -> bool {
        self.protocol == Protocol::Any
            && self.source_ranges == [ANY]
            && self.destination_ports == [ANY]
    }
}

/// Build the ordered inbound rule set for the VM's security group
///
/// Always five rules, ascending by priority: operator range on the admin port,
/// trusted v4 and v6 ranges on the service ports, a temporary allow-all, and a
/// final deny-all. An operator range overlapping a trusted range still gets its
/// own rule.
pub fn build_rules<S: AsRef<str>>(
    allowed_range: &str,
    trusted_v4: &[S],
    trusted_v6: &[S],
) -> Vec<FirewallRule> {
    vec![
        FirewallRule::new(
            "AllowAdminFromOperator",
            ADMIN_PRIORITY,
            Access::Allow,
            Protocol::Tcp,
        )
        .from_sources(&[allowed_range])
        .on_ports(&[ADMIN_PORT]),
        FirewallRule::new(
            "AllowTrustedV4Web",
            TRUSTED_V4_PRIORITY,
            Access::Allow,
            Protocol::Tcp,
        )
        .from_sources(trusted_v4)
        .on_ports(&SERVICE_PORTS),
        FirewallRule::new(
            "AllowTrustedV6Web",
            TRUSTED_V6_PRIORITY,
            Access::Allow,
            Protocol::Tcp,
        )
        .from_sources(trusted_v6)
        .on_ports(&SERVICE_PORTS),
        // Narrow or remove this one by hand once the box is set up.
        FirewallRule::new(
            "TemporaryAllowAll",
            TEMPORARY_PRIORITY,
            Access::Allow,
            Protocol::Any,
        ),
        FirewallRule::new("DenyAllInbound", DENY_PRIORITY, Access::Deny, Protocol::Any),
    ]
}

/// Rule set using the built-in trusted range lists
pub fn default_rules(allowed_range: &str) -> Vec<FirewallRule> {
    build_rules(allowed_range, TRUSTED_V4_RANGES, TRUSTED_V6_RANGES)
}
