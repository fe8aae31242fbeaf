use crate::{DialogPermissionError, Kind, Permission, PermissionType};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt::{Display, Formatter};

/// Set of socket actions.
///
/// `connect`, `listen` and `accept` each imply `resolve`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SocketActions(u8);

impl SocketActions {
    /// Open a connection to the host.
    pub const CONNECT: Self = Self(1);
    /// Listen on the port.
    pub const LISTEN: Self = Self(1 << 1);
    /// Accept connections from the host.
    pub const ACCEPT: Self = Self(1 << 2);
    /// Look the host name up.
    pub const RESOLVE: Self = Self(1 << 3);

    const NAMES: [(Self, &'static str); 4] = [
        (Self::CONNECT, "connect"),
        (Self::LISTEN, "listen"),
        (Self::ACCEPT, "accept"),
        (Self::RESOLVE, "resolve"),
    ];

    /// Parse a comma-separated, case-insensitive action list.
    pub fn parse(actions: &str) -> Result<Self, DialogPermissionError> {
        let mut parsed = Self::default();
        for action in actions.split(',').map(str::trim) {
            let action = action.to_ascii_lowercase();
            match Self::NAMES.iter().find(|(_, name)| *name == action) {
                Some((flag, _)) => parsed = parsed.union(*flag),
                None => {
                    return Err(DialogPermissionError::invalid(
                        SocketPermission::KIND,
                        format!("unknown action '{action}'"),
                    ));
                }
            }
        }
        if !parsed.is_empty() {
            parsed = parsed.union(Self::RESOLVE);
        }
        Ok(parsed)
    }

    /// Actions present in either set.
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether every action of `other` is present in `self`.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no action is present.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Display for SocketActions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        f.write_str(&names.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Host {
    /// `*`
    Any,
    /// `*.example.com`, stored as `.example.com`.
    Suffix(String),
    Exact(String),
}

impl Host {
    fn parse(host: &str) -> Result<Self, DialogPermissionError> {
        let host = host.to_ascii_lowercase();
        if host.is_empty() {
            return Ok(Self::Exact("localhost".into()));
        }
        if host == "*" {
            return Ok(Self::Any);
        }
        if let Some(suffix) = host.strip_prefix('*') {
            if suffix.starts_with('.') && suffix.len() > 1 && !suffix.contains('*') {
                return Ok(Self::Suffix(suffix.into()));
            }
        } else if !host.contains('*') {
            return Ok(Self::Exact(host));
        }
        Err(DialogPermissionError::invalid(
            SocketPermission::KIND,
            format!("'{host}' may only use '*' as a leading wildcard label"),
        ))
    }

    fn covers(&self, requested: &Host) -> bool {
        match (self, requested) {
            (Self::Any, _) => true,
            (_, Self::Any) => false,
            (Self::Suffix(suffix), Self::Suffix(other)) => other.ends_with(suffix.as_str()),
            (Self::Suffix(suffix), Self::Exact(host)) => host.ends_with(suffix.as_str()),
            (Self::Exact(_), Self::Suffix(_)) => false,
            (Self::Exact(host), Self::Exact(other)) => host == other,
        }
    }
}

impl Display for Host {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("*"),
            Self::Suffix(suffix) => write!(f, "*{suffix}"),
            Self::Exact(host) if host.contains(':') => write!(f, "[{host}]"),
            Self::Exact(host) => f.write_str(host),
        }
    }
}

/// Inclusive range of ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortRange {
    /// Lowest port in the range.
    pub low: u16,
    /// Highest port in the range.
    pub high: u16,
}

impl PortRange {
    /// Every port.
    pub const ALL: Self = Self {
        low: 0,
        high: u16::MAX,
    };

    /// Parse `N`, `N-M`, `N-`, `-N` or `*`. An empty string means every port.
    pub fn parse(ports: &str) -> Result<Self, DialogPermissionError> {
        let invalid = || {
            DialogPermissionError::invalid(
                SocketPermission::KIND,
                format!("invalid port range '{ports}'"),
            )
        };
        let port = |text: &str, default: u16| -> Result<u16, DialogPermissionError> {
            if text.is_empty() {
                Ok(default)
            } else {
                text.parse().map_err(|_| invalid())
            }
        };

        let ports = ports.trim();
        if ports.is_empty() || ports == "*" {
            return Ok(Self::ALL);
        }
        let range = match ports.split_once('-') {
            Some(("", "")) => return Err(invalid()),
            Some((low, high)) => Self {
                low: port(low, 0)?,
                high: port(high, u16::MAX)?,
            },
            None => {
                let single = port(ports, 0)?;
                Self {
                    low: single,
                    high: single,
                }
            }
        };
        if range.low > range.high {
            return Err(invalid());
        }
        Ok(range)
    }

    /// Whether `other` lies entirely within this range.
    pub fn contains(&self, other: &PortRange) -> bool {
        self.low <= other.low && other.high <= self.high
    }
}

impl Display for PortRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.low == self.high {
            write!(f, "{}", self.low)
        } else {
            write!(f, "{}-{}", self.low, self.high)
        }
    }
}

/// Network access to a host and port range.
///
/// Names take the form `host[:ports]`, where the host is `*`, `*.suffix`, a
/// host name or an IP literal (IPv6 in brackets), and the ports are a
/// [`PortRange`]. Host names are compared without any lookup, so
/// `example.com` does not imply `93.184.215.14`.
///
/// The reported name is canonical: lowercase host and explicit port range,
/// with the range left out when it covers every port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "SocketRecord", into = "SocketRecord")]
pub struct SocketPermission {
    host: Host,
    ports: PortRange,
    actions: SocketActions,
    name: String,
    canonical_actions: String,
}

#[derive(Serialize, Deserialize)]
struct SocketRecord {
    name: String,
    actions: String,
}

impl TryFrom<SocketRecord> for SocketPermission {
    type Error = DialogPermissionError;

    fn try_from(record: SocketRecord) -> Result<Self, Self::Error> {
        Self::new(&record.name, &record.actions)
    }
}

impl From<SocketPermission> for SocketRecord {
    fn from(permission: SocketPermission) -> Self {
        Self {
            name: permission.name,
            actions: permission.canonical_actions,
        }
    }
}

impl SocketPermission {
    /// Create a socket permission from `host[:ports]` and a comma-separated
    /// list of `connect`, `listen`, `accept` and `resolve`.
    pub fn new(name: &str, actions: &str) -> Result<Self, DialogPermissionError> {
        let (host, ports) = split_host_and_ports(name.trim())?;
        let host = Host::parse(host)?;
        let ports = PortRange::parse(ports)?;
        let actions = SocketActions::parse(actions)?;

        let name = if ports == PortRange::ALL {
            host.to_string()
        } else {
            format!("{host}:{ports}")
        };

        Ok(Self {
            canonical_actions: actions.to_string(),
            host,
            ports,
            actions,
            name,
        })
    }

    /// The granted port range.
    pub fn ports(&self) -> PortRange {
        self.ports
    }

    /// The granted actions.
    pub fn socket_actions(&self) -> SocketActions {
        self.actions
    }
}

fn split_host_and_ports(name: &str) -> Result<(&str, &str), DialogPermissionError> {
    if let Some(bracketed) = name.strip_prefix('[') {
        let Some((host, rest)) = bracketed.split_once(']') else {
            return Err(DialogPermissionError::invalid(
                SocketPermission::KIND,
                format!("unterminated IPv6 literal in '{name}'"),
            ));
        };
        return match rest {
            "" => Ok((host, "")),
            _ => match rest.strip_prefix(':') {
                Some(ports) => Ok((host, ports)),
                None => Err(DialogPermissionError::invalid(
                    SocketPermission::KIND,
                    format!("unexpected '{rest}' after IPv6 literal"),
                )),
            },
        };
    }

    match name.matches(':').count() {
        0 => Ok((name, "")),
        1 => Ok(name.split_once(':').unwrap_or((name, ""))),
        // An IPv6 literal without brackets cannot carry ports.
        _ => Ok((name, "")),
    }
}

impl Permission for SocketPermission {
    fn kind(&self) -> Kind {
        Kind::from_static(Self::KIND)
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn actions(&self) -> Option<&str> {
        Some(&self.canonical_actions)
    }

    fn implies(&self, requested: &dyn Permission) -> bool {
        let Some(requested) = requested.downcast_ref::<SocketPermission>() else {
            return false;
        };
        if !self.actions.contains(requested.actions) {
            return false;
        }
        // Ports do not matter when all that is asked for is a lookup.
        let resolve_only = requested.actions == SocketActions::RESOLVE;
        if !resolve_only && !self.ports.contains(&requested.ports) {
            return false;
        }
        self.host.covers(&requested.host)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl PermissionType for SocketPermission {
    const KIND: &'static str = "socket";

    fn construct(name: &str, actions: Option<&str>) -> Result<Self, DialogPermissionError> {
        let actions = actions
            .ok_or_else(|| DialogPermissionError::invalid(Self::KIND, "no actions given"))?;
        Self::new(name, actions)
    }
}
