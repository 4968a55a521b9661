//! Connection profile model and validation

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use toml::{Table, Value};

use super::serde_utils::{duration_secs, parse_duration};
use crate::error::ProfileError;
use crate::types::{Target, TransportKind};

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// OpenSSH keepalive values used when `ssh_options` leaves them unset
pub const DEFAULT_SERVER_ALIVE_INTERVAL: u32 = 10;
pub const DEFAULT_SERVER_ALIVE_COUNT_MAX: u32 = 60;
pub const DEFAULT_CONNECTION_ATTEMPTS: u32 = 3;

/// `tmux_session` value that asks for a derived session name
pub const AUTO_SESSION: &str = "auto";

/// Fields accepted in a `[[profiles]]` entry
const PROFILE_FIELDS: &[&str] = &[
    "name",
    "host",
    "user",
    "port",
    "transport_order",
    "tmux_session",
    "connect_timeout",
    "extra_args",
    "key",
    "mosh_server",
    "network",
    "tags",
    "ssh_options",
];

const SSH_OPTION_FIELDS: &[&str] = &[
    "forward_agent",
    "server_alive_interval",
    "server_alive_count_max",
    "connection_attempts",
];

/// How the profile reaches its network
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// Use whatever route the system resolver gives us
    #[default]
    Auto,
    /// The host must be a peer in the local tailnet
    Tailscale,
    /// Plain ssh only; mosh candidates are never planned
    Direct,
}

/// How `tmux_session = "auto"` is turned into a session name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoSessionNaming {
    /// The profile name, verbatim
    #[default]
    Profile,
    /// `<profile>-<host>`, for several profiles sharing one host
    ProfileHost,
}

/// Opaque passthrough arguments per transport
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraArgs {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mosh: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ssh: Vec<String>,
}

impl ExtraArgs {
    pub fn for_transport(&self, kind: TransportKind) -> &[String] {
        match kind {
            TransportKind::Mosh => &self.mosh,
            TransportKind::Ssh => &self.ssh,
        }
    }
}

/// Advanced OpenSSH options. `None` leaves the backend default in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshOptions {
    #[serde(default)]
    pub forward_agent: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_alive_interval: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_alive_count_max: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_attempts: Option<u32>,
}

/// The `[defaults]` table of a profile file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileDefaults {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_order: Option<Vec<TransportKind>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_secs::option"
    )]
    pub connect_timeout: Option<Duration>,

    #[serde(default)]
    pub auto_session: AutoSessionNaming,
}

impl ProfileDefaults {
    /// Check the defaults obey the same invariants as profile fields
    pub fn validate(&self) -> Result<(), String> {
        if let Some(order) = &self.transport_order {
            check_transport_order(order)?;
        }
        if self.connect_timeout == Some(Duration::ZERO) {
            return Err("connect_timeout must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// A validated connection profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub name: String,
    pub host: String,
    pub user: Option<String>,
    pub port: u16,
    pub transport_order: Vec<TransportKind>,
    pub tmux_session: String,
    #[serde(with = "duration_secs")]
    pub connect_timeout: Duration,
    pub extra_args: ExtraArgs,
    pub key: Option<PathBuf>,
    pub mosh_server: Option<String>,
    pub network: NetworkMode,
    pub tags: Vec<String>,
    pub ssh_options: SshOptions,
}

impl Profile {
    /// Connection target for this profile
    pub fn target(&self) -> Target {
        Target::new(self.user.clone(), self.host.clone(), self.port)
    }

    /// Check if the profile has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Validate one `[[profiles]]` entry against the invariants
    ///
    /// Every error names the offending field. Only `port` and
    /// `tmux_session` fall back to built-in values; `transport_order` and
    /// `connect_timeout` may come from `[defaults]`.
    pub fn from_entry(entry: &Table, defaults: &ProfileDefaults) -> Result<Self, ProfileError> {
        let name = entry_name(entry)?;
        let fields = Fields {
            profile: &name,
            entry,
        };

        for key in entry.keys() {
            if !PROFILE_FIELDS.contains(&key.as_str()) {
                return Err(fields.invalid(key, "is not a recognized profile field"));
            }
        }

        let host = fields
            .string("host")?
            .ok_or_else(|| fields.invalid("host", "is required"))?;
        if host.trim().is_empty() || host.chars().any(char::is_whitespace) {
            return Err(fields.invalid("host", "must be a non-empty host name without spaces"));
        }

        let user = fields.string("user")?.filter(|u| !u.is_empty());
        let port = fields.port()?;

        let transport_order = match entry.get("transport_order") {
            Some(value) => fields.transport_order(value)?,
            None => defaults.transport_order.clone().ok_or_else(|| {
                fields.invalid(
                    "transport_order",
                    "is required (set it on the profile or in [defaults])",
                )
            })?,
        };

        let tmux_session = match fields.string("tmux_session")? {
            None => derive_session_name(&name, &host, defaults.auto_session),
            Some(s) if s == AUTO_SESSION => derive_session_name(&name, &host, defaults.auto_session),
            Some(s) => {
                check_session_name(&s).map_err(|reason| fields.invalid("tmux_session", reason))?;
                s
            }
        };

        let connect_timeout = match entry.get("connect_timeout") {
            Some(value) => fields.duration("connect_timeout", value)?,
            None => defaults.connect_timeout.ok_or_else(|| {
                fields.invalid(
                    "connect_timeout",
                    "is required (set it on the profile or in [defaults])",
                )
            })?,
        };

        let network = match fields.string("network")? {
            None => NetworkMode::Auto,
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "auto" => NetworkMode::Auto,
                "tailscale" => NetworkMode::Tailscale,
                "direct" => NetworkMode::Direct,
                _ => {
                    return Err(fields.invalid(
                        "network",
                        "must be \"auto\", \"tailscale\" or \"direct\"",
                    ))
                }
            },
        };
        if network == NetworkMode::Direct && !transport_order.contains(&TransportKind::Ssh) {
            return Err(fields.invalid("network", "\"direct\" needs ssh in transport_order"));
        }

        Ok(Profile {
            host,
            user,
            port,
            transport_order,
            tmux_session,
            connect_timeout,
            extra_args: fields.extra_args()?,
            key: fields.string("key")?.map(|k| expand_home(&k)),
            mosh_server: fields.string("mosh_server")?.filter(|s| !s.is_empty()),
            network,
            tags: match entry.get("tags") {
                Some(value) => fields.string_list("tags", value)?,
                None => Vec::new(),
            },
            ssh_options: fields.ssh_options()?,
            name,
        })
    }
}

/// Derive a tmux session name for `tmux_session = "auto"`
pub fn derive_session_name(name: &str, host: &str, naming: AutoSessionNaming) -> String {
    match naming {
        AutoSessionNaming::Profile => name.to_string(),
        AutoSessionNaming::ProfileHost => {
            let host: String = host
                .chars()
                .map(|c| if c == '.' || c == ':' { '-' } else { c })
                .collect();
            format!("{}-{}", name, host)
        }
    }
}

/// Profile names double as tmux session names and ssh aliases
pub fn check_profile_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("must be a non-empty string".to_string());
    }
    if name.chars().any(|c| c.is_whitespace() || c == ':' || c == '.') {
        return Err("must not contain whitespace, ':' or '.'".to_string());
    }
    Ok(())
}

fn check_session_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        return Err("must not be empty".to_string());
    }
    if name.chars().any(|c| c == ':' || c == '.' || c.is_control()) {
        return Err("must not contain ':', '.' or control characters".to_string());
    }
    Ok(())
}

fn check_transport_order(order: &[TransportKind]) -> Result<(), String> {
    if order.is_empty() {
        return Err("transport_order must list at least one transport".to_string());
    }
    for (i, kind) in order.iter().enumerate() {
        if order[..i].contains(kind) {
            return Err(format!("transport_order lists {} more than once", kind));
        }
    }
    Ok(())
}

/// Expand a leading `~/` (or `~\`) to the home directory
pub fn expand_home(path: &str) -> PathBuf {
    let mut chars = path.chars();
    if chars.next() == Some('~') && matches!(chars.next(), Some('/') | Some('\\')) {
        if let Some(home) = dirs::home_dir() {
            return home.join(&path[2..]);
        }
    }
    PathBuf::from(path)
}

fn entry_name(entry: &Table) -> Result<String, ProfileError> {
    match entry.get("name") {
        Some(Value::String(name)) => {
            check_profile_name(name).map_err(|reason| ProfileError::invalid(name, "name", reason))?;
            Ok(name.clone())
        }
        Some(_) => Err(ProfileError::invalid("<unnamed>", "name", "must be a string")),
        None => Err(ProfileError::invalid("<unnamed>", "name", "is required")),
    }
}

/// Field accessors that report errors against one profile
struct Fields<'a> {
    profile: &'a str,
    entry: &'a Table,
}

impl Fields<'_> {
    fn invalid(&self, field: &str, reason: impl Into<String>) -> ProfileError {
        ProfileError::invalid(self.profile, field, reason)
    }

    fn string(&self, field: &str) -> Result<Option<String>, ProfileError> {
        match self.entry.get(field) {
            None => Ok(None),
            Some(Value::String(s)) if s.trim() != s => {
                Err(self.invalid(field, "must not start or end with whitespace"))
            }
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.invalid(field, format!("must be a string, got {}", other.type_str()))),
        }
    }

    fn port(&self) -> Result<u16, ProfileError> {
        match self.entry.get("port") {
            None => Ok(DEFAULT_PORT),
            Some(Value::Integer(n)) => u16::try_from(*n)
                .ok()
                .filter(|p| *p != 0)
                .ok_or_else(|| self.invalid("port", format!("must be between 1 and 65535, got {}", n))),
            Some(other) => Err(self.invalid("port", format!("must be an integer, got {}", other.type_str()))),
        }
    }

    fn transport_order(&self, value: &Value) -> Result<Vec<TransportKind>, ProfileError> {
        let order = self
            .string_list("transport_order", value)?
            .iter()
            .map(|token| token.parse::<TransportKind>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| self.invalid("transport_order", reason))?;
        check_transport_order(&order).map_err(|reason| self.invalid("transport_order", reason))?;
        Ok(order)
    }

    fn duration(&self, field: &str, value: &Value) -> Result<Duration, ProfileError> {
        let duration = match value {
            Value::Integer(secs) if *secs > 0 => Duration::from_secs(*secs as u64),
            Value::Integer(secs) => {
                return Err(self.invalid(field, format!("must be greater than zero, got {}", secs)))
            }
            Value::String(s) => parse_duration(s).map_err(|reason| self.invalid(field, reason))?,
            other => {
                return Err(self.invalid(
                    field,
                    format!("must be seconds or a duration string, got {}", other.type_str()),
                ))
            }
        };
        if duration.is_zero() {
            return Err(self.invalid(field, "must be greater than zero"));
        }
        Ok(duration)
    }

    fn string_list(&self, field: &str, value: &Value) -> Result<Vec<String>, ProfileError> {
        let items = value
            .as_array()
            .ok_or_else(|| self.invalid(field, format!("must be an array, got {}", value.type_str())))?;
        items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| self.invalid(field, "must contain only strings"))
            })
            .collect()
    }

    fn extra_args(&self) -> Result<ExtraArgs, ProfileError> {
        let table = match self.entry.get("extra_args") {
            None => return Ok(ExtraArgs::default()),
            Some(Value::Table(table)) => table,
            Some(other) => {
                return Err(self.invalid("extra_args", format!("must be a table, got {}", other.type_str())))
            }
        };

        let mut args = ExtraArgs::default();
        for (key, value) in table {
            let field = format!("extra_args.{}", key);
            let kind = key
                .parse::<TransportKind>()
                .map_err(|reason| self.invalid(&field, reason))?;
            let list = self.string_list(&field, value)?;
            match kind {
                TransportKind::Mosh => args.mosh = list,
                TransportKind::Ssh => args.ssh = list,
            }
        }
        Ok(args)
    }

    fn ssh_options(&self) -> Result<SshOptions, ProfileError> {
        let table = match self.entry.get("ssh_options") {
            None => return Ok(SshOptions::default()),
            Some(Value::Table(table)) => table,
            Some(other) => {
                return Err(self.invalid("ssh_options", format!("must be a table, got {}", other.type_str())))
            }
        };

        let mut options = SshOptions::default();
        for (key, value) in table {
            let field = format!("ssh_options.{}", key);
            if !SSH_OPTION_FIELDS.contains(&key.as_str()) {
                return Err(self.invalid(&field, "is not a recognized ssh option"));
            }
            if key == "forward_agent" {
                options.forward_agent = value
                    .as_bool()
                    .ok_or_else(|| self.invalid(&field, "must be a boolean"))?;
                continue;
            }
            let n = value
                .as_integer()
                .and_then(|n| u32::try_from(n).ok())
                .filter(|n| *n > 0)
                .ok_or_else(|| self.invalid(&field, "must be a positive integer"))?;
            match key.as_str() {
                "server_alive_interval" => options.server_alive_interval = Some(n),
                "server_alive_count_max" => options.server_alive_count_max = Some(n),
                _ => options.connection_attempts = Some(n),
            }
        }
        Ok(options)
    }
}

/// Serializable form of a new `[[profiles]]` entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileEntry {
    pub name: String,
    pub host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_order: Option<Vec<TransportKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_session: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "duration_secs::option"
    )]
    pub connect_timeout: Option<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mosh_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<NetworkMode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}
