use serde::{Deserialize, Serialize};

/// Fields shared by `launch` and `attach` arguments, nested under a
/// `common` block at the Rust level but flattened into the JSON envelope
/// (`spec.md` §4.1): IDEs send these as top-level launch/attach keys.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonArguments {
    #[serde(default)]
    pub program: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: std::collections::BTreeMap<String, String>,
    #[serde(default)]
    pub stop_on_entry: bool,
    #[serde(default, rename = "sourceMap")]
    pub source_map: Option<serde_json::Value>,
    #[serde(default)]
    pub init_commands: Vec<String>,
    #[serde(default)]
    pub pre_run_commands: Vec<String>,
    #[serde(default)]
    pub pre_terminate_commands: Vec<String>,
    #[serde(default)]
    pub exit_commands: Vec<String>,
    #[serde(default)]
    pub target_create_commands: Vec<String>,
    #[serde(default)]
    pub process_create_commands: Vec<String>,
    /// Arbitrary `lldb` settings to apply after `initCommands`, as
    /// `name -> value` pairs (`spec.md` §4.5 step 2 "per-settings
    /// overrides"), e.g. `{"target.inline-breakpoint-strategy": "always"}`.
    #[serde(default)]
    pub settings: std::collections::BTreeMap<String, String>,
}

/// Polymorphic `terminal` field of launch arguments (`spec.md` §4.1): the
/// wire carries either one of three well-known strings, an arbitrary string
/// (a TTY device path), or an integer (a process id). This untagged enum
/// captures the JSON shape; [`TerminalKind`] carries the resolved meaning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawTerminalField {
    Pid(i64),
    Text(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum TerminalKind {
    Integrated,
    External,
    Console,
    Device(String),
    Pid(i64),
}

impl TerminalKind {
    pub fn from_raw(raw: RawTerminalField) -> Self {
        match raw {
            RawTerminalField::Pid(pid) => TerminalKind::Pid(pid),
            RawTerminalField::Text(text) => match text.as_str() {
                "integrated" => TerminalKind::Integrated,
                "external" => TerminalKind::External,
                "console" => TerminalKind::Console,
                _ => TerminalKind::Device(text),
            },
        }
    }

    pub fn to_raw(&self) -> RawTerminalField {
        match self {
            TerminalKind::Integrated => RawTerminalField::Text("integrated".to_string()),
            TerminalKind::External => RawTerminalField::Text("external".to_string()),
            TerminalKind::Console => RawTerminalField::Text("console".to_string()),
            TerminalKind::Device(path) => RawTerminalField::Text(path.clone()),
            TerminalKind::Pid(pid) => RawTerminalField::Pid(*pid),
        }
    }

    pub fn requests_tty_handshake(&self) -> bool {
        matches!(self, TerminalKind::Integrated | TerminalKind::External)
    }
}

/// `category` of an `output` event (`spec.md` §4.1). Unknown categories
/// round-trip through [`OutputCategory::Other`] rather than being rejected.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum OutputCategory {
    Console,
    Stdout,
    Stderr,
    Other(String),
}

impl OutputCategory {
    pub fn as_str(&self) -> &str {
        match self {
            OutputCategory::Console => "console",
            OutputCategory::Stdout => "stdout",
            OutputCategory::Stderr => "stderr",
            OutputCategory::Other(s) => s.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "console" => OutputCategory::Console,
            "stdout" => OutputCategory::Stdout,
            "stderr" => OutputCategory::Stderr,
            other => OutputCategory::Other(other.to_string()),
        }
    }
}

impl Serialize for OutputCategory {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for OutputCategory {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Ok(OutputCategory::parse(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_kind_round_trips_well_known_strings() {
        for kind in [TerminalKind::Integrated, TerminalKind::External, TerminalKind::Console] {
            let raw = kind.to_raw();
            assert_eq!(TerminalKind::from_raw(raw), kind);
        }
    }

    #[test]
    fn terminal_kind_treats_other_strings_as_device_paths() {
        let raw = RawTerminalField::Text("/dev/pts/4".to_string());
        assert_eq!(
            TerminalKind::from_raw(raw),
            TerminalKind::Device("/dev/pts/4".to_string())
        );
    }

    #[test]
    fn terminal_kind_treats_integers_as_pids() {
        let raw = RawTerminalField::Pid(4242);
        assert_eq!(TerminalKind::from_raw(raw), TerminalKind::Pid(4242));
    }

    #[test]
    fn output_category_round_trips_unknown_values() {
        let parsed = OutputCategory::parse("telemetry");
        assert_eq!(parsed, OutputCategory::Other("telemetry".to_string()));
        assert_eq!(parsed.as_str(), "telemetry");
    }
}
