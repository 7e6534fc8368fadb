//! Diagnostic dump analysis.
//!
//! A dump is a JSON object produced by the plugin's `/sr dump` command. Only
//! `buildInfo` is required for a document to count as a dump; every other
//! section is optional and only produces its block when present.

use crate::release::ReleaseMetadata;
use crate::triage::version;
use crate::{FileAttachment, InfoBlock, Severity};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Home directory used by Pterodactyl/Pelican style containers.
const CONTAINER_HOME: &str = "/home/container";

// Only `buildInfo` has to be an object. Every other field that has the wrong
// shape decodes as absent instead of rejecting the whole dump.

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpRecord {
    pub build_info: BuildInfo,
    #[serde(default, deserialize_with = "lenient")]
    pub os_info: Option<OsInfo>,
    #[serde(default, deserialize_with = "lenient")]
    pub java_info: Option<JavaInfo>,
    #[serde(default, deserialize_with = "lenient")]
    pub user_info: Option<UserInfo>,
    #[serde(default, deserialize_with = "lenient")]
    pub platform_info: Option<PlatformInfo>,
    #[serde(default, deserialize_with = "lenient")]
    pub environment_info: Option<EnvironmentInfo>,
    #[serde(default, deserialize_with = "lenient")]
    pub plugin_info: Option<PluginInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildInfo {
    #[serde(deserialize_with = "lenient_text")]
    pub version: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub build_time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OsInfo {
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub arch: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct JavaInfo {
    #[serde(deserialize_with = "lenient_text")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserInfo {
    #[serde(deserialize_with = "lenient_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub dir: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub home: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlatformInfo {
    #[serde(deserialize_with = "lenient_text")]
    pub platform_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub platform_version: Option<String>,
    #[serde(deserialize_with = "lenient")]
    pub plugins: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnvironmentInfo {
    #[serde(deserialize_with = "lenient_text")]
    pub platform: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub platform_type: Option<String>,
    pub hybrid: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginInfo {
    pub proxy_mode: Option<Value>,
    pub config_data: Option<Value>,
}

/// Decode `T`, or `None` when the value has another shape.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

/// Strings as-is, numbers and booleans in their JSON spelling, anything else `None`.
fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(text) => Some(text),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        _ => None,
    })
}

impl UserInfo {
    /// `?` usernames and the container home directory betray a sandboxed host.
    fn looks_containerized(&self) -> bool {
        self.name.as_deref() == Some("?")
            || self.dir.as_deref() == Some(CONTAINER_HOME)
            || self.home.as_deref() == Some(CONTAINER_HOME)
    }
}

impl PluginInfo {
    fn debug_enabled(&self) -> bool {
        self.config_data
            .as_ref()
            .and_then(|config| config.pointer("/dev/debug"))
            .is_some_and(truthy)
    }
}

/// The blocks found in a dump plus the pretty-printed document.
#[derive(Debug, Clone)]
pub struct DumpReport {
    pub blocks: Vec<InfoBlock>,
    pub pretty_json: String,
}

impl DumpReport {
    /// The dump as a file to attach to the reply.
    pub fn attachment(&self) -> FileAttachment {
        FileAttachment {
            filename: "dump.json".into(),
            mime_type: "application/json".into(),
            data: self.pretty_json.clone().into_bytes(),
        }
    }
}

/// Decode `text` as a dump. Anything that isn't one returns `None`.
pub fn parse(text: &str) -> Option<(DumpRecord, Value)> {
    let document: Value = serde_json::from_str(text.trim()).ok()?;
    let record = DumpRecord::deserialize(&document)
        .inspect_err(|error| tracing::debug!(%error, "JSON document is not a dump"))
        .ok()?;
    Some((record, document))
}

/// Analyze `text` as a dump against the latest known release.
pub fn analyze(
    text: &str,
    latest: Option<&ReleaseMetadata>,
    download_url: &str,
) -> Option<DumpReport> {
    let (record, document) = parse(text)?;
    let blocks = report_blocks(&record, latest, download_url);
    let pretty_json = serde_json::to_string_pretty(&document).unwrap_or_else(|_| text.to_string());

    Some(DumpReport {
        blocks,
        pretty_json,
    })
}

fn report_blocks(
    record: &DumpRecord,
    latest: Option<&ReleaseMetadata>,
    download_url: &str,
) -> Vec<InfoBlock> {
    let mut blocks = Vec::new();
    let raw_version = record.build_info.version.as_deref();
    let current = raw_version.and_then(version::coerce);

    if let Some(block) = outdated_block(current.as_ref(), latest, download_url) {
        blocks.push(block);
    }

    let shown_version = current
        .as_ref()
        .map(ToString::to_string)
        .or_else(|| raw_version.map(str::to_string))
        .unwrap_or_else(|| "unknown".into());
    let mut build = format!("You are running version `{shown_version}` of SkinsRestorer");
    if let Some(build_time) = &record.build_info.build_time {
        build.push_str(&format!(", built on `{build_time}`"));
    }
    build.push('.');
    blocks.push(InfoBlock::new(Severity::Info, "Info: Build", build));

    if record
        .user_info
        .as_ref()
        .is_some_and(UserInfo::looks_containerized)
    {
        blocks.push(InfoBlock::new(
            Severity::Info,
            "Info: Docker detected",
            "We detected you are running SkinsRestorer in a Docker container and likely using a \
             panel like Pterodactyl/Pelican. This is not an error, but we need to know this to \
             better help you.",
        ));
    }

    if record.os_info.is_some() || record.java_info.is_some() {
        let os = record.os_info.clone().unwrap_or_default();
        let java = record.java_info.clone().unwrap_or_default();
        blocks.push(InfoBlock::new(
            Severity::Info,
            "Info: OS/Java",
            format!(
                "We detected you are running SkinsRestorer on `{}` with arch `{}` and Java `{}`",
                or_unknown(&os.name),
                or_unknown(&os.arch),
                or_unknown(&java.version),
            ),
        ));
    }

    if record.platform_info.is_some() || record.environment_info.is_some() {
        let platform = record.platform_info.clone().unwrap_or_default();
        let environment = record.environment_info.clone().unwrap_or_default();
        let plugin_count = platform.plugins.as_ref().map_or(0, Vec::len);
        blocks.push(InfoBlock::new(
            Severity::Info,
            "Info: Platform/Environment",
            format!(
                "The dump is from the platform `{}` (`{}` & `{}`) with version `{}` and `{}` plugins.",
                or_unknown(&platform.platform_name),
                or_unknown(&environment.platform),
                or_unknown(&environment.platform_type),
                or_unknown(&platform.platform_version),
                plugin_count,
            ),
        ));

        if environment.hybrid.as_ref().is_some_and(truthy) {
            blocks.push(InfoBlock::new(
                Severity::Warning,
                "Warning: Hybrid detected!",
                "The platform appears to be a hybrid platform (mix of mods with plugins). This is \
                 not supported and may cause issues.",
            ));
        }
    }

    if let Some(plugin) = &record.plugin_info {
        let proxy_mode = plugin.proxy_mode.as_ref().is_some_and(truthy);
        blocks.push(InfoBlock::new(
            Severity::Info,
            "Info: Plugin",
            format!(
                "You are in proxy mode: `{proxy_mode}`, debug enabled: `{}`",
                plugin.debug_enabled()
            ),
        ));
    }

    blocks
}

/// Warn when the dump's version is strictly older than the latest release.
/// Either side failing to coerce suppresses the block.
fn outdated_block(
    current: Option<&semver::Version>,
    latest: Option<&ReleaseMetadata>,
    download_url: &str,
) -> Option<InfoBlock> {
    let current = current?;
    let latest_version = latest.and_then(|release| version::coerce(&release.tag_name))?;

    if *current >= latest_version {
        return None;
    }

    let download_url = download_url.trim_end_matches('/');
    Some(InfoBlock::new(
        Severity::Warning,
        "Important: Outdated SkinsRestorer Version!",
        format!(
            "The SkinsRestorer version you're using (`{current}`) is outdated! Please update to \
             the latest version: `{latest_version}`\n\
             [Download {latest_version}]({download_url}/{latest_version})"
        ),
    ))
}

fn or_unknown(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("unknown")
}

/// Loose truthiness for flags that different platforms serialize differently.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    const DOWNLOAD: &str = "https://modrinth.com/plugin/skinsrestorer/version";

    const FULL_DUMP: &str = indoc! {r#"
        {
          "buildInfo": {"version": "15.0.0", "buildTime": "2024-05-01T10:00:00Z"},
          "osInfo": {"name": "Linux", "arch": "amd64"},
          "javaInfo": {"version": "21.0.2"},
          "userInfo": {"name": "container", "dir": "/home/container", "home": "/home/container"},
          "platformInfo": {"platformName": "Paper", "platformVersion": "1.20.4", "plugins": [{}, {}, {}]},
          "environmentInfo": {"platform": "BUKKIT", "platformType": "SERVER", "hybrid": false},
          "pluginInfo": {"proxyMode": false, "configData": {"dev": {"debug": true}}}
        }
    "#};

    fn release(tag: &str) -> ReleaseMetadata {
        ReleaseMetadata {
            tag_name: tag.into(),
            html_url: None,
            assets: Vec::new(),
        }
    }

    fn dump_with_version(version: &str) -> String {
        format!(r#"{{"buildInfo": {{"version": "{version}"}}}}"#)
    }

    fn titles(report: &DumpReport) -> Vec<&str> {
        report.blocks.iter().map(|block| block.title.as_str()).collect()
    }

    fn has_outdated(report: &DumpReport) -> bool {
        report
            .blocks
            .iter()
            .any(|block| block.title.starts_with("Important: Outdated"))
    }

    #[test]
    fn older_version_gets_outdated_warning() {
        let report = analyze(&dump_with_version("1.0.0"), Some(&release("1.2.0")), DOWNLOAD)
            .expect("dump should parse");

        assert!(has_outdated(&report));
        let outdated = &report.blocks[0];
        assert_eq!(outdated.severity, Severity::Warning);
        assert!(outdated.body.contains("(`1.0.0`) is outdated"));
        assert!(outdated.body.contains(&format!("[Download 1.2.0]({DOWNLOAD}/1.2.0)")));
    }

    #[test]
    fn equal_or_newer_version_is_not_outdated() {
        for latest in ["1.0.0", "0.9.5", "v1.0"] {
            let report = analyze(&dump_with_version("1.0.0"), Some(&release(latest)), DOWNLOAD)
                .expect("dump should parse");
            assert!(!has_outdated(&report), "latest {latest} must not warn");
        }
    }

    #[test]
    fn malformed_versions_only_suppress_the_comparison() {
        let report = analyze(&dump_with_version("dev-build"), Some(&release("15.0.0")), DOWNLOAD)
            .expect("dump should parse");
        assert!(!has_outdated(&report));
        assert_eq!(titles(&report), vec!["Info: Build"]);
        assert!(report.blocks[0].body.contains("`dev-build`"));

        let report = analyze(&dump_with_version("1.0.0"), Some(&release("nightly")), DOWNLOAD)
            .expect("dump should parse");
        assert!(!has_outdated(&report));
    }

    #[test]
    fn missing_release_cache_skips_the_comparison() {
        let report = analyze(&dump_with_version("1.0.0"), None, DOWNLOAD).expect("dump should parse");
        assert_eq!(titles(&report), vec!["Info: Build"]);
    }

    #[test]
    fn full_dump_produces_every_block() {
        let report = analyze(FULL_DUMP, Some(&release("15.1.0")), DOWNLOAD).expect("dump should parse");

        assert_eq!(
            titles(&report),
            vec![
                "Important: Outdated SkinsRestorer Version!",
                "Info: Build",
                "Info: Docker detected",
                "Info: OS/Java",
                "Info: Platform/Environment",
                "Info: Plugin",
            ]
        );
        assert!(report.blocks[1].body.contains("built on `2024-05-01T10:00:00Z`"));
        assert!(report.blocks[3].body.contains("`Linux` with arch `amd64` and Java `21.0.2`"));
        assert!(report.blocks[4].body.contains("`3` plugins"));
        assert!(report.blocks[5].body.contains("proxy mode: `false`, debug enabled: `true`"));
    }

    #[test]
    fn hybrid_flag_adds_a_warning() {
        let dump = r#"{"buildInfo": {}, "environmentInfo": {"hybrid": true}}"#;
        let report = analyze(dump, None, DOWNLOAD).expect("dump should parse");

        assert!(titles(&report).contains(&"Warning: Hybrid detected!"));
        assert!(report.blocks[1].body.contains("`unknown`"));
    }

    #[test]
    fn placeholder_username_implies_container() {
        let dump = r#"{"buildInfo": {"version": "15.0.0"}, "userInfo": {"name": "?"}}"#;
        let report = analyze(dump, None, DOWNLOAD).expect("dump should parse");

        assert_eq!(titles(&report), vec!["Info: Build", "Info: Docker detected"]);
    }

    #[test]
    fn regular_host_has_no_container_block() {
        let dump = r#"{"buildInfo": {}, "userInfo": {"name": "minecraft", "home": "/srv/mc"}}"#;
        let report = analyze(dump, None, DOWNLOAD).expect("dump should parse");

        assert!(!titles(&report).contains(&"Info: Docker detected"));
    }

    #[test]
    fn non_dump_inputs_are_ignored() {
        assert!(analyze("[12:00] server started", None, DOWNLOAD).is_none());
        assert!(analyze("42", None, DOWNLOAD).is_none());
        assert!(analyze(r#"{"name": "not a dump"}"#, None, DOWNLOAD).is_none());
        assert!(analyze(r#"{"buildInfo": "wrong shape"}"#, None, DOWNLOAD).is_none());
    }

    #[test]
    fn mistyped_optional_fields_do_not_hide_the_dump() {
        let dump = r#"{"buildInfo": {"version": "1.0.0"}, "javaInfo": {"version": 21}}"#;
        let report = analyze(dump, Some(&release("1.2.0")), DOWNLOAD).expect("dump should parse");

        assert!(has_outdated(&report));
        assert!(report.blocks[2].body.contains("Java `21`"));

        let dump = indoc! {r#"
            {
              "buildInfo": {"version": "1.0.0", "buildTime": 1714557600},
              "osInfo": "Linux",
              "platformInfo": {"platformName": ["Paper"], "plugins": {"SkinsRestorer": {}}},
              "pluginInfo": null
            }
        "#};
        let report = analyze(dump, Some(&release("1.2.0")), DOWNLOAD).expect("dump should parse");

        assert_eq!(
            titles(&report),
            vec![
                "Important: Outdated SkinsRestorer Version!",
                "Info: Build",
                "Info: Platform/Environment",
            ]
        );
        assert!(report.blocks[1].body.contains("built on `1714557600`"));
        assert!(report.blocks[2].body.contains("platform `unknown`"));
        assert!(report.blocks[2].body.contains("`0` plugins"));
    }

    #[test]
    fn attachment_holds_pretty_json() {
        let report = analyze(&dump_with_version("15.0.0"), None, DOWNLOAD).expect("dump should parse");
        let attachment = report.attachment();

        assert_eq!(attachment.filename, "dump.json");
        let text = String::from_utf8(attachment.data).expect("utf-8");
        assert!(text.contains("\n  \"buildInfo\""));
    }

    #[test]
    fn truthiness_follows_loose_rules() {
        assert!(!truthy(&Value::Null));
        assert!(!truthy(&serde_json::json!(0)));
        assert!(!truthy(&serde_json::json!("")));
        assert!(truthy(&serde_json::json!("FORGE")));
        assert!(truthy(&serde_json::json!(1)));
        assert!(truthy(&serde_json::json!({})));
    }
}
