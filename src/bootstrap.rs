//! Deployment bootstrap
//!
//! Finds the deployment descriptor, reads process identity from it, and
//! collects the default values it ships. A descriptor is a TOML file:
//!
//! ```toml
//! creator = "Example Labs"
//! product = "Viewer"
//! version = "4.2.0"
//! release-type = "normal"
//! release-date = "2024-05-01"
//! home-path = "/opt/viewer"
//! plugin-path = "PlugIns"            # relative to home-path
//!
//! [defaults]
//! General.Theme = "light"
//! ```
//!
//! Unknown keys are ignored. Missing or unreadable descriptors never abort
//! startup; the built-in identity from the builder is used instead and the
//! problem is reported through [`ParsedDescriptor::error`].

use crate::config::EnvSource;
use crate::error::Error;
use crate::value::SettingValue;
use log::{debug, warn};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use time::Date;
use time::macros::format_description;

/// Default descriptor file name
pub const DESCRIPTOR_FILE: &str = "deployment.toml";

/// Kind of release, as declared by the deployment descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReleaseType {
    /// Regular release; the only kind that can be a production release
    #[default]
    Normal,
    Demo,
    Training,
    Testing,
    Prototype,
    ResearchDevelopment,
}

/// Release type a production build must declare.
pub const PRODUCTION_RELEASE: ReleaseType = ReleaseType::Normal;

impl FromStr for ReleaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "production" => Ok(ReleaseType::Normal),
            "demo" => Ok(ReleaseType::Demo),
            "training" => Ok(ReleaseType::Training),
            "test" | "testing" => Ok(ReleaseType::Testing),
            "prototype" | "proto" => Ok(ReleaseType::Prototype),
            "rd" | "r&d" | "research" => Ok(ReleaseType::ResearchDevelopment),
            other => Err(format!("unknown release type '{other}'")),
        }
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReleaseType::Normal => "normal",
            ReleaseType::Demo => "demo",
            ReleaseType::Training => "training",
            ReleaseType::Testing => "testing",
            ReleaseType::Prototype => "prototype",
            ReleaseType::ResearchDevelopment => "rd",
        })
    }
}

/// Process identity resolved during bootstrap.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentDescriptor {
    /// Descriptor file this was read from, if any
    pub source: Option<PathBuf>,
    pub creator: String,
    pub product: String,
    pub version: String,
    pub build_revision: String,
    pub release_type: ReleaseType,
    pub release_date: Option<Date>,
    pub release_description: String,
    /// Debug/override marker from the descriptor or environment
    pub debug_marker: bool,
    pub home_path: PathBuf,
    pub plugin_path: PathBuf,
    pub user_config_path: PathBuf,
    pub user_docs: PathBuf,
    pub additional_defaults_path: Option<PathBuf>,
    pub user_name: String,
    pub os_name: String,
    pub architecture: String,
    /// Whether `release_type` came from the descriptor
    release_declared: bool,
    production: bool,
}

impl DeploymentDescriptor {
    /// Production iff the descriptor declared [`PRODUCTION_RELEASE`] as its
    /// release type and no debug marker was present. A missing, unknown or
    /// built-in release type is never production. Fixed when the descriptor
    /// is built.
    #[must_use]
    pub fn is_production_release(&self) -> bool {
        self.production
    }

    fn update_production_status(&mut self) {
        self.production =
            self.release_declared && self.release_type == PRODUCTION_RELEASE && !self.debug_marker;
    }

    /// Check the fields the store cannot work without.
    ///
    /// # Errors
    ///
    /// Returns a message when the home path is not an existing directory.
    pub fn validate(&self) -> Result<(), String> {
        if self.home_path.as_os_str().is_empty() {
            return Err("no home path could be determined".into());
        }
        if !self.home_path.is_dir() {
            return Err(format!(
                "home path '{}' is not a directory",
                self.home_path.display()
            ));
        }
        Ok(())
    }
}

/// Outcome of reading one descriptor.
#[derive(Debug, Clone)]
pub struct ParsedDescriptor {
    pub descriptor: DeploymentDescriptor,
    /// Why the descriptor could not be used, if it could not
    pub error: Option<String>,
    /// Notes about defaulted, ignored or rejected keys
    pub debug_trace: Vec<String>,
    /// The `[defaults]` table, seeded into the Default layer
    pub defaults: SettingValue,
}

/// Built-in identity handed to the bootstrap by the store configuration.
#[derive(Clone)]
pub(crate) struct IdentitySeed {
    pub app_name: String,
    pub app_version: String,
    pub creator: String,
    pub home_dir: Option<PathBuf>,
    pub config_dir: Option<PathBuf>,
    pub candidates: Option<Vec<PathBuf>>,
    pub env_prefix: String,
    pub env: Arc<dyn EnvSource>,
}

/// Locates and parses deployment descriptors.
pub struct DeploymentBootstrap {
    seed: IdentitySeed,
}

impl DeploymentBootstrap {
    pub(crate) fn new(seed: IdentitySeed) -> Self {
        Self { seed }
    }

    /// Candidate descriptor locations, in search order.
    ///
    /// Explicit paths from the builder replace the standard list, which is:
    /// the user config directory, `~/.{app}`, the executable's directory and
    /// its parent.
    #[must_use]
    pub fn candidates(&self) -> Vec<PathBuf> {
        if let Some(explicit) = &self.seed.candidates {
            return explicit.clone();
        }

        let app = &self.seed.app_name;
        let mut out = Vec::new();
        if let Some(config) = dirs::config_dir() {
            out.push(config.join(app).join(DESCRIPTOR_FILE));
        }
        if let Some(home) = dirs::home_dir() {
            out.push(home.join(format!(".{app}")).join(DESCRIPTOR_FILE));
        }
        if let Some(exe_dir) = executable_dir() {
            out.push(exe_dir.join(DESCRIPTOR_FILE));
            if let Some(parent) = exe_dir.parent() {
                out.push(parent.join(DESCRIPTOR_FILE));
            }
        }
        out
    }

    /// First candidate that is a readable regular file.
    #[must_use]
    pub fn locate_descriptor(&self) -> Option<PathBuf> {
        self.candidates()
            .into_iter()
            .find(|path| path.is_file() && std::fs::File::open(path).is_ok())
    }

    /// Locate and parse the descriptor, falling back to the built-in
    /// identity when none is found.
    #[must_use]
    pub fn run(&self) -> ParsedDescriptor {
        match self.locate_descriptor() {
            Some(path) => self.parse(&path),
            None => {
                let searched: Vec<String> = self
                    .candidates()
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect();
                let message = format!(
                    "no deployment descriptor found (searched: {})",
                    searched.join(", ")
                );
                warn!("{message}");
                ParsedDescriptor {
                    descriptor: self.builtin(),
                    error: Some(message),
                    debug_trace: Vec::new(),
                    defaults: SettingValue::Absent,
                }
            }
        }
    }

    /// The identity used when no descriptor is available.
    #[must_use]
    pub fn builtin(&self) -> DeploymentDescriptor {
        let home = self
            .seed
            .home_dir
            .clone()
            .or_else(executable_dir)
            .unwrap_or_default();
        self.finish(Fields::new(&self.seed), None, home)
    }

    /// Read one descriptor file.
    ///
    /// Never fails: unreadable or malformed files produce the built-in
    /// identity plus an error message.
    #[must_use]
    pub fn parse(&self, path: &Path) -> ParsedDescriptor {
        let mut trace = Vec::new();
        let failed = |reason: String| {
            warn!("Deployment descriptor '{}' unusable: {reason}", path.display());
            ParsedDescriptor {
                descriptor: self.builtin(),
                error: Some(
                    Error::Descriptor {
                        path: path.to_path_buf(),
                        reason,
                    }
                    .to_string(),
                ),
                debug_trace: Vec::new(),
                defaults: SettingValue::Absent,
            }
        };

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => return failed(e.to_string()),
        };
        let table: toml::Table = match toml::from_str(&content) {
            Ok(table) => table,
            Err(e) => return failed(e.to_string()),
        };

        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        let resolve = |value: &str| {
            let p = PathBuf::from(value);
            if p.is_absolute() { p } else { base_dir.join(p) }
        };

        let mut fields = Fields::new(&self.seed);
        let mut saw_product = false;
        let mut saw_version = false;
        let mut home_override = None;
        let mut defaults = SettingValue::Absent;

        for (key, value) in table {
            match (key.as_str(), &value) {
                ("creator", toml::Value::String(s)) => fields.creator = s.clone(),
                ("product", toml::Value::String(s)) => {
                    fields.product = s.clone();
                    saw_product = true;
                }
                ("version", toml::Value::String(s)) => {
                    fields.version = s.clone();
                    saw_version = true;
                }
                ("build-revision", toml::Value::String(s)) => fields.build_revision = s.clone(),
                ("release-description", toml::Value::String(s)) => {
                    fields.release_description = s.clone();
                }
                ("release-type", toml::Value::String(s)) => match s.parse::<ReleaseType>() {
                    Ok(kind) => fields.release_type = Some(kind),
                    Err(e) => trace.push(format!("release-type: {e}; not a production release")),
                },
                ("release-date", toml::Value::String(s)) => {
                    match Date::parse(s, format_description!("[year]-[month]-[day]")) {
                        Ok(date) => fields.release_date = Some(date),
                        Err(e) => trace.push(format!("release-date '{s}' not YYYY-MM-DD: {e}")),
                    }
                }
                ("release-date", toml::Value::Datetime(dt)) => match dt.date {
                    Some(d) => {
                        match time::Month::try_from(d.month)
                            .ok()
                            .and_then(|m| Date::from_calendar_date(i32::from(d.year), m, d.day).ok())
                        {
                            Some(date) => fields.release_date = Some(date),
                            None => trace.push(format!("release-date '{dt}' is not a valid date")),
                        }
                    }
                    None => trace.push(format!("release-date '{dt}' has no date part")),
                },
                ("debug", toml::Value::Boolean(b)) => fields.debug_marker = *b,
                ("home-path", toml::Value::String(s)) => home_override = Some(resolve(s)),
                ("plugin-path", toml::Value::String(s)) => fields.plugin_path = Some(PathBuf::from(s)),
                ("user-config-path", toml::Value::String(s)) => {
                    fields.user_config_path = Some(resolve(s));
                }
                ("additional-defaults-path", toml::Value::String(s)) => {
                    fields.additional_defaults_path = Some(resolve(s));
                }
                ("defaults", toml::Value::Table(_)) => defaults = toml_to_setting(value.clone()),
                (
                    "creator" | "product" | "version" | "build-revision" | "release-description"
                    | "release-type" | "release-date" | "debug" | "home-path" | "plugin-path"
                    | "user-config-path" | "additional-defaults-path" | "defaults",
                    other,
                ) => trace.push(format!(
                    "{key}: unexpected {} value, ignored",
                    other.type_str()
                )),
                _ => trace.push(format!("{key}: unknown key, ignored")),
            }
        }

        if !saw_product {
            trace.push(format!("product not set; using built-in '{}'", fields.product));
        }
        if !saw_version {
            trace.push(format!("version not set; using built-in '{}'", fields.version));
        }

        let home = home_override
            .or_else(|| self.seed.home_dir.clone())
            .unwrap_or_else(|| base_dir.clone());

        for note in &trace {
            debug!("deployment descriptor {}: {note}", path.display());
        }

        ParsedDescriptor {
            descriptor: self.finish(fields, Some(path.to_path_buf()), home),
            error: None,
            debug_trace: trace,
            defaults,
        }
    }

    fn finish(&self, fields: Fields, source: Option<PathBuf>, home: PathBuf) -> DeploymentDescriptor {
        let plugin_path = match fields.plugin_path {
            Some(p) if p.is_absolute() => p,
            Some(p) => home.join(p),
            None => home.join("PlugIns"),
        };
        let user_config_path = fields
            .user_config_path
            .or_else(|| self.seed.config_dir.clone())
            .or_else(|| dirs::config_dir().map(|d| d.join(&self.seed.app_name)))
            .unwrap_or_else(|| home.join("UserSettings"));
        let user_docs = dirs::document_dir()
            .or_else(dirs::home_dir)
            .map_or_else(|| user_config_path.clone(), |d| d.join(&fields.product));

        let env_debug = self
            .seed
            .env
            .var(&format!("{}_DEBUG", self.seed.env_prefix))
            .is_some_and(|v| !matches!(v.trim(), "" | "0" | "false"));

        let user_name = self
            .seed
            .env
            .var("USER")
            .or_else(|| self.seed.env.var("USERNAME"))
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        let mut descriptor = DeploymentDescriptor {
            source,
            creator: fields.creator,
            product: fields.product,
            version: fields.version,
            build_revision: fields.build_revision,
            release_type: fields.release_type.unwrap_or_default(),
            release_declared: fields.release_type.is_some(),
            release_date: fields.release_date,
            release_description: fields.release_description,
            debug_marker: fields.debug_marker || env_debug,
            home_path: home,
            plugin_path,
            user_config_path,
            user_docs,
            additional_defaults_path: fields.additional_defaults_path,
            user_name,
            os_name: std::env::consts::OS.to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            production: false,
        };
        descriptor.update_production_status();
        descriptor
    }
}

/// Descriptor fields before paths are resolved.
struct Fields {
    creator: String,
    product: String,
    version: String,
    build_revision: String,
    release_type: Option<ReleaseType>,
    release_date: Option<Date>,
    release_description: String,
    debug_marker: bool,
    plugin_path: Option<PathBuf>,
    user_config_path: Option<PathBuf>,
    additional_defaults_path: Option<PathBuf>,
}

impl Fields {
    fn new(seed: &IdentitySeed) -> Self {
        Self {
            creator: seed.creator.clone(),
            product: seed.app_name.clone(),
            version: seed.app_version.clone(),
            build_revision: String::new(),
            release_type: None,
            release_date: None,
            release_description: String::new(),
            debug_marker: false,
            plugin_path: None,
            user_config_path: None,
            additional_defaults_path: None,
        }
    }
}

fn executable_dir() -> Option<PathBuf> {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
}

/// Convert a TOML value into a setting value. Datetimes become strings.
pub(crate) fn toml_to_setting(value: toml::Value) -> SettingValue {
    match value {
        toml::Value::String(s) => SettingValue::String(s),
        toml::Value::Integer(n) => SettingValue::Int(n),
        toml::Value::Float(f) => SettingValue::Float(f),
        toml::Value::Boolean(b) => SettingValue::Bool(b),
        toml::Value::Datetime(dt) => SettingValue::String(dt.to_string()),
        toml::Value::Array(items) => {
            SettingValue::List(items.into_iter().map(toml_to_setting).collect())
        }
        toml::Value::Table(table) => SettingValue::Map(
            table
                .into_iter()
                .map(|(k, v)| (k, toml_to_setting(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn seed(candidates: Vec<PathBuf>, env: HashMap<String, String>) -> IdentitySeed {
        IdentitySeed {
            app_name: "viewer".into(),
            app_version: "0.0.1".into(),
            creator: "builtin creator".into(),
            home_dir: None,
            config_dir: None,
            candidates: Some(candidates),
            env_prefix: "VIEWER".into(),
            env: Arc::new(env),
        }
    }

    #[test]
    fn test_locate_returns_first_existing_candidate() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        let second = dir.path().join("second.toml");
        let third = dir.path().join("third.toml");
        std::fs::write(&second, "").unwrap();
        std::fs::write(&third, "").unwrap();

        let bootstrap =
            DeploymentBootstrap::new(seed(vec![missing, second.clone(), third], HashMap::new()));
        assert_eq!(bootstrap.locate_descriptor(), Some(second));
    }

    #[test]
    fn test_parse_full_descriptor() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        std::fs::write(
            &path,
            r#"
creator = "Example Labs"
product = "Viewer"
version = "4.2.0"
release-type = "normal"
release-date = "2024-05-01"
home-path = "."
plugin-path = "Extensions"
future-key = 12

[defaults.General]
Theme = "light"
"#,
        )
        .unwrap();

        let bootstrap = DeploymentBootstrap::new(seed(vec![path.clone()], HashMap::new()));
        let parsed = bootstrap.parse(&path);

        assert!(parsed.error.is_none());
        let d = &parsed.descriptor;
        assert_eq!(d.creator, "Example Labs");
        assert_eq!(d.product, "Viewer");
        assert_eq!(d.version, "4.2.0");
        assert_eq!(d.release_type, ReleaseType::Normal);
        assert_eq!(
            d.release_date,
            Some(Date::from_calendar_date(2024, time::Month::May, 1).unwrap())
        );
        assert_eq!(d.home_path, dir.path().join("."));
        assert_eq!(d.plugin_path, dir.path().join(".").join("Extensions"));
        assert!(d.is_production_release());
        assert_eq!(d.source.as_deref(), Some(path.as_path()));
        assert!(parsed.debug_trace.iter().any(|t| t.contains("future-key")));
        assert_eq!(
            parsed.defaults.get_path("General/Theme"),
            Some(&SettingValue::from("light"))
        );
    }

    #[test]
    fn test_missing_required_keys_are_traced_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        std::fs::write(&path, "creator = \"Someone\"\n").unwrap();

        let parsed = DeploymentBootstrap::new(seed(vec![], HashMap::new())).parse(&path);

        assert!(parsed.error.is_none());
        assert_eq!(parsed.descriptor.product, "viewer");
        assert_eq!(parsed.descriptor.version, "0.0.1");
        assert!(parsed.debug_trace.iter().any(|t| t.starts_with("product not set")));
        assert!(parsed.debug_trace.iter().any(|t| t.starts_with("version not set")));
    }

    #[test]
    fn test_malformed_descriptor_falls_back_to_builtin() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        std::fs::write(&path, "product = [unterminated").unwrap();

        let parsed = DeploymentBootstrap::new(seed(vec![], HashMap::new())).parse(&path);

        assert!(parsed.error.is_some());
        assert_eq!(parsed.descriptor.creator, "builtin creator");
        assert_eq!(parsed.descriptor.source, None);
    }

    #[test]
    fn test_debug_marker_disables_production() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        std::fs::write(&path, "release-type = \"normal\"\ndebug = true\n").unwrap();
        let parsed = DeploymentBootstrap::new(seed(vec![], HashMap::new())).parse(&path);
        assert!(!parsed.descriptor.is_production_release());

        std::fs::write(&path, "release-type = \"normal\"\n").unwrap();
        let env = HashMap::from([("VIEWER_DEBUG".to_string(), "1".to_string())]);
        let parsed = DeploymentBootstrap::new(seed(vec![], env)).parse(&path);
        assert!(!parsed.descriptor.is_production_release());
    }

    #[test]
    fn test_non_normal_release_is_not_production() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        std::fs::write(&path, "release-type = \"demo\"\n").unwrap();

        let parsed = DeploymentBootstrap::new(seed(vec![], HashMap::new())).parse(&path);
        assert_eq!(parsed.descriptor.release_type, ReleaseType::Demo);
        assert!(!parsed.descriptor.is_production_release());
    }

    #[test]
    fn test_no_descriptor_reports_error() {
        let dir = tempdir().unwrap();
        let bootstrap = DeploymentBootstrap::new(seed(
            vec![dir.path().join("nope.toml")],
            HashMap::new(),
        ));

        let parsed = bootstrap.run();
        assert!(parsed.error.unwrap().contains("no deployment descriptor"));
        assert_eq!(parsed.descriptor.product, "viewer");
        assert!(!parsed.descriptor.is_production_release());
    }

    #[test]
    fn test_unknown_release_type_is_not_production() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        std::fs::write(&path, "release-type = \"nightly\"\n").unwrap();

        let parsed = DeploymentBootstrap::new(seed(vec![], HashMap::new())).parse(&path);
        assert!(parsed.error.is_none());
        assert!(!parsed.descriptor.is_production_release());
        assert!(parsed.debug_trace.iter().any(|t| t.contains("nightly")));
    }

    #[test]
    fn test_omitted_release_type_is_not_production() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(DESCRIPTOR_FILE);
        std::fs::write(&path, "product = \"Viewer\"\n").unwrap();

        let parsed = DeploymentBootstrap::new(seed(vec![], HashMap::new())).parse(&path);
        assert_eq!(parsed.descriptor.release_type, ReleaseType::Normal);
        assert!(!parsed.descriptor.is_production_release());
    }

    #[test]
    fn test_validate_requires_existing_home() {
        let dir = tempdir().unwrap();
        let mut s = seed(vec![], HashMap::new());
        s.home_dir = Some(dir.path().join("does-not-exist"));
        let descriptor = DeploymentBootstrap::new(s).builtin();
        assert!(descriptor.validate().is_err());

        let mut s = seed(vec![], HashMap::new());
        s.home_dir = Some(dir.path().to_path_buf());
        assert!(DeploymentBootstrap::new(s).builtin().validate().is_ok());
    }

    #[test]
    fn test_release_type_parsing() {
        assert_eq!("Production".parse::<ReleaseType>(), Ok(ReleaseType::Normal));
        assert_eq!("r&d".parse::<ReleaseType>(), Ok(ReleaseType::ResearchDevelopment));
        assert!("nightly".parse::<ReleaseType>().is_err());
    }
}
