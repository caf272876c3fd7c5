use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::sizing::SizeCode;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub matching: MatchingConfig,
    pub learning: LearningConfig,
    pub recommender: RecommenderConfig,
    pub validation: ValidationConfig,
    pub drafts: DraftConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Which tolerance window a caller matches with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingRegime {
    /// Near-identical body proportions, gated on BPC.
    Tight,
    /// General tailoring lookup.
    Loose,
}

impl MatchingRegime {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tight => "tight",
            Self::Loose => "loose",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToleranceConfig {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub bmi: f64,
    pub age_years: u32,
    pub bpc: Option<f64>,
    pub min_score: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PenaltyConfig {
    pub height_per_cm: f64,
    pub weight_per_kg: f64,
    pub bmi_per_unit: f64,
    pub age_per_year: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchingConfig {
    pub default_regime: MatchingRegime,
    pub tight: ToleranceConfig,
    pub loose: ToleranceConfig,
    pub penalties: PenaltyConfig,
}

impl MatchingConfig {
    pub fn tolerances(&self, regime: MatchingRegime) -> ToleranceConfig {
        match regime {
            MatchingRegime::Tight => self.tight,
            MatchingRegime::Loose => self.loose,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LearningConfig {
    pub min_samples: u32,
    pub materiality_cm: f64,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RecommenderConfig {
    pub default_size_code: SizeCode,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ValidationConfig {
    pub min_age: u32,
    pub max_age: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DraftConfig {
    pub ttl_secs: u64,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub log_level: Option<String>,
    pub default_regime: Option<MatchingRegime>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            default_regime: MatchingRegime::Tight,
            tight: ToleranceConfig {
                height_cm: 1.0,
                weight_kg: 2.0,
                bmi: 1.0,
                age_years: 1,
                bpc: Some(0.5),
                min_score: 75.0,
            },
            loose: ToleranceConfig {
                height_cm: 15.0,
                weight_kg: 20.0,
                bmi: 5.0,
                age_years: 3,
                bpc: None,
                min_score: 60.0,
            },
            penalties: PenaltyConfig {
                height_per_cm: 5.0,
                weight_per_kg: 5.0,
                bmi_per_unit: 10.0,
                age_per_year: 10.0,
            },
        }
    }
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self { min_samples: 3, materiality_cm: 0.5 }
    }
}

impl Default for RecommenderConfig {
    fn default() -> Self {
        Self { default_size_code: SizeCode::Medium }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self { min_age: 3, max_age: 18 }
    }
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self { ttl_secs: 1800 }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://tailor.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
            matching: MatchingConfig::default(),
            learning: LearningConfig::default(),
            recommender: RecommenderConfig::default(),
            validation: ValidationConfig::default(),
            drafts: DraftConfig::default(),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl std::str::FromStr for MatchingRegime {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tight" => Ok(Self::Tight),
            "loose" => Ok(Self::Loose),
            other => Err(ConfigError::Validation(format!(
                "unsupported matching regime `{other}` (expected tight|loose)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch)?;
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("tailor.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) -> Result<(), ConfigError> {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }

        if let Some(matching) = patch.matching {
            if let Some(default_regime) = matching.default_regime {
                self.matching.default_regime = default_regime;
            }
            if let Some(tight) = matching.tight {
                tight.apply_to(&mut self.matching.tight);
            }
            if let Some(loose) = matching.loose {
                loose.apply_to(&mut self.matching.loose);
            }
            if let Some(penalties) = matching.penalties {
                if let Some(value) = penalties.height_per_cm {
                    self.matching.penalties.height_per_cm = value;
                }
                if let Some(value) = penalties.weight_per_kg {
                    self.matching.penalties.weight_per_kg = value;
                }
                if let Some(value) = penalties.bmi_per_unit {
                    self.matching.penalties.bmi_per_unit = value;
                }
                if let Some(value) = penalties.age_per_year {
                    self.matching.penalties.age_per_year = value;
                }
            }
        }

        if let Some(learning) = patch.learning {
            if let Some(min_samples) = learning.min_samples {
                self.learning.min_samples = min_samples;
            }
            if let Some(materiality_cm) = learning.materiality_cm {
                self.learning.materiality_cm = materiality_cm;
            }
        }

        if let Some(recommender) = patch.recommender {
            if let Some(code) = recommender.default_size_code {
                self.recommender.default_size_code = parse_size_code("recommender", &code)?;
            }
        }

        if let Some(validation) = patch.validation {
            if let Some(min_age) = validation.min_age {
                self.validation.min_age = min_age;
            }
            if let Some(max_age) = validation.max_age {
                self.validation.max_age = max_age;
            }
        }

        if let Some(drafts) = patch.drafts {
            if let Some(ttl_secs) = drafts.ttl_secs {
                self.drafts.ttl_secs = ttl_secs;
            }
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("TAILOR_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("TAILOR_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("TAILOR_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("TAILOR_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("TAILOR_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("TAILOR_MATCHING_DEFAULT_REGIME") {
            self.matching.default_regime = value.parse()?;
        }

        if let Some(value) = read_env("TAILOR_LEARNING_MIN_SAMPLES") {
            self.learning.min_samples = parse_u32("TAILOR_LEARNING_MIN_SAMPLES", &value)?;
        }
        if let Some(value) = read_env("TAILOR_LEARNING_MATERIALITY_CM") {
            self.learning.materiality_cm = parse_f64("TAILOR_LEARNING_MATERIALITY_CM", &value)?;
        }

        if let Some(value) = read_env("TAILOR_RECOMMENDER_DEFAULT_SIZE_CODE") {
            self.recommender.default_size_code =
                SizeCode::parse(&value).ok_or_else(|| ConfigError::InvalidEnvOverride {
                    key: "TAILOR_RECOMMENDER_DEFAULT_SIZE_CODE".to_string(),
                    value: value.clone(),
                })?;
        }

        if let Some(value) = read_env("TAILOR_VALIDATION_MIN_AGE") {
            self.validation.min_age = parse_u32("TAILOR_VALIDATION_MIN_AGE", &value)?;
        }
        if let Some(value) = read_env("TAILOR_VALIDATION_MAX_AGE") {
            self.validation.max_age = parse_u32("TAILOR_VALIDATION_MAX_AGE", &value)?;
        }

        if let Some(value) = read_env("TAILOR_DRAFTS_TTL_SECS") {
            self.drafts.ttl_secs = parse_u64("TAILOR_DRAFTS_TTL_SECS", &value)?;
        }

        let log_level = read_env("TAILOR_LOGGING_LEVEL").or_else(|| read_env("TAILOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("TAILOR_LOGGING_FORMAT").or_else(|| read_env("TAILOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(max_connections) = overrides.database_max_connections {
            self.database.max_connections = max_connections;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(default_regime) = overrides.default_regime {
            self.matching.default_regime = default_regime;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_logging(&self.logging)?;
        validate_matching(&self.matching)?;
        validate_learning(&self.learning)?;
        validate_validation(&self.validation)?;
        validate_drafts(&self.drafts)?;
        Ok(())
    }
}

impl TolerancePatch {
    fn apply_to(self, target: &mut ToleranceConfig) {
        if let Some(value) = self.height_cm {
            target.height_cm = value;
        }
        if let Some(value) = self.weight_kg {
            target.weight_kg = value;
        }
        if let Some(value) = self.bmi {
            target.bmi = value;
        }
        if let Some(value) = self.age_years {
            target.age_years = value;
        }
        if let Some(value) = self.bpc {
            // A non-positive value in the file disables the BPC gate.
            target.bpc = (value > 0.0).then_some(value);
        }
        if let Some(value) = self.min_score {
            target.min_score = value;
        }
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("tailor.toml"), PathBuf::from("config/tailor.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn validate_matching(matching: &MatchingConfig) -> Result<(), ConfigError> {
    for (name, tolerance) in [("tight", &matching.tight), ("loose", &matching.loose)] {
        let windows = [
            ("height_cm", tolerance.height_cm),
            ("weight_kg", tolerance.weight_kg),
            ("bmi", tolerance.bmi),
        ];
        for (field, value) in windows {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "matching.{name}.{field} must be a positive number"
                )));
            }
        }
        if let Some(bpc) = tolerance.bpc {
            if !bpc.is_finite() || bpc <= 0.0 {
                return Err(ConfigError::Validation(format!(
                    "matching.{name}.bpc must be a positive number when set"
                )));
            }
        }
        if !(0.0..=100.0).contains(&tolerance.min_score) {
            return Err(ConfigError::Validation(format!(
                "matching.{name}.min_score must be in range 0..=100"
            )));
        }
    }

    let penalties = [
        ("height_per_cm", matching.penalties.height_per_cm),
        ("weight_per_kg", matching.penalties.weight_per_kg),
        ("bmi_per_unit", matching.penalties.bmi_per_unit),
        ("age_per_year", matching.penalties.age_per_year),
    ];
    for (field, value) in penalties {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Validation(format!(
                "matching.penalties.{field} must be a non-negative number"
            )));
        }
    }

    Ok(())
}

fn validate_learning(learning: &LearningConfig) -> Result<(), ConfigError> {
    if learning.min_samples == 0 {
        return Err(ConfigError::Validation(
            "learning.min_samples must be greater than zero".to_string(),
        ));
    }
    if !learning.materiality_cm.is_finite() || learning.materiality_cm < 0.0 {
        return Err(ConfigError::Validation(
            "learning.materiality_cm must be a non-negative number".to_string(),
        ));
    }
    Ok(())
}

fn validate_validation(validation: &ValidationConfig) -> Result<(), ConfigError> {
    if validation.min_age >= validation.max_age {
        return Err(ConfigError::Validation(
            "validation.min_age must be lower than validation.max_age".to_string(),
        ));
    }
    Ok(())
}

fn validate_drafts(drafts: &DraftConfig) -> Result<(), ConfigError> {
    if drafts.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "drafts.ttl_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn parse_size_code(section: &str, value: &str) -> Result<SizeCode, ConfigError> {
    SizeCode::parse(value).ok_or_else(|| {
        ConfigError::Validation(format!(
            "{section}.default_size_code `{value}` is not one of small-|small|small+|medium|medium+|large|large+"
        ))
    })
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    logging: Option<LoggingPatch>,
    matching: Option<MatchingPatch>,
    learning: Option<LearningPatch>,
    recommender: Option<RecommenderPatch>,
    validation: Option<ValidationPatch>,
    drafts: Option<DraftPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[derive(Debug, Default, Deserialize)]
struct MatchingPatch {
    default_regime: Option<MatchingRegime>,
    tight: Option<TolerancePatch>,
    loose: Option<TolerancePatch>,
    penalties: Option<PenaltyPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct TolerancePatch {
    height_cm: Option<f64>,
    weight_kg: Option<f64>,
    bmi: Option<f64>,
    age_years: Option<u32>,
    bpc: Option<f64>,
    min_score: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct PenaltyPatch {
    height_per_cm: Option<f64>,
    weight_per_kg: Option<f64>,
    bmi_per_unit: Option<f64>,
    age_per_year: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct LearningPatch {
    min_samples: Option<u32>,
    materiality_cm: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct RecommenderPatch {
    default_size_code: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ValidationPatch {
    min_age: Option<u32>,
    max_age: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct DraftPatch {
    ttl_secs: Option<u64>,
}
