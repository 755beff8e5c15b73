//!
//! src/config.rs  Andrew Belles  Oct 19th, 2026
//!
//! Reads the environment once at startup and builds the configuration
//! for the gemini client, the export pipeline and the logger
//!

use std::{path::PathBuf, time};
use url::Url;

use crate::simulator::Pipeline;
use crate::SonicError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 30000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 4;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const GEMINI_DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const GEMINI_DEFAULT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/";
pub const GEMINI_HOST: &str = "generativelanguage.googleapis.com";

/// Bounds on how many records one search asks for
pub const RESULT_TARGET_MIN: u8 = 6;
pub const RESULT_TARGET_MAX: u8 = 8;

/// Lookup used by every builder; `std::env::var` in production
type EnvLookup<'a> = &'a dyn Fn(&str) -> Option<String>;

fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Returns the value of the first key that is set and non-blank
fn env_check(env: EnvLookup, keys: &[&str]) -> Result<String, SonicError> {
    keys.iter()
        .filter_map(|&k| env(k))
        .find(|v| !v.trim().is_empty())
        .ok_or_else(|| SonicError::Config(format!("{} was not set", keys.join(" or "))))
}

fn env_flag(env: EnvLookup, key: &str, default: bool) -> bool {
    match env(key).as_deref().map(str::trim) {
        Some("1") | Some("true") | Some("yes") | Some("on") => true,
        Some("0") | Some("false") | Some("no") | Some("off") => false,
        _ => default,
    }
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

fn ensure_trailing_slash(url: &mut Url) {
    if !url.path().ends_with('/') {
        let mut path = url.path().to_string();
        path.push('/');
        url.set_path(&path);
    }
}

///
/// Configuration for the generative metadata backend
///
#[derive(Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: Url,        // https://generativelanguage.googleapis.com/v1beta/
    pub grounding: bool,      // attach the google_search tool
    pub result_target: u8,    // records asked for per search
}

// keep the credential out of `{:#?}` dumps
impl std::fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url.as_str())
            .field("grounding", &self.grounding)
            .field("result_target", &self.result_target)
            .finish()
    }
}

fn build_gemini(env: EnvLookup) -> Result<GeminiConfig, SonicError> {
    let api_key = env_check(env, &["GEMINI_API_KEY", "API_KEY"])?;

    let model = env("GEMINI_MODEL")
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string());

    let base_url = env("GEMINI_BASE_URL")
        .unwrap_or_else(|| GEMINI_DEFAULT_BASE.to_string());
    let mut base_url = Url::parse(&base_url)
        .map_err(|e| SonicError::Config(format!("GEMINI_BASE_URL invalid {e}")))?;

    // https and hostname check
    ensure_https(&base_url).map_err(SonicError::Config)?;
    ensure_host(&base_url, GEMINI_HOST).map_err(SonicError::Config)?;
    ensure_trailing_slash(&mut base_url);

    let grounding = env_flag(env, "GEMINI_GROUNDING", true);

    let result_target = match env("SONIC_RESULT_TARGET") {
        None => RESULT_TARGET_MAX,
        Some(raw) => {
            let value = raw.trim().parse::<u8>().map_err(|_| {
                SonicError::Config(format!("SONIC_RESULT_TARGET invalid: {raw}"))
            })?;
            if !(RESULT_TARGET_MIN..=RESULT_TARGET_MAX).contains(&value) {
                return Err(SonicError::Config(format!(
                    "SONIC_RESULT_TARGET must be within \
                     {RESULT_TARGET_MIN}..={RESULT_TARGET_MAX}, got {value}"
                )));
            }
            value
        }
    };

    Ok( GeminiConfig { api_key, model, base_url, grounding, result_target } )
}

///
/// Configuration for Http timeouts etc.
///
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
        }
    }
}

///
/// Configuration for the simulated export and where artifacts land
///
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub pipeline: Pipeline,
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pipeline: Pipeline::Standard,
            dir: PathBuf::from("./exports"),
        }
    }
}

fn build_export(env: EnvLookup) -> Result<ExportConfig, SonicError> {
    let mut cfg = ExportConfig::default();

    if let Some(raw) = env("SONIC_PIPELINE") {
        cfg.pipeline = raw.parse()?;
    }
    if let Some(dir) = env("SONIC_EXPORT_DIR").filter(|d| !d.trim().is_empty()) {
        cfg.dir = PathBuf::from(dir);
    }
    Ok(cfg)
}

///
/// Configuration for Logger
///

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,sonic_fetch=debug,reqwest=warn".to_string(),
            format: LogFormat::Pretty,
            with_ansi: true,
            include_file_line: false,
            include_target: true,
        }
    }
}

fn build_logging(env: EnvLookup) -> LoggingConfig {
    let mut cfg = LoggingConfig::default();
    match env("LOG_FORMAT").as_deref().map(str::trim) {
        Some(f) if f.eq_ignore_ascii_case("json") => {
            cfg.format = LogFormat::Json;
            cfg.include_file_line = true;
        }
        _ => {}
    }
    cfg.with_ansi = env("NO_COLOR").is_none();
    cfg
}

///
/// AppConfig which holds everything the controller and clients need
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub gemini: GeminiConfig,
    pub http: HttpConfig,
    pub export: ExportConfig,
    pub logging: LoggingConfig,
}

fn build_app(env: EnvLookup) -> Result<AppConfig, SonicError> {
    let gemini  = build_gemini(env)?;
    let http    = HttpConfig::default();
    let export  = build_export(env)?;
    let logging = build_logging(env);

    Ok( AppConfig { gemini, http, export, logging } )
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config() -> Result<AppConfig, SonicError> {
    dotenvy::dotenv().ok();
    build_app(&process_env)
}
