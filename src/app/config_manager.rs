//! Configuration lifecycle: load the file config, merge CLI flags, validate once.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use mediafetch_core::{EngineConfig, Quality};

use crate::cli::GlobalArgs;

/// Defaults read from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct FileConfig {
    pub(crate) download_dir: Option<PathBuf>,
    pub(crate) concurrency: Option<u8>,
    pub(crate) max_retries: Option<u32>,
    pub(crate) retry_base_delay_ms: Option<u64>,
    pub(crate) quality: Option<Quality>,
    pub(crate) verbosity: Option<VerbositySetting>,
    pub(crate) catalog_file: Option<PathBuf>,
}

/// Supported config verbosity labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum VerbositySetting {
    Default,
    Verbose,
    Quiet,
    Debug,
}

/// Everything the binary needs after merging file and CLI.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedConfig {
    pub(crate) engine: EngineConfig,
    pub(crate) catalog_file: Option<PathBuf>,
    /// `tracing` level used when `RUST_LOG` is unset.
    pub(crate) log_level: &'static str,
}

impl ResolvedConfig {
    /// Queue database location for this download directory.
    pub(crate) fn database_path(&self) -> PathBuf {
        self.engine.download_dir.join(".mediafetch").join("queue.db")
    }
}

/// Loads the default config file (if any) and merges `args` over it.
pub(crate) fn resolve_config(args: &GlobalArgs) -> Result<ResolvedConfig> {
    let file = match resolve_default_config_path() {
        Some(path) if path.exists() => load_file_config(&path)?,
        _ => FileConfig::default(),
    };
    merge(args, &file)
}

/// Applies CLI flags over file values, then validates the engine config.
pub(crate) fn merge(args: &GlobalArgs, file: &FileConfig) -> Result<ResolvedConfig> {
    let download_dir = args
        .download_dir
        .clone()
        .or_else(|| file.download_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut engine = EngineConfig::new(download_dir);
    if let Some(concurrency) = args.concurrency.or(file.concurrency) {
        engine = engine.with_concurrency(usize::from(concurrency));
    }
    let max_retries = args
        .max_retries
        .map(u32::from)
        .or(file.max_retries)
        .unwrap_or(engine.max_retries);
    let base_delay = file
        .retry_base_delay_ms
        .map_or(engine.retry_base_delay, Duration::from_millis);
    engine = engine.with_retries(max_retries, base_delay);
    if let Some(quality) = args.quality.or(file.quality) {
        engine = engine.with_quality(quality);
    }
    engine.validate().context("Invalid engine configuration")?;

    Ok(ResolvedConfig {
        engine,
        catalog_file: args.catalog.clone().or_else(|| file.catalog_file.clone()),
        log_level: log_level(args, file.verbosity),
    })
}

/// Priority: `-q` > `-v`/`-vv` > file verbosity > info.
fn log_level(args: &GlobalArgs, file: Option<VerbositySetting>) -> &'static str {
    if args.quiet {
        return "error";
    }
    match (args.verbose, file) {
        (0, Some(VerbositySetting::Quiet)) => "error",
        (0, Some(VerbositySetting::Verbose)) | (1, _) => "debug",
        (0, Some(VerbositySetting::Debug)) => "trace",
        (0, _) => "info",
        _ => "trace",
    }
}

/// Resolves default config path.
///
/// Priority:
/// 1. `$XDG_CONFIG_HOME/mediafetch/config.toml`
/// 2. `$HOME/.config/mediafetch/config.toml`
fn resolve_default_config_path() -> Option<PathBuf> {
    config_path_from(
        env_var_non_empty_os("XDG_CONFIG_HOME"),
        env_var_non_empty_os("HOME"),
    )
}

fn config_path_from(
    xdg_config_home: Option<std::ffi::OsString>,
    home: Option<std::ffi::OsString>,
) -> Option<PathBuf> {
    if let Some(xdg) = xdg_config_home {
        return Some(PathBuf::from(xdg).join("mediafetch").join("config.toml"));
    }
    let home = home?;
    Some(
        PathBuf::from(home)
            .join(".config")
            .join("mediafetch")
            .join("config.toml"),
    )
}

fn env_var_non_empty_os(name: &str) -> Option<std::ffi::OsString> {
    let value = env::var_os(name)?;
    if value.is_empty() { None } else { Some(value) }
}

fn load_file_config(path: &Path) -> Result<FileConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
    parse_config_str(&raw)
        .with_context(|| format!("Failed to parse config file '{}'", path.display()))
}

fn parse_config_str(raw: &str) -> Result<FileConfig> {
    let mut cfg = FileConfig::default();
    for (line_index, raw_line) in raw.lines().enumerate() {
        let line_no = line_index + 1;
        let line = strip_inline_comment(raw_line).trim();
        if line.is_empty() {
            continue;
        }

        let Some((raw_key, raw_value)) = line.split_once('=') else {
            bail!("Invalid config syntax on line {line_no}: expected key = value");
        };
        let key = raw_key.trim();
        let value = raw_value.trim();
        let context = || format!("Invalid `{key}` value on line {line_no}");

        match key {
            "download_dir" => {
                cfg.download_dir = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            "concurrency" => {
                let parsed = parse_integer(value).with_context(context)?;
                cfg.concurrency = Some(u8::try_from(parsed).with_context(context)?);
            }
            "max_retries" => {
                let parsed = parse_integer(value).with_context(context)?;
                cfg.max_retries = Some(u32::try_from(parsed).with_context(context)?);
            }
            "retry_base_delay_ms" => {
                cfg.retry_base_delay_ms = Some(parse_integer(value).with_context(context)?);
            }
            "quality" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.quality = Some(parsed.parse().with_context(context)?);
            }
            "verbosity" => {
                let parsed = parse_string_literal(value).with_context(context)?;
                cfg.verbosity = Some(parse_verbosity(&parsed).with_context(context)?);
            }
            "catalog_file" => {
                cfg.catalog_file = Some(PathBuf::from(
                    parse_string_literal(value).with_context(context)?,
                ));
            }
            unknown => {
                bail!("Unknown configuration key: '{unknown}' on line {line_no}");
            }
        }
    }
    Ok(cfg)
}

fn strip_inline_comment(line: &str) -> &str {
    let mut in_string = false;
    for (index, ch) in line.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '#' if !in_string => return &line[..index],
            _ => {}
        }
    }
    line
}

fn parse_string_literal(raw_value: &str) -> Result<String> {
    if raw_value.len() < 2 || !raw_value.starts_with('"') || !raw_value.ends_with('"') {
        bail!("Expected double-quoted string");
    }
    Ok(raw_value[1..raw_value.len() - 1].to_string())
}

fn parse_integer(raw_value: &str) -> Result<u64> {
    let token = raw_value.trim();
    if token.is_empty() {
        bail!("Expected integer value");
    }
    let value = token.parse::<i128>()?;
    if value < 0 {
        bail!("Expected non-negative integer");
    }
    u64::try_from(value).map_err(|_| anyhow::anyhow!("Integer value out of range for u64"))
}

fn parse_verbosity(value: &str) -> Result<VerbositySetting> {
    match value {
        "default" => Ok(VerbositySetting::Default),
        "verbose" => Ok(VerbositySetting::Verbose),
        "quiet" => Ok(VerbositySetting::Quiet),
        "debug" => Ok(VerbositySetting::Debug),
        _ => bail!("Expected one of: default, verbose, quiet, debug"),
    }
}
