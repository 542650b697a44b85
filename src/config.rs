//! Runtime configuration: resolves the shell's bootstrap parameters from CLI
//! flags, environment variables and built-in defaults, in that precedence
//! order (§3, §6). This replaces the module-scoped env-var reads the teacher
//! binary did directly in `main` with a single value constructed once at
//! startup and threaded through.

use std::path::PathBuf;

use anyhow::Result;

use crate::error::{ShellError, ShellResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warn" | "warning" => Some(LogLevel::Warn),
            "error" => Some(LogLevel::Error),
            "fatal" => Some(LogLevel::Fatal),
            "panic" => Some(LogLevel::Panic),
            _ => None,
        }
    }

    /// Tracing's `EnvFilter` only knows the first four; `fatal`/`panic` map
    /// onto `error`, the nearest tracing level.
    pub fn as_tracing_filter(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error | LogLevel::Fatal | LogLevel::Panic => "error",
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

use crate::session::OutputFormat;

fn parse_output_format(s: &str) -> Option<OutputFormat> {
    match s.to_ascii_lowercase().as_str() {
        "json" => Some(OutputFormat::Json),
        "yaml" | "yml" => Some(OutputFormat::Yaml),
        _ => None,
    }
}

/// CLI surface of the shell subcommand (§6): every flag the spec names,
/// parsed by hand in the teacher's own style rather than pulling in an
/// argument-parsing crate the rest of the stack doesn't use.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub namespace: Option<String>,
    pub all_namespaces: bool,
    pub loglevel: Option<String>,
    pub no_color: bool,
    pub format: Option<String>,
    pub backend_url: Option<String>,
}

impl CliArgs {
    pub fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut out = CliArgs {
            namespace: None,
            all_namespaces: false,
            loglevel: None,
            no_color: false,
            format: None,
            backend_url: None,
        };
        let args: Vec<String> = args.into_iter().collect();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--namespace" | "-n" => {
                    let v = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("{} requires a value", args[i]))?;
                    out.namespace = Some(v.clone());
                    i += 2;
                }
                "--all-namespaces" | "-A" => {
                    out.all_namespaces = true;
                    i += 1;
                }
                "--loglevel" | "-l" => {
                    let v = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("{} requires a value", args[i]))?;
                    out.loglevel = Some(v.clone());
                    i += 2;
                }
                "--no-color" => {
                    out.no_color = true;
                    i += 1;
                }
                "--format" => {
                    let v = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("{} requires a value", args[i]))?;
                    out.format = Some(v.clone());
                    i += 2;
                }
                "--connect" => {
                    let v = args.get(i + 1).ok_or_else(|| anyhow::anyhow!("{} requires a value", args[i]))?;
                    out.backend_url = Some(v.clone());
                    i += 2;
                }
                other => {
                    return Err(anyhow::anyhow!("unrecognized flag: {other}"));
                }
            }
        }
        Ok(out)
    }
}

/// Resolved once at bootstrap from (CLI flags, environment, defaults), in
/// that precedence order (§3 "Runtime config").
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub backend_url: String,
    pub dot2ascii_url: String,
    pub namespace: String,
    pub log_level: LogLevel,
    pub no_color: bool,
    pub output_format: OutputFormat,
    pub macros_path: Option<PathBuf>,
    pub history_path: Option<PathBuf>,
}

impl RuntimeConfig {
    pub fn resolve(cli: &CliArgs) -> ShellResult<Self> {
        let namespace = if cli.all_namespaces {
            String::new()
        } else {
            cli.namespace
                .clone()
                .or_else(|| std::env::var("CYPHERNETES_NAMESPACE").ok())
                .unwrap_or_else(|| "default".to_string())
        };

        let loglevel_str = cli
            .loglevel
            .clone()
            .or_else(|| std::env::var("CYPHERNETES_LOGLEVEL").ok())
            .unwrap_or_else(|| "info".to_string());
        let log_level = LogLevel::parse(&loglevel_str)
            .ok_or_else(|| ShellError::fatal_init(format!("invalid --loglevel value: {loglevel_str}")))?;

        let format_str = cli
            .format
            .clone()
            .or_else(|| std::env::var("CYPHERNETES_FORMAT").ok())
            .unwrap_or_else(|| "json".to_string());
        let output_format = parse_output_format(&format_str)
            .ok_or_else(|| ShellError::fatal_init(format!("invalid --format value: {format_str}")))?;

        let no_color = cli.no_color || std::env::var_os("NO_COLOR").is_some();

        let backend_url = cli
            .backend_url
            .clone()
            .or_else(|| std::env::var("CYPHERNETES_BACKEND_URL").ok())
            .unwrap_or_else(|| "http://127.0.0.1:7878".to_string());

        let dot2ascii_url = std::env::var("CYPHERNETES_DOT2ASCII_URL")
            .unwrap_or_else(|_| format!("{}/render/dot2ascii", backend_url.trim_end_matches('/')));

        let home = std::env::var_os("HOME").map(PathBuf::from);
        let macros_path = home.as_ref().map(|h| h.join(".cyphernetes").join("macros"));
        let history_path = home.as_ref().map(|h| h.join(".cyphernetes").join("history"));

        Ok(RuntimeConfig {
            backend_url,
            dot2ascii_url,
            namespace,
            log_level,
            no_color,
            output_format,
            macros_path,
            history_path,
        })
    }
}

/// Narrow entry point into "cluster configuration" (§9 DESIGN NOTES):
/// returns only the current context name, never credentials. Full config/
/// auth resolution is out of scope for this crate.
pub trait ContextResolver: Send + Sync {
    fn current_context(&self) -> Result<String>;
}

/// Reads the `current-context` line out of a kubeconfig file; this is the
/// only sanctioned entry point into cluster configuration. A missing or
/// unparsable kubeconfig is a fatal init error (§7) because the shell's
/// prompt and every query depend on knowing which context it's pointed at.
pub struct KubeconfigContextResolver {
    pub path: PathBuf,
}

impl KubeconfigContextResolver {
    pub fn default_path() -> PathBuf {
        std::env::var_os("KUBECONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
                home.join(".kube").join("config")
            })
    }
}

impl ContextResolver for KubeconfigContextResolver {
    fn current_context(&self) -> Result<String> {
        let text = std::fs::read_to_string(&self.path)
            .map_err(|e| anyhow::anyhow!("could not read kubeconfig {}: {e}", self.path.display()))?;
        for line in text.lines() {
            if let Some(rest) = line.trim_start().strip_prefix("current-context:") {
                let ctx = rest.trim().trim_matches('"').trim_matches('\'');
                if !ctx.is_empty() {
                    return Ok(ctx.to_string());
                }
            }
        }
        Err(anyhow::anyhow!("no current-context set in {}", self.path.display()))
    }
}
