// Command-line surface of the entrypoint binary.

use anyhow::Result;
use clap::Parser;
use podutils_common::{EntrypointOptions, OptionsLoader};
use podutils_sdk::StringUtil;
use std::path::PathBuf;
use std::time::Duration;

/// Options come from `--options`, else `$ENTRYPOINT_OPTIONS`, else the flags below.
#[derive(Parser, Debug)]
#[command(name = "entrypoint", version, about = "Wrap a container's command and record its result")]
pub struct Args {
    /// JSON file holding the full options.
    #[arg(long)]
    pub options: Option<PathBuf>,

    #[arg(long)]
    pub marker_file: Option<PathBuf>,

    #[arg(long)]
    pub process_log: Option<PathBuf>,

    /// e.g. `90s`, `1h30m`, or bare seconds.
    #[arg(long, value_parser = parse_duration)]
    pub timeout: Option<Duration>,

    #[arg(long, value_parser = parse_duration)]
    pub grace_period: Option<Duration>,

    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,

    /// Wait for this marker and only run if it reports success.
    #[arg(long)]
    pub previous_marker: Option<PathBuf>,

    #[arg(long)]
    pub container_name: Option<String>,

    /// Exit 0 even when the command fails.
    #[arg(long)]
    pub always_zero: bool,

    /// The command to run, after `--`.
    #[arg(last = true)]
    pub args: Vec<String>,
}

fn parse_duration(value: &str) -> Result<Duration, String> {
    StringUtil::parse_duration(value).map_err(|e| e.to_string())
}

impl Args {
    pub fn resolve(self) -> Result<EntrypointOptions> {
        if let Some(options) = OptionsLoader::load::<EntrypointOptions>(self.options.as_deref())? {
            return Ok(options);
        }
        Ok(self.into_options())
    }

    /// Options built from the flags alone.
    pub fn into_options(self) -> EntrypointOptions {
        EntrypointOptions {
            args: self.args,
            container_name: self.container_name,
            process_log: self.process_log.unwrap_or_default(),
            marker_file: self.marker_file.unwrap_or_default(),
            timeout: self.timeout,
            grace_period: self.grace_period,
            artifact_dir: self.artifact_dir,
            previous_marker: self.previous_marker,
            always_zero: self.always_zero,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_build_options() {
        let args = Args::try_parse_from([
            "entrypoint",
            "--marker-file",
            "/logs/marker-file.txt",
            "--process-log",
            "/logs/process-log.txt",
            "--timeout",
            "1m30s",
            "--always-zero",
            "--",
            "make",
            "--jobs=4",
            "test",
        ])
        .unwrap();

        let options = args.into_options();
        assert_eq!(options.args, vec!["make", "--jobs=4", "test"]);
        assert_eq!(options.timeout, Some(Duration::from_secs(90)));
        assert_eq!(options.grace_period, None);
        assert!(options.always_zero);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn missing_command_fails_validation() {
        let args = Args::try_parse_from(["entrypoint", "--marker-file", "/logs/marker"]).unwrap();
        assert!(args.into_options().validate().is_err());
    }

    #[test]
    fn bad_duration_is_rejected() {
        assert!(Args::try_parse_from(["entrypoint", "--timeout", "soon"]).is_err());
    }

    #[test]
    fn options_file_wins_over_flags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"args": ["echo"], "marker_file": "/from/file"}"#).unwrap();

        let args = Args::try_parse_from([
            "entrypoint".to_string(),
            "--options".to_string(),
            path.display().to_string(),
            "--marker-file".to_string(),
            "/from/flag".to_string(),
        ])
        .unwrap();

        let options = args.resolve().unwrap();
        assert_eq!(options.marker_file, PathBuf::from("/from/file"));
    }
}
