// Commandline argument parser using clap for TactileForce

use crate::config::DEFAULT_CONFIG_PATH;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{CommandFactory, Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Everything the `tactileforce` binary accepts on its command line.
#[derive(Debug, Parser, Clone)]
#[clap(version, about)]
pub struct TactileForceArgs {
    #[command(subcommand)]
    /// What to do: stream both sensors, or calibrate the tactile array alone
    pub command: CommandTask,

    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Use simulated sensors instead of real hardware
    #[arg(long, global = true)]
    pub simulate: bool,

    /// Serial port of the force/torque sensor, overriding the configuration
    #[arg(short, long, global = true)]
    pub port: Option<String>,
}

/// The task to perform.
#[derive(Debug, Subcommand, Clone, Copy, PartialEq, Eq)]
pub enum CommandTask {
    /// Calibrate, then stream filtered readings of every configured sensor
    Run,

    /// Stream the tactile array on its own against a zero baseline, with no
    /// calibration phase and no time limit, until Ctrl-C
    Calibrate,
}

impl TactileForceArgs {
    /// Parses the process arguments, exiting with a usage message on error.
    pub fn parse_suggesting() -> Self {
        Self::try_parse_suggesting(std::env::args_os()).unwrap_or_else(|e| e.exit())
    }

    /// Like [Parser::try_parse_from], but an unknown command that clap has
    /// no suggestion for gets the closest one by [closest_command].
    pub fn try_parse_suggesting<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|mut err| {
            if err.kind() != ErrorKind::InvalidSubcommand
                || err.get(ContextKind::SuggestedSubcommand).is_some()
            {
                return err;
            }
            let typed = match err.get(ContextKind::InvalidSubcommand) {
                Some(ContextValue::String(typed)) => typed.clone(),
                _ => return err,
            };
            let command = Self::command();
            let names: Vec<&str> = command.get_subcommands().map(|c| c.get_name()).collect();
            if let Some(name) = closest_command(&typed, &names) {
                err.insert(
                    ContextKind::SuggestedSubcommand,
                    ContextValue::String(name.to_owned()),
                );
            }
            err
        })
    }
}

/// True if every character of `typed` appears in `name`, in order.
fn is_subsequence(typed: &str, name: &str) -> bool {
    let mut rest = name.chars();
    typed.chars().all(|c| rest.any(|n| n == c))
}

/// The command `typed` most likely meant.
///
/// Names containing `typed` as a subsequence win, nearest by edit distance
/// first. Failing that, the nearest name is accepted if it is at most half
/// the length of `typed` away.
pub fn closest_command<'a>(typed: &str, names: &[&'a str]) -> Option<&'a str> {
    let distance = |name: &&'a str| strsim::levenshtein(typed, name);

    if let Some(name) = names
        .iter()
        .copied()
        .filter(|name| is_subsequence(typed, name))
        .min_by_key(distance)
    {
        return Some(name);
    }

    names
        .iter()
        .copied()
        .min_by_key(distance)
        .filter(|name| distance(name) <= typed.chars().count() / 2)
}

impl CommandTask {
    /// Factor the tactile channels are multiplied by for this task, unless
    /// the configuration says otherwise.
    pub fn default_tactile_scale(&self) -> f64 {
        match self {
            CommandTask::Run => 100.0,
            CommandTask::Calibrate => 30.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let args = TactileForceArgs::try_parse_from(["tactileforce", "run"]).unwrap();
        assert_eq!(args.command, CommandTask::Run);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(!args.simulate);
        assert_eq!(args.port, None);
    }

    #[test]
    fn flags_after_subcommand() {
        let args = TactileForceArgs::try_parse_from([
            "tactileforce",
            "calibrate",
            "--simulate",
            "--config",
            "other.ron",
            "-p",
            "/dev/ttyACM0",
        ])
        .unwrap();
        assert_eq!(args.command, CommandTask::Calibrate);
        assert!(args.simulate);
        assert_eq!(args.config, PathBuf::from("other.ron"));
        assert_eq!(args.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn short_typo_gets_a_suggestion() {
        let err = TactileForceArgs::try_parse_suggesting(["tactileforce", "rn"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        assert!(matches!(
            err.get(ContextKind::SuggestedSubcommand),
            Some(ContextValue::String(name)) if name == "run"
        ));
        assert!(err.to_string().contains("'run'"));
    }

    #[test]
    fn long_typo_keeps_clap_suggestion() {
        let err = TactileForceArgs::try_parse_suggesting(["tactileforce", "runn"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        assert!(err.to_string().contains("'run'"));
    }

    #[test]
    fn nonsense_gets_no_suggestion() {
        let err = TactileForceArgs::try_parse_suggesting(["tactileforce", "xyz"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        assert!(err.get(ContextKind::SuggestedSubcommand).is_none());
    }

    #[test]
    fn closest_command_ranking() {
        let names = ["run", "calibrate"];
        assert_eq!(closest_command("rn", &names), Some("run"));
        assert_eq!(closest_command("cal", &names), Some("calibrate"));
        assert_eq!(closest_command("calbirate", &names), Some("calibrate"));
        assert_eq!(closest_command("ruin", &names), Some("run"));
        assert_eq!(closest_command("q", &names), None);
    }

    #[test]
    fn command_is_required() {
        assert!(TactileForceArgs::try_parse_from(["tactileforce"]).is_err());
    }

    #[test]
    fn calibrate_uses_lower_scale() {
        assert_eq!(CommandTask::Calibrate.default_tactile_scale(), 30.0);
        assert_eq!(CommandTask::Run.default_tactile_scale(), 100.0);
    }
}
