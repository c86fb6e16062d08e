//! CLI argument definitions using clap

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};

use crate::prompt::Decision;

/// Change notification and lineage integrity for schema models
#[derive(Parser, Debug)]
#[command(name = "schemawatch")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Debug output (-d info, -dd debug, -ddd trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub debug: u8,

    /// Config file layered over the global config
    #[arg(short, long, global = true, value_hint = ValueHint::FilePath, env = "SCHEMAWATCH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show source and target models as trees
    Show {
        /// Model description (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        model: PathBuf,
    },

    /// List target columns derived from a source subtree
    Lineage {
        /// Model description (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        model: PathBuf,
        /// Source path, e.g. sales/orders
        path: String,
    },

    /// Remove nodes sharing one parent, guarded by the lineage watcher
    Remove {
        /// Model description (TOML)
        #[arg(value_hint = ValueHint::FilePath)]
        model: PathBuf,
        /// Paths of the nodes to remove in one batch
        #[arg(num_args = 1.., required = true)]
        paths: Vec<String>,
        /// Paths are relative to the target model instead of the source model
        #[arg(long)]
        target: bool,
        /// Answer lineage questions without asking
        #[arg(long, value_enum)]
        decision: Option<DecisionArg>,
    },

    /// Manage settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show effective settings
    Show,
    /// Show global config file location
    Path,
    /// Print a commented default config
    Template,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionArg {
    /// Forget lineage and remove
    Proceed,
    /// Keep the source connection, abort
    Keep,
    /// Abort
    Cancel,
}

impl From<DecisionArg> for Decision {
    fn from(arg: DecisionArg) -> Self {
        match arg {
            DecisionArg::Proceed => Decision::ProceedAndClear,
            DecisionArg::Keep => Decision::KeepAndAbort,
            DecisionArg::Cancel => Decision::CancelAndAbort,
        }
    }
}
