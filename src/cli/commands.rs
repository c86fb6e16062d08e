//! Command handlers

use std::path::Path;

use tracing::{debug, info, instrument};

use crate::builder::SessionBuilder;
use crate::cli::args::{Cli, Commands, ConfigCommands, DecisionArg};
use crate::cli::error::{CliError, CliResult};
use crate::cli::output;
use crate::cli::prompt::TerminalPrompter;
use crate::config::{global_config_path, Settings};
use crate::events::MutationOutcome;
use crate::exitcode;
use crate::prompt::{Decision, DecisionPrompter, FixedDecision};
use crate::session::SchemaSession;
use crate::tree_traits::TreeRender;
use crate::NodeId;

/// Runs the parsed command and returns the process exit code.
pub fn execute_command(cli: &Cli) -> CliResult<i32> {
    match &cli.command {
        Some(Commands::Show { model }) => cmd_show(model),
        Some(Commands::Lineage { model, path }) => cmd_lineage(model, path),
        Some(Commands::Remove {
            model,
            paths,
            target,
            decision,
        }) => cmd_remove(cli.config.as_deref(), model, paths, *target, *decision),
        Some(Commands::Config { command }) => cmd_config(cli.config.as_deref(), command),
        None => Err(CliError::Usage(
            "no command given, see 'schemawatch --help'".to_string(),
        )),
    }
}

#[instrument(level = "debug")]
fn cmd_show(model: &Path) -> CliResult<i32> {
    let session = SessionBuilder::from_path(model)?;
    print_trees(&session);
    Ok(exitcode::OK)
}

#[instrument(level = "debug")]
fn cmd_lineage(model: &Path, path: &str) -> CliResult<i32> {
    let session = SessionBuilder::from_path(model)?;
    let arena = session.model();
    let node = arena.find_path(session.source_root(), path)?;
    let columns = arena.columns_sourced_from(session.target_root(), node)?;

    if columns.is_empty() {
        output::info(&format!("No target column derives from '{}'", path));
        return Ok(exitcode::OK);
    }
    output::header(&format!("{} column(s) derive from '{}'", columns.len(), path));
    for column in columns {
        output::detail(&describe_column(&session, column));
    }
    Ok(exitcode::OK)
}

#[instrument(level = "debug")]
fn cmd_remove(
    config: Option<&Path>,
    model: &Path,
    paths: &[String],
    target: bool,
    decision: Option<DecisionArg>,
) -> CliResult<i32> {
    let settings = Settings::load(config)?;
    let mut session = SessionBuilder::from_path(model)?;
    let root = if target {
        session.target_root()
    } else {
        session.source_root()
    };

    let (parent, children) = resolve_siblings(&session, root, paths)?;
    let referencing: Vec<NodeId> = if target {
        Vec::new()
    } else {
        let mut found = Vec::new();
        for &child in &children {
            found.extend(
                session
                    .model()
                    .columns_sourced_from(session.target_root(), child)?,
            );
        }
        found
    };
    let before: Vec<String> = referencing
        .iter()
        .map(|&c| describe_column(&session, c))
        .collect();

    let prompter: Box<dyn DecisionPrompter> = match decision {
        Some(arg) => Box::new(FixedDecision(Decision::from(arg))),
        None if settings.prompt.interactive => {
            Box::new(TerminalPrompter::new(settings.watcher.default_decision))
        }
        None => Box::new(FixedDecision(settings.watcher.default_decision)),
    };

    session.start(prompter, &settings.watcher)?;
    let outcome = session.model_mut().remove_children(parent, &children)?;
    session.end();
    debug!("remove outcome: {:?}", outcome);

    let code = match outcome {
        MutationOutcome::Applied => {
            output::success(&format!("Removed {}", paths.join(", ")));
            for (column, shown) in referencing.iter().zip(before) {
                if session.model().lineage(*column)?.is_none() {
                    output::diff_remove(&format!("lineage cleared: {}", shown));
                }
            }
            info!("removed {} node(s)", children.len());
            exitcode::OK
        }
        MutationOutcome::Vetoed(veto) => {
            output::failure(&format!("Not removed: {}", veto));
            exitcode::VETOED
        }
    };
    print_trees(&session);
    Ok(code)
}

fn cmd_config(config: Option<&Path>, command: &ConfigCommands) -> CliResult<i32> {
    match command {
        ConfigCommands::Show => {
            let settings = Settings::load(config)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Path => match global_config_path() {
            Some(path) => {
                output::info(&path.display());
                if !path.exists() {
                    output::warning("file does not exist, defaults apply");
                }
            }
            None => output::warning("no config directory on this platform"),
        },
        ConfigCommands::Template => output::info(&Settings::template()),
    }
    Ok(exitcode::OK)
}

/// Resolves `paths` below `root`; all must share one parent.
fn resolve_siblings(
    session: &SchemaSession,
    root: NodeId,
    paths: &[String],
) -> CliResult<(NodeId, Vec<NodeId>)> {
    let arena = session.model();
    let mut parent: Option<NodeId> = None;
    let mut children = Vec::with_capacity(paths.len());
    for path in paths {
        let node = arena.find_path(root, path)?;
        let Some(node_parent) = arena.parent(node)? else {
            return Err(CliError::InvalidArgs(format!(
                "'{}' is a model root and cannot be removed",
                path
            )));
        };
        match parent {
            Some(p) if p != node_parent => {
                return Err(CliError::InvalidArgs(
                    "all paths of one removal must share the same parent".to_string(),
                ))
            }
            _ => parent = Some(node_parent),
        }
        children.push(node);
    }
    match parent {
        Some(p) => Ok((p, children)),
        None => Err(CliError::Usage("nothing to remove".to_string())),
    }
}

fn print_trees(session: &SchemaSession) {
    let arena = session.model();
    let source = session.source_root();
    output::header("source");
    output::info(&arena.to_tree_string(source, None));
    output::header("target");
    output::info(&arena.to_tree_string(session.target_root(), Some(source)));
}

fn describe_column(session: &SchemaSession, column: NodeId) -> String {
    let arena = session.model();
    let target = arena
        .path_of(session.target_root(), column)
        .unwrap_or_else(|| column.to_string());
    match arena.lineage(column).ok().flatten() {
        Some(src) => {
            let source = arena
                .path_of(session.source_root(), src)
                .unwrap_or_else(|| src.to_string());
            format!("{} <- {}", target, source)
        }
        None => target,
    }
}
