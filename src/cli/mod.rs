// CLI module - Administrative command-line interface

mod output;

use crate::config::DEFAULT_SOCKET_PATH;
use crate::control::LoggerBinding;
use crate::error::{LogCtlError, Result};
use crate::ipc::client::IpcClient;
use crate::ipc::protocol::{AgentLogOptions, Command, TailOptions, TargetOptions};
use crate::logging::Level;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// logctl - Reconfigure and tail logging across a controller and its agents
#[derive(Parser)]
#[command(name = "logctl")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Controller socket
    #[arg(short, long, global = true, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the named loggers on every agent's standard output
    ConfigureAgentLogs {
        /// Logger names
        #[arg(required = true)]
        names: Vec<String>,

        /// Minimum level to print
        #[arg(short, long, default_value = "ALL")]
        level: String,
    },

    /// Print messages from the named loggers until interrupted
    TailLog {
        /// Logger names
        #[arg(required = true)]
        names: Vec<String>,

        /// Minimum level to print
        #[arg(short, long, default_value = "ALL")]
        level: String,
    },

    /// Manage console log targets on the controller and all agents
    Targets {
        #[command(subcommand)]
        command: TargetCommands,
    },

    /// List the controller and connected agents
    Agents,

    /// Show controller status
    Status,
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Replace the targets (NAME@LEVEL, e.g. hudson.model.Run@FINE)
    Set {
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Remove all targets
    Clear,
    /// Show the targets in force
    Show,
}

impl Cli {
    /// Run the CLI application
    pub fn run() -> Result<()> {
        let cli = Cli::parse();
        cli.execute()
    }

    /// Execute the parsed command
    fn execute(&self) -> Result<()> {
        let client = IpcClient::with_socket_path(&self.socket);

        if let Commands::TailLog { names, level } = &self.command {
            return tail(&client, names, level);
        }

        let command = self.build_command()?;
        let response = client.send_command(command)?;

        match response.result {
            Ok(data) => {
                output::print_success(&data);
                Ok(())
            }
            Err(error_msg) => {
                output::print_error(&error_msg);
                Err(LogCtlError::Other(error_msg))
            }
        }
    }

    /// Build an IPC command from the CLI arguments
    fn build_command(&self) -> Result<Command> {
        match &self.command {
            Commands::ConfigureAgentLogs { names, level } => {
                Level::parse(level)?;
                Ok(Command::ConfigureAgentLogs(AgentLogOptions {
                    names: names.clone(),
                    level: level.clone(),
                }))
            }

            Commands::TailLog { names, level } => {
                Level::parse(level)?;
                Ok(Command::TailLog(TailOptions {
                    names: names.clone(),
                    level: level.clone(),
                }))
            }

            Commands::Targets { command } => match command {
                TargetCommands::Set { targets } => {
                    // reject typos before the controller sees them
                    for target in targets {
                        LoggerBinding::parse_target(target)?;
                    }
                    Ok(Command::SetTargets(TargetOptions {
                        targets: targets.clone(),
                    }))
                }
                TargetCommands::Clear => Ok(Command::ClearTargets),
                TargetCommands::Show => Ok(Command::GetTargets),
            },

            Commands::Agents => Ok(Command::ListAgents),

            Commands::Status => Ok(Command::Status),
        }
    }
}

/// Stream records to stdout until Ctrl-C
fn tail(client: &IpcClient, names: &[String], level: &str) -> Result<()> {
    Level::parse(level)?;

    ctrlc::set_handler(|| {
        eprintln!("Stopped.");
        std::process::exit(0);
    })
    .map_err(|e| LogCtlError::Internal(format!("Failed to install Ctrl-C handler: {}", e)))?;

    eprintln!("Waiting for messages or interruption");
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    client.tail(
        TailOptions {
            names: names.to_vec(),
            level: level.to_string(),
        },
        &mut out,
    )?;

    eprintln!("Stopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("logctl").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_configure_agent_logs_defaults_to_all() {
        let cli = parse(&["configure-agent-logs", "hudson.remoting"]);
        match cli.build_command().unwrap() {
            Command::ConfigureAgentLogs(opts) => {
                assert_eq!(opts.names, vec!["hudson.remoting"]);
                assert_eq!(opts.level, "ALL");
            }
            _ => panic!("wrong command"),
        }
        assert_eq!(cli.socket, PathBuf::from(DEFAULT_SOCKET_PATH));
        assert!(Cli::try_parse_from(["logctl", "configure-agent-logs"]).is_err());
        assert!(Cli::try_parse_from(["logctl", "configure-agent-logs", "-l", "FINE"]).is_err());
    }

    #[test]
    fn test_tail_log_requires_a_name() {
        assert!(Cli::try_parse_from(["logctl", "tail-log"]).is_err());
        let cli = parse(&["tail-log", "hudson.model", "-l", "fine"]);
        assert!(matches!(cli.build_command().unwrap(), Command::TailLog(_)));
    }

    #[test]
    fn test_targets_are_checked_locally() {
        let cli = parse(&["targets", "set", "a@FINE", "b@LOUD"]);
        assert!(matches!(
            cli.build_command(),
            Err(LogCtlError::InvalidLevel(_))
        ));

        let cli = parse(&["--socket", "/tmp/other.sock", "targets", "set", "a@FINER"]);
        assert!(matches!(cli.build_command().unwrap(), Command::SetTargets(_)));
        assert_eq!(cli.socket, PathBuf::from("/tmp/other.sock"));
    }

    #[test]
    fn test_bad_level_is_rejected() {
        let cli = parse(&["configure-agent-logs", "x", "--level", "CHATTY"]);
        assert!(cli.build_command().is_err());
    }
}
