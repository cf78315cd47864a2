//! Line-oriented console: parses typed commands and runs them against the
//! [`ControlSystem`].
//!
//! # Commands
//!
//! | Command                                   | Effect                                  |
//! |-------------------------------------------|-----------------------------------------|
//! | `help`                                    | List commands                           |
//! | `go`                                      | Load the system configuration file      |
//! | `reload`                                  | Tear down, then load the file again     |
//! | `getjoinmap <bridge> [device]`            | Print live join assignments             |
//! | `getjoinmapmarkdown <bridge> [device]`    | Same, as a markdown table               |
//! | `listtielines`                            | Print every tie line                    |
//! | `showconfig`                              | Dump the merged configuration as JSON   |
//! | `gettypes [filter]`                       | List the factory's device types         |
//! | `getroutingports <device>`                | List a device's input and output ports  |
//! | `devices`                                 | List registered devices                 |
//! | `press <bridge> <join> <true\|false>`     | Simulate a digital write on a bridge    |
//! | `quit`                                    | Exit                                    |
//!
//! Command names are case-insensitive.
//!
//! # `CommandResult` wrapper
//!
//! Every command returns a [`CommandResult`] with the same shape:
//! `{ success: bool, data: T | null, error: string | null }`.  A front end
//! (the stdin loop in `main`, or a remote shell) never has to special-case
//! failures.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::diagnostics;
use crate::application::load_system::{ControlSystem, LoadOutcome};
use crate::infrastructure::storage::config::load_system_config;

// ── Command result ────────────────────────────────────────────────────────────

/// Uniform response shape for console commands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

impl<T: Serialize, E: std::fmt::Display> From<Result<T, E>> for CommandResult<T> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e.to_string()),
        }
    }
}

// ── Parsing ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown command '{0}'; type 'help'")]
    UnknownCommand(String),

    #[error("{command}: missing <{argument}>")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("{command}: invalid <{argument}> '{value}'")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Help,
    Go,
    Reload,
    GetJoinMap { bridge: String, device: Option<String> },
    GetJoinMapMarkdown { bridge: String, device: Option<String> },
    ListTieLines,
    ShowConfig,
    GetTypes { filter: Option<String> },
    GetRoutingPorts { device: String },
    Devices,
    Press { bridge: String, join: u32, value: bool },
    Quit,
}

impl ConsoleCommand {
    /// Parses one input line.  Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, ParseError> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();
        let optional = |i: usize| args.get(i).map(|s| s.to_string());
        let required = |i: usize, command: &'static str, argument: &'static str| {
            args.get(i)
                .map(|s| s.to_string())
                .ok_or(ParseError::MissingArgument { command, argument })
        };

        let command = match name.to_ascii_lowercase().as_str() {
            "help" | "?" => Self::Help,
            "go" => Self::Go,
            "reload" => Self::Reload,
            "getjoinmap" => Self::GetJoinMap {
                bridge: required(0, "getjoinmap", "bridge")?,
                device: optional(1),
            },
            "getjoinmapmarkdown" => Self::GetJoinMapMarkdown {
                bridge: required(0, "getjoinmapmarkdown", "bridge")?,
                device: optional(1),
            },
            "listtielines" => Self::ListTieLines,
            "showconfig" => Self::ShowConfig,
            "gettypes" => Self::GetTypes { filter: optional(0) },
            "getroutingports" => Self::GetRoutingPorts {
                device: required(0, "getroutingports", "device")?,
            },
            "devices" => Self::Devices,
            "press" => {
                let bridge = required(0, "press", "bridge")?;
                let join_text = required(1, "press", "join")?;
                let join = join_text.parse().map_err(|_| ParseError::InvalidArgument {
                    command: "press",
                    argument: "join",
                    value: join_text.clone(),
                })?;
                let value_text = required(2, "press", "value")?;
                let value = parse_bool(&value_text).ok_or(ParseError::InvalidArgument {
                    command: "press",
                    argument: "value",
                    value: value_text.clone(),
                })?;
                Self::Press { bridge, join, value }
            }
            "quit" | "exit" => Self::Quit,
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Some(true),
        "false" | "0" | "off" => Some(false),
        _ => None,
    }
}

const HELP: &str = "\
help                                  list commands
go                                    load the system configuration
reload                                tear down and load again
getjoinmap <bridge> [device]          print join assignments
getjoinmapmarkdown <bridge> [device]  print join assignments as markdown
listtielines                          list tie lines
showconfig                            print the merged configuration
gettypes [filter]                     list device types
getroutingports <device>              list a device's ports
devices                               list registered devices
press <bridge> <join> <true|false>    simulate a digital write
quit                                  exit";

// ── Console ───────────────────────────────────────────────────────────────────

/// Executes console commands against one control system.
pub struct Console {
    system: Arc<ControlSystem>,
    config_path: PathBuf,
}

impl Console {
    pub fn new(system: Arc<ControlSystem>, config_path: impl Into<PathBuf>) -> Self {
        Self {
            system,
            config_path: config_path.into(),
        }
    }

    pub fn system(&self) -> &Arc<ControlSystem> {
        &self.system
    }

    /// Runs one command.  May block on file I/O and device activation.
    pub fn execute(&self, command: &ConsoleCommand) -> CommandResult<String> {
        let system = self.system.as_ref();
        match command {
            ConsoleCommand::Help => CommandResult::ok(HELP.to_string()),
            ConsoleCommand::Go => {
                if system.is_loaded() {
                    return CommandResult::err("system is already loaded; use 'reload'");
                }
                self.load_from_file(false)
            }
            ConsoleCommand::Reload => self.load_from_file(true),
            ConsoleCommand::GetJoinMap { bridge, device } => {
                diagnostics::get_join_map(system, bridge, device.as_deref()).into()
            }
            ConsoleCommand::GetJoinMapMarkdown { bridge, device } => {
                diagnostics::get_join_map_markdown(system, bridge, device.as_deref()).into()
            }
            ConsoleCommand::ListTieLines => CommandResult::ok(diagnostics::list_tie_lines(system)),
            ConsoleCommand::ShowConfig => diagnostics::show_config(system).into(),
            ConsoleCommand::GetTypes { filter } => {
                CommandResult::ok(diagnostics::get_types(system, filter.as_deref()))
            }
            ConsoleCommand::GetRoutingPorts { device } => {
                diagnostics::get_routing_ports(system, device).into()
            }
            ConsoleCommand::Devices => CommandResult::ok(diagnostics::devices(system)),
            ConsoleCommand::Press { bridge, join, value } => {
                diagnostics::press(system, bridge, *join, *value)
                    .map(|()| format!("{bridge} join {join} <- {value}"))
                    .into()
            }
            ConsoleCommand::Quit => CommandResult::ok("bye".to_string()),
        }
    }

    fn load_from_file(&self, reload: bool) -> CommandResult<String> {
        let config = match load_system_config(&self.config_path) {
            Ok(config) => config,
            Err(e) => {
                self.system.mark_load_failed(e.to_string());
                return CommandResult::err(e.to_string());
            }
        };
        let outcome = if reload {
            self.system.reload(config)
        } else {
            self.system.load(config)
        };
        CommandResult::ok(describe(&outcome))
    }
}

/// One-paragraph summary of a load for the console.
pub fn describe(outcome: &LoadOutcome) -> String {
    let summary = outcome.summary();
    let mut text = format!(
        "loaded {} device(s), {} room(s), {} tie line(s) ({} skipped)",
        summary.devices, summary.rooms, summary.tie_lines, summary.tie_lines_skipped
    );
    for error in &summary.errors {
        text.push_str(&format!("\n  error: {error}"));
    }
    text
}
