//! Line-based control console on stdin.
//!
//! Stands in for a tray menu when the host runs headless.  Lines arrive over
//! a channel fed by [`spawn_stdin_reader`]; replies go to the writer given to
//! [`run_console`] (stderr in the binary) so they never mix with text
//! delivered on stdout.
//!
//! ```text
//! toggle      flip the sync flag
//! on | off    set the sync flag
//! status      sync flag, client count and relay URL
//! sessions    one line per connected client
//! url         the relay URL phones should use
//! quit | exit stop the host
//! ```

use std::io::BufRead;
use std::sync::Arc;
use std::time::SystemTime;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::debug;
use voice_relay_core::DiscoveryAnnouncement;

use crate::application::{SessionRegistry, SyncController};
use crate::infrastructure::network::discovery::HostAddress;
use crate::infrastructure::shutdown::ShutdownSignal;
use crate::infrastructure::ui_bridge::status::StatusObserver;

const HELP: &str = "commands: toggle | on | off | status | sessions | url | quit";

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Toggle,
    On,
    Off,
    Status,
    Sessions,
    Url,
    Quit,
    Help,
    Unknown(String),
}

impl ConsoleCommand {
    /// Parses a line; blank lines yield `None`.
    pub fn parse(line: &str) -> Option<Self> {
        let word = line.trim();
        if word.is_empty() {
            return None;
        }
        Some(match word.to_ascii_lowercase().as_str() {
            "toggle" | "t" => Self::Toggle,
            "on" => Self::On,
            "off" => Self::Off,
            "status" | "s" => Self::Status,
            "sessions" => Self::Sessions,
            "url" => Self::Url,
            "quit" | "exit" | "q" => Self::Quit,
            "help" | "?" => Self::Help,
            _ => Self::Unknown(word.to_string()),
        })
    }
}

/// How [`run_console`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    /// The user asked to stop the host.
    Quit,
    /// Input closed.  The host keeps running.
    EndOfInput,
    /// The shutdown signal fired.
    Shutdown,
}

/// Operations reachable from the console.
pub struct Console {
    pub registry: Arc<SessionRegistry>,
    pub sync: Arc<SyncController>,
    pub status: Arc<StatusObserver>,
    pub address: HostAddress,
    pub relay_port: u16,
    pub host_name: String,
}

impl Console {
    async fn relay_url(&self) -> String {
        DiscoveryAnnouncement {
            ip: self.address.resolve().await,
            port: self.relay_port,
            name: self.host_name.clone(),
        }
        .relay_url()
    }

    /// Executes one command and returns the reply text.
    pub async fn execute(&self, command: &ConsoleCommand) -> String {
        match command {
            ConsoleCommand::Toggle => {
                let enabled = self.sync.toggle();
                format!("sync {}", on_off(enabled))
            }
            ConsoleCommand::On | ConsoleCommand::Off => {
                let wanted = *command == ConsoleCommand::On;
                if self.sync.set(wanted) {
                    format!("sync {}", on_off(wanted))
                } else {
                    format!("sync already {}", on_off(wanted))
                }
            }
            ConsoleCommand::Status => format!(
                "{} | sync {} | {} session(s) | {}",
                self.status.status(),
                on_off(self.sync.enabled()),
                self.registry.count(),
                self.relay_url().await
            ),
            ConsoleCommand::Sessions => {
                let sessions = self.registry.sessions();
                if sessions.is_empty() {
                    return "no sessions".to_string();
                }
                sessions
                    .iter()
                    .map(|s| {
                        let age = SystemTime::now()
                            .duration_since(s.connected_at)
                            .unwrap_or_default();
                        format!(
                            "{}  {}  connected {}s  idle {}s",
                            s.id,
                            s.remote_addr,
                            age.as_secs(),
                            s.idle_for().as_secs()
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            }
            ConsoleCommand::Url => self.relay_url().await,
            ConsoleCommand::Quit => "stopping".to_string(),
            ConsoleCommand::Help => HELP.to_string(),
            ConsoleCommand::Unknown(word) => format!("unknown command '{word}'; {HELP}"),
        }
    }
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

/// Spawns a thread that reads stdin line by line into a channel.
///
/// The read blocks a plain OS thread rather than a runtime worker, so a
/// pending read never holds up shutdown.  The channel closes at end of
/// input.
///
/// # Errors
///
/// Returns an error if the thread cannot be spawned.
pub fn spawn_stdin_reader() -> std::io::Result<mpsc::Receiver<String>> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::Builder::new()
        .name("voice-relay-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        })?;
    Ok(rx)
}

/// Executes commands from `input` until quit, end of input or shutdown.
///
/// # Errors
///
/// Returns an I/O error if writing a reply fails.
pub async fn run_console<W>(
    console: &Console,
    mut input: mpsc::Receiver<String>,
    mut output: W,
    mut shutdown: ShutdownSignal,
) -> std::io::Result<ConsoleExit>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let line = tokio::select! {
            _ = shutdown.wait() => return Ok(ConsoleExit::Shutdown),
            line = input.recv() => line,
        };
        let Some(line) = line else {
            debug!("console input closed");
            return Ok(ConsoleExit::EndOfInput);
        };
        let Some(command) = ConsoleCommand::parse(&line) else {
            continue;
        };

        let reply = console.execute(&command).await;
        output.write_all(reply.as_bytes()).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;

        if command == ConsoleCommand::Quit {
            return Ok(ConsoleExit::Quit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::SessionObserver;
    use crate::infrastructure::shutdown::Shutdown;
    use std::net::IpAddr;

    fn lines(input: &[&str]) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel(input.len().max(1));
        for line in input {
            tx.try_send(line.to_string()).unwrap();
        }
        rx
    }

    fn console(enabled: bool) -> Console {
        let status = Arc::new(StatusObserver::new(enabled));
        let observer: Arc<dyn SessionObserver> = status.clone();
        let registry = Arc::new(SessionRegistry::new(Arc::clone(&observer)));
        let sync = Arc::new(SyncController::new(enabled, Arc::clone(&registry), observer));
        Console {
            registry,
            sync,
            status,
            address: HostAddress::Fixed(IpAddr::from([192, 168, 137, 1])),
            relay_port: 9527,
            host_name: "DESKTOP-01".to_string(),
        }
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse(" Toggle "), Some(ConsoleCommand::Toggle));
        assert_eq!(ConsoleCommand::parse("EXIT"), Some(ConsoleCommand::Quit));
        assert_eq!(ConsoleCommand::parse(""), None);
        assert_eq!(
            ConsoleCommand::parse("reboot"),
            Some(ConsoleCommand::Unknown("reboot".to_string()))
        );
    }

    #[tokio::test]
    async fn test_toggle_and_set_change_flag() {
        let c = console(true);

        assert_eq!(c.execute(&ConsoleCommand::Toggle).await, "sync off");
        assert_eq!(c.execute(&ConsoleCommand::Off).await, "sync already off");
        assert_eq!(c.execute(&ConsoleCommand::On).await, "sync on");
        assert!(c.sync.enabled());
    }

    #[tokio::test]
    async fn test_url_uses_resolved_address() {
        let c = console(true);
        assert_eq!(c.execute(&ConsoleCommand::Url).await, "ws://192.168.137.1:9527");
    }

    #[tokio::test]
    async fn test_status_reflects_observer() {
        let c = console(false);
        let reply = c.execute(&ConsoleCommand::Status).await;
        assert!(reply.starts_with("sync paused | sync off | 0 session(s)"));
    }

    #[tokio::test]
    async fn test_run_console_quits_on_quit() {
        // Arrange
        let c = console(true);
        let input = lines(&["toggle", "", "status", "quit", "never reached"]);
        let mut output = Vec::new();
        let shutdown = Shutdown::new();

        // Act
        let exit = run_console(&c, input, &mut output, shutdown.subscribe())
            .await
            .unwrap();

        // Assert
        assert_eq!(exit, ConsoleExit::Quit);
        let text = String::from_utf8(output).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "sync off");
        assert_eq!(lines.last(), Some(&"stopping"));
        assert!(!c.sync.enabled());
    }

    #[tokio::test]
    async fn test_end_of_input_is_not_quit() {
        let c = console(true);
        let input = lines(&["url"]);
        let mut output = Vec::new();
        let shutdown = Shutdown::new();

        let exit = run_console(&c, input, &mut output, shutdown.subscribe())
            .await
            .unwrap();

        assert_eq!(exit, ConsoleExit::EndOfInput);
    }
}
