//! Line-oriented console front end
//!
//! Maps typed lines to controller commands and renders controller events
//! for stdout.

use anyhow::{Result, anyhow, bail};
use common::{TerminalCommand, TerminalEvent};
use protocol::{SendEncoding, format_hex, format_numeric};

pub const HELP: &str = "\
Commands:
  list               enumerate attached devices
  select <n>         request access to device <n> of the last list
  send <text>        write <text> to the bound device
  mode raw|numeric   choose how send payloads are encoded
  disconnect         release the bound device
  help               show this help
  quit               exit";

/// User actions derived from one input line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Forward a command to the controller
    Command(TerminalCommand),
    /// Show help
    ShowHelp,
    /// Quit the application
    Quit,
    /// Blank line
    None,
}

/// Parse one input line
pub fn parse_input_line(line: &str) -> Result<Action> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim_start();
    if trimmed.trim().is_empty() {
        return Ok(Action::None);
    }

    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest),
        None => (trimmed, ""),
    };

    let action = match word.to_ascii_lowercase().as_str() {
        "list" | "ls" => Action::Command(TerminalCommand::EnumerateDevices),
        "select" => {
            let index = rest
                .trim()
                .parse::<usize>()
                .map_err(|_| anyhow!("usage: select <n>"))?;
            Action::Command(TerminalCommand::SelectDevice { index })
        }
        // Payload is taken verbatim after the single separating space
        "send" => Action::Command(TerminalCommand::SendData {
            payload: rest.to_string(),
        }),
        "mode" => {
            let encoding = match rest.trim().to_ascii_lowercase().as_str() {
                "raw" | "text" => SendEncoding::Raw,
                "numeric" | "num" => SendEncoding::NumericTokens,
                _ => bail!("usage: mode raw|numeric"),
            };
            Action::Command(TerminalCommand::SetEncoding { encoding })
        }
        "disconnect" => Action::Command(TerminalCommand::Disconnect),
        "help" | "?" => Action::ShowHelp,
        "quit" | "exit" | "q" => Action::Quit,
        other => bail!("unknown command '{}', type 'help'", other),
    };

    Ok(action)
}

/// Render an event as console lines
pub fn render_event(event: &TerminalEvent) -> String {
    match event {
        TerminalEvent::DevicesListed { devices } => {
            if devices.is_empty() {
                "No USB devices found.".to_string()
            } else {
                devices
                    .labels()
                    .iter()
                    .enumerate()
                    .map(|(i, label)| format!("  [{}] {}", i, label))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }
        TerminalEvent::DeviceConnected { device } => format!("+ connected {}", device),
        TerminalEvent::DeviceSelected { device } => format!("* selected {}", device),
        TerminalEvent::DeviceAttached { device } => format!(
            "* attached {} ({} interface(s))",
            device,
            device.interface_count()
        ),
        TerminalEvent::DeviceDisconnected { device } => format!("- disconnected {}", device),
        TerminalEvent::DataReceived { frame } => format!(
            "<< [{:02x}{}] {} | {}",
            frame.endpoint,
            if frame.via_control { " ctl" } else { "" },
            format_hex(&frame.data),
            format_numeric(&frame.data)
        ),
        TerminalEvent::Sending { payload } => format!(">> {}", payload),
        TerminalEvent::Sent { status, bytes } => {
            format!("   sent {} ({}): {}", status, bytes.len(), format_hex(bytes))
        }
        TerminalEvent::SendError { message } => format!("! send error: {}", message),
        TerminalEvent::BindFailed { device, message } => {
            format!("! could not attach {}: {}", device, message)
        }
        TerminalEvent::CommandFailed { message } => format!("! {}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{create_mock_device_list, create_mock_hid_device};
    use protocol::{DeviceList, ReceivedFrame};

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            parse_input_line("list").unwrap(),
            Action::Command(TerminalCommand::EnumerateDevices)
        );
        assert_eq!(
            parse_input_line("select 2\n").unwrap(),
            Action::Command(TerminalCommand::SelectDevice { index: 2 })
        );
        assert_eq!(
            parse_input_line("mode numeric").unwrap(),
            Action::Command(TerminalCommand::SetEncoding {
                encoding: SendEncoding::NumericTokens
            })
        );
        assert_eq!(
            parse_input_line("MODE Raw").unwrap(),
            Action::Command(TerminalCommand::SetEncoding {
                encoding: SendEncoding::Raw
            })
        );
        assert_eq!(
            parse_input_line("disconnect").unwrap(),
            Action::Command(TerminalCommand::Disconnect)
        );
        assert_eq!(parse_input_line("help").unwrap(), Action::ShowHelp);
        assert_eq!(parse_input_line("quit").unwrap(), Action::Quit);
        assert_eq!(parse_input_line("   ").unwrap(), Action::None);
    }

    #[test]
    fn test_send_keeps_payload_verbatim() {
        assert_eq!(
            parse_input_line("send 10  0x1F 255 ").unwrap(),
            Action::Command(TerminalCommand::SendData {
                payload: "10  0x1F 255 ".to_string()
            })
        );
        assert_eq!(
            parse_input_line("send").unwrap(),
            Action::Command(TerminalCommand::SendData {
                payload: String::new()
            })
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_input_line("select").is_err());
        assert!(parse_input_line("select -1").is_err());
        assert!(parse_input_line("mode hex").is_err());
        assert!(parse_input_line("frobnicate").is_err());
    }

    #[test]
    fn test_render_received_frame() {
        let line = render_event(&TerminalEvent::DataReceived {
            frame: ReceivedFrame {
                endpoint: 0x81,
                via_control: false,
                data: vec![10, 31, 255],
            },
        });
        assert_eq!(line, "<< [81] 0a 1f ff | 10 31 255");
    }

    #[test]
    fn test_render_device_list() {
        let rendered = render_event(&TerminalEvent::DevicesListed {
            devices: DeviceList::new(create_mock_device_list(2)),
        });
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("  [0] 04d8:003f"));
        assert!(lines[1].contains("addr 2"));

        let empty = render_event(&TerminalEvent::DevicesListed {
            devices: DeviceList::default(),
        });
        assert_eq!(empty, "No USB devices found.");
    }

    #[test]
    fn test_render_bind_failure() {
        let line = render_event(&TerminalEvent::BindFailed {
            device: create_mock_hid_device(1),
            message: "access denied".to_string(),
        });
        assert!(line.starts_with("! could not attach 04d8:003f"));
        assert!(line.ends_with("access denied"));
    }
}
