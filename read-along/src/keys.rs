//! Playback commands typed on stdin while reading.

use std::io::{self, BufRead};

use tokio::sync::mpsc;

/// A transport command, one per line of input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Pause,
    Resume,
    Forward,
    Back,
    Stop,
}

impl KeyCommand {
    /// Parse a line: the first letter or the full word, any case.
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Some(KeyCommand::Pause),
            "r" | "resume" => Some(KeyCommand::Resume),
            "f" | "forward" => Some(KeyCommand::Forward),
            "b" | "back" => Some(KeyCommand::Back),
            "s" | "stop" | "q" | "quit" => Some(KeyCommand::Stop),
            _ => None,
        }
    }
}

/// Forward commands from stdin until it closes or the receiver goes away.
///
/// Runs on a plain thread: a blocked stdin read must not hold up runtime
/// shutdown.
pub fn spawn_reader(commands: mpsc::UnboundedSender<KeyCommand>) {
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match KeyCommand::parse(&line) {
                Some(command) => {
                    if commands.send(command).is_err() {
                        break;
                    }
                }
                None => tracing::debug!(input = %line.trim(), "Ignoring unknown key command"),
            }
        }
    });
}
