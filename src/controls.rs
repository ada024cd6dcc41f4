//! Terminal controls: one command per line on stdin.

use std::{
    io::{self, BufRead},
    thread,
};

use crossbeam_channel::{Receiver, unbounded};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ControlEvent {
    Quit,
    Retry,
    /// Pitch slider position; clamped when applied.
    SetPitch(f32),
}

pub const HELP: &str = "commands: q|quit, r|retry, p|pitch <0.5..2.0>";

pub fn parse_command(line: &str) -> Option<ControlEvent> {
    let mut words = line.split_whitespace();
    let command = words.next()?.to_ascii_lowercase();
    match command.as_str() {
        "q" | "quit" | "exit" => Some(ControlEvent::Quit),
        "r" | "retry" => Some(ControlEvent::Retry),
        "p" | "pitch" => {
            let value: f32 = words.next()?.parse().ok()?;
            value.is_finite().then_some(ControlEvent::SetPitch(value))
        }
        _ => None,
    }
}

/// Reads stdin on a background thread. End of input counts as a quit so a
/// closed terminal never leaves the loop running unattended.
pub fn spawn_stdin_controls() -> Receiver<ControlEvent> {
    let (tx, rx) = unbounded();
    let spawned = thread::Builder::new()
        .name("stdin-controls".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(event) => {
                        if tx.send(event).is_err() {
                            return;
                        }
                    }
                    None => log::warn!("unrecognized command {line:?}; {HELP}"),
                }
            }
            let _ = tx.send(ControlEvent::Quit);
        });
    if let Err(err) = spawned {
        log::error!("failed to start stdin controls: {err}");
    }
    rx
}
