//! Argument parsing for the daemon subcommands.

use std::path::PathBuf;

pub const USAGE: &str = "\
usage:
  sirius-daemon express [--audio-query FILE] [--play] TEXT
  sirius-daemon listen --wav FILE
  sirius-daemon listen --mic        (requires the `capture` feature)";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Wav(PathBuf),
    Mic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Process a marked-up response and print its timeline.
    Express {
        audio_query: Option<PathBuf>,
        play: bool,
        text: String,
    },
    /// Run the voice coordinator on an audio source.
    Listen { source: AudioSource },
}

pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Command, String> {
    let mut args = args.into_iter();
    match args.next().as_deref() {
        Some("express") => parse_express(args),
        Some("listen") => parse_listen(args),
        Some(other) => Err(format!("unknown command '{}'", other)),
        None => Err("missing command".to_string()),
    }
}

fn parse_express(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    let mut audio_query = None;
    let mut play = false;
    let mut words = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--audio-query" => {
                let path = args.next().ok_or("--audio-query needs a file")?;
                audio_query = Some(PathBuf::from(path));
            }
            "--play" => play = true,
            // Everything after `--` is text, even if it looks like a flag.
            "--" => {
                words.extend(args.by_ref());
            }
            flag if flag.starts_with("--") => return Err(format!("unknown flag '{}'", flag)),
            _ => words.push(arg),
        }
    }

    if words.is_empty() {
        return Err("express needs TEXT".to_string());
    }
    Ok(Command::Express {
        audio_query,
        play,
        text: words.join(" "),
    })
}

fn parse_listen(mut args: impl Iterator<Item = String>) -> Result<Command, String> {
    let source = match args.next().as_deref() {
        Some("--wav") => AudioSource::Wav(PathBuf::from(args.next().ok_or("--wav needs a file")?)),
        Some("--mic") => AudioSource::Mic,
        Some(other) => return Err(format!("unknown listen source '{}'", other)),
        None => return Err("listen needs --wav FILE or --mic".to_string()),
    };
    if let Some(extra) = args.next() {
        return Err(format!("unexpected argument '{}'", extra));
    }
    Ok(Command::Listen { source })
}
