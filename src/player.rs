//! Blocking audio playback.
//!
//! The backend is picked once, when the player is built: [`CommandPlayer`]
//! runs a file-based player that exits when the clip ends, [`SystemPlayer`]
//! hands the file to the platform's default opener and [`SilentPlayer`]
//! does nothing. A backend whose program is missing fails at construction,
//! before any item is touched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{PlayerError, UnknownBackend};

/// Written lowercase; read in any case, from the config file as well as the
/// environment and the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum AudioBackend {
    #[default]
    Vlc,
    Ffplay,
    System,
    Silent,
}

impl fmt::Display for AudioBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioBackend::Vlc => write!(f, "vlc"),
            AudioBackend::Ffplay => write!(f, "ffplay"),
            AudioBackend::System => write!(f, "system"),
            AudioBackend::Silent => write!(f, "silent"),
        }
    }
}

impl FromStr for AudioBackend {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vlc" => Ok(AudioBackend::Vlc),
            "ffplay" => Ok(AudioBackend::Ffplay),
            "system" => Ok(AudioBackend::System),
            "silent" => Ok(AudioBackend::Silent),
            other => Err(UnknownBackend(other.to_string())),
        }
    }
}

impl TryFrom<String> for AudioBackend {
    type Error = UnknownBackend;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Plays a clip to the end, blocking the calling thread.
pub trait Player: Send {
    fn play(&mut self, path: &Path) -> Result<(), PlayerError>;
}

/// Builds the player for a run.
pub trait PlayerFactory: Send {
    fn create(&self, backend: AudioBackend) -> Result<Box<dyn Player>, PlayerError>;
}

/// Resolves backends against the programs installed on this machine.
#[derive(Debug, Clone, Copy, Default)]
pub struct InstalledPlayers;

impl PlayerFactory for InstalledPlayers {
    fn create(&self, backend: AudioBackend) -> Result<Box<dyn Player>, PlayerError> {
        let player: Box<dyn Player> = match backend {
            AudioBackend::Vlc => Box::new(CommandPlayer::resolve(
                backend,
                "cvlc",
                &["--play-and-exit", "--quiet"],
            )?),
            AudioBackend::Ffplay => Box::new(CommandPlayer::resolve(
                backend,
                "ffplay",
                &["-nodisp", "-autoexit", "-loglevel", "quiet"],
            )?),
            AudioBackend::System => Box::new(SystemPlayer::resolve()?),
            AudioBackend::Silent => Box::new(SilentPlayer),
        };
        tracing::debug!(%backend, "audio player ready");
        Ok(player)
    }
}

fn locate(backend: AudioBackend, program: &'static str) -> Result<PathBuf, PlayerError> {
    which::which(program).map_err(|source| PlayerError::BackendUnavailable {
        backend,
        program,
        source,
    })
}

fn run_to_completion(program: &Path, args: &[&str], path: &Path) -> Result<(), PlayerError> {
    if !path.exists() {
        return Err(PlayerError::MissingFile(path.to_path_buf()));
    }
    if path.is_dir() {
        return Err(PlayerError::Failed(format!("{} is a directory", path.display())));
    }
    let status = Command::new(program)
        .args(args)
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .status()
        .map_err(|source| PlayerError::Spawn {
            program: program.display().to_string(),
            source,
        })?;
    if !status.success() {
        return Err(PlayerError::Exit {
            program: program.display().to_string(),
            path: path.to_path_buf(),
            code: status.code(),
        });
    }
    Ok(())
}

/// A player program that exits once the clip has played.
#[derive(Debug, Clone)]
pub struct CommandPlayer {
    program: PathBuf,
    args: Vec<&'static str>,
}

impl CommandPlayer {
    fn resolve(
        backend: AudioBackend,
        program: &'static str,
        args: &[&'static str],
    ) -> Result<Self, PlayerError> {
        Ok(Self {
            program: locate(backend, program)?,
            args: args.to_vec(),
        })
    }
}

impl Player for CommandPlayer {
    fn play(&mut self, path: &Path) -> Result<(), PlayerError> {
        run_to_completion(&self.program, &self.args, path)
    }
}

/// The platform's default handler for audio files.
///
/// On Linux and Windows the opener may return before playback ends.
#[derive(Debug, Clone)]
pub struct SystemPlayer {
    opener: PathBuf,
    args: Vec<&'static str>,
}

impl SystemPlayer {
    fn resolve() -> Result<Self, PlayerError> {
        let (program, args): (&'static str, &[&'static str]) = if cfg!(target_os = "macos") {
            ("afplay", &[])
        } else if cfg!(windows) {
            ("cmd", &["/C", "start", "/WAIT", ""])
        } else {
            ("xdg-open", &[])
        };
        Ok(Self {
            opener: locate(AudioBackend::System, program)?,
            args: args.to_vec(),
        })
    }
}

impl Player for SystemPlayer {
    fn play(&mut self, path: &Path) -> Result<(), PlayerError> {
        run_to_completion(&self.opener, &self.args, path)
    }
}

/// Plays nothing. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentPlayer;

impl Player for SilentPlayer {
    fn play(&mut self, path: &Path) -> Result<(), PlayerError> {
        tracing::info!(path = %path.display(), "silent playback");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_parses_case_insensitively() {
        assert_eq!("VLC".parse::<AudioBackend>().unwrap(), AudioBackend::Vlc);
        assert_eq!(" ffplay ".parse::<AudioBackend>().unwrap(), AudioBackend::Ffplay);
        assert_eq!("system".parse::<AudioBackend>().unwrap(), AudioBackend::System);
        assert_eq!(
            "sounddevice".parse::<AudioBackend>(),
            Err(UnknownBackend("sounddevice".into()))
        );
    }

    #[test]
    fn backend_display_round_trips_through_parse() {
        for backend in [
            AudioBackend::Vlc,
            AudioBackend::Ffplay,
            AudioBackend::System,
            AudioBackend::Silent,
        ] {
            assert_eq!(backend.to_string().parse::<AudioBackend>().unwrap(), backend);
        }
    }

    #[test]
    fn silent_backend_always_builds() {
        let mut player = InstalledPlayers.create(AudioBackend::Silent).unwrap();
        player.play(Path::new("does/not/exist.wav")).unwrap();
    }

    #[test]
    fn missing_file_is_reported_before_spawning() {
        let err = run_to_completion(
            Path::new("/nonexistent/player"),
            &[],
            Path::new("/nonexistent/clip.wav"),
        )
        .unwrap_err();
        assert!(matches!(err, PlayerError::MissingFile(_)));
    }

    #[test]
    fn directory_is_not_playable() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_to_completion(Path::new("/nonexistent/player"), &[], dir.path()).unwrap_err();
        assert!(matches!(err, PlayerError::Failed(_)));
    }

    #[test]
    fn unknown_program_is_backend_unavailable() {
        let err = locate(AudioBackend::Vlc, "autodial-no-such-player").unwrap_err();
        match err {
            PlayerError::BackendUnavailable {
                backend, program, ..
            } => {
                assert_eq!(backend, AudioBackend::Vlc);
                assert_eq!(program, "autodial-no-such-player");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
