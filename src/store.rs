//! Advisory local state.
//!
//! Everything here is a best-effort copy: the theme preference, a settings blob, and a backup of
//! the last transcript keyed by the client-generated [`ChatId`].  Nothing stored here is ever
//! treated as authoritative or merged with server data.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{from_reader, to_writer_pretty};

use crate::error::{Error, Result};
use crate::types::{ChatId, Message, PreferredService, Theme};

const THEME_FILE: &str = "theme";
const SETTINGS_FILE: &str = "settings.yaml";
const TRANSCRIPT_VERSION: u8 = 1;

/// User settings persisted between runs.
///
/// Missing keys take their defaults, so older or partial files still load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Print a timestamp next to every message.
    pub show_timestamps: bool,

    /// The service selector sent with every chat request.
    pub preferred_service: PreferredService,

    /// Seconds between background health probes.
    pub health_interval_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            show_timestamps: true,
            preferred_service: PreferredService::Auto,
            health_interval_secs: 30,
        }
    }
}

/// Directory-backed store for advisory client state.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `root`.  The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The platform cache directory for chatline, if the platform has one.
    pub fn default_location() -> Option<PathBuf> {
        dirs::cache_dir().map(|dir| dir.join("chatline"))
    }

    /// The directory holding the store's files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Load the theme preference, if one was saved.
    pub fn load_theme(&self) -> Result<Option<Theme>> {
        let Some(raw) = self.read_optional(THEME_FILE)? else {
            return Ok(None);
        };
        raw.parse::<Theme>()
            .map(Some)
            .map_err(|err| Error::validation(err, Some("theme".to_string())))
    }

    /// Save the theme preference.
    pub fn save_theme(&self, theme: Theme) -> Result<()> {
        self.ensure_root()?;
        fs::write(self.root.join(THEME_FILE), theme.to_string())
            .map_err(|err| Error::io("failed to write theme preference", err))
    }

    /// Load settings, falling back to defaults when none were saved.
    pub fn load_settings(&self) -> Result<Settings> {
        match self.read_optional(SETTINGS_FILE)? {
            Some(raw) if !raw.trim().is_empty() => Ok(serde_yaml::from_str(&raw)?),
            _ => Ok(Settings::default()),
        }
    }

    /// Save settings.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.ensure_root()?;
        let yaml = serde_yaml::to_string(settings)?;
        fs::write(self.root.join(SETTINGS_FILE), yaml)
            .map_err(|err| Error::io("failed to write settings", err))
    }

    /// Load the transcript backup for `chat_id`, if one exists.
    pub fn load_transcript(&self, chat_id: &ChatId) -> Result<Option<Vec<Message>>> {
        let path = self.transcript_path(chat_id);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(Error::io("failed to open transcript backup", err)),
        };
        let reader = BufReader::new(file);
        let transcript: TranscriptFile = from_reader(reader).map_err(|err| {
            Error::serialization("failed to parse transcript backup", Some(Box::new(err)))
        })?;
        if transcript.version != TRANSCRIPT_VERSION {
            return Err(Error::serialization(
                format!(
                    "unsupported transcript backup version {} (expected {})",
                    transcript.version, TRANSCRIPT_VERSION
                ),
                None,
            ));
        }
        Ok(Some(transcript.messages))
    }

    /// Overwrite the transcript backup for `chat_id`.
    pub fn save_transcript(&self, chat_id: &ChatId, messages: &[Message]) -> Result<()> {
        self.ensure_root()?;
        let transcript = TranscriptFile::new(chat_id, messages);
        let file = File::create(self.transcript_path(chat_id))
            .map_err(|err| Error::io("failed to create transcript backup", err))?;
        let writer = BufWriter::new(file);
        to_writer_pretty(writer, &transcript).map_err(|err| {
            Error::serialization("failed to serialize transcript backup", Some(Box::new(err)))
        })
    }

    fn transcript_path(&self, chat_id: &ChatId) -> PathBuf {
        let safe: String = chat_id
            .as_str()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.root.join(format!("history-{safe}.json"))
    }

    fn ensure_root(&self) -> Result<()> {
        fs::create_dir_all(&self.root)
            .map_err(|err| Error::io("failed to create local store directory", err))
    }

    fn read_optional(&self, name: &str) -> Result<Option<String>> {
        match fs::read_to_string(self.root.join(name)) {
            Ok(raw) => Ok(Some(raw)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::io(format!("failed to read {name}"), err)),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TranscriptFile {
    version: u8,
    chat_id: ChatId,
    messages: Vec<Message>,
}

impl TranscriptFile {
    fn new(chat_id: &ChatId, messages: &[Message]) -> Self {
        Self {
            version: TRANSCRIPT_VERSION,
            chat_id: chat_id.clone(),
            messages: messages.to_vec(),
        }
    }
}
