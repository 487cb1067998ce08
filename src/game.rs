//! Game variants targeted by the build.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::header::HeaderFormat;

/// Script source extension.
pub const SOURCE_EXTENSION: &str = "psc";
/// Compiled artifact extension.
pub const ARTIFACT_EXTENSION: &str = "pex";

/// Target runtime family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameType {
    /// Fallout 4: namespaced object names, little-endian artifacts, `.ba2`
    Fo4,
    /// Skyrim Special Edition
    Sse,
    /// Skyrim (original release)
    Tes5,
}

impl GameType {
    /// All known variants.
    pub const ALL: [GameType; 3] = [GameType::Fo4, GameType::Sse, GameType::Tes5];

    /// Parse a game alias as written in descriptors and on the command line.
    ///
    /// Accepts `fo4`, `sse`, `tes5` (and `tesv`), ignoring case.
    pub fn from_alias(alias: &str) -> Option<Self> {
        match alias.trim().to_ascii_lowercase().as_str() {
            "fo4" => Some(GameType::Fo4),
            "sse" => Some(GameType::Sse),
            "tes5" | "tesv" => Some(GameType::Tes5),
            _ => None,
        }
    }

    /// Short alias.
    pub fn alias(self) -> &'static str {
        match self {
            GameType::Fo4 => "fo4",
            GameType::Sse => "sse",
            GameType::Tes5 => "tes5",
        }
    }

    /// Display name of the game.
    pub fn display_name(self) -> &'static str {
        match self {
            GameType::Fo4 => "Fallout 4",
            GameType::Sse => "Skyrim Special Edition",
            GameType::Tes5 => "Skyrim",
        }
    }

    /// Whether object names are namespace-qualified relative paths.
    pub fn namespaced(self) -> bool {
        matches!(self, GameType::Fo4)
    }

    /// Byte order of compiled artifacts written for this game.
    pub fn artifact_header_format(self) -> HeaderFormat {
        match self {
            GameType::Fo4 => HeaderFormat::LittleEndian,
            GameType::Sse | GameType::Tes5 => HeaderFormat::BigEndian,
        }
    }

    /// Extension of the game archive (without the dot).
    pub fn package_extension(self) -> &'static str {
        match self {
            GameType::Fo4 => "ba2",
            GameType::Sse | GameType::Tes5 => "bsa",
        }
    }

    /// Flags file shipped with the game's compiler.
    pub fn default_flags(self) -> &'static str {
        match self {
            GameType::Fo4 => "Institute_Papyrus_Flags.flg",
            GameType::Sse | GameType::Tes5 => "TESV_Papyrus_Flags.flg",
        }
    }

    /// Archiver switch selecting this game's archive format.
    pub fn archiver_switch(self) -> &'static str {
        match self {
            GameType::Fo4 => "-fo4",
            GameType::Sse => "-sse",
            GameType::Tes5 => "-tes5",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.alias())
    }
}

/// Whether a flags file name is one of the stock game flag files.
pub fn is_stock_flags_file(name: &str) -> bool {
    GameType::ALL.iter().any(|g| g.default_flags().eq_ignore_ascii_case(name))
}
