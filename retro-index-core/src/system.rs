use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of media a system indexes. Drives slug normalization, so systems
/// sharing a media type always produce identical slugs for the same text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Game,
    #[serde(rename = "tvshow")]
    TvShow,
    Movie,
    Music,
    Image,
    Application,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Game => "game",
            Self::TvShow => "tvshow",
            Self::Movie => "movie",
            Self::Music => "music",
            Self::Image => "image",
            Self::Application => "application",
        }
    }
}

/// Known indexable systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SystemDef {
    Nes,
    Snes,
    N64,
    GameBoy,
    Gba,
    Ds,
    MasterSystem,
    Genesis,
    Saturn,
    Dreamcast,
    GameGear,
    Ps1,
    Ps2,
    Psp,
    Arcade,
    Dos,
    TvEpisode,
    Movie,
    MusicTrack,
    Picture,
    PcApplication,
}

const ALL_SYSTEMS: &[SystemDef] = &[
    SystemDef::Nes,
    SystemDef::Snes,
    SystemDef::N64,
    SystemDef::GameBoy,
    SystemDef::Gba,
    SystemDef::Ds,
    SystemDef::MasterSystem,
    SystemDef::Genesis,
    SystemDef::Saturn,
    SystemDef::Dreamcast,
    SystemDef::GameGear,
    SystemDef::Ps1,
    SystemDef::Ps2,
    SystemDef::Psp,
    SystemDef::Arcade,
    SystemDef::Dos,
    SystemDef::TvEpisode,
    SystemDef::Movie,
    SystemDef::MusicTrack,
    SystemDef::Picture,
    SystemDef::PcApplication,
];

impl SystemDef {
    /// External system code stored in `Systems.SystemID`.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Nes => "NES",
            Self::Snes => "SNES",
            Self::N64 => "Nintendo64",
            Self::GameBoy => "Gameboy",
            Self::Gba => "GBA",
            Self::Ds => "NDS",
            Self::MasterSystem => "MasterSystem",
            Self::Genesis => "Genesis",
            Self::Saturn => "Saturn",
            Self::Dreamcast => "Dreamcast",
            Self::GameGear => "GameGear",
            Self::Ps1 => "PSX",
            Self::Ps2 => "PS2",
            Self::Psp => "PSP",
            Self::Arcade => "Arcade",
            Self::Dos => "DOS",
            Self::TvEpisode => "TVEpisode",
            Self::Movie => "Movie",
            Self::MusicTrack => "MusicTrack",
            Self::Picture => "Image",
            Self::PcApplication => "PC",
        }
    }

    /// Full display name for the system.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Nes => "Nintendo Entertainment System",
            Self::Snes => "Super Nintendo Entertainment System",
            Self::N64 => "Nintendo 64",
            Self::GameBoy => "Game Boy",
            Self::Gba => "Game Boy Advance",
            Self::Ds => "Nintendo DS",
            Self::MasterSystem => "Sega Master System",
            Self::Genesis => "Sega Genesis / Mega Drive",
            Self::Saturn => "Sega Saturn",
            Self::Dreamcast => "Sega Dreamcast",
            Self::GameGear => "Sega Game Gear",
            Self::Ps1 => "Sony PlayStation",
            Self::Ps2 => "Sony PlayStation 2",
            Self::Psp => "Sony PlayStation Portable",
            Self::Arcade => "Arcade",
            Self::Dos => "MS-DOS",
            Self::TvEpisode => "TV Episode",
            Self::Movie => "Movie",
            Self::MusicTrack => "Music Track",
            Self::Picture => "Image",
            Self::PcApplication => "PC Application",
        }
    }

    pub fn media_type(&self) -> MediaType {
        match self {
            Self::TvEpisode => MediaType::TvShow,
            Self::Movie => MediaType::Movie,
            Self::MusicTrack => MediaType::Music,
            Self::Picture => MediaType::Image,
            Self::PcApplication => MediaType::Application,
            _ => MediaType::Game,
        }
    }

    /// Alternative names accepted when parsing (case-insensitive).
    pub fn aliases(&self) -> &'static [&'static str] {
        match self {
            Self::Nes => &["famicom", "fc"],
            Self::Snes => &["sfc", "superfamicom", "supernintendo"],
            Self::N64 => &["n64"],
            Self::GameBoy => &["gb"],
            Self::Gba => &["gameboyadvance"],
            Self::Ds => &["ds", "nintendods"],
            Self::MasterSystem => &["sms"],
            Self::Genesis => &["megadrive", "md"],
            Self::Saturn => &["segasaturn"],
            Self::Dreamcast => &["dc"],
            Self::GameGear => &["gg"],
            Self::Ps1 => &["ps1", "playstation"],
            Self::Ps2 => &["playstation2"],
            Self::Psp => &["playstationportable"],
            Self::Arcade => &["mame"],
            Self::Dos => &["msdos"],
            Self::TvEpisode => &["tv", "tvshow"],
            Self::Movie => &["film"],
            Self::MusicTrack => &["music"],
            Self::Picture => &["picture", "photo"],
            Self::PcApplication => &["windows"],
        }
    }

    pub fn all() -> &'static [SystemDef] {
        ALL_SYSTEMS
    }

    /// Look up a system by its exact external code.
    pub fn lookup(id: &str) -> Option<SystemDef> {
        ALL_SYSTEMS.iter().copied().find(|s| s.id() == id)
    }
}

impl std::fmt::Display for SystemDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Returned when a string names no known system.
#[derive(Debug, Clone, Error)]
#[error("unknown system: '{0}'")]
pub struct SystemParseError(pub String);

impl std::str::FromStr for SystemDef {
    type Err = SystemParseError;

    /// Parse from the external code or any alias, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        for &system in ALL_SYSTEMS {
            if system.id().to_lowercase() == lower || system.aliases().contains(&lower.as_str()) {
                return Ok(system);
            }
        }
        Err(SystemParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip() {
        for &system in SystemDef::all() {
            let parsed: SystemDef = system.id().parse().unwrap();
            assert_eq!(parsed, system, "round-trip failed for {:?}", system);
            assert_eq!(SystemDef::lookup(system.id()), Some(system));
        }
    }

    #[test]
    fn ids_are_unique() {
        let mut ids: Vec<_> = SystemDef::all().iter().map(|s| s.id()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), SystemDef::all().len());
    }

    #[test]
    fn aliases_and_case() {
        assert_eq!("megadrive".parse::<SystemDef>().unwrap(), SystemDef::Genesis);
        assert_eq!("snes".parse::<SystemDef>().unwrap(), SystemDef::Snes);
        assert_eq!("TvEpisode".parse::<SystemDef>().unwrap(), SystemDef::TvEpisode);
        assert!("commodore64".parse::<SystemDef>().is_err());
    }

    #[test]
    fn media_types() {
        assert_eq!(SystemDef::Nes.media_type(), MediaType::Game);
        assert_eq!(SystemDef::Snes.media_type(), MediaType::Game);
        assert_eq!(SystemDef::TvEpisode.media_type(), MediaType::TvShow);
        assert_eq!(SystemDef::Picture.media_type(), MediaType::Image);
    }
}
