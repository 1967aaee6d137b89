// config.rs — settings.ini loading
//
// Plain INI: `[section]`, `key = value`, `;`/`#` comments. Unknown keys are
// ignored, bad values fall back to the default with a logged complaint, and
// a missing file just means an all-defaults server.

use std::fs;

use cubit_common::log::log_error;

pub struct ServerSection {
    pub name: String,
    pub motd: String,
    pub port: u16,
    pub public: bool,
    /// Skip name-key authentication when set.
    pub offline: bool,
    pub max_players: usize,
    pub whitelist: bool,
    pub heartbeat_host: String,
}

pub struct MapSection {
    pub name: String,
    pub width: usize,
    pub depth: usize,
    pub height: usize,
    pub generator: String,
    /// 0 means derive the world seed from the clock.
    pub seed: i64,
    /// Seconds between map snapshots; 0 disables imaging.
    pub snapshot_interval: f64,
}

pub struct DebugSection {
    /// Non-empty pins the authentication salt for test setups.
    pub fixed_salt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextColour {
    pub code: u8,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

pub struct Config {
    pub server: ServerSection,
    pub map: MapSection,
    pub debug: DebugSection,
    pub colours: Vec<TextColour>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerSection {
                name: "Unnamed server".to_string(),
                motd: "The server owner needs to set a MotD in settings.ini.".to_string(),
                port: 25565,
                public: false,
                offline: false,
                max_players: 8,
                whitelist: false,
                heartbeat_host: "www.classicube.net".to_string(),
            },
            map: MapSection {
                name: "world".to_string(),
                width: 64,
                depth: 64,
                height: 64,
                generator: "flat".to_string(),
                seed: 0,
                snapshot_interval: 0.0,
            },
            debug: DebugSection {
                fixed_salt: String::new(),
            },
            colours: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Self {
        let mut config = Self::default();

        let text = match fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => {
                log_error(&format!(
                    "Failed to open config file '{}', using defaults.",
                    path
                ));
                return config;
            }
        };

        config.apply(&text);
        config
    }

    pub fn apply(&mut self, text: &str) {
        let mut section = String::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                section = name.trim().to_string();
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            self.set(&section, key.trim(), value.trim());
        }
    }

    fn set(&mut self, section: &str, key: &str, value: &str) {
        match section {
            "server" => match key {
                "name" => self.server.name = value.to_string(),
                "motd" => self.server.motd = value.to_string(),
                "port" => self.server.port = parse_or(key, value, self.server.port),
                "public" => self.server.public = value == "true",
                "offline" => self.server.offline = value == "true",
                "max_players" => {
                    self.server.max_players = parse_or(key, value, self.server.max_players)
                }
                "whitelist" => self.server.whitelist = value == "true",
                "heartbeat_host" => self.server.heartbeat_host = value.to_string(),
                _ => {}
            },

            "map" => match key {
                "name" => self.map.name = value.to_string(),
                "width" => self.map.width = parse_or(key, value, self.map.width),
                "depth" => self.map.depth = parse_or(key, value, self.map.depth),
                "height" => self.map.height = parse_or(key, value, self.map.height),
                "generator" => self.map.generator = value.to_string(),
                "seed" => self.map.seed = parse_or(key, value, self.map.seed),
                "snapshot_interval" => {
                    self.map.snapshot_interval =
                        parse_or(key, value, self.map.snapshot_interval)
                }
                _ => {}
            },

            "debug" => {
                if key == "fixed_salt" {
                    self.debug.fixed_salt = value.to_string();
                }
            }

            "colours" => {
                if key.len() != 1 {
                    log_error(&format!("Colour code '{}' must be a single character", key));
                    return;
                }
                let parts: Vec<u8> = value
                    .split_whitespace()
                    .filter_map(|p| p.parse().ok())
                    .collect();
                if parts.len() != 4 {
                    log_error(&format!("Colour '{}' needs four components 'r g b a'", key));
                    return;
                }
                self.colours.push(TextColour {
                    code: key.as_bytes()[0],
                    r: parts[0],
                    g: parts[1],
                    b: parts[2],
                    a: parts[3],
                });
            }

            _ => {}
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(key: &str, value: &str, default: T) -> T {
    match value.parse() {
        Ok(v) => v,
        Err(_) => {
            log_error(&format!("Failed to parse '{}' value '{}'", key, value));
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let config = Config::default();
        assert_eq!(config.server.port, 25565);
        assert_eq!(config.server.max_players, 8);
        assert_eq!(config.map.width, 64);
        assert_eq!(config.map.generator, "flat");
        assert!(!config.server.offline);
    }

    #[test]
    fn parses_sections_and_values() {
        let mut config = Config::default();
        config.apply(
            "[server]\n\
             name = My World\n\
             port = 12345\n\
             public = true\n\
             max_players = 20\n\
             \n\
             [map]\n\
             width = 128\n\
             generator = random\n",
        );
        assert_eq!(config.server.name, "My World");
        assert_eq!(config.server.port, 12345);
        assert!(config.server.public);
        assert_eq!(config.server.max_players, 20);
        assert_eq!(config.map.width, 128);
        assert_eq!(config.map.generator, "random");
        // Untouched keys keep defaults.
        assert_eq!(config.map.depth, 64);
    }

    #[test]
    fn ignores_comments_and_junk() {
        let mut config = Config::default();
        config.apply(
            "; a comment\n\
             # another\n\
             not a key value line\n\
             [server]\n\
             port = 1000\n",
        );
        assert_eq!(config.server.port, 1000);
    }

    #[test]
    fn bad_number_keeps_default() {
        let mut config = Config::default();
        config.apply("[server]\nport = notanumber\n");
        assert_eq!(config.server.port, 25565);
    }

    #[test]
    fn whitespace_is_trimmed() {
        let mut config = Config::default();
        config.apply("  [ server ]  \n   name   =   spaced out   \n");
        assert_eq!(config.server.name, "spaced out");
    }

    #[test]
    fn colour_entries() {
        let mut config = Config::default();
        config.apply("[colours]\ng = 30 200 30 255\nbad = 1 2 3\n");
        assert_eq!(
            config.colours,
            vec![TextColour {
                code: b'g',
                r: 30,
                g: 200,
                b: 30,
                a: 255
            }]
        );
    }
}
