// namelist.rs — one-name-per-line text lists (ops, bans, whitelist)
//
// Loaded once at startup and read-only afterwards. A missing file is an
// empty list, not an error.

use std::fs;

pub struct NameList {
    names: Vec<String>,
}

impl NameList {
    pub fn load(path: &str) -> Self {
        let names = fs::read_to_string(path)
            .map(|text| {
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Self { names }
    }

    pub fn empty() -> Self {
        Self { names: Vec::new() }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
