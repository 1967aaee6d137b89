// cpe.rs — protocol extensions this server announces

/// Highest custom-block level the server understands.
pub const CUSTOMBLOCKS_LEVEL: u8 = 1;

/// Extensions offered during the ExtInfo/ExtEntry exchange.
pub const SUPPORTED_EXTENSIONS: &[(&str, i32)] = &[
    ("FullCP437", 1),
    ("FastMap", 1),
    ("CustomBlocks", 1),
    ("TwoWayPing", 1),
    ("TextColors", 1),
];
