// protocol.rs — classic wire protocol ids and fixed-point codecs
//
// Every packet is a 1-byte id followed by a fixed-size payload; the layout
// table lives with the encoder/decoder call sites. Positions travel as
// 1/32-block signed 16-bit fixed point, angles as 1/256-turn signed bytes.

pub const PROTOCOL_VERSION: u8 = 0x07;

/// Ident trailer byte announcing a CPE-capable peer.
pub const CPE_MAGIC: u8 = 0x42;

/// User type sent in the server ident; 0x64 marks the op rank.
pub const USER_TYPE_OP: u8 = 0x64;

pub const PACKET_IDENT: u8 = 0x00;
pub const PACKET_PING: u8 = 0x01;
pub const PACKET_LEVEL_INIT: u8 = 0x02;
pub const PACKET_LEVEL_CHUNK: u8 = 0x03;
pub const PACKET_LEVEL_FINISH: u8 = 0x04;
pub const PACKET_SET_BLOCK_CLIENT: u8 = 0x05;
pub const PACKET_SET_BLOCK_SERVER: u8 = 0x06;
pub const PACKET_PLAYER_SPAWN: u8 = 0x07;
pub const PACKET_PLAYER_POS_ANGLE: u8 = 0x08;
pub const PACKET_PLAYER_DESPAWN: u8 = 0x0c;
pub const PACKET_MESSAGE: u8 = 0x0d;
pub const PACKET_PLAYER_DISCONNECT: u8 = 0x0e;

pub const PACKET_EXTINFO: u8 = 0x10;
pub const PACKET_EXTENTRY: u8 = 0x11;
pub const PACKET_CUSTOM_BLOCK_SUPPORT_LEVEL: u8 = 0x13;
pub const PACKET_SET_TEXT_COLOUR: u8 = 0x27;
pub const PACKET_TWO_WAY_PING: u8 = 0x2b;

/// Encode a block-space float as 1/32-block fixed point.
pub fn float2fixed(value: f32) -> i16 {
    (value * 32.0).floor() as i16
}

pub fn fixed2float(value: i16) -> f32 {
    value as f32 / 32.0
}

/// Encode degrees as a 1/256-turn byte; wraps modulo a full turn.
pub fn degrees2fixed(value: f32) -> i8 {
    ((value * 256.0 / 360.0).round() as i32 as u8) as i8
}

pub fn fixed2degrees(value: i8) -> f32 {
    value as f32 * 360.0 / 256.0
}
