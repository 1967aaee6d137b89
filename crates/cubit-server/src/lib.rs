// cubit-server — classic-protocol voxel multiplayer server

pub mod blocks;
pub mod client;
pub mod config;
pub mod cpe;
pub mod heartbeat;
pub mod map;
pub mod mapgen;
pub mod mapimage;
pub mod mapsend;
pub mod namelist;
pub mod server;
pub mod sv_main;
pub mod worldsave;
pub mod ws;
