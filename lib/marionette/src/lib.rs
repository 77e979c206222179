//! Runtime control bridge: a loopback HTTP endpoint scheduled cooperatively
//! on a game engine's frame loop. An automation client uses it to observe
//! the scene tree, inject input, capture annotated screenshots and await
//! conditions inside the running game.

#![allow(clippy::len_without_is_empty)]
#![allow(clippy::new_without_default)]

pub mod bridge;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod input;
pub mod net;
pub mod routes;
pub mod scene;
pub mod serialize;
pub mod tasks;
pub mod wait;

pub use crate::bridge::Bridge;
pub use crate::config::BridgeConfig;
