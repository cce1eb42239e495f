#![deny(warnings)]

pub mod capture;
pub mod config;
pub mod emotion;
pub mod face;
pub mod idle;
pub mod pipeline;
pub mod playback;
pub mod script;
pub mod timeline;
pub mod tts;
