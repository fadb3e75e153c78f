//! # Audio Module
//!
//! Cola por guild y reproducción.
//!
//! - [`queue`]: modelo persistido (`Track`, `GuildMusicState`) y formato de duración.
//! - [`engine`]: máquina de estados y única autoridad sobre la cola.
//! - [`sink`]: interfaz de salida de audio y canal de señales de fin.
//! - [`player`]: implementación de [`sink::AudioSink`] sobre songbird.

pub mod engine;
pub mod player;
pub mod queue;
pub mod sink;
