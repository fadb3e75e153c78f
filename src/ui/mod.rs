//! Respuestas en texto que el bot envía al canal.

pub mod messages;
