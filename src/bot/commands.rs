use serenity::model::id::{ChannelId, GuildId, UserId};

/// Prefijo de todos los comandos de texto.
pub const PREFIX: char = '!';

/// Comando reconocido, con su argumento ya interpretado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    Help,
    Join,
    Disconnect,
    Skip,
    TogglePlayback,
    Queue,
    Clear,
    /// `None` cuando el argumento falta o no es un número.
    Remove(Option<usize>),
    Undo,
    MusicReg,
    MusicUnreg,
    /// Texto libre en el canal de música: búsqueda o URL.
    Add(String),
    Unknown(String),
}

/// Comando listo para el dispatcher, con el contexto de quién y dónde.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub kind: CommandKind,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    /// Canal de voz en el que está el autor, si está en alguno.
    pub author_voice: Option<ChannelId>,
}

/// Interpreta un mensaje de texto.
///
/// Los verbos no distinguen mayúsculas y aceptan también la letra que sale
/// con la distribución de teclado rusa (`!р` = `!h`). El texto sin prefijo
/// sólo cuenta como búsqueda dentro del canal de música; fuera de él, igual
/// que los `!verbos` desconocidos, se ignora.
pub fn parse(text: &str, in_music_channel: bool) -> Option<CommandKind> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let Some(rest) = text.strip_prefix(PREFIX) else {
        return in_music_channel.then(|| CommandKind::Add(text.to_string()));
    };

    let (verb, argument) = match rest.split_once(' ') {
        Some((verb, arg)) => (verb, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };

    let kind = match verb.to_lowercase().as_str() {
        "help" | "h" | "р" => CommandKind::Help,
        "join" | "j" | "о" => CommandKind::Join,
        "disconnect" | "d" | "в" => CommandKind::Disconnect,
        "skip" | "s" | "ы" => CommandKind::Skip,
        "p" | "з" => CommandKind::TogglePlayback,
        "queue" | "q" | "й" => CommandKind::Queue,
        "clear" | "c" | "с" => CommandKind::Clear,
        "remove" | "r" | "к" => CommandKind::Remove(argument.and_then(|a| a.parse().ok())),
        "undo" | "u" | "г" => CommandKind::Undo,
        "music-reg" => CommandKind::MusicReg,
        "music-unreg" => CommandKind::MusicUnreg,
        other if in_music_channel => CommandKind::Unknown(other.to_string()),
        _ => return None,
    };

    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_verbs_and_aliases() {
        let cases = [
            ("!help", CommandKind::Help),
            ("!H", CommandKind::Help),
            ("!join", CommandKind::Join),
            ("!d", CommandKind::Disconnect),
            ("!Skip", CommandKind::Skip),
            ("!p", CommandKind::TogglePlayback),
            ("!q", CommandKind::Queue),
            ("!clear", CommandKind::Clear),
            ("!u", CommandKind::Undo),
            ("!music-reg", CommandKind::MusicReg),
            ("!MUSIC-UNREG", CommandKind::MusicUnreg),
        ];
        for (text, expected) in cases {
            assert_eq!(parse(text, false), Some(expected), "{}", text);
        }
    }

    #[test]
    fn test_russian_layout_aliases() {
        assert_eq!(parse("!Р", false), Some(CommandKind::Help));
        assert_eq!(parse("!ы", false), Some(CommandKind::Skip));
        assert_eq!(parse("!з", false), Some(CommandKind::TogglePlayback));
        assert_eq!(parse("!к 2", false), Some(CommandKind::Remove(Some(2))));
    }

    #[test]
    fn test_remove_argument() {
        assert_eq!(parse("!remove 3", true), Some(CommandKind::Remove(Some(3))));
        assert_eq!(parse("!r  7 ", true), Some(CommandKind::Remove(Some(7))));
        assert_eq!(parse("!r abc", true), Some(CommandKind::Remove(None)));
        assert_eq!(parse("!r", true), Some(CommandKind::Remove(None)));
        assert_eq!(parse("!r -1", true), Some(CommandKind::Remove(None)));
    }

    #[test]
    fn test_plain_text_is_a_query_only_in_music_channel() {
        assert_eq!(
            parse("  never gonna give you up ", true),
            Some(CommandKind::Add("never gonna give you up".to_string()))
        );
        assert_eq!(parse("hola a todos", false), None);
        assert_eq!(parse("   ", true), None);
    }

    #[test]
    fn test_unknown_verbs() {
        assert_eq!(parse("!dance", true), Some(CommandKind::Unknown("dance".to_string())));
        assert_eq!(parse("!dance", false), None);
    }
}
