//! Line-oriented command transport used by the headless host.

use thiserror::Error;

use crate::playback::snapshot::CUSTOM_ACTION_THUMBS_UP;
use crate::protocol::{PlaybackCommand, SearchFocus};

pub const HELP_TEXT: &str = "commands: play | pause | stop | next | prev | seek <ms> | \
id <media-id> | search [artist|album|genre|title:]<query> | queue <queue-id> | \
fav <track-id> <on|off> | thumbs | browse [media-id] | switch | quit";

#[derive(Debug, Clone, PartialEq)]
pub enum HostCommand {
    Playback(PlaybackCommand),
    /// List a browse node; `None` means the top of the tree.
    Browse(Option<String>),
    /// Hand playback to a fresh local device.
    SwitchDevice,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{command} needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    #[error("invalid argument {0:?}")]
    InvalidArgument(String),
}

fn parse_search(query: &str) -> PlaybackCommand {
    let (focus, query) = match query.split_once(':') {
        Some((prefix, rest)) => match prefix.trim().to_ascii_lowercase().as_str() {
            "artist" => (SearchFocus::Artist, rest),
            "album" => (SearchFocus::Album, rest),
            "genre" => (SearchFocus::Genre, rest),
            "title" => (SearchFocus::Title, rest),
            _ => (SearchFocus::Any, query),
        },
        None => (SearchFocus::Any, query),
    };
    PlaybackCommand::PlayFromSearch {
        query: query.trim().to_string(),
        focus,
    }
}

pub fn parse_command(line: &str) -> Result<HostCommand, ParseCommandError> {
    let line = line.trim();
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "" => return Err(ParseCommandError::Empty),
        "play" => PlaybackCommand::Play,
        "pause" => PlaybackCommand::Pause,
        "stop" => PlaybackCommand::Stop,
        "next" => PlaybackCommand::SkipToNext,
        "prev" => PlaybackCommand::SkipToPrevious,
        "thumbs" => PlaybackCommand::CustomAction(CUSTOM_ACTION_THUMBS_UP.to_string()),
        "seek" => {
            if rest.is_empty() {
                return Err(ParseCommandError::MissingArgument {
                    command: "seek",
                    expected: "a position in milliseconds",
                });
            }
            let position_ms = rest
                .parse::<u64>()
                .map_err(|_| ParseCommandError::InvalidArgument(rest.to_string()))?;
            PlaybackCommand::SeekTo(position_ms)
        }
        "queue" => {
            let queue_id = rest
                .parse::<u64>()
                .map_err(|_| ParseCommandError::InvalidArgument(rest.to_string()))?;
            PlaybackCommand::SkipToQueueItem(queue_id)
        }
        "id" => {
            if rest.is_empty() {
                return Err(ParseCommandError::MissingArgument {
                    command: "id",
                    expected: "a media id",
                });
            }
            PlaybackCommand::PlayFromMediaId(rest.to_string())
        }
        "search" => parse_search(rest),
        "fav" => {
            let mut parts = rest.split_whitespace();
            let (Some(music_id), Some(flag), None) = (parts.next(), parts.next(), parts.next())
            else {
                return Err(ParseCommandError::MissingArgument {
                    command: "fav",
                    expected: "<track-id> <on|off>",
                });
            };
            let favorite = match flag.to_ascii_lowercase().as_str() {
                "on" | "true" | "1" => true,
                "off" | "false" | "0" => false,
                _ => return Err(ParseCommandError::InvalidArgument(flag.to_string())),
            };
            PlaybackCommand::SetFavorite {
                music_id: music_id.to_string(),
                favorite,
            }
        }
        "browse" => {
            let node = (!rest.is_empty()).then(|| rest.to_string());
            return Ok(HostCommand::Browse(node));
        }
        "switch" => return Ok(HostCommand::SwitchDevice),
        "help" | "?" => return Ok(HostCommand::Help),
        "quit" | "exit" => return Ok(HostCommand::Quit),
        other => return Err(ParseCommandError::Unknown(other.to_string())),
    };
    Ok(HostCommand::Playback(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport_verbs() {
        assert_eq!(
            parse_command("  PLAY "),
            Ok(HostCommand::Playback(PlaybackCommand::Play))
        );
        assert_eq!(
            parse_command("prev"),
            Ok(HostCommand::Playback(PlaybackCommand::SkipToPrevious))
        );
        assert_eq!(
            parse_command("seek 42000"),
            Ok(HostCommand::Playback(PlaybackCommand::SeekTo(42_000)))
        );
        assert_eq!(parse_command("quit"), Ok(HostCommand::Quit));
        assert_eq!(parse_command("switch"), Ok(HostCommand::SwitchDevice));
    }

    #[test]
    fn test_parse_media_id_keeps_separators() {
        assert_eq!(
            parse_command("id __BY_GENRE__/Rock|track1"),
            Ok(HostCommand::Playback(PlaybackCommand::PlayFromMediaId(
                "__BY_GENRE__/Rock|track1".to_string()
            )))
        );
    }

    #[test]
    fn test_parse_search_focus_prefix() {
        assert_eq!(
            parse_command("search artist: John Coltrane"),
            Ok(HostCommand::Playback(PlaybackCommand::PlayFromSearch {
                query: "John Coltrane".to_string(),
                focus: SearchFocus::Artist,
            }))
        );
        assert_eq!(
            parse_command("search blue train"),
            Ok(HostCommand::Playback(PlaybackCommand::PlayFromSearch {
                query: "blue train".to_string(),
                focus: SearchFocus::Any,
            }))
        );
        assert_eq!(
            parse_command("search"),
            Ok(HostCommand::Playback(PlaybackCommand::PlayFromSearch {
                query: String::new(),
                focus: SearchFocus::Any,
            }))
        );
    }

    #[test]
    fn test_parse_browse_node() {
        assert_eq!(parse_command("browse"), Ok(HostCommand::Browse(None)));
        assert_eq!(
            parse_command("browse __BY_GENRE__/Jazz"),
            Ok(HostCommand::Browse(Some("__BY_GENRE__/Jazz".to_string())))
        );
    }

    #[test]
    fn test_parse_favorite_and_thumbs() {
        assert_eq!(
            parse_command("fav trk-1 on"),
            Ok(HostCommand::Playback(PlaybackCommand::SetFavorite {
                music_id: "trk-1".to_string(),
                favorite: true,
            }))
        );
        assert_eq!(
            parse_command("fav trk-1 maybe"),
            Err(ParseCommandError::InvalidArgument("maybe".to_string()))
        );
        assert!(matches!(
            parse_command("fav trk-1"),
            Err(ParseCommandError::MissingArgument { command: "fav", .. })
        ));
        assert_eq!(
            parse_command("thumbs"),
            Ok(HostCommand::Playback(PlaybackCommand::CustomAction(
                CUSTOM_ACTION_THUMBS_UP.to_string()
            )))
        );
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert_eq!(parse_command("   "), Err(ParseCommandError::Empty));
        assert_eq!(
            parse_command("rewind"),
            Err(ParseCommandError::Unknown("rewind".to_string()))
        );
        assert_eq!(
            parse_command("seek soon"),
            Err(ParseCommandError::InvalidArgument("soon".to_string()))
        );
        assert!(matches!(
            parse_command("seek"),
            Err(ParseCommandError::MissingArgument { command: "seek", .. })
        ));
    }
}
