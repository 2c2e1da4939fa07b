//! Control lines typed on stdin while speaking.

use readflow_voice::SessionCommand;

pub const HELP: &str =
    "controls: p/enter play-pause · n [k] next · b [k] back · +/- speed · s <x> speed · v <voice> · q stop";

/// Parse one input line. `None` for anything unrecognised.
pub fn parse_control(line: &str) -> Option<SessionCommand> {
    let line = line.trim();
    let (head, arg) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(h, a)| (h, a.trim()));

    let count = || -> Option<isize> {
        if arg.is_empty() {
            Some(1)
        } else {
            arg.parse().ok().filter(|k: &isize| *k > 0)
        }
    };

    match head {
        "" | "p" => Some(SessionCommand::TogglePlayPause),
        "n" => count().map(SessionCommand::Skip),
        "b" => count().map(|k| SessionCommand::Skip(-k)),
        "+" => Some(SessionCommand::SpeedUp),
        "-" => Some(SessionCommand::SpeedDown),
        "s" => arg.parse().ok().map(SessionCommand::SetSpeed),
        "v" if !arg.is_empty() => Some(SessionCommand::SetVoice(arg.to_owned())),
        "q" => Some(SessionCommand::Stop),
        _ => None,
    }
}
