// Commands - Host to scheduler thread
// Applied between ticks, so each one only affects events scheduled after it

use crate::error::ValidationError;
use crate::sequencer::clave::{ClavePreset, ClaveStep};
use crate::sequencer::section::SectionDraft;
use crate::sequencer::transport::Mode;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Start in the given mode, or the current one
    Start(Option<Mode>),
    Stop,
    SetMode(Mode),
    SetBpm(f64),
    SetTimeSignature { numerator: u8, denominator: u8 },
    /// Zero-indexed beat
    ToggleAccent(u8),
    SetAccents(String),
    SetSubdivision(u8),
    SetClaveCell { index: usize, step: ClaveStep },
    /// Zero-indexed slot
    CycleClaveCell(usize),
    SetClavePattern(String),
    ApplyPreset(ClavePreset),
    SetClaveCycleLength(usize),
    AddSection(SectionDraft),
    /// Zero-indexed section
    RemoveSection(usize),
    Quit,
}

/// Parse one console line
///
/// Beat, slot and section numbers are one-based, as shown to the user.
///
/// ```text
/// start [classic|clave|timemap]   stop   mode clave
/// bpm 96   sig 7/8   accent 3   accents 2,4   sub 3
/// cell 5   pattern x..x..x...o.o...   preset son-2-3   length 12
/// add classic:bpm=120,sig=4/4,measures=2   remove 1   quit
/// ```
impl FromStr for Command {
    type Err = ValidationError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        let (verb, arg) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let arg = arg.trim();
        let malformed = || ValidationError::Command(line.to_string());

        let number = |value: &str| value.parse::<usize>().map_err(|_| malformed());
        let one_based = |value: &str| match number(value)? {
            0 => Err(malformed()),
            n => Ok(n - 1),
        };

        let command = match (verb.to_ascii_lowercase().as_str(), arg) {
            ("start" | "play", "") => Command::Start(None),
            ("start" | "play", mode) => Command::Start(Some(mode.parse()?)),
            ("stop", "") => Command::Stop,
            ("mode", mode) => Command::SetMode(mode.parse()?),
            ("bpm" | "tempo", value) => {
                Command::SetBpm(value.parse::<f64>().map_err(|_| malformed())?)
            }
            ("sig", value) => {
                let (num, den) = value.split_once('/').ok_or_else(malformed)?;
                Command::SetTimeSignature {
                    numerator: num.trim().parse().map_err(|_| malformed())?,
                    denominator: den.trim().parse().map_err(|_| malformed())?,
                }
            }
            ("accent", beat) => Command::ToggleAccent(
                u8::try_from(one_based(beat)?).map_err(|_| malformed())?,
            ),
            ("accents", spec) => Command::SetAccents(spec.to_string()),
            ("sub", factor) => {
                Command::SetSubdivision(factor.parse().map_err(|_| malformed())?)
            }
            ("cell", arg) => match arg.split_once(char::is_whitespace) {
                Some((slot, step)) => {
                    let mut chars = step.trim().chars();
                    let step = match (chars.next(), chars.next()) {
                        (Some(ch), None) => ClaveStep::from_char(ch).ok_or_else(malformed)?,
                        _ => return Err(malformed()),
                    };
                    Command::SetClaveCell {
                        index: one_based(slot)?,
                        step,
                    }
                }
                None => Command::CycleClaveCell(one_based(arg)?),
            },
            ("pattern", grid) if !grid.is_empty() => Command::SetClavePattern(grid.to_string()),
            ("preset", name) => Command::ApplyPreset(name.parse()?),
            ("length", value) => Command::SetClaveCycleLength(number(value)?),
            ("add", spec) => Command::AddSection(spec.parse()?),
            ("remove", index) => Command::RemoveSection(one_based(index)?),
            ("quit" | "exit", "") => Command::Quit,
            _ => return Err(malformed()),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transport_commands() {
        assert_eq!("start".parse(), Ok(Command::Start(None)));
        assert_eq!(
            "start timemap".parse(),
            Ok(Command::Start(Some(Mode::TimeMap)))
        );
        assert_eq!("  stop ".parse(), Ok(Command::Stop));
        assert_eq!("quit".parse(), Ok(Command::Quit));
    }

    #[test]
    fn test_parse_parameter_commands() {
        assert_eq!("bpm 96.5".parse(), Ok(Command::SetBpm(96.5)));
        assert_eq!(
            "sig 7/8".parse(),
            Ok(Command::SetTimeSignature {
                numerator: 7,
                denominator: 8
            })
        );
        assert_eq!("accent 3".parse(), Ok(Command::ToggleAccent(2)));
        assert_eq!("cell 1".parse(), Ok(Command::CycleClaveCell(0)));
        assert_eq!(
            "cell 16 o".parse(),
            Ok(Command::SetClaveCell {
                index: 15,
                step: ClaveStep::Medium
            })
        );
        assert_eq!("remove 2".parse(), Ok(Command::RemoveSection(1)));
        assert_eq!(
            "preset son-2-3".parse(),
            Ok(Command::ApplyPreset(ClavePreset::Son23))
        );
    }

    #[test]
    fn test_parse_add_section() {
        let command: Command = "add pause:measures=2".parse().unwrap();
        assert_eq!(
            command,
            Command::AddSection(SectionDraft::Pause {
                duration: Some(2.0)
            })
        );
    }

    #[test]
    fn test_rejects_malformed_lines() {
        assert!("".parse::<Command>().is_err());
        assert!("bpm fast".parse::<Command>().is_err());
        assert!("accent 0".parse::<Command>().is_err());
        assert!("sig 4".parse::<Command>().is_err());
        assert!("cell 3 xo".parse::<Command>().is_err());
        assert!("dance".parse::<Command>().is_err());
        assert!(matches!(
            "mode polka".parse::<Command>(),
            Err(ValidationError::Mode(_))
        ));
    }
}
