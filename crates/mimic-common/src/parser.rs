//! Parser for the `VERB:arg:arg` command grammar.
//!
//! Verbs are case-insensitive. Text-bearing verbs (`TYPE`, `PRESS_KEY`, `FOCUS_ELEMENT`,
//! window ids, ...) take the rest of the line verbatim, so their argument may contain `:`.

use thiserror::Error;

use crate::command::{Command, PointerTarget, ScrollDirection};
use crate::locator::Locator;
use crate::protocol::Point;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Empty command")]
    Empty,

    #[error("Unknown command verb: {0}")]
    UnknownVerb(String),

    #[error("{verb} expects {expected}, got {got} argument(s)")]
    Arity {
        verb: String,
        expected: &'static str,
        got: usize,
    },

    #[error("{verb}: invalid number '{value}'")]
    InvalidNumber { verb: String, value: String },

    #[error("Invalid scroll direction: {0}")]
    InvalidDirection(String),
}

/// Parse one command line. Only leading whitespace is insignificant: `TYPE`
/// receives everything after its colon, trailing spaces included.
pub fn parse_command(line: &str) -> Result<Command, ParseError> {
    let line = line.trim_start();
    if line.trim_end().is_empty() {
        return Err(ParseError::Empty);
    }

    let (verb, rest) = match line.split_once(':') {
        Some((verb, rest)) => (verb.trim().to_uppercase(), Some(rest)),
        None => (line.trim_end().to_uppercase(), None),
    };
    let args: Vec<&str> = rest.map(|r| r.split(':').collect()).unwrap_or_default();

    match verb.as_str() {
        "MOUSE_MOVE" => {
            expect_arity(&verb, &args, &[2], "x:y")?;
            Ok(Command::MouseMove(point(&verb, args[0], args[1])?))
        }
        "CLICK" => Ok(Command::Click(pointer_target(rest))),
        "RIGHT_CLICK" => Ok(Command::RightClick(pointer_target(rest))),
        "DOUBLE_CLICK" => Ok(Command::DoubleClick(pointer_target(rest))),
        "SCROLL" => {
            expect_arity(&verb, &args, &[2, 4], "direction:amount[:x:y]")?;
            let direction = ScrollDirection::parse(args[0])
                .ok_or_else(|| ParseError::InvalidDirection(args[0].to_string()))?;
            let amount = number(&verb, args[1])?;
            let at = if args.len() == 4 {
                Some(point(&verb, args[2], args[3])?)
            } else {
                None
            };
            Ok(Command::Scroll {
                direction,
                amount,
                at,
            })
        }
        "DRAG" => {
            expect_arity(&verb, &args, &[4], "x1:y1:x2:y2")?;
            Ok(Command::Drag {
                from: point(&verb, args[0], args[1])?,
                to: point(&verb, args[2], args[3])?,
            })
        }
        "TYPE" => Ok(Command::Type(rest_of_line(&verb, rest)?.to_string())),
        "PRESS_KEY" => Ok(Command::PressKey(non_empty(&verb, rest)?.to_string())),
        "KEY_COMBO" => {
            let combo = non_empty(&verb, rest)?;
            let mut parts: Vec<String> = combo
                .split('+')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            let key = parts.pop().ok_or_else(|| ParseError::Arity {
                verb: verb.clone(),
                expected: "mod+key",
                got: 0,
            })?;
            let modifiers = parts.into_iter().map(|m| m.to_lowercase()).collect();
            Ok(Command::KeyCombo { modifiers, key })
        }
        "BACKSPACE" => match rest.map(str::trim).filter(|r| !r.is_empty()) {
            Some(count) => Ok(Command::Backspace(count.parse().map_err(|_| {
                ParseError::InvalidNumber {
                    verb: verb.clone(),
                    value: count.to_string(),
                }
            })?)),
            None => Ok(Command::Backspace(1)),
        },
        "FOCUS_ELEMENT" => Ok(Command::FocusElement(Locator::parse(non_empty(
            &verb, rest,
        )?))),
        "WAIT" => {
            expect_arity(&verb, &args, &[1], "ms")?;
            let ms = args[0].trim();
            Ok(Command::Wait(ms.parse().map_err(|_| {
                ParseError::InvalidNumber {
                    verb: verb.clone(),
                    value: ms.to_string(),
                }
            })?))
        }
        "OPEN_APP" => Ok(Command::OpenApp(non_empty(&verb, rest)?.to_string())),
        "CLOSE_WINDOW" => Ok(Command::CloseWindow(non_empty(&verb, rest)?.to_string())),
        "FOCUS_WINDOW" => Ok(Command::FocusWindow(non_empty(&verb, rest)?.to_string())),
        "MOVE_WINDOW" => {
            // Ids may contain ':', coordinates are always the last two fields.
            let rest = non_empty(&verb, rest)?;
            let mut fields = rest.rsplitn(3, ':');
            let (y, x, id) = match (fields.next(), fields.next(), fields.next()) {
                (Some(y), Some(x), Some(id)) if !id.trim().is_empty() => (y, x, id),
                _ => {
                    return Err(ParseError::Arity {
                        verb: verb.clone(),
                        expected: "id:x:y",
                        got: args.len(),
                    });
                }
            };
            Ok(Command::MoveWindow {
                id: id.trim().to_string(),
                to: point(&verb, x, y)?,
            })
        }
        "FINISHED" => Ok(Command::Finished),
        _ => Err(ParseError::UnknownVerb(verb.clone())),
    }
}

/// Command lines of a plan text, without blank lines and `#` comments.
/// Trailing whitespace is kept since it belongs to a `TYPE` argument.
pub fn command_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim_start)
        .filter(|l| !l.trim_end().is_empty() && !l.starts_with('#'))
}

/// Parse every non-empty, non-comment line of a plan.
pub fn parse_plan(text: &str) -> Vec<Result<Command, ParseError>> {
    command_lines(text).map(parse_command).collect()
}

fn expect_arity(
    verb: &str,
    args: &[&str],
    allowed: &[usize],
    expected: &'static str,
) -> Result<(), ParseError> {
    if allowed.contains(&args.len()) {
        Ok(())
    } else {
        Err(ParseError::Arity {
            verb: verb.to_string(),
            expected,
            got: args.len(),
        })
    }
}

fn number(verb: &str, value: &str) -> Result<f64, ParseError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::InvalidNumber {
            verb: verb.to_string(),
            value: value.to_string(),
        })
}

fn point(verb: &str, x: &str, y: &str) -> Result<Point, ParseError> {
    Ok(Point::new(number(verb, x)?, number(verb, y)?))
}

fn rest_of_line<'a>(verb: &str, rest: Option<&'a str>) -> Result<&'a str, ParseError> {
    rest.ok_or_else(|| ParseError::Arity {
        verb: verb.to_string(),
        expected: "an argument",
        got: 0,
    })
}

fn non_empty<'a>(verb: &str, rest: Option<&'a str>) -> Result<&'a str, ParseError> {
    let value = rest_of_line(verb, rest)?.trim();
    if value.is_empty() {
        Err(ParseError::Arity {
            verb: verb.to_string(),
            expected: "a non-empty argument",
            got: 0,
        })
    } else {
        Ok(value)
    }
}

fn pointer_target(rest: Option<&str>) -> PointerTarget {
    let Some(rest) = rest.map(str::trim).filter(|r| !r.is_empty()) else {
        return PointerTarget::Current;
    };
    let coords = rest
        .split_once(':')
        .map(|(x, y)| (x.trim().parse::<f64>(), y.trim().parse::<f64>()));
    match coords {
        Some((Ok(x), Ok(y))) => PointerTarget::Point(Point::new(x, y)),
        _ => PointerTarget::Element(Locator::parse(rest)),
    }
}
