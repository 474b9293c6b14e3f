//! Parser for BTOR2 witnesses as printed by `btormc`.
//!
//! ```text
//! sat
//! b0
//! #0
//! 0 00000000 state@0
//! @0
//! 0 00000101 in_x@0
//! .
//! ```
//!
//! A witness is a `sat` header, a line of violated properties (`b<n>` for
//! bad states, `j<n>` for justice), then frames. Each frame may open with a
//! state part (`#k`) and always has an input part (`@k`). Assignments are
//! `<id> <bits> [symbol]`, or `<id> [<index bits>] <bits> [symbol]` for
//! arrays. Lines starting with `;` are comments; `.` ends the witness.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("witness line {line}: {message}")]
pub struct WitnessError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyRef {
    Bad(u64),
    Justice(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub id: u64,
    /// Array index for array assignments.
    pub index: Option<String>,
    /// MSB-first binary string.
    pub bits: String,
    pub symbol: Option<String>,
}

impl Assignment {
    /// The assigned value, if it fits 128 bits.
    pub fn value(&self) -> Option<u128> {
        if self.bits.len() > 128 {
            return None;
        }
        u128::from_str_radix(&self.bits, 2).ok()
    }

    pub fn width(&self) -> u32 {
        self.bits.len() as u32
    }

    /// Symbol without the `@k` / `#k` frame suffix.
    pub fn base_symbol(&self) -> Option<&str> {
        self.symbol
            .as_deref()
            .map(|s| s.rsplit_once(['@', '#']).map_or(s, |(base, _)| base))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Frame {
    pub step: u64,
    pub states: Vec<Assignment>,
    pub inputs: Vec<Assignment>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Witness {
    pub properties: Vec<PropertyRef>,
    pub frames: Vec<Frame>,
}

impl Witness {
    pub fn frame(&self, step: u64) -> Option<&Frame> {
        self.frames.iter().find(|f| f.step == step)
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Part {
    None,
    States,
    Inputs,
}

fn err(line: usize, message: impl Into<String>) -> WitnessError {
    WitnessError {
        line,
        message: message.into(),
    }
}

fn is_binary(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b == b'0' || b == b'1')
}

fn parse_uint(token: &str, line: usize, what: &str) -> Result<u64, WitnessError> {
    token
        .parse()
        .map_err(|_| err(line, format!("expected {what}, found `{token}`")))
}

fn parse_assignment(text: &str, line: usize) -> Result<Assignment, WitnessError> {
    let mut tokens = text.split_whitespace();
    let id = parse_uint(tokens.next().unwrap_or_default(), line, "assignment id")?;
    let first = tokens
        .next()
        .ok_or_else(|| err(line, "assignment without value"))?;
    let (index, bits) = if let Some(inner) = first.strip_prefix('[') {
        let index = inner
            .strip_suffix(']')
            .filter(|i| is_binary(i))
            .ok_or_else(|| err(line, format!("malformed array index `{first}`")))?;
        let bits = tokens
            .next()
            .ok_or_else(|| err(line, "array assignment without value"))?;
        (Some(index.to_string()), bits)
    } else {
        (None, first)
    };
    if !is_binary(bits) {
        return Err(err(line, format!("expected binary string, found `{bits}`")));
    }
    let symbol = tokens.next().map(str::to_string);
    if let Some(extra) = tokens.next() {
        return Err(err(line, format!("unexpected token `{extra}`")));
    }
    Ok(Assignment {
        id,
        index,
        bits: bits.to_string(),
        symbol,
    })
}

/// Parse the first witness in `text`.
pub fn parse_witness(text: &str) -> Result<Witness, WitnessError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with(';'));

    match lines.next() {
        Some((_, "sat")) => {}
        Some((line, other)) => return Err(err(line, format!("expected `sat`, found `{other}`"))),
        None => return Err(err(0, "empty witness")),
    }

    let (prop_line, props) = lines
        .next()
        .ok_or_else(|| err(0, "missing property line"))?;
    let mut witness = Witness::default();
    for token in props.split_whitespace() {
        let prop = match token.split_at(1) {
            ("b", n) => PropertyRef::Bad(parse_uint(n, prop_line, "property index")?),
            ("j", n) => PropertyRef::Justice(parse_uint(n, prop_line, "property index")?),
            _ => return Err(err(prop_line, format!("malformed property `{token}`"))),
        };
        witness.properties.push(prop);
    }
    if witness.properties.is_empty() {
        return Err(err(prop_line, "empty property list"));
    }

    let mut part = Part::None;
    for (line, text) in lines {
        if text == "." {
            if part == Part::States {
                return Err(err(line, "state part without input part"));
            }
            return Ok(witness);
        }
        if let Some(step) = text.strip_prefix('#') {
            let step = parse_uint(step, line, "frame number")?;
            witness.frames.push(Frame {
                step,
                ..Frame::default()
            });
            part = Part::States;
        } else if let Some(step) = text.strip_prefix('@') {
            let step = parse_uint(step, line, "frame number")?;
            match witness.frames.last() {
                Some(frame) if part == Part::States && frame.step == step => {}
                Some(frame) if part == Part::States => {
                    return Err(err(
                        line,
                        format!("input part @{step} follows state part #{}", frame.step),
                    ));
                }
                _ => witness.frames.push(Frame {
                    step,
                    ..Frame::default()
                }),
            }
            part = Part::Inputs;
        } else {
            let assignment = parse_assignment(text, line)?;
            let frame = witness
                .frames
                .last_mut()
                .ok_or_else(|| err(line, "assignment outside of a frame"))?;
            match part {
                Part::States => frame.states.push(assignment),
                Part::Inputs => frame.inputs.push(assignment),
                Part::None => return Err(err(line, "assignment outside of a frame")),
            }
        }
    }
    Err(err(0, "witness not terminated by `.`"))
}
