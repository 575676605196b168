//! Remote command grammar (`SPEC_FULL.md` §4.N / `spec.md` §6). Pure
//! parsing only — the transport (UDP/TCP) is out of scope; this module
//! just turns a line of text into a `RemoteCommand` the supervisor's
//! setters can act on.

use crate::types::Direction;

/// Which position source the supervisor should use. `Auto` is the normal
/// operating mode: run the Hall->BEMF handover state machine as usual.
/// `Hall` pins the estimator to Hall and disables handover arming. `Bemf`
/// forces an immediate alignment and switch, for bench-testing the BEMF
/// tracker without waiting for the rotor to spin up under Hall.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorMode {
    Hall,
    Auto,
    Bemf,
}

impl Default for SensorMode {
    fn default() -> Self {
        SensorMode::Auto
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RemoteCommand {
    Enable,
    Disable,
    SetRpm(f32),
    SetDirection(Direction),
    SetSensorMode(SensorMode),
    Status,
    Stop,
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseError(pub String);

/// Parse one line of the textual command grammar: `enable`, `disable`,
/// `set rpm <n>`, `set dir fwd|rev`, `sensor hall|auto|bemf`, `status`,
/// `stop`.
pub fn parse(line: &str) -> Result<RemoteCommand, ParseError> {
    let mut tokens = line.trim().split_whitespace();
    let head = tokens.next().ok_or_else(|| ParseError("empty command".into()))?;

    match head {
        "enable" => Ok(RemoteCommand::Enable),
        "disable" => Ok(RemoteCommand::Disable),
        "status" => Ok(RemoteCommand::Status),
        "stop" => Ok(RemoteCommand::Stop),
        "set" => match tokens.next() {
            Some("rpm") => {
                let n = tokens
                    .next()
                    .ok_or_else(|| ParseError("missing rpm value".into()))?;
                let rpm: f32 = n
                    .parse()
                    .map_err(|_| ParseError(format!("invalid rpm value: {n}")))?;
                Ok(RemoteCommand::SetRpm(rpm))
            }
            Some("dir") => match tokens.next() {
                Some("fwd") => Ok(RemoteCommand::SetDirection(Direction::Forward)),
                Some("rev") => Ok(RemoteCommand::SetDirection(Direction::Reverse)),
                other => Err(ParseError(format!("invalid direction: {other:?}"))),
            },
            other => Err(ParseError(format!("unknown 'set' target: {other:?}"))),
        },
        "sensor" => match tokens.next() {
            Some("hall") => Ok(RemoteCommand::SetSensorMode(SensorMode::Hall)),
            Some("auto") => Ok(RemoteCommand::SetSensorMode(SensorMode::Auto)),
            Some("bemf") => Ok(RemoteCommand::SetSensorMode(SensorMode::Bemf)),
            other => Err(ParseError(format!("unknown sensor mode: {other:?}"))),
        },
        other => Err(ParseError(format!("unrecognized command: {other}"))),
    }
}
