//! The command table.
//!
//! Every request and response the controller understands is described here
//! as data. Adding a command means adding a row, not a function.

use std::collections::HashMap;
use std::sync::LazyLock;

use tracing::trace;

use crate::core::{Error, OPCODE_ACK, Result};

use super::{FieldSpec, ProtocolFrame, ResponseFields};

/// A request the controller accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    /// Logical name, e.g. `CurrentTimeRequest`.
    pub name: &'static str,
    /// Request opcode.
    pub opcode: u8,
    /// Opcode of the expected response.
    pub response_opcode: u8,
    /// Request length in bytes, opcode included.
    pub length: usize,
    /// Parameter fields in position order.
    pub fields: &'static [FieldSpec],
}

/// How a response payload is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseLayout {
    /// Flat fields at fixed positions.
    Fixed {
        /// Response length in bytes, opcode included.
        length: usize,
        /// Fields in position order.
        fields: &'static [FieldSpec],
    },
    /// Variable length; needs a page-aware decoder.
    Paged(PageDecoder),
}

/// Custom decoders for variable-length responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageDecoder {
    /// Schedule pages (`A0`).
    Schedule,
    /// Irrigation queue pages (`BB`).
    Queue,
}

/// A response the controller may send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseDescriptor {
    /// Logical name, e.g. `CurrentTimeResponse`.
    pub name: &'static str,
    /// Response opcode.
    pub opcode: u8,
    /// Decoding layout.
    pub layout: ResponseLayout,
}

/// Result of decoding a response frame against the command that was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// `01` acknowledge with no payload.
    Ack {
        /// Opcode of the acknowledged command.
        command_echo: u8,
    },
    /// Flat field mapping.
    Fields(ResponseFields),
    /// One raw page for a [`PageDecoder`].
    Page(PageDecoder, ProtocolFrame),
}

const fn cmd(
    name: &'static str,
    opcode: u8,
    response_opcode: u8,
    length: usize,
    fields: &'static [FieldSpec],
) -> CommandDescriptor {
    CommandDescriptor {
        name,
        opcode,
        response_opcode,
        length,
        fields,
    }
}

const fn fixed(
    name: &'static str,
    opcode: u8,
    length: usize,
    fields: &'static [FieldSpec],
) -> ResponseDescriptor {
    ResponseDescriptor {
        name,
        opcode,
        layout: ResponseLayout::Fixed { length, fields },
    }
}

const fn paged(name: &'static str, opcode: u8, decoder: PageDecoder) -> ResponseDescriptor {
    ResponseDescriptor {
        name,
        opcode,
        layout: ResponseLayout::Paged(decoder),
    }
}

static COMMANDS: &[CommandDescriptor] = &[
    cmd("ModelAndVersionRequest", 0x02, 0x82, 1, &[]),
    cmd("AvailableStationsRequest", 0x03, 0x83, 2, &[FieldSpec::uint("page", 2, 2)]),
    cmd("CommandSupportRequest", 0x04, 0x84, 2, &[FieldSpec::uint("commandToTest", 2, 2)]),
    cmd("SerialNumberRequest", 0x05, 0x85, 1, &[]),
    cmd("ControllerFirmwareVersionRequest", 0x0B, 0x8B, 1, &[]),
    cmd("CurrentTimeRequest", 0x10, 0x90, 1, &[]),
    cmd(
        "SetCurrentTimeRequest",
        0x11,
        0x01,
        4,
        &[
            FieldSpec::uint("hour", 2, 2),
            FieldSpec::uint("minute", 4, 2),
            FieldSpec::uint("second", 6, 2),
        ],
    ),
    cmd("CurrentDateRequest", 0x12, 0x92, 1, &[]),
    cmd(
        "SetCurrentDateRequest",
        0x13,
        0x01,
        4,
        &[
            FieldSpec::uint("day", 2, 2),
            FieldSpec::uint("month", 4, 1),
            FieldSpec::uint("year", 5, 3),
        ],
    ),
    cmd("RetrieveScheduleRequest", 0x20, 0xA0, 3, &[FieldSpec::uint("commandCode", 2, 4)]),
    cmd("WaterBudgetRequest", 0x30, 0xB0, 2, &[FieldSpec::uint("programCode", 2, 2)]),
    cmd("RainDelayGetRequest", 0x36, 0xB6, 1, &[]),
    cmd("RainDelaySetRequest", 0x37, 0x01, 3, &[FieldSpec::uint("days", 2, 4)]),
    cmd("ManuallyRunProgramRequest", 0x38, 0x01, 2, &[FieldSpec::uint("program", 2, 2)]),
    cmd(
        "ManuallyRunStationRequest",
        0x39,
        0x01,
        4,
        &[FieldSpec::uint("zone", 2, 4), FieldSpec::uint("minutes", 6, 2)],
    ),
    cmd("TestStationsRequest", 0x3A, 0x01, 2, &[FieldSpec::uint("zone", 2, 2)]),
    cmd("CurrentQueueRequest", 0x3B, 0xBB, 2, &[FieldSpec::uint("page", 2, 2)]),
    cmd("CurrentRainSensorStateRequest", 0x3E, 0xBE, 1, &[]),
    cmd("CurrentStationsActiveRequest", 0x3F, 0xBF, 2, &[FieldSpec::uint("page", 2, 2)]),
    cmd("StopIrrigationRequest", 0x40, 0x01, 1, &[]),
    cmd("AdvanceStationRequest", 0x42, 0x01, 2, &[FieldSpec::uint("param", 2, 2)]),
    cmd("CurrentIrrigationStateRequest", 0x48, 0xC8, 1, &[]),
    cmd("IrrigationStateSetRequest", 0x49, 0x01, 2, &[FieldSpec::uint("state", 2, 2)]),
    cmd("ControllerEventTimestampRequest", 0x4A, 0xCA, 2, &[FieldSpec::uint("eventId", 2, 2)]),
    cmd("CombinedControllerStateRequest", 0x4C, 0xCC, 1, &[]),
];

static RESPONSES: &[ResponseDescriptor] = &[
    fixed(
        "NotAcknowledgeResponse",
        0x00,
        3,
        &[FieldSpec::uint("commandEcho", 2, 2), FieldSpec::uint("nakCode", 4, 2)],
    ),
    fixed("AcknowledgeResponse", 0x01, 2, &[FieldSpec::uint("commandEcho", 2, 2)]),
    fixed(
        "ModelAndVersionResponse",
        0x82,
        5,
        &[
            FieldSpec::uint("modelID", 2, 4),
            FieldSpec::uint("protocolRevisionMajor", 6, 2),
            FieldSpec::uint("protocolRevisionMinor", 8, 2),
        ],
    ),
    fixed(
        "AvailableStationsResponse",
        0x83,
        6,
        &[FieldSpec::uint("pageNumber", 2, 2), FieldSpec::mask("setStations", 4, 8)],
    ),
    fixed(
        "CommandSupportResponse",
        0x84,
        3,
        &[FieldSpec::uint("commandEcho", 2, 2), FieldSpec::uint("support", 4, 2)],
    ),
    fixed("SerialNumberResponse", 0x85, 9, &[FieldSpec::uint("serialNumber", 2, 16)]),
    fixed(
        "ControllerFirmwareVersionResponse",
        0x8B,
        5,
        &[
            FieldSpec::uint("major", 2, 2),
            FieldSpec::uint("minor", 4, 2),
            FieldSpec::uint("patch", 6, 4),
        ],
    ),
    fixed(
        "CurrentTimeResponse",
        0x90,
        4,
        &[
            FieldSpec::uint("hour", 2, 2),
            FieldSpec::uint("minute", 4, 2),
            FieldSpec::uint("second", 6, 2),
        ],
    ),
    fixed(
        "CurrentDateResponse",
        0x92,
        4,
        &[
            FieldSpec::uint("day", 2, 2),
            FieldSpec::uint("month", 4, 1),
            FieldSpec::uint("year", 5, 3),
        ],
    ),
    paged("RetrieveScheduleResponse", 0xA0, PageDecoder::Schedule),
    fixed(
        "WaterBudgetResponse",
        0xB0,
        4,
        &[FieldSpec::uint("programCode", 2, 2), FieldSpec::uint("seasonalAdjust", 4, 4)],
    ),
    fixed("RainDelaySettingResponse", 0xB6, 3, &[FieldSpec::uint("delaySetting", 2, 4)]),
    paged("CurrentQueueResponse", 0xBB, PageDecoder::Queue),
    fixed("CurrentRainSensorStateResponse", 0xBE, 2, &[FieldSpec::uint("sensorState", 2, 2)]),
    fixed(
        "CurrentStationsActiveResponse",
        0xBF,
        6,
        &[FieldSpec::uint("pageNumber", 2, 2), FieldSpec::mask("activeStations", 4, 8)],
    ),
    fixed(
        "CurrentIrrigationStateResponse",
        0xC8,
        2,
        &[FieldSpec::uint("irrigationState", 2, 2)],
    ),
    fixed(
        "ControllerEventTimestampResponse",
        0xCA,
        6,
        &[FieldSpec::uint("eventId", 2, 2), FieldSpec::uint("timestamp", 4, 8)],
    ),
    fixed(
        "CombinedControllerStateResponse",
        0xCC,
        16,
        &[
            FieldSpec::uint("hour", 2, 2),
            FieldSpec::uint("minute", 4, 2),
            FieldSpec::uint("second", 6, 2),
            FieldSpec::uint("day", 8, 2),
            FieldSpec::uint("month", 10, 1),
            FieldSpec::uint("year", 11, 3),
            FieldSpec::uint("delaySetting", 14, 4),
            FieldSpec::uint("sensorState", 18, 2),
            FieldSpec::uint("irrigationState", 20, 2),
            FieldSpec::uint("seasonalAdjust", 22, 4),
            FieldSpec::uint("remainingRuntime", 26, 4),
            FieldSpec::uint("activeStation", 30, 2),
        ],
    ),
];

/// Immutable lookup over the command and response rows, indexed by request
/// name and by response opcode.
#[derive(Debug)]
pub struct CommandTable {
    by_name: HashMap<&'static str, &'static CommandDescriptor>,
    by_opcode: HashMap<u8, &'static ResponseDescriptor>,
}

static TABLE: LazyLock<CommandTable> = LazyLock::new(|| CommandTable {
    by_name: COMMANDS.iter().map(|c| (c.name, c)).collect(),
    by_opcode: RESPONSES.iter().map(|r| (r.opcode, r)).collect(),
});

impl CommandTable {
    /// The process-wide table.
    pub fn global() -> &'static CommandTable {
        &TABLE
    }

    /// Look up a request by name.
    pub fn command(&self, name: &str) -> Result<&'static CommandDescriptor> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownCommand(name.to_string()))
    }

    /// Look up a response by opcode.
    pub fn response(&self, opcode: u8) -> Option<&'static ResponseDescriptor> {
        self.by_opcode.get(&opcode).copied()
    }

    /// All requests, in table order.
    pub fn commands(&self) -> impl Iterator<Item = &'static CommandDescriptor> {
        COMMANDS.iter()
    }

    /// All responses, in table order.
    pub fn responses(&self) -> impl Iterator<Item = &'static ResponseDescriptor> {
        RESPONSES.iter()
    }

    /// Encode a request frame from named parameters.
    ///
    /// Every declared field must be supplied exactly once; extra names are
    /// rejected.
    pub fn encode(&self, name: &str, params: &[(&str, u64)]) -> Result<ProtocolFrame> {
        let command = self.command(name)?;
        encode_command(command, params)
    }

    /// Decode `frame` as the reply to `command`.
    pub fn decode(&self, command: &CommandDescriptor, frame: &ProtocolFrame) -> Result<Decoded> {
        let actual = frame.opcode();
        if actual != command.response_opcode {
            return Err(unexpected(command, actual));
        }
        let response = self.response(actual).ok_or_else(|| unexpected(command, actual))?;
        trace!(command = command.name, response = response.name, frame = %frame, "decoding");
        match response.layout {
            ResponseLayout::Fixed { length, fields } => {
                let decoded = decode_fields(response.name, actual, length, fields, frame)?;
                if actual == OPCODE_ACK {
                    return Ok(Decoded::Ack {
                        command_echo: decoded.uint("commandEcho")? as u8,
                    });
                }
                Ok(Decoded::Fields(decoded))
            }
            ResponseLayout::Paged(decoder) => Ok(Decoded::Page(decoder, frame.clone())),
        }
    }

    /// Decode a fixed-layout frame by its own opcode, without a request.
    pub fn decode_response(&self, frame: &ProtocolFrame) -> Result<ResponseFields> {
        let opcode = frame.opcode();
        let response = self
            .response(opcode)
            .ok_or_else(|| Error::MalformedFrame(format!("unknown response opcode {:02X}", opcode)))?;
        match response.layout {
            ResponseLayout::Fixed { length, fields } => {
                decode_fields(response.name, opcode, length, fields, frame)
            }
            ResponseLayout::Paged(_) => Err(Error::MalformedFrame(format!(
                "{} needs a page decoder",
                response.name
            ))),
        }
    }
}

fn unexpected(command: &CommandDescriptor, actual: u8) -> Error {
    Error::UnexpectedResponse {
        command: command.name,
        expected: format!("{:02X}", command.response_opcode),
        actual: format!("{:02X}", actual),
    }
}

pub(crate) fn encode_command(
    command: &'static CommandDescriptor,
    params: &[(&str, u64)],
) -> Result<ProtocolFrame> {
    if let Some((unknown, _)) = params
        .iter()
        .find(|(key, _)| !command.fields.iter().any(|f| f.name == *key))
    {
        return Err(Error::InvalidParameter {
            command: command.name,
            field: unknown.to_string(),
            reason: "unknown field".into(),
        });
    }

    let mut hex = format!("{:02X}", command.opcode);
    for field in command.fields {
        let mut values = params.iter().filter(|(key, _)| *key == field.name);
        let value = match (values.next(), values.next()) {
            (Some((_, value)), None) => *value,
            (None, _) => {
                return Err(Error::InvalidParameter {
                    command: command.name,
                    field: field.name.to_string(),
                    reason: "missing".into(),
                });
            }
            (Some(_), Some(_)) => {
                return Err(Error::InvalidParameter {
                    command: command.name,
                    field: field.name.to_string(),
                    reason: "supplied more than once".into(),
                });
            }
        };
        field.encode_into(command.name, value, &mut hex)?;
    }
    ProtocolFrame::from_hex(&hex)
}

fn decode_fields(
    name: &'static str,
    opcode: u8,
    length: usize,
    fields: &'static [FieldSpec],
    frame: &ProtocolFrame,
) -> Result<ResponseFields> {
    if frame.len_nibbles() < 2 * length {
        return Err(Error::MalformedFrame(format!(
            "{} needs {} bytes, got {} ({})",
            name,
            length,
            frame.len_bytes(),
            frame
        )));
    }
    let mut decoded = ResponseFields::new(name, opcode);
    for field in fields {
        decoded.insert(field.name, field.decode(frame)?);
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FieldValue;

    fn layout_end(fields: &[FieldSpec]) -> usize {
        fields.iter().map(FieldSpec::end).max().unwrap_or(2)
    }

    #[test]
    fn test_declared_lengths_match_layouts() {
        let table = CommandTable::global();
        for command in table.commands() {
            assert_eq!(
                2 * command.length,
                layout_end(command.fields),
                "{}",
                command.name
            );
        }
        for response in table.responses() {
            if let ResponseLayout::Fixed { length, fields } = response.layout {
                assert_eq!(2 * length, layout_end(fields), "{}", response.name);
            }
        }
    }

    #[test]
    fn test_every_command_has_a_response() {
        let table = CommandTable::global();
        for command in table.commands() {
            assert!(
                table.response(command.response_opcode).is_some(),
                "{} -> {:02X}",
                command.name,
                command.response_opcode
            );
        }
    }

    #[test]
    fn test_encode_examples() {
        let table = CommandTable::global();
        let cases: &[(&str, &[(&str, u64)], &str)] = &[
            ("ModelAndVersionRequest", &[], "02"),
            ("AvailableStationsRequest", &[("page", 0x0C)], "030C"),
            ("CommandSupportRequest", &[("commandToTest", 0x0B)], "040B"),
            ("WaterBudgetRequest", &[("programCode", 0x0D)], "300D"),
            ("CurrentStationsActiveRequest", &[("page", 0x10)], "3F10"),
            ("ManuallyRunProgramRequest", &[("program", 0x11)], "3811"),
            ("ManuallyRunStationRequest", &[("zone", 6), ("minutes", 18)], "39000612"),
            ("TestStationsRequest", &[("zone", 0x17)], "3A17"),
            ("RainDelaySetRequest", &[("days", 15)], "37000F"),
            ("AdvanceStationRequest", &[("param", 8)], "4208"),
            ("SetCurrentDateRequest", &[("day", 8), ("month", 1), ("year", 2023)], "130817E7"),
        ];
        for (name, params, expected) in cases {
            let frame = table.encode(name, params).unwrap();
            assert_eq!(frame.as_hex(), *expected, "{}", name);
        }
    }

    #[test]
    fn test_encode_failures() {
        let table = CommandTable::global();
        assert!(matches!(
            table.encode("LaunchMissilesRequest", &[]),
            Err(Error::UnknownCommand(_))
        ));
        assert!(matches!(
            table.encode("TestStationsRequest", &[("zone", 0x100)]),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            table.encode("TestStationsRequest", &[]),
            Err(Error::InvalidParameter { .. })
        ));
        assert!(matches!(
            table.encode("StopIrrigationRequest", &[("zone", 1)]),
            Err(Error::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_decode_current_time() {
        let table = CommandTable::global();
        let command = table.command("CurrentTimeRequest").unwrap();
        let frame = ProtocolFrame::from_hex("900E1E00").unwrap();
        let Decoded::Fields(fields) = table.decode(command, &frame).unwrap() else {
            panic!("expected fields");
        };
        assert_eq!(fields.uint("hour").unwrap(), 14);
        assert_eq!(fields.uint("minute").unwrap(), 30);
        assert_eq!(fields.uint("second").unwrap(), 0);
    }

    #[test]
    fn test_decode_wrong_opcode() {
        let table = CommandTable::global();
        let command = table.command("CurrentTimeRequest").unwrap();
        let frame = ProtocolFrame::from_hex("920817E7").unwrap();
        let err = table.decode(command, &frame).unwrap_err();
        assert!(matches!(err, Error::UnexpectedResponse { .. }));
    }

    #[test]
    fn test_decode_short_frame() {
        let table = CommandTable::global();
        let command = table.command("SerialNumberRequest").unwrap();
        let frame = ProtocolFrame::from_hex("850000").unwrap();
        assert!(matches!(
            table.decode(command, &frame),
            Err(Error::MalformedFrame(_))
        ));
    }

    #[test]
    fn test_decode_station_mask() {
        let table = CommandTable::global();
        let command = table.command("AvailableStationsRequest").unwrap();
        let frame = ProtocolFrame::from_hex("83003F000000").unwrap();
        let Decoded::Fields(fields) = table.decode(command, &frame).unwrap() else {
            panic!("expected fields");
        };
        let stations = fields.stations("setStations").unwrap();
        assert_eq!(stations.len(), 6);
        assert!(stations.contains(6));
        assert!(matches!(fields.get("pageNumber"), Some(FieldValue::Uint(0))));
    }

    #[test]
    fn test_decode_ack() {
        let table = CommandTable::global();
        let command = table.command("StopIrrigationRequest").unwrap();
        let frame = ProtocolFrame::from_hex("0140").unwrap();
        assert_eq!(
            table.decode(command, &frame).unwrap(),
            Decoded::Ack { command_echo: 0x40 }
        );
    }

    #[test]
    fn test_schedule_is_paged() {
        let table = CommandTable::global();
        let command = table.command("RetrieveScheduleRequest").unwrap();
        let frame = ProtocolFrame::from_hex("A0000000000400").unwrap();
        assert!(matches!(
            table.decode(command, &frame).unwrap(),
            Decoded::Page(PageDecoder::Schedule, _)
        ));
    }

    #[test]
    fn test_combined_state_layout() {
        let frame = ProtocolFrame::from_hex("CC140B230817E700030001FFFF000000").unwrap();
        let fields = CommandTable::global().decode_response(&frame).unwrap();
        assert_eq!(fields.uint("hour").unwrap(), 20);
        assert_eq!(fields.uint("year").unwrap(), 2023);
        assert_eq!(fields.uint("delaySetting").unwrap(), 3);
        assert_eq!(fields.uint("irrigationState").unwrap(), 1);
        assert_eq!(fields.uint("seasonalAdjust").unwrap(), 0xFFFF);
    }
}
