//! # Wire ⇄ structured message conversion
//!
//! Pure functions mapping between MAVLink frames and the generated protocol
//! types. The mapping covers the payload variants declared in
//! `proto/mavgate.proto`; frames outside that subset translate to `None`
//! and are skipped upstream.
//!
//! Numeric narrowing follows wire conventions: integer fields are truncated
//! to their MAVLink width, enum and bitmask fields are range-checked.

use mavio::dialects::common::enums::{
    MavAutopilot, MavCmd, MavModeFlag, MavResult, MavSeverity, MavState, MavSysStatusSensor,
    MavType,
};
use mavio::dialects::common::messages;
use mavio::protocol::MaybeVersioned;
use mavio::Frame;

use crate::grpc::proto;
use crate::grpc::proto::mavlink_message::Payload;
use crate::link::BridgeDialect;
use crate::prelude::*;

/// Translates a validated frame into its structured form.
///
/// Returns `Ok(None)` for message types the bridge does not carry across,
/// `Err` when an in-dialect payload fails to decode.
pub fn to_proto<V: MaybeVersioned>(frame: &Frame<V>) -> Result<Option<proto::MavlinkMessage>> {
    let message = frame
        .decode::<BridgeDialect>()
        .map_err(|err| Error::Convert(format!("cannot decode message: {err}")))?;

    let payload = match message {
        BridgeDialect::Heartbeat(m) => Payload::Heartbeat(proto::Heartbeat {
            r#type: m.type_ as u32,
            autopilot: m.autopilot as u32,
            base_mode: m.base_mode.bits() as u32,
            custom_mode: m.custom_mode,
            system_status: m.system_status as u32,
            mavlink_version: m.mavlink_version as u32,
        }),
        BridgeDialect::SysStatus(m) => Payload::SysStatus(proto::SysStatus {
            onboard_control_sensors_present: m.onboard_control_sensors_present.bits(),
            onboard_control_sensors_enabled: m.onboard_control_sensors_enabled.bits(),
            onboard_control_sensors_health: m.onboard_control_sensors_health.bits(),
            load: m.load as u32,
            voltage_battery: m.voltage_battery as u32,
            current_battery: m.current_battery as i32,
            battery_remaining: m.battery_remaining as i32,
            drop_rate_comm: m.drop_rate_comm as u32,
            errors_comm: m.errors_comm as u32,
            errors_count1: m.errors_count1 as u32,
            errors_count2: m.errors_count2 as u32,
            errors_count3: m.errors_count3 as u32,
            errors_count4: m.errors_count4 as u32,
        }),
        BridgeDialect::Attitude(m) => Payload::Attitude(proto::Attitude {
            time_boot_ms: m.time_boot_ms,
            roll: m.roll,
            pitch: m.pitch,
            yaw: m.yaw,
            rollspeed: m.rollspeed,
            pitchspeed: m.pitchspeed,
            yawspeed: m.yawspeed,
        }),
        BridgeDialect::GlobalPositionInt(m) => {
            Payload::GlobalPositionInt(proto::GlobalPositionInt {
                time_boot_ms: m.time_boot_ms,
                lat: m.lat,
                lon: m.lon,
                alt: m.alt,
                relative_alt: m.relative_alt,
                vx: m.vx as i32,
                vy: m.vy as i32,
                vz: m.vz as i32,
                hdg: m.hdg as u32,
            })
        }
        BridgeDialect::CommandLong(m) => Payload::CommandLong(proto::CommandLong {
            target_system: m.target_system as u32,
            target_component: m.target_component as u32,
            command: m.command as u32,
            confirmation: m.confirmation as u32,
            param1: m.param1,
            param2: m.param2,
            param3: m.param3,
            param4: m.param4,
            param5: m.param5,
            param6: m.param6,
            param7: m.param7,
        }),
        BridgeDialect::CommandAck(m) => Payload::CommandAck(proto::CommandAck {
            command: m.command as u32,
            result: m.result as u32,
            progress: m.progress as u32,
            result_param2: m.result_param2,
            target_system: m.target_system as u32,
            target_component: m.target_component as u32,
        }),
        BridgeDialect::Statustext(m) => Payload::Statustext(proto::Statustext {
            severity: m.severity as u32,
            text: chars_to_string(&m.text),
            id: m.id as u32,
            chunk_seq: m.chunk_seq as u32,
        }),
        _ => return Ok(None),
    };

    Ok(Some(proto::MavlinkMessage {
        system_id: frame.system_id() as u32,
        component_id: frame.component_id() as u32,
        message_id: frame.message_id(),
        sequence: frame.sequence() as u32,
        payload: Some(payload),
    }))
}

/// Translates a structured message back into a dialect message ready for
/// framing.
///
/// The frame header (source ids, sequence) is stamped by the engine on
/// send; only the payload is taken from `message`.
pub fn from_proto(message: &proto::MavlinkMessage) -> Result<BridgeDialect> {
    let payload = message
        .payload
        .as_ref()
        .ok_or_else(|| Error::Convert("message has no payload".to_string()))?;

    let decoded = match payload {
        Payload::Heartbeat(m) => BridgeDialect::Heartbeat(messages::Heartbeat {
            type_: enum_u8::<MavType>(m.r#type, "HEARTBEAT.type")?,
            autopilot: enum_u8::<MavAutopilot>(m.autopilot, "HEARTBEAT.autopilot")?,
            base_mode: mode_flags(m.base_mode, "HEARTBEAT.base_mode")?,
            custom_mode: m.custom_mode,
            system_status: enum_u8::<MavState>(m.system_status, "HEARTBEAT.system_status")?,
            mavlink_version: m.mavlink_version as u8,
        }),
        Payload::SysStatus(m) => BridgeDialect::SysStatus(messages::SysStatus {
            onboard_control_sensors_present: sensor_flags(
                m.onboard_control_sensors_present,
                "SYS_STATUS.onboard_control_sensors_present",
            )?,
            onboard_control_sensors_enabled: sensor_flags(
                m.onboard_control_sensors_enabled,
                "SYS_STATUS.onboard_control_sensors_enabled",
            )?,
            onboard_control_sensors_health: sensor_flags(
                m.onboard_control_sensors_health,
                "SYS_STATUS.onboard_control_sensors_health",
            )?,
            load: m.load as u16,
            voltage_battery: m.voltage_battery as u16,
            current_battery: m.current_battery as i16,
            battery_remaining: m.battery_remaining as i8,
            drop_rate_comm: m.drop_rate_comm as u16,
            errors_comm: m.errors_comm as u16,
            errors_count1: m.errors_count1 as u16,
            errors_count2: m.errors_count2 as u16,
            errors_count3: m.errors_count3 as u16,
            errors_count4: m.errors_count4 as u16,
        }),
        Payload::Attitude(m) => BridgeDialect::Attitude(messages::Attitude {
            time_boot_ms: m.time_boot_ms,
            roll: m.roll,
            pitch: m.pitch,
            yaw: m.yaw,
            rollspeed: m.rollspeed,
            pitchspeed: m.pitchspeed,
            yawspeed: m.yawspeed,
        }),
        Payload::GlobalPositionInt(m) => {
            BridgeDialect::GlobalPositionInt(messages::GlobalPositionInt {
                time_boot_ms: m.time_boot_ms,
                lat: m.lat,
                lon: m.lon,
                alt: m.alt,
                relative_alt: m.relative_alt,
                vx: m.vx as i16,
                vy: m.vy as i16,
                vz: m.vz as i16,
                hdg: m.hdg as u16,
            })
        }
        Payload::CommandLong(m) => BridgeDialect::CommandLong(messages::CommandLong {
            target_system: m.target_system as u8,
            target_component: m.target_component as u8,
            command: enum_u16::<MavCmd>(m.command, "COMMAND_LONG.command")?,
            confirmation: m.confirmation as u8,
            param1: m.param1,
            param2: m.param2,
            param3: m.param3,
            param4: m.param4,
            param5: m.param5,
            param6: m.param6,
            param7: m.param7,
        }),
        Payload::CommandAck(m) => BridgeDialect::CommandAck(messages::CommandAck {
            command: enum_u16::<MavCmd>(m.command, "COMMAND_ACK.command")?,
            result: enum_u8::<MavResult>(m.result, "COMMAND_ACK.result")?,
            progress: m.progress as u8,
            result_param2: m.result_param2,
            target_system: m.target_system as u8,
            target_component: m.target_component as u8,
        }),
        Payload::Statustext(m) => BridgeDialect::Statustext(messages::Statustext {
            severity: enum_u8::<MavSeverity>(m.severity, "STATUSTEXT.severity")?,
            text: string_to_chars(&m.text),
            id: m.id as u16,
            chunk_seq: m.chunk_seq as u8,
        }),
    };

    Ok(decoded)
}

fn enum_u8<T: TryFrom<u8>>(value: u32, what: &str) -> Result<T> {
    u8::try_from(value)
        .ok()
        .and_then(|raw| T::try_from(raw).ok())
        .ok_or_else(|| Error::Convert(format!("invalid {what}: {value}")))
}

fn enum_u16<T: TryFrom<u16>>(value: u32, what: &str) -> Result<T> {
    u16::try_from(value)
        .ok()
        .and_then(|raw| T::try_from(raw).ok())
        .ok_or_else(|| Error::Convert(format!("invalid {what}: {value}")))
}

fn mode_flags(value: u32, what: &str) -> Result<MavModeFlag> {
    u8::try_from(value)
        .ok()
        .and_then(MavModeFlag::from_bits)
        .ok_or_else(|| Error::Convert(format!("invalid {what}: {value}")))
}

fn sensor_flags(value: u32, what: &str) -> Result<MavSysStatusSensor> {
    MavSysStatusSensor::from_bits(value)
        .ok_or_else(|| Error::Convert(format!("invalid {what}: {value}")))
}

/// Reads a NUL-padded MAVLink char array into a string.
fn chars_to_string(chars: &[u8]) -> String {
    let end = chars.iter().position(|&byte| byte == 0).unwrap_or(chars.len());
    String::from_utf8_lossy(&chars[..end]).into_owned()
}

/// Writes a string into a NUL-padded MAVLink char array, truncating to fit.
fn string_to_chars<const N: usize>(text: &str) -> [u8; N] {
    let mut chars = [0u8; N];
    let bytes = text.as_bytes();
    let len = bytes.len().min(N);
    chars[..len].copy_from_slice(&bytes[..len]);
    chars
}

#[cfg(test)]
mod tests {
    use super::*;

    use mavio::protocol::V2;

    fn frame_with(message: &BridgeDialect) -> Frame<V2> {
        Frame::builder()
            .sequence(9)
            .system_id(7)
            .component_id(3)
            .version(V2)
            .message(message)
            .unwrap()
            .build()
    }

    fn roundtrip(payload: Payload) {
        let original = proto::MavlinkMessage {
            system_id: 7,
            component_id: 3,
            message_id: 0,
            sequence: 0,
            payload: Some(payload),
        };

        let decoded = from_proto(&original).unwrap();
        let frame = frame_with(&decoded);
        let restored = to_proto(&frame).unwrap().expect("payload in subset");

        assert_eq!(restored.system_id, 7);
        assert_eq!(restored.component_id, 3);
        assert_eq!(restored.message_id, frame.message_id());
        assert_eq!(restored.sequence, 9);
        assert_eq!(restored.payload, original.payload);
    }

    #[test]
    fn heartbeat_round_trip() {
        roundtrip(Payload::Heartbeat(proto::Heartbeat {
            r#type: 2,
            autopilot: 3,
            base_mode: 81,
            custom_mode: 4,
            system_status: 4,
            mavlink_version: 3,
        }));
    }

    #[test]
    fn sys_status_round_trip() {
        roundtrip(Payload::SysStatus(proto::SysStatus {
            onboard_control_sensors_present: 7,
            onboard_control_sensors_enabled: 3,
            onboard_control_sensors_health: 1,
            load: 500,
            voltage_battery: 11_800,
            current_battery: 1_250,
            battery_remaining: 87,
            drop_rate_comm: 0,
            errors_comm: 2,
            errors_count1: 0,
            errors_count2: 0,
            errors_count3: 1,
            errors_count4: 0,
        }));
    }

    #[test]
    fn attitude_round_trip() {
        roundtrip(Payload::Attitude(proto::Attitude {
            time_boot_ms: 123_456,
            roll: 0.1,
            pitch: -0.2,
            yaw: 1.5,
            rollspeed: 0.01,
            pitchspeed: -0.02,
            yawspeed: 0.0,
        }));
    }

    #[test]
    fn global_position_round_trip() {
        roundtrip(Payload::GlobalPositionInt(proto::GlobalPositionInt {
            time_boot_ms: 42,
            lat: 473_977_420,
            lon: 85_455_940,
            alt: 500_000,
            relative_alt: 10_000,
            vx: -120,
            vy: 80,
            vz: 0,
            hdg: 27_000,
        }));
    }

    #[test]
    fn command_long_round_trip() {
        roundtrip(Payload::CommandLong(proto::CommandLong {
            target_system: 1,
            target_component: 1,
            command: 22, // MAV_CMD_NAV_TAKEOFF
            confirmation: 0,
            param1: 0.0,
            param2: 0.0,
            param3: 0.0,
            param4: 0.0,
            param5: 0.0,
            param6: 0.0,
            param7: 10.0,
        }));
    }

    #[test]
    fn command_ack_round_trip() {
        roundtrip(Payload::CommandAck(proto::CommandAck {
            command: 22,
            result: 0,
            progress: 100,
            result_param2: 0,
            target_system: 254,
            target_component: 190,
        }));
    }

    #[test]
    fn statustext_round_trip() {
        roundtrip(Payload::Statustext(proto::Statustext {
            severity: 6,
            text: "PreArm: all checks passed".to_string(),
            id: 0,
            chunk_seq: 0,
        }));
    }

    #[test]
    fn from_proto_rejects_missing_payload() {
        let message = proto::MavlinkMessage::default();
        assert!(from_proto(&message).is_err());
    }

    #[test]
    fn from_proto_rejects_out_of_range_enum() {
        let message = proto::MavlinkMessage {
            payload: Some(Payload::Heartbeat(proto::Heartbeat {
                r#type: 100_000,
                ..Default::default()
            })),
            ..Default::default()
        };
        assert!(from_proto(&message).is_err());
    }

    #[test]
    fn from_proto_rejects_out_of_range_bitmask() {
        let message = proto::MavlinkMessage {
            payload: Some(Payload::Heartbeat(proto::Heartbeat {
                base_mode: 300,
                ..Default::default()
            })),
            ..Default::default()
        };
        assert!(from_proto(&message).is_err());
    }

    #[test]
    fn char_array_helpers_pad_and_truncate() {
        let chars: [u8; 8] = string_to_chars("hi");
        assert_eq!(&chars, b"hi\0\0\0\0\0\0");
        assert_eq!(chars_to_string(&chars), "hi");

        let truncated: [u8; 4] = string_to_chars("toolong");
        assert_eq!(chars_to_string(&truncated), "tool");
    }
}
