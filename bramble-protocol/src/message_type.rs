//! Message type discriminants (§3 Message types).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    SensorData = 0x01,
    ActuatorCmd = 0x02,
    Ack = 0x03,
    Heartbeat = 0x04,
    Registration = 0x05,
    RegistrationResponse = 0x06,
    CheckUpdates = 0x07,
    UpdateAvailable = 0x08,
    HeartbeatResponse = 0x09,
    SensorDataBatch = 0x0A,
    BatchAck = 0x0B,
    EventLog = 0x0C,
}

impl MessageType {
    pub fn from_u8(raw: u8) -> Option<MessageType> {
        Some(match raw {
            0x01 => MessageType::SensorData,
            0x02 => MessageType::ActuatorCmd,
            0x03 => MessageType::Ack,
            0x04 => MessageType::Heartbeat,
            0x05 => MessageType::Registration,
            0x06 => MessageType::RegistrationResponse,
            0x07 => MessageType::CheckUpdates,
            0x08 => MessageType::UpdateAvailable,
            0x09 => MessageType::HeartbeatResponse,
            0x0A => MessageType::SensorDataBatch,
            0x0B => MessageType::BatchAck,
            0x0C => MessageType::EventLog,
            _ => return None,
        })
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_round_trips() {
        let all = [
            MessageType::SensorData,
            MessageType::ActuatorCmd,
            MessageType::Ack,
            MessageType::Heartbeat,
            MessageType::Registration,
            MessageType::RegistrationResponse,
            MessageType::CheckUpdates,
            MessageType::UpdateAvailable,
            MessageType::HeartbeatResponse,
            MessageType::SensorDataBatch,
            MessageType::BatchAck,
            MessageType::EventLog,
        ];
        for t in all {
            assert_eq!(MessageType::from_u8(t.as_u8()), Some(t));
        }
    }

    #[test]
    fn unknown_type_is_none() {
        assert_eq!(MessageType::from_u8(0x00), None);
        assert_eq!(MessageType::from_u8(0xFF), None);
    }
}
