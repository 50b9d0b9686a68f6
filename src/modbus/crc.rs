/// Modbus CRC-16 (reflected polynomial 0xA001, seed 0xFFFF).
///
/// The result goes on the wire low byte first.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crc16_modbus_known_vectors() {
        assert_eq!(crc16_modbus(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xCDC5);
        assert_eq!(crc16_modbus(&[0x11, 0x03, 0x00, 0x6B, 0x00, 0x03]), 0x8776);
        assert_eq!(crc16_modbus(&[0x01, 0x03, 0x00, 0x0A, 0x00, 0x01]), 0x08A4);
    }

    #[test]
    fn test_crc16_empty_input_is_seed() {
        assert_eq!(crc16_modbus(&[]), 0xFFFF);
    }

    #[test]
    fn test_crc16_appended_frame_checks_to_zero() {
        // A frame followed by its own little-endian CRC has a residue of zero.
        let mut frame = vec![0x01, 0x06, 0x00, 0x01, 0x00, 0x03];
        let crc = crc16_modbus(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(crc16_modbus(&frame), 0x0000);
    }
}
