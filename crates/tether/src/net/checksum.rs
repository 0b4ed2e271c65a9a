// CRC-16/ARC: reflected polynomial 0x8005, zero init, no final xor.
const POLYNOMIAL: u16 = 0xA001;

pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ POLYNOMIAL;
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
    fn test_check_value() {
        assert_eq!(crc16(b"123456789"), 0xBB3D);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(crc16(&[]), 0);
    }

    #[test]
    fn test_deterministic() {
        let bytes = 0xDEAD_BEEFu32.to_be_bytes();
        assert_eq!(crc16(&bytes), crc16(&bytes));
        assert_ne!(crc16(&bytes), crc16(&0xDEAD_BEEEu32.to_be_bytes()));
    }
}
