use std::fmt;

use super::errors::{CrlError, CrlResult};

/// Widest serial magnitude accepted, in octets.
///
/// RFC 5280 caps serials at 20 octets but deployed CAs exceed that, so the
/// limit is generous.
pub const MAX_SERIAL_LEN: usize = 64;

/// A certificate serial number as carried in a certificate or CRL entry:
/// the content octets of a DER INTEGER (big-endian two's complement).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SerialNumber(Vec<u8>);

impl SerialNumber {
    pub fn from_der_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Parse a hex encoded serial, as printed by most X.509 tooling.
    ///
    /// Colons and an odd number of digits are accepted (`1:ff`, `fff`).
    pub fn from_hex(hex_str: &str) -> CrlResult<Self> {
        let mut digits: String = hex_str.trim().chars().filter(|c| *c != ':').collect();
        if digits.is_empty() {
            return Err(CrlError::Encoding("empty serial number".to_string()));
        }
        if digits.len() % 2 == 1 {
            digits.insert(0, '0');
        }
        let magnitude = hex::decode(&digits)
            .map_err(|e| CrlError::Encoding(format!("{hex_str:?} is not hex: {e}")))?;
        Ok(Self::from_magnitude(magnitude))
    }

    // Hex and integers are unsigned, pad so the sign bit stays clear.
    fn from_magnitude(mut magnitude: Vec<u8>) -> Self {
        if magnitude.first().is_some_and(|b| b & 0x80 != 0) {
            magnitude.insert(0, 0);
        }
        Self(magnitude)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<u64> for SerialNumber {
    fn from(value: u64) -> Self {
        let bytes = value.to_be_bytes();
        let first = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len() - 1);
        Self::from_magnitude(bytes[first..].to_vec())
    }
}

impl fmt::Display for SerialNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Canonical byte form of a serial number used as a shard member.
///
/// This is the minimal unsigned big-endian magnitude, zero being `[0]`.
/// Negative, empty and over-wide serials are rejected.
pub fn serialize_sn(sn: &SerialNumber) -> CrlResult<Vec<u8>> {
    let raw = sn.as_bytes();
    let Some(first) = raw.first() else {
        return Err(CrlError::Encoding("empty serial number".to_string()));
    };
    if first & 0x80 != 0 {
        return Err(CrlError::Encoding(format!("negative serial number {sn}")));
    }

    let start = raw.iter().position(|b| *b != 0).unwrap_or(raw.len() - 1);
    let magnitude = &raw[start..];
    if magnitude.len() > MAX_SERIAL_LEN {
        return Err(CrlError::Encoding(format!(
            "serial number is {} octets long, at most {MAX_SERIAL_LEN} allowed",
            magnitude.len()
        )));
    }

    Ok(magnitude.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_integers() {
        assert_eq!(serialize_sn(&SerialNumber::from(0u64)).unwrap(), vec![0]);
        assert_eq!(serialize_sn(&SerialNumber::from(10u64)).unwrap(), vec![10]);
        assert_eq!(serialize_sn(&SerialNumber::from(255u64)).unwrap(), vec![0xff]);
        assert_eq!(
            serialize_sn(&SerialNumber::from(4096u64)).unwrap(),
            vec![0x10, 0x00]
        );
    }

    #[test]
    fn test_sign_padding_is_stripped() {
        // DER encodes 255 as 00 ff
        let der = SerialNumber::from_der_bytes(vec![0x00, 0xff]);
        assert_eq!(der, SerialNumber::from(255u64));
        assert_eq!(serialize_sn(&der).unwrap(), vec![0xff]);

        let padded = SerialNumber::from_der_bytes(vec![0x00, 0x00, 0x00, 0x0a]);
        assert_eq!(serialize_sn(&padded).unwrap(), vec![0x0a]);
    }

    #[test]
    fn test_equal_values_serialize_equally() {
        let a = SerialNumber::from_hex("00:10:00").unwrap();
        let b = SerialNumber::from(4096u64);
        let c = SerialNumber::from_hex("1000").unwrap();
        assert_eq!(serialize_sn(&a).unwrap(), serialize_sn(&b).unwrap());
        assert_eq!(serialize_sn(&b).unwrap(), serialize_sn(&c).unwrap());
        assert_ne!(
            serialize_sn(&SerialNumber::from(16u64)).unwrap(),
            serialize_sn(&SerialNumber::from(4096u64)).unwrap()
        );
    }

    #[test]
    fn test_from_hex() {
        assert_eq!(SerialNumber::from_hex("fff").unwrap(), SerialNumber::from(0xfffu64));
        assert_eq!(SerialNumber::from_hex(" FF ").unwrap(), SerialNumber::from(255u64));
        assert!(matches!(
            SerialNumber::from_hex("xyz"),
            Err(CrlError::Encoding(_))
        ));
        assert!(matches!(SerialNumber::from_hex(""), Err(CrlError::Encoding(_))));
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(matches!(
            serialize_sn(&SerialNumber::from_der_bytes(Vec::new())),
            Err(CrlError::Encoding(_))
        ));
        assert!(matches!(
            serialize_sn(&SerialNumber::from_der_bytes(vec![0x80, 0x01])),
            Err(CrlError::Encoding(_))
        ));
        assert!(matches!(
            serialize_sn(&SerialNumber::from_der_bytes(vec![0x01; MAX_SERIAL_LEN + 1])),
            Err(CrlError::Encoding(_))
        ));
        assert!(serialize_sn(&SerialNumber::from_der_bytes(vec![0x01; MAX_SERIAL_LEN])).is_ok());
    }
}
