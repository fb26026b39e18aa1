//! CBOR encoding of stored values.

use crate::error::{GuardError, GuardResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub(crate) fn encode<V: Serialize>(value: &V) -> GuardResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| GuardError::Codec(e.to_string()))?;
    Ok(buf)
}

pub(crate) fn decode<V: DeserializeOwned>(bytes: &[u8]) -> GuardResult<V> {
    ciborium::from_reader(bytes).map_err(|e| GuardError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Window {
        width: u32,
        title: String,
    }

    #[test]
    fn structs_survive() {
        let window = Window {
            width: 800,
            title: "main".into(),
        };
        let bytes = encode(&window).unwrap();
        assert_eq!(decode::<Window>(&bytes).unwrap(), window);
    }

    #[test]
    fn wrong_type_is_codec_error() {
        let bytes = encode(&"text").unwrap();
        assert!(matches!(decode::<u64>(&bytes), Err(GuardError::Codec(_))));
        assert!(matches!(decode::<u64>(&[0xff, 0x00]), Err(GuardError::Codec(_))));
    }
}
