use serde::{Serialize, de::DeserializeOwned};

/// Payload codec used at the workflow boundary (round input, proxy inputs,
/// call results, completion and restart payloads).
pub trait Codec {
    fn encode<T: Serialize + ?Sized>(v: &T) -> Result<String, String>;
    fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String>;
}

/// JSON codec backed by `serde_json`.
pub struct Json;

impl Codec for Json {
    fn encode<T: Serialize + ?Sized>(v: &T) -> Result<String, String> {
        serde_json::to_string(v).map_err(|e| format!("encode: {e}"))
    }

    fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String> {
        serde_json::from_str(s).map_err(|e| format!("decode: {e}"))
    }
}
