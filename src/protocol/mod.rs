pub mod messages;
pub mod product;

pub use messages::{ClientMessage, OrderMode, OrderStatus, Recipe, RecipeType, Role, ServerMessage, Side};
pub use product::Product;

/// Default WebSocket text-frame size bound (§6.1).
pub const DEFAULT_MAX_FRAME_BYTES: usize = 64 * 1024;

/// Decode a single client frame. Oversized frames and frames whose `type` is
/// missing/unrecognized are reported as `INVALID_MESSAGE` rather than panicking.
pub fn decode_client_message(
    text: &str,
    max_frame_bytes: usize,
) -> Result<ClientMessage, crate::error::EngineError> {
    if text.len() > max_frame_bytes {
        return Err(crate::error::EngineError::InvalidMessage);
    }
    serde_json::from_str(text).map_err(|_| crate::error::EngineError::InvalidMessage)
}

pub fn encode_server_message(msg: &ServerMessage) -> String {
    serde_json::to_string(msg).unwrap_or_else(|_| "{}".to_string())
}

/// Client-side counterpart of `encode_server_message`: frames a client message
/// for the wire.
pub fn encode_client_message(msg: &ClientMessage) -> String {
    serde_json::to_string(msg).unwrap_or_else(|_| "{}".to_string())
}

/// Client-side counterpart of `decode_client_message`. The client trusts the
/// server's frame sizing, so no byte bound is applied here.
pub fn decode_server_message(text: &str) -> Result<ServerMessage, crate::error::EngineError> {
    serde_json::from_str(text).map_err(|_| crate::error::EngineError::InvalidMessage)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_frame_is_rejected() {
        let huge = format!("{{\"type\":\"PING\",\"pad\":\"{}\"}}", "x".repeat(128));
        let result = decode_client_message(&huge, 32);
        assert!(result.is_err());
    }

    #[test]
    fn malformed_json_is_invalid_message() {
        let result = decode_client_message("not json at all", DEFAULT_MAX_FRAME_BYTES);
        assert_eq!(result.unwrap_err(), crate::error::EngineError::InvalidMessage);
    }
}
