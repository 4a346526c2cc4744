//! Shared-secret token helpers for RPC authentication
//!
//! Every RPC call carries the deployment's token. The controller compares it
//! against its configured secret before dispatching the call.

/// Length of a generated token in bytes (before hex encoding)
const TOKEN_BYTES: usize = 32;

/// Generate a new random token
///
/// Returns a 64-character hex string (32 random bytes).
pub fn generate_token() -> String {
    use rand::Rng;
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Compare a presented token with the expected one
///
/// Exact match in constant time for tokens of equal length.
pub fn validate_token(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() {
        return false;
    }

    let mut result = 0u8;
    for (a, b) in provided.bytes().zip(expected.bytes()) {
        result |= a ^ b;
    }
    result == 0
}
