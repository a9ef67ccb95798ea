//! Identifier utilities
//!
//! Participant ids are locally generated random tokens; there is no
//! server-issued identity. Callers that want a stable id across reconnects
//! persist the value themselves and pass it back in.

use uuid::Uuid;

/// Generate a new UUIDv4
pub fn generate() -> Uuid {
    Uuid::new_v4()
}

/// Fresh participant id for a new session
pub fn participant_id() -> String {
    generate().to_string()
}

/// Short human-shareable room code (6 upper-case hex characters)
pub fn room_code() -> String {
    generate().simple().to_string()[..6].to_uppercase()
}
