//! Texts sent back to users.

pub const VOICE_ACCEPTED: &str = "Thanks! Your voice message has been received.";
pub const TEXT_RECEIVED: &str = "Message received!";
pub const FAILURE: &str = "Something went wrong while processing your message.";

pub fn greeting(max_secs: u32) -> String {
    format!("Hi! I collect voice messages. Send me a voice message up to {max_secs} seconds long.")
}

pub fn voice_too_long(max_secs: u32) -> String {
    format!("Sorry, voice messages must be no longer than {max_secs} seconds!")
}
