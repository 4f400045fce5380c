// Waypoint Android JNI Library
// Exposes the Rust tracking agent to Kotlin via JNI

pub mod android_jni;
pub mod bridge;
pub mod error;

pub use bridge::Bridge;
pub use error::{BridgeError, BridgeResult};
