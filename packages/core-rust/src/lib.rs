//! `hostlink` Core — call envelopes, method identifiers, and the `MsgPack`
//! envelope codec shared by both ends of the bridge.

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, DecodeError, EncodeError};
pub use envelope::{Envelope, MalformedIdentifier, MethodId};

#[cfg(test)]
mod tests {
    #[test]
    fn crate_loads() {
        // Empty body: if this test runs, the crate compiles and loads.
    }
}
