//! Oblivious transfer used to deliver P2's input keys.
//!
//! Messages are opaque byte buffers: the sender passes two parallel buffers of `count` elements,
//! one per choice bit, and the receiver gets the element selected by each of its choices.

#[cfg(any(test, feature = "ideal"))]
pub mod ideal;

use async_trait::async_trait;

/// An OT error.
#[derive(Debug, thiserror::Error)]
#[allow(missing_docs)]
pub enum OTError {
    #[error(transparent)]
    IOError(#[from] std::io::Error),
    #[error("sender error: {0}")]
    SenderError(Box<dyn std::error::Error + Send + Sync>),
    #[error("receiver error: {0}")]
    ReceiverError(Box<dyn std::error::Error + Send + Sync>),
}

/// An OT sender.
#[async_trait]
pub trait OTSender<Io: Send> {
    /// Obliviously transfers `count` elements, the `i`-th element of `x0` or `x1`.
    ///
    /// # Arguments
    ///
    /// * `io` - The channel to the receiver.
    /// * `x0` - The elements sent for choice `0`, concatenated.
    /// * `x1` - The elements sent for choice `1`, concatenated.
    /// * `count` - The number of elements.
    async fn send(
        &mut self,
        io: &mut Io,
        x0: Vec<u8>,
        x1: Vec<u8>,
        count: usize,
    ) -> Result<(), OTError>;
}

/// An OT receiver.
#[async_trait]
pub trait OTReceiver<Io: Send> {
    /// Receives one element per choice, concatenated.
    ///
    /// # Arguments
    ///
    /// * `io` - The channel to the sender.
    /// * `choices` - The choice bits.
    /// * `element_len` - The length of one element in bytes.
    async fn receive(
        &mut self,
        io: &mut Io,
        choices: &[bool],
        element_len: usize,
    ) -> Result<Vec<u8>, OTError>;
}
