//! Ideal oblivious transfer functionality.

use async_trait::async_trait;
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    StreamExt,
};

use super::{OTError, OTReceiver, OTSender};

#[derive(Debug)]
struct Transfer {
    x0: Vec<u8>,
    x1: Vec<u8>,
    count: usize,
}

/// Creates a connected pair of ideal OT sender and receiver.
///
/// The pair ignores the IO channel and hands the messages over in memory.
pub fn ideal_ot() -> (IdealOTSender, IdealOTReceiver) {
    let (sender, receiver) = unbounded();

    (
        IdealOTSender { sender },
        IdealOTReceiver {
            receiver,
            counter: 0,
        },
    )
}

/// The ideal OT sender.
#[derive(Debug)]
pub struct IdealOTSender {
    sender: UnboundedSender<Transfer>,
}

/// The ideal OT receiver.
#[derive(Debug)]
pub struct IdealOTReceiver {
    receiver: UnboundedReceiver<Transfer>,
    counter: usize,
}

impl IdealOTReceiver {
    /// Returns the number of elements received so far.
    pub fn count(&self) -> usize {
        self.counter
    }
}

#[async_trait]
impl<Io: Send> OTSender<Io> for IdealOTSender {
    async fn send(
        &mut self,
        _io: &mut Io,
        x0: Vec<u8>,
        x1: Vec<u8>,
        count: usize,
    ) -> Result<(), OTError> {
        if x0.len() != x1.len() || (count > 0 && x0.len() % count != 0) {
            return Err(OTError::SenderError(
                format!(
                    "buffers of {} and {} bytes do not hold {count} elements",
                    x0.len(),
                    x1.len()
                )
                .into(),
            ));
        }

        self.sender
            .unbounded_send(Transfer { x0, x1, count })
            .map_err(|_| OTError::SenderError("receiver dropped".into()))
    }
}

#[async_trait]
impl<Io: Send> OTReceiver<Io> for IdealOTReceiver {
    async fn receive(
        &mut self,
        _io: &mut Io,
        choices: &[bool],
        element_len: usize,
    ) -> Result<Vec<u8>, OTError> {
        let Transfer { x0, x1, count } = self
            .receiver
            .next()
            .await
            .ok_or_else(|| OTError::ReceiverError("sender dropped".into()))?;

        if choices.len() != count || x0.len() != count * element_len {
            return Err(OTError::ReceiverError(
                format!(
                    "expected {} elements of {element_len} bytes, sender sent {count} elements of {} bytes",
                    choices.len(),
                    x0.len()
                )
                .into(),
            ));
        }

        let chosen = choices
            .iter()
            .enumerate()
            .flat_map(|(i, choice)| {
                let buffer = if *choice { &x1 } else { &x0 };
                buffer[i * element_len..(i + 1) * element_len].iter().copied()
            })
            .collect();

        self.counter += count;

        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ideal_ot() {
        let (mut sender, mut receiver) = ideal_ot();
        let mut io = ();

        let x0: Vec<u8> = (0..8).collect();
        let x1: Vec<u8> = (100..108).collect();
        let choices = [false, true, true, false];

        sender.send(&mut io, x0, x1, 4).await.unwrap();
        let chosen = receiver.receive(&mut io, &choices, 2).await.unwrap();

        assert_eq!(chosen, vec![0, 1, 102, 103, 104, 105, 6, 7]);
        assert_eq!(receiver.count(), 4);
    }

    #[tokio::test]
    async fn test_ideal_ot_length_mismatch() {
        let (mut sender, mut receiver) = ideal_ot();
        let mut io = ();

        sender
            .send(&mut io, vec![0; 8], vec![1; 8], 4)
            .await
            .unwrap();
        let err = receiver.receive(&mut io, &[true; 3], 2).await.unwrap_err();

        assert!(matches!(err, OTError::ReceiverError(_)));
    }
}
