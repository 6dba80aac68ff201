//! Delivery of the extended P2 input keys by oblivious transfer.
//!
//! For every bucket P2 picks a random input `y1`, extends it through the matrix and receives, for
//! each extended wire, the decommitments of the keys selected by its bit in every circuit of the
//! bucket. Each OT element holds `B` decommitments, the masked key followed by its nonce.

use lryao_core::{
    bucket::BucketList,
    bundle::{Bundle, LimitedBundle},
    commit::Decommitment,
    matrix::ProbeResistantMatrix,
    Block, CheatError,
};
use rand::Rng;
use serio::IoDuplex;

use crate::{
    ot::{OTReceiver, OTSender},
    P1Error, P2Error,
};

const DECOMMITMENT_LEN: usize = 2 * Block::LEN;

/// Sends the extended P2 input key decommitments of every bucket.
#[tracing::instrument(skip_all)]
pub(crate) async fn send_keys<Io, OT>(
    io: &mut Io,
    ot: &mut OT,
    list: &BucketList<Bundle>,
) -> Result<(), P1Error>
where
    Io: IoDuplex + Unpin + Send,
    OT: OTSender<Io> + Send,
{
    for (b, bucket) in list.iter().enumerate() {
        let m = bucket
            .first()
            .map(|bundle| bundle.labels().y1_extended.len())
            .unwrap_or(0);
        let element_len = bucket.len() * DECOMMITMENT_LEN;

        let mut x0 = Vec::with_capacity(m * element_len);
        let mut x1 = Vec::with_capacity(m * element_len);
        for i in 0..m {
            for bundle in bucket {
                for (sigma, buffer) in [(false, &mut x0), (true, &mut x1)] {
                    let decommitment = bundle
                        .commitments_y1_extended()
                        .decommitment(i, sigma)
                        .ok_or_else(|| P1Error::state("bundle has no key decommitments"))?;
                    buffer.extend_from_slice(decommitment.data().as_bytes());
                    buffer.extend_from_slice(decommitment.nonce().as_bytes());
                }
            }
        }

        ot.send(io, x0, x1, m).await?;
        tracing::debug!(bucket = b, wires = m, "sent extended input keys");
    }

    Ok(())
}

/// Receives the extended P2 input keys of every bucket for a fresh random input.
///
/// Every received key is checked against its commitment before it is stored.
#[tracing::instrument(skip_all)]
pub(crate) async fn receive_keys<Io, OT>(
    io: &mut Io,
    ot: &mut OT,
    list: &mut BucketList<LimitedBundle>,
    matrix: &ProbeResistantMatrix,
) -> Result<(), P2Error>
where
    Io: IoDuplex + Unpin + Send,
    OT: OTReceiver<Io> + Send,
{
    for (b, bucket) in list.iter_mut().enumerate() {
        let (y1, y1_extended) = {
            let mut rng = rand::thread_rng();
            let y1: Vec<bool> = (0..matrix.n()).map(|_| rng.gen()).collect();
            let y1_extended = matrix.transform_input(&y1, &mut rng)?;

            (y1, y1_extended)
        };

        let element_len = bucket.len() * DECOMMITMENT_LEN;
        let received = ot.receive(io, &y1_extended, element_len).await?;
        if received.len() != y1_extended.len() * element_len {
            return Err(CheatError::new(format!(
                "received {} bytes of keys, expected {}",
                received.len(),
                y1_extended.len() * element_len
            ))
            .into());
        }

        let mut keys = vec![Vec::with_capacity(y1_extended.len()); bucket.len()];
        for (i, (element, sigma)) in received
            .chunks_exact(element_len)
            .zip(&y1_extended)
            .enumerate()
        {
            for (j, (bundle, chunk)) in bucket
                .iter()
                .zip(element.chunks_exact(DECOMMITMENT_LEN))
                .enumerate()
            {
                let (key, nonce) = chunk.split_at(Block::LEN);
                let decommitment = Decommitment::new_with_nonce(
                    Block::try_from(key).expect("chunk holds a key"),
                    Block::try_from(nonce).expect("chunk holds a nonce"),
                );

                let key = bundle
                    .commitments_y1_extended()
                    .open(i, *sigma, &decommitment)
                    .map_err(|_| {
                        CheatError::new(format!("decommitment failed! for i = {i} and j = {j}"))
                    })?;
                keys[j].push(key);
            }
        }

        for (bundle, keys) in bucket.iter_mut().zip(keys) {
            bundle.set_y1(y1.clone());
            bundle.set_y1_extended_keys(keys);
        }

        tracing::debug!(bucket = b, wires = y1_extended.len(), "received extended input keys");
    }

    Ok(())
}
