//! Cut-and-choose verifier, run by P2.

use std::sync::Arc;

use futures::future::try_join_all;
use lryao_core::{
    bucket::{BucketList, BucketMapping},
    bundle::{BundleBuilder, LimitedBundle, LimitedBundleConfig},
    chunks::chunk_ranges,
    commit::HashCommit,
    commitments::{CheckedCircuitOpening, CommitmentBundle, CommitmentsPackage, DecommitmentsPackage},
    difference::{
        receiver::state::Committed, DifferenceCommitments, DifferenceOpenings,
        DifferenceReceiverBundle, ProveDifference, Receiver,
    },
    params::ExecutionParameters,
    selection::{ChooseFractionSelectionBuilder, SelectionBuilder},
    Block, CheatError,
};
use rand::Rng;
use serio::{stream::IoStreamExt, IoDuplex, SinkExt};

use crate::{
    backend::CpuBackend,
    msg::{CutAndChooseCommitments, GarbledCircuitMessage, Reveal},
    P2Error, ProtocolConfig,
};

/// Checks a random subset of P1's circuits and buckets the rest.
#[derive(Debug, Clone)]
pub struct CutAndChooseVerifier {
    params: ExecutionParameters,
    builder: Arc<BundleBuilder>,
    config: ProtocolConfig,
}

/// A checked circuit with everything needed to rebuild it.
struct CheckedCircuit {
    index: usize,
    message: GarbledCircuitMessage,
    package: CommitmentsPackage,
    opening: CheckedCircuitOpening,
    placement_mask: Vec<bool>,
}

impl CutAndChooseVerifier {
    /// Creates a new verifier.
    ///
    /// The builder rebuilds checked circuits from their seeds. For the cheating-recovery circuit
    /// its proof of cheating is irrelevant, as the P2 input commitments are not compared.
    pub fn new(params: ExecutionParameters, builder: BundleBuilder, config: ProtocolConfig) -> Self {
        Self {
            params,
            builder: Arc::new(builder),
            config,
        }
    }

    /// Returns the execution parameters.
    pub fn params(&self) -> &ExecutionParameters {
        &self.params
    }

    /// Runs the cut-and-choose, returning P2's view of the evaluated circuits in buckets.
    #[tracing::instrument(skip_all)]
    pub async fn execute<Io>(
        &self,
        channels: &mut [Io],
    ) -> Result<BucketList<LimitedBundle>, P2Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        if channels.len() != self.config.channels() {
            return Err(P2Error::state(format!(
                "expected {} channels, got {}",
                self.config.channels(),
                channels.len()
            )));
        }

        let total = self.params.total_circuits();
        let check = self.params.check_circuits();

        let (selection, mapping_seed, receiver) = {
            let mut rng = rand::thread_rng();
            let selection = ChooseFractionSelectionBuilder::new(check).build(total, &mut rng)?;
            let mapping_seed: Block = rng.gen();
            let receiver = Receiver::new(
                selection.clone(),
                self.params.statistical_parameter(),
                &mut rng,
            );

            (selection, mapping_seed, receiver)
        };

        let (selection_decommitment, selection_commitment) = selection.clone().hash_commit();
        let (mapping_decommitment, mapping_commitment) = mapping_seed.hash_commit();
        let (receiver, setup) = receiver.setup();

        let io = &mut channels[0];
        io.feed(CutAndChooseCommitments {
            selection: selection_commitment,
            mapping: mapping_commitment,
        })
        .await?;
        io.feed(setup).await?;
        io.flush().await?;

        let messages = self.receive_circuits(channels, total).await?;
        tracing::debug!(total, "received garbled circuits");

        let io = &mut channels[0];
        let packages: Vec<CommitmentsPackage> = io.expect_next().await?;
        if packages.len() != total {
            return Err(CheatError::new(format!(
                "expected {total} commitment packages, got {}",
                packages.len()
            ))
            .into());
        }

        let commitments: DifferenceCommitments = io.expect_next().await?;
        let receiver = receiver.receive_commitments(commitments)?;

        io.send(Reveal {
            selection: selection_decommitment,
            mapping: mapping_decommitment,
            k: receiver.reveal_selection(),
        })
        .await?;

        let DecommitmentsPackage { openings } = io.expect_next().await?;
        if openings.len() != check {
            return Err(CheatError::new(format!(
                "expected {check} checked circuit openings, got {}",
                openings.len()
            ))
            .into());
        }

        let (checked, evaluated): (Vec<_>, Vec<_>) = messages
            .into_iter()
            .zip(packages)
            .enumerate()
            .partition(|(j, _)| selection.is_checked(*j));

        let checked = checked
            .into_iter()
            .zip(openings)
            .map(|((index, (message, package)), opening)| {
                let placement_mask = receiver.verify_opening(index, &opening.difference)?;
                Ok(CheckedCircuit {
                    index,
                    message,
                    package,
                    opening,
                    placement_mask,
                })
            })
            .collect::<Result<Vec<_>, P2Error>>()?;

        let builder = self.builder.clone();
        let threads = self.config.threads();
        CpuBackend::blocking(move || verify_checked(&builder, &checked, threads)).await?;
        tracing::debug!(check, "verified checked circuits");

        let mapping = BucketMapping::new(
            selection.eval_circuits(),
            mapping_seed,
            self.params.buckets(),
            self.params.bucket_size(),
        )?;
        let mut list = BucketList::new(mapping);
        for (j, (message, package)) in evaluated {
            let bundle = LimitedBundleConfig {
                garbled_tables: message.tables,
                translation_table: message.translation_table,
                labels: self.builder.labels(),
                commitments: package,
                difference: receiver.bundle(j)?,
            }
            .finalize()?;

            list.add(bundle, j)?;
        }
        list.check_full()?;

        self.verify_differences(io, &receiver, &mut list).await?;

        Ok(list)
    }

    async fn receive_circuits<Io>(
        &self,
        channels: &mut [Io],
        total: usize,
    ) -> Result<Vec<GarbledCircuitMessage>, P2Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let ranges = chunk_ranges(total, channels.len());
        let chunks = try_join_all(channels.iter_mut().zip(ranges).map(|(io, range)| async move {
            let mut messages = Vec::with_capacity(range.len());
            for _ in range {
                let message: GarbledCircuitMessage = io.expect_next().await?;
                messages.push(message);
            }

            Ok::<_, P2Error>(messages)
        }))
        .await?;

        Ok(chunks.into_iter().flatten().collect())
    }

    /// Checks the claimed placement mask differences of every bucket and stores them.
    async fn verify_differences<Io>(
        &self,
        io: &mut Io,
        receiver: &Receiver<Committed>,
        list: &mut BucketList<LimitedBundle>,
    ) -> Result<(), P2Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let proofs: Vec<ProveDifference> = io.expect_next().await?;
        if proofs.len() != list.len() {
            return Err(CheatError::new(format!(
                "expected difference proofs for {} buckets, got {}",
                list.len(),
                proofs.len()
            ))
            .into());
        }

        let differences = {
            let buckets: Vec<Vec<&DifferenceReceiverBundle>> = list
                .iter()
                .map(|bucket| bucket.iter().map(LimitedBundle::difference).collect())
                .collect();

            for (bucket, proof) in buckets.iter().zip(&proofs) {
                receiver.check_differences(bucket, proof)?;
            }

            io.send(receiver.reveal_challenge()).await?;

            let openings: Vec<DifferenceOpenings> = io.expect_next().await?;
            if openings.len() != proofs.len() {
                return Err(CheatError::new("difference openings do not cover every bucket").into());
            }

            buckets
                .iter()
                .zip(&proofs)
                .zip(&openings)
                .map(|((bucket, proof), openings)| {
                    receiver.verify_differences(bucket, proof, openings)
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        for (bucket, differences) in list.iter_mut().zip(differences) {
            for (bundle, difference) in bucket.iter_mut().zip(differences) {
                bundle.set_placement_mask_difference(difference);
            }
        }

        tracing::debug!(buckets = list.len(), "verified placement mask differences");

        Ok(())
    }
}

fn verify_checked(
    builder: &BundleBuilder,
    checked: &[CheckedCircuit],
    threads: usize,
) -> Result<(), P2Error> {
    let ranges = chunk_ranges(checked.len(), threads);

    cfg_if::cfg_if! {
        if #[cfg(all(feature = "rayon", not(feature = "force-st")))] {
            use rayon::prelude::*;

            ranges.into_par_iter().try_for_each(|range| {
                checked[range]
                    .iter()
                    .try_for_each(|circuit| verify_circuit(builder, circuit))
            })
        } else {
            ranges.into_iter().try_for_each(|range| {
                checked[range]
                    .iter()
                    .try_for_each(|circuit| verify_circuit(builder, circuit))
            })
        }
    }
}

/// Rebuilds a checked circuit from its seed and compares it with everything P1 sent for it.
fn verify_circuit(builder: &BundleBuilder, circuit: &CheckedCircuit) -> Result<(), P2Error> {
    let CheckedCircuit {
        index,
        message,
        package,
        opening,
        placement_mask,
    } = circuit;

    opening
        .seed
        .verify(&package.seed)
        .map_err(|_| CheatError::new(format!("decommitment of seed failed for circuit {index}")))?;
    opening
        .commitment_mask
        .verify(&package.commitment_mask)
        .map_err(|_| {
            CheatError::new(format!(
                "decommitment of commitment mask failed for circuit {index}"
            ))
        })?;

    let bundle = builder.build(*opening.seed.data())?;

    if bundle.commitment_mask() != *opening.commitment_mask.data() {
        return Err(CheatError::new(format!(
            "decommitment of commitment mask does not match the decommitted seed for circuit {index}"
        ))
        .into());
    }

    if bundle.garbled_tables() != &message.tables {
        return Err(CheatError::new(format!(
            "garbled tables do not match the decommitted seed for circuit {index}"
        ))
        .into());
    }

    if bundle.translation_table() != &message.translation_table {
        return Err(CheatError::new(format!(
            "translation table does not match the decommitted seed for circuit {index}"
        ))
        .into());
    }

    let labels = bundle.labels();
    CommitmentBundle::from_commitments(labels.x.clone(), package.x.clone())?
        .verify_equal(bundle.commitments_x())?;

    // The P2 keys of a cheating-recovery circuit depend on the proof of cheating.
    if !builder.is_cheating_recovery() {
        CommitmentBundle::from_commitments(
            labels.y1_extended.clone(),
            package.y1_extended.clone(),
        )?
        .verify_equal(bundle.commitments_y1_extended())?;
        CommitmentBundle::from_commitments(labels.y2.clone(), package.y2.clone())?
            .verify_equal(bundle.commitments_y2())?;
    }

    if bundle.output_commitment() != &package.output {
        return Err(CheatError::new(format!(
            "output commitment does not match the decommitted seed for circuit {index}"
        ))
        .into());
    }

    if bundle.placement_mask() != placement_mask.as_slice() {
        return Err(CheatError::new(format!(
            "committed placement mask does not match the decommitted seed for circuit {index}"
        ))
        .into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use lryao_core::{
        circuits::{adder, xor},
        matrix::ProbeResistantMatrixBuilder,
    };

    use super::*;
    use crate::{
        prover::CutAndChooseProver,
        test_utils::{channels, params},
        ProtocolError,
    };

    fn matrix() -> Arc<lryao_core::matrix::ProbeResistantMatrix> {
        Arc::new(
            ProbeResistantMatrixBuilder::new(32, 8)
                .unwrap()
                .build(&mut rand::thread_rng()),
        )
    }

    #[tokio::test]
    async fn test_detects_wrong_circuit() {
        let _ = tracing_subscriber::fmt::try_init();

        let params = params(adder(32), 2, 3);
        let matrix = matrix();
        let config = ProtocolConfig::default();

        // P1 garbles XOR instead of ADD, with the same input and output shape.
        let prover = CutAndChooseProver::new(
            params.clone(),
            BundleBuilder::new(Arc::new(xor(32)), matrix.clone()).unwrap(),
            config.clone(),
        );
        let verifier = CutAndChooseVerifier::new(
            params.clone(),
            BundleBuilder::new(params.circuit().clone(), matrix).unwrap(),
            config,
        );

        let (mut channels_p1, mut channels_p2) = channels(1);
        let err = tokio::try_join!(
            async {
                prover
                    .execute(&mut channels_p1)
                    .await
                    .map_err(ProtocolError::from)
            },
            async {
                verifier
                    .execute(&mut channels_p2)
                    .await
                    .map_err(ProtocolError::from)
            }
        )
        .unwrap_err();

        assert!(err.is_cheat());
    }

    #[tokio::test]
    async fn test_wrong_channel_count() {
        let params = params(adder(32), 2, 3);
        let builder = BundleBuilder::new(params.circuit().clone(), matrix()).unwrap();
        let verifier = CutAndChooseVerifier::new(
            params,
            builder,
            ProtocolConfig::builder().channels(2).build().unwrap(),
        );

        let (_, mut channels_p2) = channels(1);
        let err = verifier.execute(&mut channels_p2).await.unwrap_err();
        assert!(!err.is_cheat());
    }
}
