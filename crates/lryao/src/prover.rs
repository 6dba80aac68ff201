//! Cut-and-choose prover, run by P1.

use std::sync::Arc;

use futures::future::try_join_all;
use lryao_core::{
    bucket::{BucketList, BucketMapping},
    bundle::{Bundle, BundleBuilder},
    chunks::chunk_ranges,
    commit::HashCommit,
    commitments::{CheckedCircuitOpening, CommitmentsPackage, DecommitmentsPackage},
    difference::{
        committer::state::Committed, Committer, DifferenceCommitterBundle, DifferenceOpenings,
        DifferenceSetup, ProveDifference,
    },
    params::ExecutionParameters,
    Block, CheatError,
};
use serio::{stream::IoStreamExt, IoDuplex, SinkExt};

use crate::{
    backend::CpuBackend,
    msg::{CutAndChooseCommitments, GarbledCircuitMessage, Reveal},
    P1Error, ProtocolConfig,
};

/// Garbles the circuits of one execution, proves the checked ones and buckets the rest.
#[derive(Debug, Clone)]
pub struct CutAndChooseProver {
    params: ExecutionParameters,
    builder: Arc<BundleBuilder>,
    config: ProtocolConfig,
}

impl CutAndChooseProver {
    /// Creates a new prover.
    ///
    /// # Arguments
    ///
    /// * `params` - The execution parameters.
    /// * `builder` - Builds the bundle of each circuit from its seed.
    /// * `config` - The protocol configuration.
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

    /// Runs the cut-and-choose, returning the bundles of the evaluated circuits in buckets.
    ///
    /// Garbled circuits are streamed over every channel, all other messages use the first one.
    #[tracing::instrument(skip_all)]
    pub async fn execute<Io>(&self, channels: &mut [Io]) -> Result<BucketList<Bundle>, P1Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        if channels.len() != self.config.channels() {
            return Err(P1Error::state(format!(
                "expected {} channels, got {}",
                self.config.channels(),
                channels.len()
            )));
        }

        let total = self.params.total_circuits();
        let seeds = Block::random_vec(&mut rand::thread_rng(), total);

        let mut bundles = self.garble(channels, &seeds).await?;
        tracing::debug!(total, "garbled circuits");

        let io = &mut channels[0];
        let challenge: CutAndChooseCommitments = io.expect_next().await?;
        let setup: DifferenceSetup = io.expect_next().await?;

        let (seed_openings, packages): (Vec<_>, Vec<CommitmentsPackage>) = bundles
            .iter()
            .map(|bundle| {
                let (decommitment, commitment) = bundle.seed().hash_commit();
                (decommitment, bundle.commitments_package(commitment))
            })
            .unzip();
        io.send(packages).await?;

        let secrets = bundles
            .iter()
            .map(|bundle| bundle.placement_mask().to_vec())
            .collect();
        let (committer, commitments) = Committer::new(secrets, self.params.statistical_parameter())?
            .commit(setup, &mut rand::thread_rng());
        io.send(commitments).await?;

        for (j, bundle) in bundles.iter_mut().enumerate() {
            bundle.set_difference(committer.bundle(j)?);
        }

        let reveal: Reveal = io.expect_next().await?;
        reveal
            .selection
            .verify(&challenge.selection)
            .map_err(|_| CheatError::new("decommitment of the selection failed!"))?;
        reveal
            .mapping
            .verify(&challenge.mapping)
            .map_err(|_| CheatError::new("decommitment of the mapping seed failed!"))?;

        let selection = reveal.selection.into_inner();
        if committer.receive_selection(&reveal.k)? != selection {
            return Err(CheatError::new(
                "revealed selection differs from the selection in the difference protocol",
            )
            .into());
        }

        if selection.len() != total || selection.eval_circuits().len() != self.params.eval_circuits()
        {
            return Err(CheatError::new(format!(
                "selection evaluates {} of {} circuits, expected {} of {total}",
                selection.eval_circuits().len(),
                selection.len(),
                self.params.eval_circuits()
            ))
            .into());
        }

        let openings = selection
            .check_circuits()
            .iter()
            .map(|&j| {
                Ok(CheckedCircuitOpening {
                    seed: seed_openings[j].clone(),
                    commitment_mask: bundles[j].commitment_mask_decommitment().clone(),
                    difference: committer.open(j)?,
                })
            })
            .collect::<Result<Vec<_>, P1Error>>()?;
        io.send(DecommitmentsPackage { openings }).await?;
        tracing::debug!(
            check = selection.check_circuits().len(),
            "opened checked circuits"
        );

        let mapping = BucketMapping::new(
            selection.eval_circuits(),
            *reveal.mapping.data(),
            self.params.buckets(),
            self.params.bucket_size(),
        )?;
        let mut list = BucketList::new(mapping);
        for (j, bundle) in bundles.into_iter().enumerate() {
            if !selection.is_checked(j) {
                list.add(bundle, j)?;
            }
        }
        list.check_full()?;

        self.prove_differences(io, &committer, &list).await?;

        Ok(list)
    }

    async fn garble<Io>(&self, channels: &mut [Io], seeds: &[Block]) -> Result<Vec<Bundle>, P1Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let ranges = chunk_ranges(seeds.len(), channels.len());
        let chunks = try_join_all(channels.iter_mut().zip(ranges).map(|(io, range)| {
            let builder = self.builder.clone();
            let seeds = seeds[range].to_vec();
            async move {
                let bundles = CpuBackend::blocking(move || {
                    seeds
                        .into_iter()
                        .map(|seed| builder.build(seed))
                        .collect::<Result<Vec<_>, _>>()
                })
                .await?;

                for bundle in &bundles {
                    io.feed(GarbledCircuitMessage {
                        tables: bundle.garbled_tables().clone(),
                        translation_table: bundle.translation_table().clone(),
                    })
                    .await?;
                }
                io.flush().await?;

                Ok::<_, P1Error>(bundles)
            }
        }))
        .await?;

        Ok(chunks.into_iter().flatten().collect())
    }

    /// Proves the placement masks of adjacent circuits in each bucket differ by the claimed
    /// values.
    ///
    /// Every bucket's differences are sent before the challenge is opened.
    async fn prove_differences<Io>(
        &self,
        io: &mut Io,
        committer: &Committer<Committed>,
        list: &BucketList<Bundle>,
    ) -> Result<(), P1Error>
    where
        Io: IoDuplex + Unpin + Send,
    {
        let buckets = list
            .iter()
            .map(|bucket| {
                bucket
                    .iter()
                    .map(|bundle| {
                        bundle
                            .difference()
                            .ok_or_else(|| P1Error::state("bundle has no difference commitments"))
                    })
                    .collect::<Result<Vec<&DifferenceCommitterBundle>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        let proofs = buckets
            .iter()
            .map(|bucket| committer.prove_differences(bucket))
            .collect::<Result<Vec<ProveDifference>, _>>()?;
        io.send(proofs).await?;

        let w = io.expect_next().await?;
        let openings = buckets
            .iter()
            .map(|bucket| committer.open_differences(bucket, &w))
            .collect::<Result<Vec<DifferenceOpenings>, _>>()?;
        io.send(openings).await?;

        tracing::debug!(buckets = buckets.len(), "proved placement mask differences");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lryao_core::{circuits::adder, matrix::ProbeResistantMatrixBuilder};

    use super::*;
    use crate::{
        test_utils::{channels, params},
        verifier::CutAndChooseVerifier,
        ProtocolError,
    };

    #[tokio::test]
    async fn test_cut_and_choose() {
        let _ = tracing_subscriber::fmt::try_init();

        let params = params(adder(32), 3, 2);
        let matrix = Arc::new(
            ProbeResistantMatrixBuilder::new(32, 8)
                .unwrap()
                .build(&mut rand::thread_rng()),
        );
        let builder = BundleBuilder::new(params.circuit().clone(), matrix).unwrap();
        let config = ProtocolConfig::builder()
            .channels(3)
            .threads(2)
            .build()
            .unwrap();

        let prover = CutAndChooseProver::new(params.clone(), builder.clone(), config.clone());
        let verifier = CutAndChooseVerifier::new(params, builder, config);

        let (mut channels_p1, mut channels_p2) = channels(3);
        let (bundles, limited) = tokio::try_join!(
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
        .unwrap();

        assert_eq!(bundles.len(), 3);
        assert_eq!(limited.len(), 3);
        for (bundles, limited) in bundles.iter().zip(limited.iter()) {
            assert_eq!(bundles.len(), 2);
            for (bundle, limited) in bundles.iter().zip(limited) {
                assert_eq!(bundle.garbled_tables(), limited.garbled_tables());
                assert_eq!(bundle.translation_table(), limited.translation_table());
            }
        }
    }

    #[tokio::test]
    async fn test_wrong_channel_count() {
        let params = params(adder(8), 1, 2);
        let matrix = Arc::new(
            ProbeResistantMatrixBuilder::new(8, 4)
                .unwrap()
                .build(&mut rand::thread_rng()),
        );
        let builder = BundleBuilder::new(params.circuit().clone(), matrix).unwrap();
        let prover = CutAndChooseProver::new(params, builder, ProtocolConfig::default());

        let (mut channels_p1, _channels_p2) = channels(2);
        assert!(prover.execute(&mut channels_p1).await.is_err());
    }
}
